//! Request body decoding for `POST /request`.

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Raw `username`/`email` fields. Missing fields decode as empty strings
/// and are left for validation to reject.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccountForm {
    /// Requested username.
    pub username: String,
    /// Requester's email address.
    pub email: String,
}

/// The body could not be decoded as JSON or as a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRequest;

impl IntoResponse for InvalidRequest {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, "Invalid request data").into_response()
    }
}

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|mime| {
            mime.eq_ignore_ascii_case("application/json")
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
}

impl<S> FromRequest<S> for AccountForm
where
    S: Send + Sync,
{
    type Rejection = InvalidRequest;

    async fn from_request(mut req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(&req) {
            let Json(form) = Json::<Self>::from_request(req, state)
                .await
                .map_err(|e| {
                    tracing::debug!(error = %e, "Rejected JSON body");
                    InvalidRequest
                })?;
            return Ok(form);
        }

        // Anything that is not JSON is decoded as a urlencoded form.
        req.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let Form(form) = Form::<Self>::from_request(req, state)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected form body");
                InvalidRequest
            })?;
        Ok(form)
    }
}
