//! # ldapgate
//!
//! HTTP surface of the account-request gateway.
//!
//! `POST /request` takes a `username`/`email` pair (JSON or form encoded),
//! runs it through [`RequestPipeline`] and answers with a plain text
//! status message. `GET /health` reports liveness.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod extract;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header, header::InvalidHeaderValue},
    routing::{get, post},
};
use ldapgate_core::{DirectoryChecker, MailTransport, Outcome, RequestPipeline};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::extract::AccountForm;

/// Builds the gateway router over a shared pipeline.
pub fn router<D, M>(pipeline: Arc<RequestPipeline<D, M>>, cors: CorsLayer) -> Router
where
    D: DirectoryChecker + 'static,
    M: MailTransport + 'static,
{
    Router::new()
        .route("/request", post(submit::<D, M>))
        .route("/health", get(health))
        .with_state(pipeline)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Builds the CORS policy.
///
/// With no configured origins any origin is allowed, without credentials.
/// Otherwise only the listed origins are allowed, with credentials.
///
/// # Errors
///
/// Returns an error if an origin is not a valid header value.
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, InvalidHeaderValue> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::ORIGIN, header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return Ok(cors.allow_origin(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cors
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true))
}

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().compact())
        .try_init()?;

    Ok(())
}

/// HTTP status for an outcome.
#[must_use]
pub const fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Success => StatusCode::OK,
        Outcome::Conflict => StatusCode::CONFLICT,
        Outcome::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        Outcome::DirectoryUnavailable(_) | Outcome::DeliveryFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[tracing::instrument(name = "POST /request", skip_all)]
async fn submit<D, M>(
    State(pipeline): State<Arc<RequestPipeline<D, M>>>,
    form: AccountForm,
) -> (StatusCode, &'static str)
where
    D: DirectoryChecker + 'static,
    M: MailTransport + 'static,
{
    let outcome = pipeline.process_raw(&form.username, &form.email).await;
    (status_for(&outcome), outcome.public_message())
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ldapgate_core::{
        DeliveryError, DeliveryErrorKind, DeliveryStage, DirectoryError, ValidationError,
    };

    #[test]
    fn maps_every_outcome() {
        assert_eq!(status_for(&Outcome::Success), StatusCode::OK);
        assert_eq!(status_for(&Outcome::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Outcome::ValidationFailed(ValidationError::EmptyUsername)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Outcome::DirectoryUnavailable(DirectoryError::Connect)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&Outcome::DeliveryFailed(DeliveryError::new(
                DeliveryStage::Commit,
                DeliveryErrorKind::Timeout
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rejects_unusable_origins() {
        assert!(cors_layer(&["https://ok.example.com".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
        assert!(cors_layer(&[]).is_ok());
    }
}
