//! Caller-visible result of processing one request.

use crate::directory::DirectoryError;
use crate::notify::DeliveryError;
use crate::request::ValidationError;

/// Result of [`RequestPipeline::process`](crate::RequestPipeline::process).
///
/// The carried causes are classified errors only; server replies and
/// credentials never reach this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Username was available and the notification was committed.
    Success,
    /// Username already exists in the directory.
    Conflict,
    /// Input was missing or malformed.
    ValidationFailed(ValidationError),
    /// The existence check could not be completed.
    DirectoryUnavailable(DirectoryError),
    /// The notification could not be delivered.
    DeliveryFailed(DeliveryError),
}

impl Outcome {
    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short message safe to show to the requester.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Success => "Email sent successfully",
            Self::Conflict => "Username already exists!",
            Self::ValidationFailed(ValidationError::ControlCharacter(_)) => {
                "Username and email must not contain control characters"
            }
            Self::ValidationFailed(ValidationError::TooLong(_)) => "Username or email is too long",
            Self::ValidationFailed(_) => "Username and email are required",
            Self::DirectoryUnavailable(_) => "Error processing request",
            Self::DeliveryFailed(_) => "Error sending email",
        }
    }
}
