//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS handshake failed (certificate rejected, protocol mismatch, ...).
    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),

    /// An operation did not finish within its deadline.
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// Server returned an error reply.
    #[error("SMTP error {code}: {message}")]
    Rejected {
        /// Reply code (e.g., 535).
        code: u16,
        /// Reply text from the server.
        message: String,
    },

    /// Protocol error (malformed or unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid TLS server name.
    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    /// Feature not advertised by the server.
    #[error("Server does not support {0}")]
    NotSupported(&'static str),
}

impl Error {
    /// Creates a rejection error from a reply code and message.
    #[must_use]
    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Returns the server reply code, if this error came from a reply.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejection_carries_reply() {
        let auth = Error::rejected(535, "5.7.8 bad credentials");
        assert_eq!(auth.reply_code(), Some(535));
        assert_eq!(auth.to_string(), "SMTP error 535: 5.7.8 bad credentials");
    }

    #[test]
    fn non_reply_errors_have_no_code() {
        assert_eq!(Error::Timeout("greeting").reply_code(), None);
        assert_eq!(Error::NotSupported("STARTTLS").reply_code(), None);
    }
}
