//! Delivery of notifications to the administrative mailbox.

mod smtp;

pub use smtp::SmtpMailer;

use async_trait::async_trait;

use crate::message::NotificationMessage;

/// Hands a notification to a mail relay.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Delivers `message`. `Ok` means the relay accepted the message data.
    async fn notify(&self, message: &NotificationMessage) -> Result<(), DeliveryError>;
}

/// Step of an SMTP delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    /// TCP connect, greeting and first EHLO.
    Connect,
    /// STARTTLS upgrade and second EHLO.
    StartTls,
    /// AUTH PLAIN.
    Authenticate,
    /// MAIL FROM.
    SetSender,
    /// RCPT TO.
    SetRecipient,
    /// DATA and message transfer.
    WriteBody,
    /// End-of-data and the relay's final reply.
    Commit,
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::StartTls => "starttls",
            Self::Authenticate => "authenticate",
            Self::SetSender => "set sender",
            Self::SetRecipient => "set recipient",
            Self::WriteBody => "write body",
            Self::Commit => "commit",
        })
    }
}

/// What went wrong during a delivery stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    /// Transport failure.
    Io,
    /// TLS handshake failure.
    Tls,
    /// Deadline elapsed.
    Timeout,
    /// The relay refused with this reply code.
    Rejected {
        /// SMTP reply code.
        code: u16,
    },
    /// The relay lacks a required capability.
    NotSupported,
    /// The relay violated the protocol.
    Protocol,
    /// A configured or requested address is not usable.
    InvalidAddress,
}

impl std::fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io => f.write_str("I/O error"),
            Self::Tls => f.write_str("TLS handshake failed"),
            Self::Timeout => f.write_str("timed out"),
            Self::Rejected { code } => write!(f, "rejected with {code}"),
            Self::NotSupported => f.write_str("capability not offered"),
            Self::Protocol => f.write_str("protocol violation"),
            Self::InvalidAddress => f.write_str("invalid address"),
        }
    }
}

/// A failed delivery, classified by stage and cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("delivery failed at {stage}: {kind}")]
pub struct DeliveryError {
    /// Where it failed.
    pub stage: DeliveryStage,
    /// Why it failed.
    pub kind: DeliveryErrorKind,
}

impl DeliveryError {
    /// Creates a delivery error.
    #[must_use]
    pub const fn new(stage: DeliveryStage, kind: DeliveryErrorKind) -> Self {
        Self { stage, kind }
    }

    pub(crate) fn from_smtp(stage: DeliveryStage, error: &ldapgate_smtp::Error) -> Self {
        use ldapgate_smtp::Error;

        let kind = match error {
            Error::Io(_) => DeliveryErrorKind::Io,
            Error::Handshake(_) => DeliveryErrorKind::Tls,
            Error::Timeout(_) => DeliveryErrorKind::Timeout,
            Error::Rejected { code, .. } => DeliveryErrorKind::Rejected { code: *code },
            Error::NotSupported(_) => DeliveryErrorKind::NotSupported,
            Error::Protocol(_) | Error::InvalidHostname(_) => DeliveryErrorKind::Protocol,
            Error::InvalidAddress(_) => DeliveryErrorKind::InvalidAddress,
        };
        Self { stage, kind }
    }
}
