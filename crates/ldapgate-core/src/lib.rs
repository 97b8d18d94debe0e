//! # ldapgate-core
//!
//! The duplicate-check-and-notify pipeline behind the account-request
//! gateway.
//!
//! This crate provides:
//! - Request and message types ([`AccountRequest`], [`NotificationMessage`])
//! - The [`DirectoryChecker`] capability and its LDAP implementation
//! - The [`MailTransport`] capability and its SMTP implementation
//! - [`RequestPipeline`], which sequences the two and yields an [`Outcome`]
//! - Immutable process configuration ([`GatewayConfig`])
//!
//! The pipeline fails closed: a notification is only sent after the
//! directory positively confirmed the username is absent.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod directory;
pub mod message;
pub mod notify;
mod outcome;
pub mod pipeline;
pub mod request;

pub use config::{
    ConfigError, DirectoryConfig, DirectorySecurity, GatewayConfig, HttpConfig, MailConfig,
};
pub use directory::{DirectoryChecker, DirectoryError, DirectoryQuery, DirectoryStage, LdapDirectory};
pub use message::{NotificationMessage, SUBJECT, TransferEncoding};
pub use notify::{DeliveryError, DeliveryErrorKind, DeliveryStage, MailTransport, SmtpMailer};
pub use outcome::Outcome;
pub use pipeline::RequestPipeline;
pub use request::{AccountRequest, Field, ValidationError};
