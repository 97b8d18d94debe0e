//! # ldapgate-smtp
//!
//! A small SMTP submission client (RFC 5321 + RFC 3207 STARTTLS + RFC 4954
//! AUTH PLAIN) used to hand a single notification to a relay.
//!
//! The client only supports the submission path the gateway needs:
//!
//! ```text
//! connect ─→ Connected ─ starttls() ─→ Secured ─ auth_plain() ─→ Authenticated
//!                                                                    │
//!      Authenticated ←─ commit() ── Data ←─ data() ── RecipientAdded ←┘ mail_from()/rcpt_to()
//! ```
//!
//! Credentials can only be sent from the `Secured` state, so a plaintext
//! AUTH exchange is unrepresentable. Every read, write and handshake is
//! bounded by the [`Timeouts`] the stream was opened with.
//!
//! ```ignore
//! use ldapgate_smtp::{Address, Client, Timeouts};
//! use ldapgate_smtp::connection::{connect, tls_connector};
//!
//! let stream = connect("smtp.example.com", 587, Timeouts::default()).await?;
//! let client = Client::from_stream(stream, "gateway.example.com").await?;
//! let client = client.ehlo().await?;
//! let client = client.starttls("smtp.example.com", &tls_connector()).await?;
//! let client = client.auth_plain("svc", "secret").await?;
//! let client = client.mail_from(&Address::new("noreply@example.com")?, false).await?;
//! let client = client.rcpt_to(&Address::new("admin@example.com")?).await?;
//! let mut client = client.data().await?;
//! client.write_message(b"Subject: hi\r\n\r\nbody").await?;
//! let client = client.commit().await?;
//! client.quit().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, Secured, ServerInfo,
    SmtpConnection, Timeouts,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
