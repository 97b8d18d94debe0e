//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, Secured,
    SmtpConnection,
};
pub use stream::{SmtpStream, connect, install_crypto_provider, tls_connector};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;
use std::time::Duration;

/// Deadlines applied to every network operation of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect ceiling.
    pub connect: Duration,
    /// Ceiling for each read, write and the TLS handshake.
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(35),
            io: Duration::from_secs(30),
        }
    }
}

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns supported authentication mechanisms, merged across every
    /// advertised `AUTH` line.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        let mut merged = Vec::new();
        for mechanism in self
            .extensions
            .iter()
            .filter_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms),
                _ => None,
            })
            .flatten()
        {
            if !merged.contains(mechanism) {
                merged.push(*mechanism);
            }
        }
        merged
    }

    /// Replaces the extension set from the lines of an EHLO reply.
    pub(crate) fn set_extensions<'a>(&mut self, lines: impl Iterator<Item = &'a String>) {
        self.extensions = lines.map(|line| Extension::parse(line)).collect();
    }
}
