//! The notification sent to the administrative mailbox.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::request::AccountRequest;

/// Subject line of every notification.
pub const SUBJECT: &str = "New Account Request!";

const USERNAME_PREFIX: &str = "Username: ";
const EMAIL_PREFIX: &str = "Email: ";

/// Longest encoded line in a quoted-printable body (RFC 2045).
const QP_MAX_LINE_LENGTH: usize = 76;

/// Content-Transfer-Encoding of a rendered body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// Plain ASCII.
    SevenBit,
    /// Raw UTF-8; needs a relay that advertises 8BITMIME.
    EightBit,
    /// Quoted-printable, for non-ASCII bodies on 7-bit relays.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Picks the encoding for `body` given whether the relay accepts 8-bit
    /// bodies.
    #[must_use]
    pub const fn select(body: &str, eight_bit_mime: bool) -> Self {
        if body.is_ascii() {
            Self::SevenBit
        } else if eight_bit_mime {
            Self::EightBit
        } else {
            Self::QuotedPrintable
        }
    }

    /// The header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::QuotedPrintable => "quoted-printable",
        }
    }
}

/// A notification built deterministically from an [`AccountRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    /// Envelope and header sender.
    pub from: String,
    /// Envelope and header recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
}

impl NotificationMessage {
    /// Composes the notification for `request`.
    #[must_use]
    pub fn compose(request: &AccountRequest, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: SUBJECT.to_string(),
            body: format!(
                "{USERNAME_PREFIX}{}\n{EMAIL_PREFIX}{}",
                request.username(),
                request.email()
            ),
        }
    }

    /// Recovers `(username, email)` from a composed body.
    ///
    /// Returns `None` if the body does not have the composed shape.
    #[must_use]
    pub fn parse_body(body: &str) -> Option<(&str, &str)> {
        let (first, second) = body.split_once('\n')?;
        let username = first.strip_prefix(USERNAME_PREFIX)?;
        let email = second.strip_prefix(EMAIL_PREFIX)?;
        if email.contains('\n') {
            return None;
        }
        Some((username, email))
    }

    /// Builds the RFC 5322 formatted message with the body in `encoding`.
    #[must_use]
    pub fn to_rfc5322(&self, date: DateTime<Utc>, encoding: TransferEncoding) -> String {
        let mut message = String::new();

        let _ = write!(message, "From: {}\r\n", self.from);
        let _ = write!(message, "To: {}\r\n", self.to);
        let _ = write!(message, "Subject: {}\r\n", self.subject);
        let _ = write!(message, "Date: {}\r\n", date.to_rfc2822());
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        let _ = write!(message, "Content-Transfer-Encoding: {}\r\n", encoding.as_str());

        // Empty line between headers and body
        message.push_str("\r\n");

        for line in self.body.split('\n') {
            match encoding {
                TransferEncoding::QuotedPrintable => encode_quoted_printable_line(line, &mut message),
                TransferEncoding::SevenBit | TransferEncoding::EightBit => message.push_str(line),
            }
            message.push_str("\r\n");
        }

        message
    }
}

/// Appends one body line in quoted-printable form, inserting soft breaks so
/// no encoded line exceeds [`QP_MAX_LINE_LENGTH`].
fn encode_quoted_printable_line(line: &str, out: &mut String) {
    let bytes = line.as_bytes();
    let mut line_length = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        let is_last = i + 1 == bytes.len();
        let literal = matches!(byte, b'!'..=b'<' | b'>'..=b'~') || (byte == b' ' && !is_last);
        let width = if literal { 1 } else { 3 };

        // Leave room for the `=` of a soft break.
        if line_length + width > QP_MAX_LINE_LENGTH - 1 {
            out.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "={byte:02X}");
        }
        line_length += width;
    }
}
