//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use std::marker::PhantomData;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Most lines accepted in one reply.
const MAX_REPLY_LINES: usize = 64;

/// Type-state marker for a plaintext session after the greeting.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for a session upgraded with STARTTLS.
#[derive(Debug)]
pub struct Secured;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
///
/// Every transition consumes the client. When the server rejects a command
/// the client sends a best-effort `QUIT` before returning the error, so a
/// failed transition always releases the session.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    helo_name: String,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;

    /// Returns true once the session is encrypted.
    fn is_encrypted(&self) -> bool;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn is_encrypted(&self) -> bool {
        self.stream.is_tls()
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// `helo_name` is the identity announced in every EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or the server refuses
    /// the session.
    pub async fn from_stream(mut stream: SmtpStream, helo_name: impl Into<String>) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        let client = Self {
            stream,
            server_info: ServerInfo {
                hostname,
                ..ServerInfo::default()
            },
            helo_name: helo_name.into(),
            _state: PhantomData,
        };

        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(client.reject(greeting).await);
        }

        debug!(server = %client.server_info.hostname, "SMTP greeting received");
        Ok(client)
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self) -> Result<Self> {
        if let Err(error) = self.send_ehlo().await {
            return Err(self.release_on_reject(error).await);
        }
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO over
    /// the encrypted channel.
    ///
    /// `server_name` is the name the certificate is validated against.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised, the server refuses
    /// it, or the handshake fails.
    pub async fn starttls(
        mut self,
        server_name: &str,
        connector: &TlsConnector,
    ) -> Result<Client<Secured>> {
        if !self.server_info.supports_starttls() {
            return Err(self.abandon_with(Error::NotSupported("STARTTLS")).await);
        }

        let reply = self.send_command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(self.reject(reply).await);
        }

        let mut client: Client<Secured> = Client {
            stream: self.stream.upgrade_to_tls(server_name, connector).await?,
            server_info: self.server_info,
            helo_name: self.helo_name,
            _state: PhantomData,
        };
        debug!(server_name, "STARTTLS negotiated");

        // RFC 3207: capabilities advertised before the upgrade are discarded.
        if let Err(error) = client.send_ehlo().await {
            return Err(client.release_on_reject(error).await);
        }
        Ok(client)
    }
}

impl Client<Secured> {
    /// Authenticates using the PLAIN mechanism with an initial response.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not offer PLAIN or rejects the
    /// credentials.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        if !self.server_info.auth_mechanisms().contains(&AuthMechanism::Plain) {
            return Err(self.abandon_with(Error::NotSupported("AUTH PLAIN")).await);
        }

        // RFC 4616: [authzid] NUL authcid NUL passwd
        let credentials = format!("\0{username}\0{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());

        let reply = self
            .send_command(&Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: encoded,
            })
            .await?;

        if !reply.is_success() {
            return Err(self.reject(reply).await);
        }

        Ok(self.transition())
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// With `eight_bit` set the body is declared as `BODY=8BITMIME`.
    ///
    /// # Errors
    ///
    /// Returns an error if `eight_bit` is set but the server does not
    /// advertise 8BITMIME, or if the MAIL FROM command fails.
    pub async fn mail_from(
        mut self,
        from: &Address,
        eight_bit: bool,
    ) -> Result<Client<MailTransaction>> {
        if eight_bit && !self.server_info.supports(&Extension::EightBitMime) {
            return Err(self.abandon_with(Error::NotSupported("8BITMIME")).await);
        }

        let reply = self
            .send_command(&Command::MailFrom {
                from: from.clone(),
                eight_bit,
            })
            .await?;

        if !reply.is_success() {
            return Err(self.reject(reply).await);
        }

        Ok(self.transition())
    }
}

impl Client<MailTransaction> {
    /// Adds the recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Client<RecipientAdded>> {
        if let Err(error) = self.add_recipient(to).await {
            return Err(self.release_on_reject(error).await);
        }
        Ok(self.transition())
    }
}

impl Client<RecipientAdded> {
    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers 354.
    pub async fn data(mut self) -> Result<Client<Data>> {
        let reply = self.send_command(&Command::Data).await?;

        if reply.code != ReplyCode::START_DATA {
            return Err(self.reject(reply).await);
        }

        Ok(self.transition())
    }
}

impl Client<Data> {
    /// Streams the message content.
    ///
    /// Line endings are normalized to CRLF and lines starting with `.` are
    /// dot-stuffed. Nothing is delivered until [`Client::commit`] succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub async fn write_message(&mut self, message: &[u8]) -> Result<()> {
        self.stream.write_all(&encode_data(message)).await
    }

    /// Sends the terminating `.` line and waits for the server to accept
    /// the message.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not accept the message.
    pub async fn commit(mut self) -> Result<Client<Authenticated>> {
        self.stream.write_all(b".\r\n").await?;
        let reply = read_reply(&mut self.stream).await?;

        if !reply.is_success() {
            return Err(self.reject(reply).await);
        }

        debug!(code = %reply.code, "message accepted");
        Ok(self.transition())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        debug!(command = cmd.verb(), code = %reply.code, "SMTP exchange");
        Ok(reply)
    }

    async fn send_ehlo(&mut self) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: self.helo_name.clone(),
        };
        let reply = self.send_command(&cmd).await?;

        if !reply.is_success() {
            return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
        }

        // First line echoes the server name; capabilities follow.
        self.server_info.set_extensions(reply.message.iter().skip(1));
        Ok(())
    }

    async fn add_recipient(&mut self, to: &Address) -> Result<()> {
        let reply = self
            .send_command(&Command::RcptTo { to: to.clone() })
            .await?;

        if !reply.is_success() {
            return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
        }
        Ok(())
    }

    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            helo_name: self.helo_name,
            _state: PhantomData,
        }
    }

    /// Turns a rejection into an error after releasing the session.
    async fn reject(self, reply: Reply) -> Error {
        let error = Error::rejected(reply.code.as_u16(), reply.message_text());
        self.abandon_with(error).await
    }

    /// Releases the session politely only when the link is still usable.
    async fn release_on_reject(self, error: Error) -> Error {
        if matches!(error, Error::Rejected { .. }) {
            self.abandon_with(error).await
        } else {
            error
        }
    }

    async fn abandon_with(mut self, error: Error) -> Error {
        if let Err(quit_error) = self.send_command(&Command::Quit).await {
            debug!(error = %quit_error, "QUIT after failure was not acknowledged");
        }
        error
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(&Command::Quit).await?;

        if !reply.is_success() {
            return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
        }

        Ok(())
    }
}

/// Reads one complete reply. The whole reply, not just each line, must
/// arrive within the stream's I/O deadline.
async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let deadline = stream.io_timeout();
    tokio::time::timeout(deadline, read_reply_lines(stream))
        .await
        .map_err(|_| Error::Timeout("reply"))?
}

async fn read_reply_lines(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    for _ in 0..MAX_REPLY_LINES {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            return parse_reply(&lines);
        }
    }

    Err(Error::Protocol("reply too long".into()))
}

/// Encodes a message for the DATA phase: CRLF line endings, dot-stuffing,
/// and a guaranteed trailing CRLF. The terminating `.` line is not included.
#[must_use]
pub(crate) fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 32 + 2);
    if message.is_empty() {
        return out;
    }

    let body = message.strip_suffix(b"\n").unwrap_or(message);

    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_line_endings() {
        assert_eq!(encode_data(b"a\nb\r\nc"), b"a\r\nb\r\nc\r\n");
    }

    #[test]
    fn does_not_double_trailing_newline() {
        assert_eq!(encode_data(b"Subject: x\r\n\r\nbody\r\n"), b"Subject: x\r\n\r\nbody\r\n");
    }

    #[test]
    fn dot_stuffs_leading_dots() {
        assert_eq!(encode_data(b".\n..hidden\nok."), b"..\r\n...hidden\r\nok.\r\n");
    }

    #[test]
    fn empty_message_produces_nothing() {
        assert!(encode_data(b"").is_empty());
    }
}
