//! Low-level SMTP stream handling.

use super::Timeouts;
use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

/// Longest reply line accepted from the server, CRLF included.
///
/// RFC 5321 allows 512 octets; relays in the wild exceed that in EHLO
/// banners, so this leaves headroom while still bounding memory.
const MAX_LINE_LEN: u64 = 4096;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp {
        /// Buffered socket.
        reader: BufReader<TcpStream>,
        /// Per-operation deadline.
        io_timeout: Duration,
    },
    /// TLS-encrypted connection.
    Tls {
        /// Buffered TLS session.
        reader: Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>,
        /// Per-operation deadline.
        io_timeout: Duration,
    },
}

impl SmtpStream {
    /// Returns true once the stream has been upgraded to TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    pub(crate) const fn io_timeout(&self) -> Duration {
        match self {
            Self::Tcp { io_timeout, .. } | Self::Tls { io_timeout, .. } => *io_timeout,
        }
    }

    /// Reads one line from the stream, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, times out, the peer closes the
    /// connection, or the line exceeds the maximum length.
    pub async fn read_line(&mut self) -> Result<String> {
        let deadline = self.io_timeout();
        let mut line = String::new();
        let read = match self {
            Self::Tcp { reader, .. } => {
                bounded(deadline, "reply", (&mut *reader).take(MAX_LINE_LEN).read_line(&mut line))
                    .await?
            }
            Self::Tls { reader, .. } => {
                let reader = &mut **reader;
                bounded(deadline, "reply", reader.take(MAX_LINE_LEN).read_line(&mut line)).await?
            }
        };

        if read == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        if !line.ends_with('\n') {
            return Err(Error::Protocol("reply line too long".into()));
        }

        Ok(line.trim_end().to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.io_timeout();
        match self {
            Self::Tcp { reader, .. } => {
                let inner = reader.get_mut();
                bounded(deadline, "write", async {
                    inner.write_all(data).await?;
                    inner.flush().await
                })
                .await
            }
            Self::Tls { reader, .. } => {
                let inner = reader.get_mut();
                bounded(deadline, "write", async {
                    inner.write_all(data).await?;
                    inner.flush().await
                })
                .await
            }
        }
    }

    /// Upgrades a TCP stream to TLS, validating the certificate against
    /// `server_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted, the name is not
    /// a valid DNS name or IP address, or the handshake fails or times out.
    pub async fn upgrade_to_tls(self, server_name: &str, connector: &TlsConnector) -> Result<Self> {
        let (tcp_stream, io_timeout) = match self {
            Self::Tcp { reader, io_timeout } => (reader.into_inner(), io_timeout),
            Self::Tls { .. } => return Err(Error::Protocol("already using TLS".into())),
        };

        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| Error::InvalidHostname(server_name.to_string()))?;

        let tls_stream = tokio::time::timeout(io_timeout, connector.connect(name, tcp_stream))
            .await
            .map_err(|_| Error::Timeout("TLS handshake"))?
            .map_err(Error::Handshake)?;

        Ok(Self::Tls {
            reader: Box::new(BufReader::new(tls_stream)),
            io_timeout,
        })
    }
}

/// Connects to an SMTP server over plain TCP, ready for STARTTLS.
///
/// # Errors
///
/// Returns an error if the connection fails or exceeds the connect timeout.
pub async fn connect(hostname: &str, port: u16, timeouts: Timeouts) -> Result<SmtpStream> {
    let stream = tokio::time::timeout(timeouts.connect, TcpStream::connect((hostname, port)))
        .await
        .map_err(|_| Error::Timeout("connect"))??;

    Ok(SmtpStream::Tcp {
        reader: BufReader::new(stream),
        io_timeout: timeouts.io,
    })
}

/// Creates a TLS connector that validates certificates against the
/// webpki root set.
#[must_use]
pub fn tls_connector() -> TlsConnector {
    install_crypto_provider();

    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Installs aws-lc-rs as the process-wide rustls provider unless one is
/// already installed.
///
/// [`tls_connector`] calls this; callers building their own rustls 0.23
/// client config must call it first.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

async fn bounded<T>(
    deadline: Duration,
    operation: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Error::Timeout(operation))?
        .map_err(Error::Io)
}
