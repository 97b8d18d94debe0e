//! SMTP implementation of [`MailTransport`].

use async_trait::async_trait;
use chrono::Utc;
use ldapgate_smtp::connection::{connect, tls_connector};
use ldapgate_smtp::{Address, Client, Extension, SmtpConnection};
use secrecy::ExposeSecret;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use super::{DeliveryError, DeliveryErrorKind, DeliveryStage, MailTransport};
use crate::config::MailConfig;
use crate::message::{NotificationMessage, TransferEncoding};

/// Delivers notifications over a fresh STARTTLS + AUTH PLAIN session per
/// message.
pub struct SmtpMailer {
    config: MailConfig,
    connector: TlsConnector,
}

impl SmtpMailer {
    /// Creates a mailer validating relay certificates against the webpki
    /// root set.
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        Self::with_connector(config, tls_connector())
    }

    /// Creates a mailer with a caller-supplied TLS connector.
    #[must_use]
    pub const fn with_connector(config: MailConfig, connector: TlsConnector) -> Self {
        Self { config, connector }
    }

    /// The relay settings.
    #[must_use]
    pub const fn config(&self) -> &MailConfig {
        &self.config
    }
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn failed(stage: DeliveryStage) -> impl FnOnce(ldapgate_smtp::Error) -> DeliveryError {
    move |e| {
        warn!(%stage, error = %e, "SMTP delivery failed");
        DeliveryError::from_smtp(stage, &e)
    }
}

fn envelope_address(raw: &str, stage: DeliveryStage) -> Result<Address, DeliveryError> {
    Address::new(raw).map_err(|_| {
        warn!(%stage, "Envelope address is not usable");
        DeliveryError::new(stage, DeliveryErrorKind::InvalidAddress)
    })
}

#[async_trait]
impl MailTransport for SmtpMailer {
    #[tracing::instrument(name = "SmtpMailer::notify", skip_all)]
    async fn notify(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let from = envelope_address(&message.from, DeliveryStage::SetSender)?;
        let to = envelope_address(&message.to, DeliveryStage::SetRecipient)?;
        let config = &self.config;

        let stream = connect(&config.host, config.port, config.timeouts)
            .await
            .map_err(failed(DeliveryStage::Connect))?;
        let client = Client::from_stream(stream, config.helo_name.as_str())
            .await
            .map_err(failed(DeliveryStage::Connect))?
            .ehlo()
            .await
            .map_err(failed(DeliveryStage::Connect))?;

        let client = client
            .starttls(&config.host, &self.connector)
            .await
            .map_err(failed(DeliveryStage::StartTls))?;

        let client = client
            .auth_plain(&config.username, config.password.expose_secret())
            .await
            .map_err(failed(DeliveryStage::Authenticate))?;

        let eight_bit_mime = client.server_info().supports(&Extension::EightBitMime);
        let encoding = TransferEncoding::select(&message.body, eight_bit_mime);
        debug!(encoding = encoding.as_str(), "Body encoding selected");

        let client = client
            .mail_from(&from, encoding == TransferEncoding::EightBit)
            .await
            .map_err(failed(DeliveryStage::SetSender))?;
        let client = client
            .rcpt_to(&to)
            .await
            .map_err(failed(DeliveryStage::SetRecipient))?;

        let mut client = client
            .data()
            .await
            .map_err(failed(DeliveryStage::WriteBody))?;
        client
            .write_message(message.to_rfc5322(Utc::now(), encoding).as_bytes())
            .await
            .map_err(failed(DeliveryStage::WriteBody))?;

        let client = client
            .commit()
            .await
            .map_err(failed(DeliveryStage::Commit))?;
        info!(relay = %config.host, "Notification accepted by relay");

        // The message is committed; a failed QUIT does not undo that.
        if let Err(e) = client.quit().await {
            debug!(error = %e, "QUIT after delivery failed");
        }

        Ok(())
    }
}
