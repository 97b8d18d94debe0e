//! Request processing: validate, check the directory, then notify.

use tracing::{info, warn};

use crate::config::{DirectoryConfig, MailConfig};
use crate::directory::{DirectoryChecker, LdapDirectory};
use crate::message::NotificationMessage;
use crate::notify::{MailTransport, SmtpMailer};
use crate::outcome::Outcome;
use crate::request::AccountRequest;

/// Sequences the directory check and the notification for one request.
///
/// Holds no per-request state, so one instance can serve any number of
/// concurrent requests.
#[derive(Debug)]
pub struct RequestPipeline<D, M> {
    directory: D,
    mailer: M,
    sender: String,
    recipient: String,
}

impl RequestPipeline<LdapDirectory, SmtpMailer> {
    /// Builds the production pipeline from configuration.
    #[must_use]
    pub fn from_config(directory: DirectoryConfig, mail: MailConfig) -> Self {
        let sender = mail.sender.as_str().to_string();
        let recipient = mail.recipient.as_str().to_string();
        Self::new(
            LdapDirectory::new(directory),
            SmtpMailer::new(mail),
            sender,
            recipient,
        )
    }
}

impl<D, M> RequestPipeline<D, M>
where
    D: DirectoryChecker,
    M: MailTransport,
{
    /// Creates a pipeline over the given capabilities.
    pub fn new(
        directory: D,
        mailer: M,
        sender: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            mailer,
            sender: sender.into(),
            recipient: recipient.into(),
        }
    }

    /// Validates raw input and processes it.
    pub async fn process_raw(&self, username: &str, email: &str) -> Outcome {
        match AccountRequest::new(username, email) {
            Ok(request) => self.process(&request).await,
            Err(e) => {
                info!(field = e.field().name(), error = %e, "Rejected account request");
                Outcome::ValidationFailed(e)
            }
        }
    }

    /// Processes a validated request.
    ///
    /// The notification is only sent once the directory has answered that
    /// the username is absent. Any failure to get that answer stops the
    /// request before the mail relay is contacted.
    #[tracing::instrument(
        name = "RequestPipeline::process",
        skip_all,
        fields(username = request.username())
    )]
    pub async fn process(&self, request: &AccountRequest) -> Outcome {
        match self.directory.exists(request.username()).await {
            Ok(false) => {}
            Ok(true) => {
                info!("Username already exists");
                return Outcome::Conflict;
            }
            Err(e) => {
                warn!(error = %e, "Directory check failed");
                return Outcome::DirectoryUnavailable(e);
            }
        }

        let message =
            NotificationMessage::compose(request, self.sender.as_str(), self.recipient.as_str());
        match self.mailer.notify(&message).await {
            Ok(()) => {
                info!("Account request forwarded");
                Outcome::Success
            }
            Err(e) => {
                warn!(error = %e, "Notification failed");
                Outcome::DeliveryFailed(e)
            }
        }
    }

    /// The directory checker.
    pub const fn directory(&self) -> &D {
        &self.directory
    }

    /// The mail transport.
    pub const fn mailer(&self) -> &M {
        &self.mailer
    }
}
