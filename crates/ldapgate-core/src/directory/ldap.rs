//! LDAP implementation of [`DirectoryChecker`].

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use super::{DirectoryChecker, DirectoryError, DirectoryQuery, DirectoryStage};
use crate::config::{DirectoryConfig, DirectorySecurity};

/// Checks usernames with a fresh, encrypted LDAP session per call.
///
/// Each check connects, binds as the service account, runs one subtree
/// search and unbinds. No connection is reused between checks.
#[derive(Debug)]
pub struct LdapDirectory {
    config: DirectoryConfig,
    url: String,
}

impl LdapDirectory {
    /// Creates a checker for the configured directory.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let url = config.url();
        Self { config, url }
    }

    /// The directory settings.
    #[must_use]
    pub const fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    async fn open(&self) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connect_timeout)
            .set_starttls(self.config.security == DirectorySecurity::StartTls);

        let (conn, ldap) = bounded(
            DirectoryStage::Connect,
            self.config.connect_timeout,
            LdapConnAsync::with_settings(settings, &self.url),
        )
        .await?
        .map_err(|e| {
            let error = connect_failure(&e);
            warn!(?e, url = %self.url, %error, "Directory connection failed");
            error
        })?;

        // The driver exits once every `Ldap` handle is dropped.
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                debug!(?e, "Directory connection closed with error");
            }
        });

        Ok(ldap)
    }

    async fn lookup(&self, ldap: &mut Ldap, query: &DirectoryQuery) -> Result<bool, DirectoryError> {
        let timeout = self.config.operation_timeout;

        bounded(
            DirectoryStage::Bind,
            timeout,
            ldap.simple_bind(&self.config.bind_dn, self.config.bind_password.expose_secret()),
        )
        .await?
        .and_then(ldap3::LdapResult::success)
        .map_err(|e| {
            warn!(?e, bind_dn = %self.config.bind_dn, "Directory bind failed");
            DirectoryError::Bind
        })?;

        let (entries, _) = bounded(
            DirectoryStage::Search,
            timeout,
            ldap.search(
                &self.config.base_dn,
                Scope::Subtree,
                query.filter(),
                query.attributes(),
            ),
        )
        .await?
        .and_then(ldap3::SearchResult::success)
        .map_err(|e| {
            warn!(?e, base_dn = %self.config.base_dn, "Directory search failed");
            DirectoryError::Search
        })?;

        debug!(matches = entries.len(), "Directory search complete");
        Ok(!entries.is_empty())
    }
}

#[async_trait]
impl DirectoryChecker for LdapDirectory {
    #[tracing::instrument(name = "LdapDirectory::exists", skip_all)]
    async fn exists(&self, username: &str) -> Result<bool, DirectoryError> {
        let query = DirectoryQuery::for_username(&self.config.user_attribute, username)?;
        let mut ldap = self.open().await?;

        let result = self.lookup(&mut ldap, &query).await;

        // Best effort; the outcome is already decided.
        match tokio::time::timeout(self.config.operation_timeout, ldap.unbind()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(?e, "Directory unbind failed"),
            Err(_) => debug!("Directory unbind timed out"),
        }

        result
    }
}

/// rustls surfaces handshake and record failures as `InvalidData`.
fn connect_failure(error: &LdapError) -> DirectoryError {
    match error {
        LdapError::Io { source } if source.kind() == io::ErrorKind::InvalidData => {
            DirectoryError::Tls
        }
        _ => DirectoryError::Connect,
    }
}

async fn bounded<F, T>(stage: DirectoryStage, limit: Duration, op: F) -> Result<T, DirectoryError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, op).await.map_err(|_| {
        warn!(%stage, ?limit, "Directory operation timed out");
        DirectoryError::Timeout(stage)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn config(port: u16) -> DirectoryConfig {
        DirectoryConfig {
            host: "127.0.0.1".to_string(),
            port,
            security: DirectorySecurity::Ldaps,
            bind_dn: "cn=svc,dc=example,dc=com".to_string(),
            bind_password: Secret::new("secret".to_string()),
            base_dn: "dc=example,dc=com".to_string(),
            user_attribute: "cn".to_string(),
            connect_timeout: Duration::from_millis(300),
            operation_timeout: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn empty_username_fails_before_connecting() {
        // Port 9 is never contacted because validation fails first.
        let directory = LdapDirectory::new(config(9));
        assert_eq!(
            directory.exists("").await,
            Err(DirectoryError::InvalidUsername)
        );
    }

    #[tokio::test]
    async fn unreachable_directory_is_a_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let directory = LdapDirectory::new(config(port));
        let err = directory.exists("alice").await.unwrap_err();
        assert_eq!(err, DirectoryError::Connect);
    }

    #[tokio::test]
    async fn plaintext_peer_is_a_tls_failure() {
        // Answers the ClientHello with a plaintext banner.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 mail.example.com ESMTP\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let directory = LdapDirectory::new(config(port));
        let err = directory.exists("alice").await.unwrap_err();
        assert_eq!(err, DirectoryError::Tls);
        assert_eq!(err.stage(), Some(DirectoryStage::Connect));

        server.abort();
    }

    #[test]
    fn io_errors_split_into_tcp_and_tls() {
        let refused = LdapError::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(connect_failure(&refused), DirectoryError::Connect);

        let corrupt = LdapError::from(io::Error::new(io::ErrorKind::InvalidData, "corrupt message"));
        assert_eq!(connect_failure(&corrupt), DirectoryError::Tls);
    }

    #[tokio::test]
    async fn silent_tls_peer_never_reports_absent() {
        // Accepts TCP but never answers the TLS handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let directory = LdapDirectory::new(config(port));
        let err = directory.exists("alice").await.unwrap_err();
        assert_eq!(err.stage(), Some(DirectoryStage::Connect));

        server.abort();
    }

    #[test]
    fn url_follows_security_mode() {
        let mut cfg = config(636);
        assert_eq!(LdapDirectory::new(config(636)).url, "ldaps://127.0.0.1:636");
        cfg.security = DirectorySecurity::StartTls;
        cfg.port = 389;
        assert_eq!(LdapDirectory::new(cfg).url, "ldap://127.0.0.1:389");
    }
}
