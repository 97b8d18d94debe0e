//! Username existence checks against a directory service.

mod ldap;

pub use ldap::LdapDirectory;

use async_trait::async_trait;

use crate::request::MAX_USERNAME_LEN;

/// Answers whether a username is already taken.
///
/// Implementations must return `Ok(false)` only after the directory
/// positively answered that no entry matches. Every failure to reach or
/// query the directory is an error.
#[async_trait]
pub trait DirectoryChecker: Send + Sync {
    /// Returns whether an entry with `username` exists.
    async fn exists(&self, username: &str) -> Result<bool, DirectoryError>;
}

/// Step of a directory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryStage {
    /// TCP connect plus TLS setup.
    Connect,
    /// Service account bind.
    Bind,
    /// Subtree search.
    Search,
}

impl std::fmt::Display for DirectoryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Bind => "bind",
            Self::Search => "search",
        })
    }
}

/// Directory check failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The username cannot be turned into a search filter.
    #[error("username cannot be searched")]
    InvalidUsername,

    /// The TCP connection could not be established.
    #[error("directory connection failed")]
    Connect,

    /// The TLS handshake failed or the peer does not speak TLS.
    #[error("directory TLS setup failed")]
    Tls,

    /// The service bind was refused or failed.
    #[error("directory bind failed")]
    Bind,

    /// The search failed or returned an error result.
    #[error("directory search failed")]
    Search,

    /// A step did not finish in time.
    #[error("directory {0} timed out")]
    Timeout(DirectoryStage),
}

impl DirectoryError {
    /// Returns the stage the failure happened in, if it is tied to one.
    #[must_use]
    pub const fn stage(&self) -> Option<DirectoryStage> {
        match self {
            Self::InvalidUsername => None,
            Self::Connect | Self::Tls => Some(DirectoryStage::Connect),
            Self::Bind => Some(DirectoryStage::Bind),
            Self::Search => Some(DirectoryStage::Search),
            Self::Timeout(stage) => Some(*stage),
        }
    }
}

/// An equality search for one username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    attribute: String,
    filter: String,
}

impl DirectoryQuery {
    /// Builds `(attribute=username)` with the username escaped per RFC 4515.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidUsername`] for an empty or overlong
    /// username.
    pub fn for_username(attribute: &str, username: &str) -> Result<Self, DirectoryError> {
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(DirectoryError::InvalidUsername);
        }
        Ok(Self {
            attribute: attribute.to_string(),
            filter: format!("({attribute}={})", ldap3::ldap_escape(username)),
        })
    }

    /// The search filter.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Attributes to request: just the username attribute.
    #[must_use]
    pub fn attributes(&self) -> Vec<&str> {
        vec![self.attribute.as_str()]
    }
}
