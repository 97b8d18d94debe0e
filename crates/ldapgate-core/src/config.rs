//! Process configuration.
//!
//! Built once at startup from environment-style key/value lookups and then
//! shared read-only. Secrets are wrapped in [`Secret`] so `Debug` output
//! never shows them, and errors name the offending variable but never its
//! value.

use std::net::SocketAddr;
use std::time::Duration;

use ldapgate_smtp::{Address, Timeouts};
use secrecy::Secret;

/// Default connection ceiling (TCP connect plus TLS on ldaps).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(35);
/// Default ceiling for each bind, search and SMTP command.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration loading error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be used.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// How the directory session is encrypted. Plaintext is not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectorySecurity {
    /// TLS from the start (`ldaps://`, port 636).
    #[default]
    Ldaps,
    /// Plain connect upgraded with the StartTLS extended operation (port 389).
    StartTls,
}

impl DirectorySecurity {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Ldaps => 636,
            Self::StartTls => 389,
        }
    }

    const fn scheme(self) -> &'static str {
        match self {
            Self::Ldaps => "ldaps",
            Self::StartTls => "ldap",
        }
    }
}

/// Directory service settings.
#[derive(Debug)]
pub struct DirectoryConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Encryption mode.
    pub security: DirectorySecurity,
    /// Service bind identity.
    pub bind_dn: String,
    /// Service bind password.
    pub bind_password: Secret<String>,
    /// Search root.
    pub base_dn: String,
    /// Attribute that keys usernames.
    pub user_attribute: String,
    /// Connection ceiling.
    pub connect_timeout: Duration,
    /// Bind and search ceiling.
    pub operation_timeout: Duration,
}

impl DirectoryConfig {
    /// Returns the LDAP URL for this directory.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = self.security.scheme();
        if self.host.contains(':') {
            format!("{scheme}://[{}]:{}", self.host, self.port)
        } else {
            format!("{scheme}://{}:{}", self.host, self.port)
        }
    }
}

/// Mail relay settings.
#[derive(Debug)]
pub struct MailConfig {
    /// Relay hostname, without any port suffix. Also the TLS server name.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// AUTH PLAIN username.
    pub username: String,
    /// AUTH PLAIN password.
    pub password: Secret<String>,
    /// Identity announced in EHLO.
    pub helo_name: String,
    /// Envelope sender.
    pub sender: Address,
    /// The single administrative recipient.
    pub recipient: Address,
    /// Connect and per-command deadlines.
    pub timeouts: Timeouts,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Listen address.
    pub bind_address: SocketAddr,
    /// Origins allowed by CORS. Empty means any origin, without credentials.
    pub allowed_origins: Vec<String>,
}

/// Complete gateway configuration.
#[derive(Debug)]
pub struct GatewayConfig {
    /// HTTP listener.
    pub http: HttpConfig,
    /// Directory service.
    pub directory: DirectoryConfig,
    /// Mail relay.
    pub mail: MailConfig,
}

impl GatewayConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any variable
    /// is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps variable names to
    /// values. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any variable
    /// is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let connect_timeout = vars
            .seconds("CONNECT_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let operation_timeout = vars
            .seconds("OPERATION_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT);

        let http = HttpConfig {
            bind_address: match vars.optional("BIND_ADDRESS") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                    key: "BIND_ADDRESS",
                    reason: "expected ip:port",
                })?,
                None => SocketAddr::from(([0, 0, 0, 0], 8080)),
            },
            allowed_origins: vars
                .optional("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let security = if vars.flag("LDAP_STARTTLS")? {
            DirectorySecurity::StartTls
        } else {
            DirectorySecurity::Ldaps
        };
        let user_attribute = vars
            .optional("LDAP_USER_ATTRIBUTE")
            .unwrap_or_else(|| "cn".to_string());
        if !is_attribute_name(&user_attribute) {
            return Err(ConfigError::Invalid {
                key: "LDAP_USER_ATTRIBUTE",
                reason: "not an attribute description",
            });
        }

        let directory = DirectoryConfig {
            host: vars.required("LDAP_SERVER")?,
            port: vars.port("LDAP_PORT")?.unwrap_or(security.default_port()),
            security,
            bind_dn: vars.required("LDAP_BIND_DN")?,
            bind_password: Secret::new(vars.required("LDAP_BIND_PASSWORD")?),
            base_dn: vars.required("LDAP_BASE_DN")?,
            user_attribute,
            connect_timeout,
            operation_timeout,
        };

        let (host, embedded_port) = split_host_port(&vars.required("SMTP_SERVER")?)?;
        let mail = MailConfig {
            host,
            port: vars
                .port("SMTP_PORT")?
                .or(embedded_port)
                .unwrap_or(DEFAULT_SMTP_PORT),
            username: vars.required("SMTP_USERNAME")?,
            password: Secret::new(vars.required("SMTP_PASSWORD")?),
            helo_name: vars
                .optional("SMTP_HELO_NAME")
                .unwrap_or_else(|| "localhost".to_string()),
            sender: vars.address("FROM_EMAIL")?,
            recipient: vars.address("TO_EMAIL")?,
            timeouts: Timeouts {
                connect: connect_timeout,
                io: operation_timeout,
            },
        };

        Ok(Self {
            http,
            directory,
            mail,
        })
    }
}

/// Submission port with STARTTLS (RFC 6409).
const DEFAULT_SMTP_PORT: u16 = 587;

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &'static str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn port(&self, key: &'static str) -> Result<Option<u16>, ConfigError> {
        self.optional(key)
            .map(|raw| parse_port(raw.trim()).ok_or(ConfigError::Invalid {
                key,
                reason: "expected a port between 1 and 65535",
            }))
            .transpose()
    }

    fn seconds(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        self.optional(key)
            .map(|raw| match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                _ => Err(ConfigError::Invalid {
                    key,
                    reason: "expected a positive number of seconds",
                }),
            })
            .transpose()
    }

    fn flag(&self, key: &'static str) -> Result<bool, ConfigError> {
        match self.optional(key).as_deref().map(str::trim) {
            None => Ok(false),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    reason: "expected true or false",
                }),
            },
        }
    }

    fn address(&self, key: &'static str) -> Result<Address, ConfigError> {
        Address::new(self.required(key)?).map_err(|_| ConfigError::Invalid {
            key,
            reason: "not a valid email address",
        })
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|port| *port != 0)
}

/// Splits `host[:port]`, also accepting `[v6]:port` and bare IPv6.
fn split_host_port(raw: &str) -> Result<(String, Option<u16>), ConfigError> {
    const INVALID: ConfigError = ConfigError::Invalid {
        key: "SMTP_SERVER",
        reason: "expected host or host:port",
    };

    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or(INVALID)?;
        let port = match tail {
            "" => None,
            _ => Some(tail.strip_prefix(':').and_then(parse_port).ok_or(INVALID)?),
        };
        return Ok((host.to_string(), port));
    }

    match raw.split_once(':') {
        // Bare IPv6 literal: several colons and no brackets.
        Some((_, tail)) if tail.contains(':') => Ok((raw.to_string(), None)),
        Some((host, port)) if !host.is_empty() => {
            Ok((host.to_string(), Some(parse_port(port).ok_or(INVALID)?)))
        }
        Some(_) => Err(INVALID),
        None => Ok((raw.to_string(), None)),
    }
}

/// RFC 4512 attribute description: a keystring or a numeric OID.
fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        Some(c) if c.is_ascii_digit() => name
            .split('.')
            .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit())),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("LDAP_SERVER", "ldap.example.com"),
            ("LDAP_BIND_DN", "cn=svc,dc=example,dc=com"),
            ("LDAP_BIND_PASSWORD", "directory-secret"),
            ("LDAP_BASE_DN", "dc=example,dc=com"),
            ("SMTP_SERVER", "smtp.example.com"),
            ("SMTP_USERNAME", "svc@example.com"),
            ("SMTP_PASSWORD", "relay-secret"),
            ("FROM_EMAIL", "noreply@example.com"),
            ("TO_EMAIL", "admin@example.com"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<GatewayConfig, ConfigError> {
        GatewayConfig::from_lookup(|key| env.get(key).map(ToString::to_string))
    }

    #[test]
    fn applies_documented_defaults() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.http.bind_address, "0.0.0.0:8080".parse().unwrap());
        assert!(config.http.allowed_origins.is_empty());
        assert_eq!(config.directory.port, 636);
        assert_eq!(config.directory.security, DirectorySecurity::Ldaps);
        assert_eq!(config.directory.user_attribute, "cn");
        assert_eq!(config.directory.url(), "ldaps://ldap.example.com:636");
        assert_eq!(config.directory.connect_timeout, Duration::from_secs(35));
        assert_eq!(config.mail.host, "smtp.example.com");
        assert_eq!(config.mail.port, 587);
        assert_eq!(config.mail.helo_name, "localhost");
        assert_eq!(config.mail.timeouts.io, Duration::from_secs(30));
        assert_eq!(config.mail.password.expose_secret(), "relay-secret");
    }

    #[test]
    fn starttls_directory_uses_plain_scheme_and_port() {
        let mut env = base_env();
        env.insert("LDAP_STARTTLS", "true");
        env.insert("LDAP_USER_ATTRIBUTE", "uid");
        let config = load(&env).unwrap();

        assert_eq!(config.directory.security, DirectorySecurity::StartTls);
        assert_eq!(config.directory.url(), "ldap://ldap.example.com:389");
        assert_eq!(config.directory.user_attribute, "uid");
    }

    #[test]
    fn relay_port_suffix_is_stripped_from_host() {
        let mut env = base_env();
        env.insert("SMTP_SERVER", "smtp.example.com:2525");
        let config = load(&env).unwrap();
        assert_eq!(config.mail.host, "smtp.example.com");
        assert_eq!(config.mail.port, 2525);

        env.insert("SMTP_PORT", "465");
        assert_eq!(load(&env).unwrap().mail.port, 465);
    }

    #[test]
    fn splits_ipv6_relays() {
        assert_eq!(
            split_host_port("[2001:db8::1]:587").unwrap(),
            ("2001:db8::1".to_string(), Some(587))
        );
        assert_eq!(
            split_host_port("2001:db8::1").unwrap(),
            ("2001:db8::1".to_string(), None)
        );
        assert!(split_host_port("[2001:db8::1").is_err());
        assert!(split_host_port(":587").is_err());
        assert!(split_host_port("smtp.example.com:0").is_err());
    }

    #[test]
    fn missing_required_values_are_named() {
        let mut env = base_env();
        env.remove("LDAP_BASE_DN");
        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Missing("LDAP_BASE_DN")
        );

        let mut env = base_env();
        env.insert("SMTP_PASSWORD", "   ");
        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Missing("SMTP_PASSWORD")
        );
    }

    #[test]
    fn invalid_values_are_rejected_without_echoing_them() {
        let mut env = base_env();
        env.insert("TO_EMAIL", "not-an-address");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TO_EMAIL", .. }));
        assert!(!err.to_string().contains("not-an-address"));

        let mut env = base_env();
        env.insert("LDAP_USER_ATTRIBUTE", "cn)(objectClass=*");
        assert!(load(&env).is_err());

        let mut env = base_env();
        env.insert("OPERATION_TIMEOUT_SECS", "0");
        assert!(load(&env).is_err());

        let mut env = base_env();
        env.insert("LDAP_STARTTLS", "maybe");
        assert!(load(&env).is_err());
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let mut env = base_env();
        env.insert(
            "CORS_ALLOWED_ORIGINS",
            "https://signup.example.com, https://example.com,,",
        );
        let config = load(&env).unwrap();
        assert_eq!(
            config.http.allowed_origins,
            vec!["https://signup.example.com", "https://example.com"]
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = load(&base_env()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("directory-secret"));
        assert!(!debug.contains("relay-secret"));
    }

    #[test]
    fn attribute_names() {
        assert!(is_attribute_name("cn"));
        assert!(is_attribute_name("sAMAccountName"));
        assert!(is_attribute_name("2.5.4.3"));
        assert!(!is_attribute_name(""));
        assert!(!is_attribute_name("-cn"));
        assert!(!is_attribute_name("2.5..3"));
        assert!(!is_attribute_name("cn=*"));
    }
}
