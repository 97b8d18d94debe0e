//! Account request validation.

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 256;

/// Longest accepted email address, in characters (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

/// The field a validation error relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// The requested username.
    Username,
    /// The requester's email address.
    Email,
}

impl Field {
    /// Returns the wire name of the field.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

/// Validation error for an incoming account request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Username is empty.
    EmptyUsername,
    /// Email address is empty.
    EmptyEmail,
    /// A field contains a control character (CR, LF, NUL, ...).
    ControlCharacter(Field),
    /// A field exceeds its length limit.
    TooLong(Field),
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyUsername => "Username is required",
            Self::EmptyEmail => "Email is required",
            Self::ControlCharacter(Field::Username) => "Username contains invalid characters",
            Self::ControlCharacter(Field::Email) => "Email contains invalid characters",
            Self::TooLong(Field::Username) => "Username is too long",
            Self::TooLong(Field::Email) => "Email is too long",
        }
    }

    /// Get the field this error relates to.
    #[must_use]
    pub const fn field(&self) -> Field {
        match self {
            Self::EmptyUsername
            | Self::ControlCharacter(Field::Username)
            | Self::TooLong(Field::Username) => Field::Username,
            Self::EmptyEmail | Self::ControlCharacter(Field::Email) | Self::TooLong(Field::Email) => {
                Field::Email
            }
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// A candidate username/email pair. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRequest {
    username: String,
    email: String,
}

impl AccountRequest {
    /// Validates and builds a request.
    ///
    /// Both fields must be non-empty, free of control characters and within
    /// [`MAX_USERNAME_LEN`] / [`MAX_EMAIL_LEN`]. No further format rules are
    /// applied here.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found, username first.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Result<Self, ValidationError> {
        let username = username.into();
        let email = email.into();

        if username.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if email.is_empty() {
            return Err(ValidationError::EmptyEmail);
        }
        if username.chars().any(char::is_control) {
            return Err(ValidationError::ControlCharacter(Field::Username));
        }
        if email.chars().any(char::is_control) {
            return Err(ValidationError::ControlCharacter(Field::Email));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(ValidationError::TooLong(Field::Username));
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            return Err(ValidationError::TooLong(Field::Email));
        }

        Ok(Self { username, email })
    }

    /// The requested username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The requester's email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}
