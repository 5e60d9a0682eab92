//! Error types for the identity crate.

use thiserror::Error;

/// Identity error type covering key and token decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// A public key line or key blob could not be parsed.
    #[error("invalid public key: {0}")]
    KeyParse(String),

    /// A fingerprint string is not in canonical colon-separated form.
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// A session token could not be decoded.
    #[error("invalid session token: {0}")]
    TokenDecode(String),
}

/// Result type alias for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

impl From<base64::DecodeError> for IdentityError {
    fn from(err: base64::DecodeError) -> Self {
        IdentityError::KeyParse(err.to_string())
    }
}
