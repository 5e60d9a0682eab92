//! Key-based authentication.
//!
//! This module verifies presented public keys against a flat trust store
//! (an `authorized_keys`-style file) and resolves bearer session tokens back
//! to users. The trust store is re-read on every call, so edits take effect
//! on the next request without a restart.

use std::io;
use std::path::PathBuf;

use identity::IdentityError;
use thiserror::Error;

pub mod authenticator;
pub mod trust_store;

pub use authenticator::{
    Authenticator, Credentials, TokenPolicy, User, BEARER_PREFIX, SESSION_COOKIE_MAX_AGE_SECS,
    SESSION_COOKIE_NAME,
};
pub use trust_store::{
    default_authorized_keys_path, FileAccess, InMemoryFiles, LocalFs, TrustStoreReader,
    TrustedKeys,
};

/// Errors raised inside the authentication layer.
///
/// The public [`Authenticator`] operations recover these into a quiet "no";
/// only [`Authenticator::issue_token`] surfaces one.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The presented key line could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] IdentityError),

    /// The trust store file could not be read.
    #[error("failed to read trust store {}: {source}", .path.display())]
    TrustStoreUnreadable {
        /// Trust store location.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
}
