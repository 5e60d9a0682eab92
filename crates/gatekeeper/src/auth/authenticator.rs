//! Login verification and session token handling.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use identity::{now_millis, Fingerprint, PublicKeyEntry, SessionToken};
use serde::Serialize;

use super::trust_store::{FileAccess, LocalFs, TrustStoreReader};
use super::AuthError;
use crate::audit::{AuditRecord, AuditSink, Operation};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Maximum age the session cookie layer grants a token (30 days).
pub const SESSION_COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;

/// Prefix of an `Authorization` header carrying a raw key line.
pub const BEARER_PREFIX: &str = "Bearer ";

/// An authenticated user.
///
/// `fingerprint` is the identity; `id` is a short label derived from it and
/// may collide for distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// First [`User::ID_LENGTH`] hex digits of the fingerprint.
    pub id: String,
    /// The trust store comment for the key.
    pub username: String,
    /// Fingerprint of the matched key.
    pub fingerprint: Fingerprint,
}

impl User {
    /// Number of fingerprint hex digits kept in [`User::id`].
    pub const ID_LENGTH: usize = 16;

    /// Builds the user for a trust store entry.
    pub fn from_entry(entry: &PublicKeyEntry) -> Self {
        Self {
            id: entry
                .fingerprint
                .compact()
                .chars()
                .take(Self::ID_LENGTH)
                .collect(),
            username: entry.comment.clone(),
            fingerprint: entry.fingerprint.clone(),
        }
    }
}

/// How old a session token may be before it is refused.
///
/// The default places no limit, leaving expiry to the session cookie's
/// max-age.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Maximum token age, if any.
    pub max_age: Option<Duration>,
}

impl TokenPolicy {
    /// A policy that accepts tokens of any age.
    pub fn unbounded() -> Self {
        Self { max_age: None }
    }

    /// A policy that refuses tokens older than `max_age`.
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
        }
    }

    /// Returns true if `token` is acceptable at `now_millis`.
    pub fn accepts(&self, token: &SessionToken, now_millis: u64) -> bool {
        match self.max_age {
            Some(max_age) => token.age_at(now_millis) <= max_age,
            None => true,
        }
    }
}

/// Credentials extracted from an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    /// A raw public key line from an `Authorization: Bearer` header.
    BearerKey(&'a str),
    /// A session token from the session cookie.
    SessionToken(&'a str),
    /// Nothing presented.
    Anonymous,
}

impl<'a> Credentials<'a> {
    /// Picks credentials from the `Authorization` header and session cookie.
    ///
    /// A `Bearer` header wins over the cookie; any other header is ignored.
    pub fn from_parts(authorization: Option<&'a str>, session_cookie: Option<&'a str>) -> Self {
        if let Some(key) = authorization.and_then(|h| h.strip_prefix(BEARER_PREFIX)) {
            return Self::BearerKey(key);
        }

        match session_cookie {
            Some(token) if !token.is_empty() => Self::SessionToken(token),
            _ => Self::Anonymous,
        }
    }
}

/// Verifies keys against the trust store and resolves session tokens.
///
/// Every failure is a quiet `None`; the reason goes to the audit sink.
pub struct Authenticator<F: FileAccess = LocalFs> {
    reader: TrustStoreReader<F>,
    token_policy: TokenPolicy,
    audit: Arc<dyn AuditSink>,
}

impl Authenticator<LocalFs> {
    /// Creates an authenticator reading the trust store from disk.
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self::with_file_access(LocalFs, audit)
    }
}

impl<F: FileAccess> Authenticator<F> {
    /// Creates an authenticator reading the trust store through `files`.
    pub fn with_file_access(files: F, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            reader: TrustStoreReader::new(files),
            token_policy: TokenPolicy::default(),
            audit,
        }
    }

    /// Sets the token age policy (builder pattern).
    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = policy;
        self
    }

    /// Returns the token age policy.
    pub fn token_policy(&self) -> TokenPolicy {
        self.token_policy
    }

    /// Verifies a presented key line against the trust store.
    ///
    /// Returns the user for the first trust store entry with the same
    /// fingerprint, or `None` if the key is unparsable, unknown, or the
    /// trust store cannot be read.
    pub fn verify(&self, presented_key_line: &str, trust_store_path: &Path) -> Option<User> {
        let presented = match PublicKeyEntry::parse_line(presented_key_line) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("Rejecting unparsable login key: {}", err);
                self.audit.record(
                    AuditRecord::denied(Operation::Login, None, "unparsable key")
                        .with_detail("invalid_key"),
                );
                return None;
            }
        };

        self.lookup(Operation::Login, &presented.fingerprint, trust_store_path)
    }

    /// Issues a session token for a key line.
    ///
    /// Does not consult the trust store; call [`Authenticator::verify`]
    /// first.
    pub fn issue_token(&self, presented_key_line: &str) -> Result<SessionToken, AuthError> {
        let entry = PublicKeyEntry::parse_line(presented_key_line)?;
        Ok(SessionToken::issue(entry.fingerprint))
    }

    /// Decodes a session token to the fingerprint it was issued for.
    pub fn resolve_token(&self, token: &str) -> Option<Fingerprint> {
        self.resolve_token_at(token, now_millis())
    }

    /// Decodes a session token as of `now_millis`.
    ///
    /// Returns `None` if the token is malformed or the token policy refuses
    /// its age.
    pub fn resolve_token_at(&self, token: &str, now_millis: u64) -> Option<Fingerprint> {
        let decoded = match SessionToken::decode(token) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::debug!("Rejecting session token: {}", err);
                return None;
            }
        };

        if !self.token_policy.accepts(&decoded, now_millis) {
            tracing::debug!(
                "Rejecting session token for {}: issued {:?} ago",
                decoded.fingerprint(),
                decoded.age_at(now_millis)
            );
            return None;
        }

        Some(decoded.into_fingerprint())
    }

    /// Looks up the user for a fingerprint recovered from a session.
    pub fn user_for_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        trust_store_path: &Path,
    ) -> Option<User> {
        self.lookup(Operation::Session, fingerprint, trust_store_path)
    }

    /// Resolves request credentials to a user.
    pub fn authenticate(&self, credentials: &Credentials<'_>, trust_store_path: &Path) -> Option<User> {
        match credentials {
            Credentials::BearerKey(key_line) => self.verify(key_line, trust_store_path),
            Credentials::SessionToken(token) => match self.resolve_token(token) {
                Some(fingerprint) => self.user_for_fingerprint(&fingerprint, trust_store_path),
                None => {
                    // Never record the token itself; it is a live credential.
                    self.audit.record(
                        AuditRecord::denied(Operation::Session, None, SESSION_COOKIE_NAME)
                            .with_detail("invalid_token"),
                    );
                    None
                }
            },
            Credentials::Anonymous => None,
        }
    }

    fn lookup(
        &self,
        operation: Operation,
        fingerprint: &Fingerprint,
        trust_store_path: &Path,
    ) -> Option<User> {
        let keys = match self.reader.load_entries(trust_store_path) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!("Authentication failed: {}", err);
                self.audit.record(
                    AuditRecord::denied(operation, None, fingerprint.as_str())
                        .with_detail("trust_store_unreadable"),
                );
                return None;
            }
        };

        match keys.find(fingerprint) {
            Some(entry) => {
                let user = User::from_entry(&entry);
                tracing::debug!("Authenticated {} ({})", user.username, user.fingerprint);
                self.audit.record(
                    AuditRecord::success(operation, Some(&user.username), fingerprint.as_str())
                        .with_detail(format!("user_id={}", user.id)),
                );
                Some(user)
            }
            None => {
                self.audit.record(
                    AuditRecord::denied(operation, None, fingerprint.as_str())
                        .with_detail("unknown_key"),
                );
                None
            }
        }
    }
}
