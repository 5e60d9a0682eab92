//! Bearer session tokens.
//!
//! A token is the URL-safe, unpadded base64 encoding of
//! `<fingerprint-without-colons>:<issued-at-epoch-millis>`. It carries no
//! expiry claim; callers decide how old a token may be.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::error::{IdentityError, Result};
use crate::fingerprint::Fingerprint;

/// Separator between the fingerprint and timestamp in the token payload.
pub const TOKEN_DELIMITER: char = ':';

/// URL-safe base64 that also accepts padded input.
const TOKEN_DECODE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A decoded session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    fingerprint: Fingerprint,
    issued_at_millis: u64,
}

impl SessionToken {
    /// Creates a token for `fingerprint` issued at the given time.
    pub fn new(fingerprint: Fingerprint, issued_at_millis: u64) -> Self {
        Self {
            fingerprint,
            issued_at_millis,
        }
    }

    /// Creates a token for `fingerprint` issued now.
    pub fn issue(fingerprint: Fingerprint) -> Self {
        Self::new(fingerprint, now_millis())
    }

    /// Returns the fingerprint carried by this token.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Consumes the token, returning its fingerprint.
    pub fn into_fingerprint(self) -> Fingerprint {
        self.fingerprint
    }

    /// Returns the issuance time in milliseconds since the Unix epoch.
    pub fn issued_at_millis(&self) -> u64 {
        self.issued_at_millis
    }

    /// Returns how old the token is at `now_millis`.
    ///
    /// Tokens stamped in the future have age zero.
    pub fn age_at(&self, now_millis: u64) -> Duration {
        Duration::from_millis(now_millis.saturating_sub(self.issued_at_millis))
    }

    /// Encodes the token into its transport string.
    pub fn encode(&self) -> String {
        let payload = format!(
            "{}{}{}",
            self.fingerprint.compact(),
            TOKEN_DELIMITER,
            self.issued_at_millis
        );
        URL_SAFE_NO_PAD.encode(payload)
    }

    /// Decodes a transport string back into a token.
    ///
    /// Fails with [`IdentityError::TokenDecode`] on malformed base64,
    /// non-UTF-8 payloads, a missing delimiter, a fingerprint segment that is
    /// not 32 lowercase hex digits, or a non-numeric timestamp.
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = TOKEN_DECODE_ENGINE
            .decode(token.trim())
            .map_err(|e| IdentityError::TokenDecode(e.to_string()))?;
        let payload = String::from_utf8(bytes)
            .map_err(|_| IdentityError::TokenDecode("payload is not UTF-8".to_string()))?;

        let (compact, issued_at) = payload
            .split_once(TOKEN_DELIMITER)
            .ok_or_else(|| IdentityError::TokenDecode("missing delimiter".to_string()))?;

        let fingerprint = Fingerprint::from_compact(compact)
            .map_err(|_| IdentityError::TokenDecode("malformed fingerprint".to_string()))?;
        let issued_at_millis = issued_at
            .parse::<u64>()
            .map_err(|_| IdentityError::TokenDecode("malformed timestamp".to_string()))?;

        Ok(Self::new(fingerprint, issued_at_millis))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
