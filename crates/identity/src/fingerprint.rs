//! Canonical public key fingerprints.
//!
//! A fingerprint is the MD5 digest of a decoded public key blob, rendered as
//! sixteen lowercase hex byte pairs joined by colons, for example
//! `0f:a2:0a:d7:38:3e:65:45:08:6b:63:84:1c:ff:dc:ba`. This is the format
//! printed by `ssh-keygen -l -E md5`, so operators can compare fingerprints
//! in the trust store by eye.

use std::fmt;
use std::str::FromStr;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, Result};

/// Length of the fingerprint digest in bytes.
pub const DIGEST_LENGTH: usize = 16;

/// Length of the compact (colon-free) hex form.
pub const COMPACT_LENGTH: usize = DIGEST_LENGTH * 2;

/// Length of the canonical colon-separated form.
pub const FINGERPRINT_LENGTH: usize = DIGEST_LENGTH * 3 - 1;

/// Standard base64 with optional padding, as found in `authorized_keys` files.
const KEY_BLOB_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A canonical key fingerprint.
///
/// Always holds exactly [`DIGEST_LENGTH`] lowercase hex pairs separated by
/// colons. Two keys with the same blob always produce the same fingerprint,
/// which makes it the identity used for matching keys and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a raw (already decoded) key blob.
    pub fn of_blob(blob: &[u8]) -> Self {
        let digest = Md5::digest(blob);
        Self::from_digest(&digest)
    }

    /// Decodes a base64 key blob and computes its fingerprint.
    ///
    /// Fails with [`IdentityError::KeyParse`] if the input is empty or not
    /// valid base64.
    pub fn from_base64(blob_b64: &str) -> Result<Self> {
        let blob = decode_key_blob(blob_b64)?;
        Ok(Self::of_blob(&blob))
    }

    /// Parses a fingerprint in canonical `aa:bb:...` form.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != FINGERPRINT_LENGTH {
            return Err(IdentityError::InvalidFingerprint(s.to_string()));
        }

        let well_formed = s.split(':').all(|pair| pair.len() == 2 && is_lower_hex(pair))
            && s.split(':').count() == DIGEST_LENGTH;
        if !well_formed {
            return Err(IdentityError::InvalidFingerprint(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Rebuilds a fingerprint from its compact form (colons stripped).
    ///
    /// This is the form carried inside session tokens.
    pub fn from_compact(compact: &str) -> Result<Self> {
        if compact.len() != COMPACT_LENGTH || !is_lower_hex(compact) {
            return Err(IdentityError::InvalidFingerprint(compact.to_string()));
        }

        let bytes = hex::decode(compact)
            .map_err(|e| IdentityError::InvalidFingerprint(e.to_string()))?;
        Ok(Self::from_digest(&bytes))
    }

    /// Returns the fingerprint with colons stripped.
    pub fn compact(&self) -> String {
        self.0.replace(':', "")
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(digest: &[u8]) -> Self {
        Self(
            digest
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(":"),
        )
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Computes the canonical fingerprint of a base64 key blob.
pub fn fingerprint(blob_b64: &str) -> Result<Fingerprint> {
    Fingerprint::from_base64(blob_b64)
}

/// Decodes a base64 public key blob.
///
/// Empty input, or input that decodes to zero bytes, is rejected.
pub fn decode_key_blob(blob_b64: &str) -> Result<Vec<u8>> {
    if blob_b64.is_empty() {
        return Err(IdentityError::KeyParse("empty key blob".to_string()));
    }

    let blob = KEY_BLOB_ENGINE.decode(blob_b64)?;
    if blob.is_empty() {
        return Err(IdentityError::KeyParse("empty key blob".to_string()));
    }
    Ok(blob)
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
