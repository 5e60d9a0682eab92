//! Public key lines in `authorized_keys` format.

use std::str::FromStr;

use crate::error::{IdentityError, Result};
use crate::fingerprint::{decode_key_blob, Fingerprint};

/// Comment used when a key line carries none.
pub const DEFAULT_COMMENT: &str = "user";

/// A parsed public key line: `<key-type> <base64-blob> [comment]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEntry {
    /// Key algorithm, e.g. `ssh-ed25519`.
    pub key_type: String,
    /// Decoded key blob.
    pub key_blob: Vec<u8>,
    /// Fingerprint of `key_blob`.
    pub fingerprint: Fingerprint,
    /// Third whitespace-separated token, or [`DEFAULT_COMMENT`].
    pub comment: String,
}

impl PublicKeyEntry {
    /// Parses a single key line.
    ///
    /// The line is split on whitespace. It must contain at least a key type
    /// and a decodable blob; anything after the third token is ignored.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();

        let key_type = parts
            .next()
            .ok_or_else(|| IdentityError::KeyParse("empty key line".to_string()))?;
        let blob_b64 = parts
            .next()
            .ok_or_else(|| IdentityError::KeyParse("missing key blob".to_string()))?;
        let comment = parts.next().unwrap_or(DEFAULT_COMMENT);

        let key_blob = decode_key_blob(blob_b64)?;
        let fingerprint = Fingerprint::of_blob(&key_blob);

        Ok(Self {
            key_type: key_type.to_string(),
            key_blob,
            fingerprint,
            comment: comment.to_string(),
        })
    }
}

impl FromStr for PublicKeyEntry {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_line(s)
    }
}
