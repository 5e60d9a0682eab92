//! # filegate Identity Library
//!
//! Key identity primitives shared by the filegate access-control core.
//!
//! ## Overview
//!
//! - **Fingerprints**: MD5 colon-hex fingerprints of public key blobs, the
//!   identity used to match keys against the trust store
//! - **Key lines**: parsing of `authorized_keys`-style lines
//! - **Session tokens**: reversible bearer tokens derived from a fingerprint
//!   and an issuance time
//!
//! ## Example Usage
//!
//! ```rust
//! use identity::{PublicKeyEntry, SessionToken};
//!
//! let line = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f alice";
//! let entry = PublicKeyEntry::parse_line(line).unwrap();
//! assert_eq!(entry.comment, "alice");
//!
//! let token = SessionToken::issue(entry.fingerprint.clone()).encode();
//! let decoded = SessionToken::decode(&token).unwrap();
//! assert_eq!(decoded.fingerprint(), &entry.fingerprint);
//! ```
//!
//! ## Modules
//!
//! - [`fingerprint`]: fingerprint computation and parsing
//! - [`key`]: public key line parsing
//! - [`token`]: session token encoding
//! - [`error`]: error types

pub mod error;
pub mod fingerprint;
pub mod key;
pub mod token;

pub use error::{IdentityError, Result};
pub use fingerprint::{fingerprint, Fingerprint, DIGEST_LENGTH};
pub use key::{PublicKeyEntry, DEFAULT_COMMENT};
pub use token::{now_millis, SessionToken, TOKEN_DELIMITER};
