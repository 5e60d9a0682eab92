//! # filegate Gatekeeper Library
//!
//! Access-control core for a networked file-browsing service.
//!
//! ## Overview
//!
//! Every request passes through two gates before it touches disk:
//!
//! - **Authentication**: a presented public key is verified against an
//!   `authorized_keys`-style trust store, and bearer session tokens derived
//!   from the key fingerprint are resolved back to users
//! - **Path access control**: every caller-supplied path runs through a
//!   seven-stage pipeline that either yields a validated absolute path under
//!   the configured root or a denial
//!
//! Every decision is written to an injected [`AuditSink`].
//!
//! ## Architecture
//!
//! ```text
//! request ──► Authenticator ──► User? ──► PathGuard ──► PathDecision
//!                  │                          │
//!                  └──────────► AuditSink ◄───┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use gatekeeper::{Authenticator, Credentials, PathGuard, TracingAuditSink};
//!
//! fn main() -> anyhow::Result<()> {
//!     let audit = Arc::new(TracingAuditSink);
//!     let auth = Authenticator::new(audit.clone());
//!     let guard = PathGuard::new("/srv/files", audit)?;
//!
//!     let credentials = Credentials::from_parts(None, Some("c2Vzc2lvbg"));
//!     let user = auth.authenticate(&credentials, Path::new("/srv/authorized_keys"));
//!
//!     let path = guard.resolve("/docs/report.txt", user.as_ref()).into_result()?;
//!     println!("{}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`audit`]: audit records and sinks
//! - [`auth`]: trust store reading and key authentication
//! - [`files`]: the path guard pipeline and its denylists
//! - [`config`]: configuration loading and defaults

pub mod audit;
pub mod auth;
pub mod config;
pub mod files;

// Re-export identity primitives for convenience
pub use identity;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, Operation, Outcome, TracingAuditSink};
pub use auth::{AuthError, Authenticator, Credentials, TokenPolicy, TrustStoreReader, User};
pub use config::{Config, ConfigError};
pub use files::{DenyReason, GuardError, GuardPolicy, PathDecision, PathGuard, RenamePlan};
