//! Security audit trail for access decisions.
//!
//! Every authentication attempt and every path decision produces exactly one
//! [`AuditRecord`], handed to an injected [`AuditSink`]. Sinks are
//! append-only and must never fail the operation being recorded.
//!
//! [`TracingAuditSink`] forwards records to `tracing` under the
//! [`AUDIT_TARGET`] target, where the binary can route them to a dedicated
//! file. [`MemoryAuditSink`] keeps records in memory for inspection.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Tracing target used for audit events.
pub const AUDIT_TARGET: &str = "filegate::audit";

/// Actor name recorded when no user is authenticated.
pub const ANONYMOUS: &str = "anonymous";

/// Operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Generic path validation.
    PathCheck,
    /// Directory enumeration gate.
    ListDirectory,
    /// File read.
    Read,
    /// File write or save.
    Write,
    /// File or directory creation.
    Create,
    /// Rename of a file or directory.
    Rename,
    /// Deletion of a file or directory.
    Delete,
    /// File upload.
    Upload,
    /// Key-based login.
    Login,
    /// Session resumption from a bearer token.
    Session,
}

impl Operation {
    /// Returns the audit code for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathCheck => "PATH_CHECK",
            Self::ListDirectory => "LIST_DIRECTORY",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Create => "CREATE",
            Self::Rename => "RENAME",
            Self::Delete => "DELETE",
            Self::Upload => "UPLOAD",
            Self::Login => "LOGIN",
            Self::Session => "SESSION",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an audited decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The operation was allowed.
    Success,
    /// The operation was refused.
    Denied,
}

impl Outcome {
    /// Returns the audit code for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Denied => "DENIED",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audited decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// What was attempted.
    pub operation: Operation,
    /// Username of the actor, or [`ANONYMOUS`].
    pub actor: String,
    /// The caller-supplied subject (raw path, or key fingerprint for logins).
    pub subject: String,
    /// Whether the decision allowed or denied.
    pub outcome: Outcome,
    /// Reason code or resolution detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        operation: Operation,
        actor: Option<&str>,
        subject: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            actor: actor.unwrap_or(ANONYMOUS).to_string(),
            subject: subject.into(),
            outcome,
            detail: None,
        }
    }

    /// Creates a success record.
    pub fn success(operation: Operation, actor: Option<&str>, subject: impl Into<String>) -> Self {
        Self::new(operation, actor, subject, Outcome::Success)
    }

    /// Creates a denial record.
    pub fn denied(operation: Operation, actor: Option<&str>, subject: impl Into<String>) -> Self {
        Self::new(operation, actor, subject, Outcome::Denied)
    }

    /// Attaches a detail string (builder pattern).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns true if the record describes an allowed operation.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[AUDIT] {} | {} | {} | user={} | path={}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.outcome,
            self.operation,
            self.actor,
            self.subject
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " | {}", detail)?;
        }
        Ok(())
    }
}

/// Append-only destination for audit records.
///
/// Implementations must be cheap to call from any thread and must swallow
/// their own failures.
pub trait AuditSink: Send + Sync {
    /// Appends a record.
    fn record(&self, record: AuditRecord);
}

/// Audit sink that emits each record as a `tracing` event.
///
/// Successes are logged at `info`, denials at `warn`, both on
/// [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        let detail = record.detail.as_deref().unwrap_or("");
        match record.outcome {
            Outcome::Success => tracing::info!(
                target: AUDIT_TARGET,
                timestamp = %record.timestamp,
                operation = %record.operation,
                outcome = %record.outcome,
                actor = %record.actor,
                path = %record.subject,
                detail,
                "{}",
                record
            ),
            Outcome::Denied => tracing::warn!(
                target: AUDIT_TARGET,
                timestamp = %record.timestamp,
                operation = %record.operation,
                outcome = %record.outcome,
                actor = %record.actor,
                path = %record.subject,
                detail,
                "{}",
                record
            ),
        }
    }
}

/// Audit sink that keeps records in memory, in call order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all records so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock().clone()
    }

    /// Returns the most recent record.
    pub fn last(&self) -> Option<AuditRecord> {
        self.lock().last().cloned()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes all records.
    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic in another recorder must not stop auditing.
    fn lock(&self) -> MutexGuard<'_, Vec<AuditRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.lock().push(record);
    }
}
