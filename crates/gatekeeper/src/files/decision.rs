//! Path decisions and denial reasons.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::guard::GuardError;

/// Why a path was refused.
///
/// The code is meant for the audit trail only. Callers map every variant to
/// the same generic access-denied response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The raw input names an OS-critical absolute path.
    BlockedSystemPath,
    /// The raw input contains `..`, a backslash, a NUL byte or `~`.
    TraversalAttempt,
    /// The resolved path is not under the root.
    OutsideRoot,
    /// Some segment of the path is a sensitive directory.
    BlockedDirectory,
    /// The first segment under the root is blocked.
    NotInAllowedDirectory,
    /// The final component matches a sensitive filename pattern.
    BlockedFilename,
    /// A new entry name is empty, hidden or contains a separator.
    InvalidName,
    /// The operation would modify the root itself.
    RootNotModifiable,
    /// A resolved path escaped the root after passing containment.
    ContainmentViolation,
}

impl DenyReason {
    /// Returns the machine-readable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockedSystemPath => "blocked_system_path",
            Self::TraversalAttempt => "traversal_attempt",
            Self::OutsideRoot => "outside_root",
            Self::BlockedDirectory => "blocked_directory",
            Self::NotInAllowedDirectory => "not_in_allowed_directory",
            Self::BlockedFilename => "blocked_filename",
            Self::InvalidName => "invalid_name",
            Self::RootNotModifiable => "root_not_modifiable",
            Self::ContainmentViolation => "containment_violation",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of the path pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathDecision {
    /// The fully validated absolute path.
    Allow(PathBuf),
    /// The request is refused.
    Deny(DenyReason),
}

impl PathDecision {
    /// Returns true for [`PathDecision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// Returns the validated path, if allowed.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Allow(path) => Some(path),
            Self::Deny(_) => None,
        }
    }

    /// Returns the denial reason, if denied.
    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow(_) => None,
            Self::Deny(reason) => Some(*reason),
        }
    }

    /// Consumes the decision, returning the validated path if allowed.
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Self::Allow(path) => Some(path),
            Self::Deny(_) => None,
        }
    }

    /// Converts the decision into a `Result` for use with `?`.
    pub fn into_result(self) -> Result<PathBuf, GuardError> {
        match self {
            Self::Allow(path) => Ok(path),
            Self::Deny(reason) => Err(GuardError::PathDenied { reason }),
        }
    }
}
