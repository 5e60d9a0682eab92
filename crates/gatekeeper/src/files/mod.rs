//! Path access control for file operations.
//!
//! Every filesystem-touching operation passes its caller-supplied path
//! through [`PathGuard`] before any I/O happens. The guard answers with a
//! [`PathDecision`]: either a validated absolute path under the configured
//! root or a [`DenyReason`] that is recorded for operators and never shown
//! to clients.
//!
//! # Security
//!
//! Raw input is screened for system paths and traversal markers before it
//! is normalized. Containment is proven lexically and then again on the
//! canonical form of the deepest existing ancestor, so a symlink cannot lead
//! a request out of the root or into a blocked subtree.

pub mod decision;
pub mod guard;
pub mod policy;

pub use decision::{DenyReason, PathDecision};
pub use guard::{GuardError, PathGuard, RenamePlan};
pub use policy::{
    check_system_path, check_traversal, strip_leading_separator, validate_entry_name,
    FilePattern, GuardPolicy, MatchKind, BLOCKED_DIRECTORIES, BLOCKED_FILE_PATTERNS,
    BLOCKED_SYSTEM_PATHS, TRAVERSAL_MARKERS,
};
