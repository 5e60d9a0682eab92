//! The path access-control pipeline.
//!
//! [`PathGuard`] turns an untrusted path string into either a validated
//! absolute path under a fixed root or a [`DenyReason`]. The stages run in
//! order and the first failure wins:
//!
//! 1. system-path rejection on the raw input
//! 2. traversal marker rejection on the raw input
//! 3. stripping of one leading `/`
//! 4. lexical resolution against the root and containment proof, followed by
//!    a symlink-aware containment check on the deepest existing ancestor
//! 5. blocked directory names at any depth
//! 6. blocked top-level directories
//! 7. blocked filename patterns on the final component
//!
//! Every decision emits exactly one audit record carrying the raw input.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::decision::{DenyReason, PathDecision};
use super::policy::{
    check_system_path, check_traversal, strip_leading_separator, validate_entry_name,
    GuardPolicy,
};
use crate::audit::{AuditRecord, AuditSink, Operation};
use crate::auth::User;

/// Errors raised by the path guard.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The configured root cannot be canonicalized or is not a directory.
    #[error("file root {} is unavailable: {source}", .path.display())]
    RootUnavailable {
        /// The configured root.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// A path expected to be under the root is not.
    #[error("path {} is not under the file root", .path.display())]
    ContainmentViolation {
        /// The offending path.
        path: PathBuf,
    },

    /// The pipeline refused the path.
    #[error("access denied ({reason})")]
    PathDenied {
        /// Audit reason code.
        reason: DenyReason,
    },
}

/// Source and destination of an approved rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    /// Validated absolute path of the existing entry.
    pub from: PathBuf,
    /// Validated absolute path of the new name.
    pub to: PathBuf,
}

/// Output of the containment stage.
struct Contained {
    absolute: PathBuf,
    relative: String,
}

/// Validates untrusted paths against a fixed root.
///
/// Holds no mutable state, so one guard can be shared across threads behind
/// an `Arc` and repeated calls with the same input give the same decision.
pub struct PathGuard {
    root: PathBuf,
    policy: GuardPolicy,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for PathGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathGuard")
            .field("root", &self.root)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PathGuard {
    /// Creates a guard over `root` with the default denylists.
    pub fn new(root: impl AsRef<Path>, audit: Arc<dyn AuditSink>) -> Result<Self, GuardError> {
        Self::with_policy(root, GuardPolicy::default(), audit)
    }

    /// Creates a guard over `root` with a custom policy.
    ///
    /// The root is canonicalized once here; it must exist and be a
    /// directory.
    pub fn with_policy(
        root: impl AsRef<Path>,
        policy: GuardPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, GuardError> {
        let root = root.as_ref();
        let unavailable = |source| GuardError::RootUnavailable {
            path: root.to_path_buf(),
            source,
        };

        let canonical = fs::canonicalize(root).map_err(unavailable)?;
        if !canonical.is_dir() {
            return Err(unavailable(io::Error::other("not a directory")));
        }

        tracing::debug!("Path guard rooted at {}", canonical.display());
        Ok(Self {
            root: canonical,
            policy,
            audit,
        })
    }

    /// Returns the canonical root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the active policy.
    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Resolves `user_path`, audited as a generic path check.
    pub fn resolve(&self, user_path: &str, actor: Option<&User>) -> PathDecision {
        self.resolve_for(Operation::PathCheck, user_path, actor)
    }

    /// Resolves `user_path`, audited under `operation`.
    pub fn resolve_for(
        &self,
        operation: Operation,
        user_path: &str,
        actor: Option<&User>,
    ) -> PathDecision {
        match self.run_pipeline(user_path) {
            Ok(contained) => {
                self.audit.record(
                    AuditRecord::success(operation, username(actor), user_path)
                        .with_detail(format!("resolved={}", contained.relative)),
                );
                PathDecision::Allow(contained.absolute)
            }
            Err(reason) => {
                self.deny(operation, user_path, actor, reason);
                PathDecision::Deny(reason)
            }
        }
    }

    /// Returns true if `user_path` resolves to an allowed path.
    pub fn is_path_safe(&self, user_path: &str, actor: Option<&User>) -> bool {
        self.resolve(user_path, actor).is_allowed()
    }

    /// Gate applied before enumerating a directory.
    ///
    /// Resolves the path, then re-derives its root-relative form from the
    /// resolved absolute path and repeats the top-level check on it.
    pub fn can_list_directory(&self, user_path: &str, actor: Option<&User>) -> bool {
        let Some(resolved) = self
            .resolve_for(Operation::ListDirectory, user_path, actor)
            .into_path()
        else {
            return false;
        };

        match self.relative_path(&resolved) {
            Ok(relative) => self.policy.check_top_level(&relative).is_ok(),
            Err(err) => {
                tracing::error!("Refusing directory listing: {}", err);
                false
            }
        }
    }

    /// Returns the root-relative form of `absolute`, always starting with `/`.
    ///
    /// The root itself maps to `/`. Fails with
    /// [`GuardError::ContainmentViolation`] if `absolute` is not under the
    /// root.
    pub fn relative_path(&self, absolute: &Path) -> Result<String, GuardError> {
        let normalized = normalize_lexically(absolute);
        let rest = normalized
            .strip_prefix(&self.root)
            .map_err(|_| GuardError::ContainmentViolation {
                path: absolute.to_path_buf(),
            })?;
        Ok(to_relative_string(rest))
    }

    /// Plans a rename of `user_path` to the bare name `new_name`.
    ///
    /// Both the source and the destination go through the full pipeline,
    /// audited as [`Operation::Rename`]. The root cannot be renamed.
    pub fn resolve_rename(
        &self,
        user_path: &str,
        new_name: &str,
        actor: Option<&User>,
    ) -> Result<RenamePlan, DenyReason> {
        if let Err(reason) = validate_entry_name(new_name) {
            self.deny(Operation::Rename, user_path, actor, reason);
            return Err(reason);
        }

        let from = match self.resolve_for(Operation::Rename, user_path, actor) {
            PathDecision::Allow(path) => path,
            PathDecision::Deny(reason) => return Err(reason),
        };
        if from == self.root {
            self.deny(Operation::Rename, user_path, actor, DenyReason::RootNotModifiable);
            return Err(DenyReason::RootNotModifiable);
        }

        let parent = from.parent().unwrap_or(self.root.as_path());
        let parent_relative = self.relative_path(parent).map_err(|err| {
            tracing::error!("Refusing rename: {}", err);
            DenyReason::ContainmentViolation
        })?;
        let destination = join_relative(&parent_relative, new_name);

        match self.resolve_for(Operation::Rename, &destination, actor) {
            PathDecision::Allow(to) => Ok(RenamePlan { from, to }),
            PathDecision::Deny(reason) => Err(reason),
        }
    }

    /// Resolves the target of a create or upload of `name` inside
    /// `parent_path`.
    pub fn resolve_new_entry(
        &self,
        operation: Operation,
        parent_path: &str,
        name: &str,
        actor: Option<&User>,
    ) -> PathDecision {
        let target = join_relative(parent_path, name);
        if let Err(reason) = validate_entry_name(name) {
            self.deny(operation, &target, actor, reason);
            return PathDecision::Deny(reason);
        }
        self.resolve_for(operation, &target, actor)
    }

    fn run_pipeline(&self, user_path: &str) -> Result<Contained, DenyReason> {
        check_system_path(user_path)?;
        check_traversal(user_path)?;
        let candidate = strip_leading_separator(user_path);

        let contained = self.contain(candidate)?;
        self.policy.check_relative(&contained.relative)?;

        if let Some(canonical_relative) = self.canonical_relative(&contained.absolute)? {
            if canonical_relative != contained.relative {
                tracing::debug!(
                    "{} resolves through a link to {}",
                    contained.relative,
                    canonical_relative
                );
                self.policy.check_relative(&canonical_relative)?;
            }
        }

        Ok(contained)
    }

    /// Stage 4: lexical join and containment proof.
    fn contain(&self, candidate: &str) -> Result<Contained, DenyReason> {
        let absolute = normalize_lexically(&self.root.join(candidate));
        if !absolute.starts_with(&self.root) {
            return Err(DenyReason::OutsideRoot);
        }

        let relative = self.relative_path(&absolute).map_err(|err| {
            tracing::error!("Containment invariant broken: {}", err);
            DenyReason::ContainmentViolation
        })?;
        Ok(Contained { absolute, relative })
    }

    /// Canonicalizes the deepest existing ancestor of `absolute` and returns
    /// the root-relative form of the result with the missing tail appended.
    ///
    /// Returns `Ok(None)` if nothing on the path exists below the root yet.
    fn canonical_relative(&self, absolute: &Path) -> Result<Option<String>, DenyReason> {
        let mut missing = Vec::new();
        let mut current = absolute;

        let canonical = loop {
            match fs::canonicalize(current) {
                Ok(canonical) => break canonical,
                Err(_) if fs::symlink_metadata(current).is_ok() => {
                    // Dangling or looping link: the target cannot be proven.
                    return Err(DenyReason::OutsideRoot);
                }
                Err(_) => {
                    let (Some(parent), Some(name)) = (current.parent(), current.file_name())
                    else {
                        return Err(DenyReason::OutsideRoot);
                    };
                    missing.push(name);
                    current = parent;
                }
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(DenyReason::OutsideRoot);
        }
        if current == self.root {
            return Ok(None);
        }

        let mut full = canonical;
        full.extend(missing.iter().rev());
        self.relative_path(&full).map(Some).map_err(|err| {
            tracing::error!("Containment invariant broken: {}", err);
            DenyReason::ContainmentViolation
        })
    }

    fn deny(&self, operation: Operation, user_path: &str, actor: Option<&User>, reason: DenyReason) {
        self.audit.record(
            AuditRecord::denied(operation, username(actor), user_path).with_detail(reason.as_str()),
        );
    }
}

fn username(actor: Option<&User>) -> Option<&str> {
    actor.map(|user| user.username.as_str())
}

/// Resolves `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn to_relative_string(rest: &Path) -> String {
    let parts: Vec<String> = rest
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}

fn join_relative(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditSink, Outcome};
    use identity::Fingerprint;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        audit: Arc<MemoryAuditSink>,
        guard: PathGuard,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs/sub")).unwrap();
        fs::write(dir.path().join("docs/readme.md"), "hello").unwrap();
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = PathGuard::new(dir.path(), audit.clone()).unwrap();
        Fixture {
            _dir: dir,
            audit,
            guard,
        }
    }

    fn alice() -> User {
        User {
            id: "0fa20ad7383e6545".to_string(),
            username: "alice".to_string(),
            fingerprint: Fingerprint::parse("0f:a2:0a:d7:38:3e:65:45:08:6b:63:84:1c:ff:dc:ba")
                .unwrap(),
        }
    }

    #[test]
    fn test_allows_plain_paths() {
        let fx = fixture();
        let root = fx.guard.root().to_path_buf();

        assert_eq!(
            fx.guard.resolve("/docs/readme.md", None),
            PathDecision::Allow(root.join("docs/readme.md"))
        );
        assert_eq!(
            fx.guard.resolve("docs/readme.md", None),
            PathDecision::Allow(root.join("docs/readme.md"))
        );
        assert_eq!(fx.guard.resolve("/", None), PathDecision::Allow(root.clone()));
        assert_eq!(fx.guard.resolve("", None), PathDecision::Allow(root.clone()));
        assert_eq!(
            fx.guard.resolve("/docs/./sub/", None),
            PathDecision::Allow(root.join("docs/sub"))
        );
    }

    #[test]
    fn test_allows_paths_that_do_not_exist_yet() {
        let fx = fixture();
        let decision = fx.guard.resolve("/docs/new/draft.txt", None);
        assert_eq!(
            decision.path(),
            Some(fx.guard.root().join("docs/new/draft.txt").as_path())
        );
    }

    #[test]
    fn test_stage_reasons() {
        let fx = fixture();
        let cases = [
            ("/etc/passwd", DenyReason::BlockedSystemPath),
            ("/proc", DenyReason::BlockedSystemPath),
            ("../../etc/passwd", DenyReason::TraversalAttempt),
            ("docs\\readme.md", DenyReason::TraversalAttempt),
            ("~/notes", DenyReason::TraversalAttempt),
            ("docs/\0x", DenyReason::TraversalAttempt),
            ("//srv/elsewhere", DenyReason::OutsideRoot),
            ("/docs/.git/config", DenyReason::BlockedDirectory),
            ("/memory/secrets.txt", DenyReason::BlockedDirectory),
            ("/docs/id_rsa", DenyReason::BlockedFilename),
            ("/docs/.env", DenyReason::BlockedFilename),
            ("/docs/server.PEM", DenyReason::BlockedFilename),
        ];
        for (raw, reason) in cases {
            assert_eq!(fx.guard.resolve(raw, None), PathDecision::Deny(reason), "{:?}", raw);
        }
    }

    #[test]
    fn test_extra_top_level_is_not_in_allowed_directory() {
        let dir = TempDir::new().unwrap();
        let policy = GuardPolicy::default().with_extra_top_level(["archive"]);
        let guard = PathGuard::with_policy(dir.path(), policy, Arc::new(MemoryAuditSink::new()))
            .unwrap();

        assert_eq!(
            guard.resolve("/archive/2023.zip", None),
            PathDecision::Deny(DenyReason::NotInAllowedDirectory)
        );
        assert!(guard.is_path_safe("/docs/archive/2023.zip", None));
    }

    #[test]
    fn test_prefix_sibling_is_outside_root() {
        let parent = TempDir::new().unwrap();
        fs::create_dir(parent.path().join("files")).unwrap();
        fs::create_dir(parent.path().join("files2")).unwrap();
        let guard = PathGuard::new(
            parent.path().join("files"),
            Arc::new(MemoryAuditSink::new()),
        )
        .unwrap();

        let sibling = parent.path().join("files2").canonicalize().unwrap();
        let raw = format!("/{}", sibling.display());
        assert_eq!(guard.resolve(&raw, None), PathDecision::Deny(DenyReason::OutsideRoot));
    }

    #[test]
    fn test_one_audit_record_per_decision() {
        let fx = fixture();
        fx.guard.resolve("/docs/readme.md", Some(&alice()));
        fx.guard.resolve("../x", None);

        let records = fx.audit.records();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].outcome, Outcome::Success);
        assert_eq!(records[0].actor, "alice");
        assert_eq!(records[0].subject, "/docs/readme.md");
        assert_eq!(records[0].detail.as_deref(), Some("resolved=/docs/readme.md"));

        assert_eq!(records[1].outcome, Outcome::Denied);
        assert_eq!(records[1].actor, "anonymous");
        assert_eq!(records[1].subject, "../x");
        assert_eq!(records[1].detail.as_deref(), Some("traversal_attempt"));
    }

    #[test]
    fn test_resolve_for_records_operation() {
        let fx = fixture();
        fx.guard.resolve_for(Operation::Delete, "/docs/readme.md", None);
        assert_eq!(fx.audit.last().unwrap().operation, Operation::Delete);
    }

    #[test]
    fn test_relative_path() {
        let fx = fixture();
        let root = fx.guard.root().to_path_buf();

        assert_eq!(fx.guard.relative_path(&root).unwrap(), "/");
        assert_eq!(
            fx.guard.relative_path(&root.join("docs/readme.md")).unwrap(),
            "/docs/readme.md"
        );
        assert_eq!(
            fx.guard.relative_path(&root.join("docs/../docs/sub")).unwrap(),
            "/docs/sub"
        );

        let outside = root.parent().unwrap().to_path_buf();
        assert!(matches!(
            fx.guard.relative_path(&outside),
            Err(GuardError::ContainmentViolation { .. })
        ));
    }

    #[test]
    fn test_relative_path_inverts_resolve() {
        let fx = fixture();
        let resolved = fx.guard.resolve("/docs/sub", None).into_path().unwrap();
        assert_eq!(fx.guard.relative_path(&resolved).unwrap(), "/docs/sub");
    }

    #[test]
    fn test_can_list_directory() {
        let fx = fixture();
        assert!(fx.guard.can_list_directory("/", None));
        assert!(fx.guard.can_list_directory("/docs", None));
        assert!(!fx.guard.can_list_directory("/logs", None));
        assert!(!fx.guard.can_list_directory("/../", None));
        assert_eq!(fx.audit.last().unwrap().operation, Operation::ListDirectory);
    }

    #[test]
    fn test_rename_plan() {
        let fx = fixture();
        let root = fx.guard.root().to_path_buf();
        let plan = fx
            .guard
            .resolve_rename("/docs/readme.md", "README.txt", Some(&alice()))
            .unwrap();
        assert_eq!(plan.from, root.join("docs/readme.md"));
        assert_eq!(plan.to, root.join("docs/README.txt"));
    }

    #[test]
    fn test_rename_denials() {
        let fx = fixture();
        assert_eq!(
            fx.guard.resolve_rename("/docs/readme.md", ".hidden", None),
            Err(DenyReason::InvalidName)
        );
        assert_eq!(
            fx.guard.resolve_rename("/docs/readme.md", "../x", None),
            Err(DenyReason::InvalidName)
        );
        assert_eq!(
            fx.guard.resolve_rename("/docs/readme.md", "id_rsa", None),
            Err(DenyReason::BlockedFilename)
        );
        assert_eq!(
            fx.guard.resolve_rename("/docs", "logs", None),
            Err(DenyReason::BlockedDirectory)
        );
        assert_eq!(
            fx.guard.resolve_rename("/", "elsewhere", None),
            Err(DenyReason::RootNotModifiable)
        );
        assert_eq!(
            fx.guard.resolve_rename("/etc/hosts", "hosts2", None),
            Err(DenyReason::BlockedSystemPath)
        );
        assert_eq!(fx.audit.last().unwrap().operation, Operation::Rename);
    }

    #[test]
    fn test_resolve_new_entry() {
        let fx = fixture();
        let decision = fx
            .guard
            .resolve_new_entry(Operation::Upload, "/docs/", "photo.jpg", None);
        assert_eq!(
            decision,
            PathDecision::Allow(fx.guard.root().join("docs/photo.jpg"))
        );
        assert_eq!(
            fx.guard.resolve_new_entry(Operation::Create, "/", "new-folder", None),
            PathDecision::Allow(fx.guard.root().join("new-folder"))
        );

        assert_eq!(
            fx.guard.resolve_new_entry(Operation::Create, "/docs", "a/b", None),
            PathDecision::Deny(DenyReason::InvalidName)
        );
        let record = fx.audit.last().unwrap();
        assert_eq!(record.operation, Operation::Create);
        assert_eq!(record.subject, "/docs/a/b");

        assert_eq!(
            fx.guard.resolve_new_entry(Operation::Upload, "/docs", "token.txt", None),
            PathDecision::Deny(DenyReason::BlockedFilename)
        );
    }

    #[test]
    fn test_root_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let err = PathGuard::new(&missing, Arc::new(MemoryAuditSink::new())).unwrap_err();
        assert!(matches!(err, GuardError::RootUnavailable { .. }));

        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        let err = PathGuard::new(&file, Arc::new(MemoryAuditSink::new())).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_outside_root() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("data.txt"), "x").unwrap();

        let fx = fixture();
        std::os::unix::fs::symlink(outside.path(), fx.guard.root().join("docs/link")).unwrap();

        assert_eq!(
            fx.guard.resolve("/docs/link/data.txt", None),
            PathDecision::Deny(DenyReason::OutsideRoot)
        );
        assert_eq!(
            fx.guard.resolve("/docs/link/new.txt", None),
            PathDecision::Deny(DenyReason::OutsideRoot)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_blocked_directory() {
        let fx = fixture();
        let root = fx.guard.root().to_path_buf();
        fs::create_dir(root.join("backups")).unwrap();
        fs::write(root.join("backups/db.sql"), "x").unwrap();
        std::os::unix::fs::symlink(root.join("backups"), root.join("docs/shortcut")).unwrap();

        assert_eq!(
            fx.guard.resolve("/docs/shortcut/db.sql", None),
            PathDecision::Deny(DenyReason::BlockedDirectory)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_denied() {
        let fx = fixture();
        let root = fx.guard.root().to_path_buf();
        std::os::unix::fs::symlink("/nonexistent/target", root.join("docs/dangling")).unwrap();

        assert_eq!(
            fx.guard.resolve("/docs/dangling", None),
            PathDecision::Deny(DenyReason::OutsideRoot)
        );
    }

    #[test]
    fn test_idempotent() {
        let fx = fixture();
        for raw in ["/docs/readme.md", "/memory/a", "../x", "/docs/id_rsa", "/"] {
            assert_eq!(fx.guard.resolve(raw, None), fx.guard.resolve(raw, None));
        }
    }
}
