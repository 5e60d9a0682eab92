//! Denylists and the individual pipeline stages.
//!
//! Each stage is a standalone check returning `Err(DenyReason)` on a match,
//! so it can be tested in isolation and chained with `?` by the guard.
//! Stages that only look at the raw input are free functions. Stages that
//! look at root-relative paths (`/docs/report.txt`) live on [`GuardPolicy`],
//! which holds the configurable denylists.

use super::decision::DenyReason;

/// Absolute OS-critical prefixes, matched against the raw input.
///
/// A prefix matches only at a word boundary, so `/etc` and `/etc/passwd`
/// match while `/etcetera` does not.
pub const BLOCKED_SYSTEM_PATHS: &[&str] = &[
    "/etc", "/sys", "/proc", "/dev", "/boot", "/root", "/bin", "/sbin", "/lib", "/usr/bin",
    "/usr/sbin",
];

/// Substrings that mark traversal or encoding tricks in the raw input.
pub const TRAVERSAL_MARKERS: &[&str] = &["..", "\\", "\0", "~"];

/// Sensitive directory names, blocked at any depth and at the top level.
pub const BLOCKED_DIRECTORIES: &[&str] = &[
    ".ssh",
    ".gnupg",
    "memory",
    "backups",
    "logs",
    "config",
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    ".npm",
    ".pnpm-store",
];

/// How a [`FilePattern`] is matched against a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The name starts with the needle.
    Prefix,
    /// The name contains the needle anywhere.
    Contains,
    /// The name ends with the needle.
    Suffix,
}

/// Sensitive filename patterns. All matching is case-insensitive.
pub const BLOCKED_FILE_PATTERNS: &[(MatchKind, &str)] = &[
    // Hidden files
    (MatchKind::Prefix, "."),
    // Key material and credential files
    (MatchKind::Contains, "authorized_keys"),
    (MatchKind::Contains, ".env"),
    (MatchKind::Contains, ".htpasswd"),
    (MatchKind::Contains, "id_rsa"),
    (MatchKind::Contains, "id_ed25519"),
    (MatchKind::Contains, "id_ecdsa"),
    (MatchKind::Contains, "id_dsa"),
    (MatchKind::Contains, "secret"),
    (MatchKind::Contains, "credential"),
    (MatchKind::Contains, "password"),
    (MatchKind::Contains, "token"),
    (MatchKind::Contains, "apikey"),
    (MatchKind::Contains, "private"),
    // Certificates, keys and account databases
    (MatchKind::Suffix, ".pem"),
    (MatchKind::Suffix, ".key"),
    (MatchKind::Suffix, ".p12"),
    (MatchKind::Suffix, ".pfx"),
    (MatchKind::Suffix, "shadow"),
    (MatchKind::Suffix, "passwd"),
];

/// A single filename pattern with a lowercase needle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    /// How the needle is matched.
    pub kind: MatchKind,
    /// Lowercase text to look for.
    pub needle: String,
}

impl FilePattern {
    /// Creates a pattern, lowercasing the needle.
    pub fn new(kind: MatchKind, needle: &str) -> Self {
        Self {
            kind,
            needle: needle.to_lowercase(),
        }
    }

    /// Returns true if `name` matches, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self.kind {
            MatchKind::Prefix => name.starts_with(&self.needle),
            MatchKind::Contains => name.contains(&self.needle),
            MatchKind::Suffix => name.ends_with(&self.needle),
        }
    }
}

/// The denylists used by the root-relative stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPolicy {
    blocked_directories: Vec<String>,
    blocked_top_level: Vec<String>,
    file_patterns: Vec<FilePattern>,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        let directories: Vec<String> = BLOCKED_DIRECTORIES.iter().map(|d| d.to_string()).collect();
        Self {
            blocked_directories: directories.clone(),
            blocked_top_level: directories,
            file_patterns: BLOCKED_FILE_PATTERNS
                .iter()
                .map(|(kind, needle)| FilePattern::new(*kind, needle))
                .collect(),
        }
    }
}

impl GuardPolicy {
    /// Adds directory names blocked at any depth.
    pub fn with_extra_directories<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_lowercase(&mut self.blocked_directories, names);
        self
    }

    /// Adds directory names blocked only directly under the root.
    pub fn with_extra_top_level<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_lowercase(&mut self.blocked_top_level, names);
        self
    }

    /// Adds blocked file extensions, with or without the leading dot.
    pub fn with_extra_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            let ext = ext.as_ref().trim();
            if ext.is_empty() {
                continue;
            }
            let needle = if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{}", ext)
            };
            self.file_patterns
                .push(FilePattern::new(MatchKind::Suffix, &needle));
        }
        self
    }

    /// Returns the directory names blocked at any depth.
    pub fn blocked_directories(&self) -> &[String] {
        &self.blocked_directories
    }

    /// Returns the directory names blocked directly under the root.
    pub fn blocked_top_level(&self) -> &[String] {
        &self.blocked_top_level
    }

    /// Returns the filename patterns.
    pub fn file_patterns(&self) -> &[FilePattern] {
        &self.file_patterns
    }

    /// Returns true if `name` is a blocked directory name, ignoring case.
    pub fn is_blocked_directory(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.blocked_directories.iter().any(|d| *d == name)
    }

    /// Returns true if `name` matches any filename pattern.
    pub fn is_blocked_filename(&self, name: &str) -> bool {
        self.file_patterns.iter().any(|p| p.matches(name))
    }

    /// Stage 5: denies if any segment of `relative` is a blocked directory.
    pub fn check_directories(&self, relative: &str) -> Result<(), DenyReason> {
        if segments(relative).any(|s| self.is_blocked_directory(s)) {
            return Err(DenyReason::BlockedDirectory);
        }
        Ok(())
    }

    /// Stage 6: denies if the first segment of `relative` is blocked.
    ///
    /// The root itself is always allowed.
    pub fn check_top_level(&self, relative: &str) -> Result<(), DenyReason> {
        let Some(first) = segments(relative).next() else {
            return Ok(());
        };
        let first = first.to_lowercase();
        if self.blocked_top_level.iter().any(|d| *d == first) {
            return Err(DenyReason::NotInAllowedDirectory);
        }
        Ok(())
    }

    /// Stage 7: denies if the final segment of `relative` matches a
    /// filename pattern. The root has no final segment and passes.
    pub fn check_filename(&self, relative: &str) -> Result<(), DenyReason> {
        match segments(relative).last() {
            Some(name) if self.is_blocked_filename(name) => Err(DenyReason::BlockedFilename),
            _ => Ok(()),
        }
    }

    /// Runs stages 5 to 7 on a root-relative path.
    pub fn check_relative(&self, relative: &str) -> Result<(), DenyReason> {
        self.check_directories(relative)?;
        self.check_top_level(relative)?;
        self.check_filename(relative)
    }
}

fn extend_lowercase<I, S>(target: &mut Vec<String>, names: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for name in names {
        let name = name.as_ref().trim().to_lowercase();
        if !name.is_empty() && !target.contains(&name) {
            target.push(name);
        }
    }
}

fn segments(relative: &str) -> impl Iterator<Item = &str> {
    relative.split('/').filter(|s| !s.is_empty())
}

/// Stage 1: denies raw input naming an OS-critical absolute path.
pub fn check_system_path(raw: &str) -> Result<(), DenyReason> {
    let blocked = BLOCKED_SYSTEM_PATHS.iter().any(|prefix| {
        raw.strip_prefix(prefix)
            .is_some_and(|rest| !rest.starts_with(is_word_char))
    });
    if blocked {
        return Err(DenyReason::BlockedSystemPath);
    }
    Ok(())
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Stage 2: denies raw input containing a traversal or encoding marker.
pub fn check_traversal(raw: &str) -> Result<(), DenyReason> {
    if TRAVERSAL_MARKERS.iter().any(|m| raw.contains(m)) {
        return Err(DenyReason::TraversalAttempt);
    }
    Ok(())
}

/// Stage 3: strips a single leading `/`.
pub fn strip_leading_separator(raw: &str) -> &str {
    raw.strip_prefix('/').unwrap_or(raw)
}

/// Validates a bare name for a new or renamed entry.
///
/// The name must be non-empty, must not contain `/`, `\` or NUL, and must
/// not start with `.` (which also rules out `.` and `..`).
pub fn validate_entry_name(name: &str) -> Result<(), DenyReason> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(DenyReason::InvalidName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_paths() {
        for raw in ["/etc", "/etc/passwd", "/proc/self/environ", "/usr/bin/env", "/root", "/dev/null"] {
            assert_eq!(check_system_path(raw), Err(DenyReason::BlockedSystemPath), "{}", raw);
        }
    }

    #[test]
    fn test_system_paths_word_boundary() {
        for raw in ["/etcetera", "/devices/list", "/library", "/binary.txt", "/usr/binaries", "/lib_x"] {
            assert_eq!(check_system_path(raw), Ok(()), "{}", raw);
        }
        // A dot or dash ends the word.
        assert!(check_system_path("/etc.d").is_err());
        assert!(check_system_path("/dev-notes").is_err());
    }

    #[test]
    fn test_system_paths_require_leading_slash() {
        assert_eq!(check_system_path("etc/passwd"), Ok(()));
        assert_eq!(check_system_path("docs/etc"), Ok(()));
    }

    #[test]
    fn test_traversal_markers() {
        for raw in ["../x", "a/../b", "a..b", "a\\b", "a\0b", "~/x", "/home/~user"] {
            assert_eq!(check_traversal(raw), Err(DenyReason::TraversalAttempt), "{:?}", raw);
        }
        assert_eq!(check_traversal("/docs/report.v1.txt"), Ok(()));
    }

    #[test]
    fn test_strip_leading_separator() {
        assert_eq!(strip_leading_separator("/docs"), "docs");
        assert_eq!(strip_leading_separator("docs"), "docs");
        assert_eq!(strip_leading_separator("//docs"), "/docs");
        assert_eq!(strip_leading_separator("/"), "");
    }

    #[test]
    fn test_blocked_directories_any_depth() {
        let policy = GuardPolicy::default();
        assert_eq!(policy.check_directories("/memory"), Err(DenyReason::BlockedDirectory));
        assert_eq!(
            policy.check_directories("/projects/app/node_modules/x.js"),
            Err(DenyReason::BlockedDirectory)
        );
        assert_eq!(policy.check_directories("/a/.GIT/HEAD"), Err(DenyReason::BlockedDirectory));
        assert_eq!(policy.check_directories("/docs/memory-notes"), Ok(()));
        assert_eq!(policy.check_directories("/"), Ok(()));
    }

    #[test]
    fn test_top_level() {
        let policy = GuardPolicy::default().with_extra_top_level(["Private-Area"]);
        assert_eq!(policy.check_top_level("/"), Ok(()));
        assert_eq!(policy.check_top_level(""), Ok(()));
        assert_eq!(policy.check_top_level("/docs/a"), Ok(()));
        assert_eq!(
            policy.check_top_level("/Logs/today"),
            Err(DenyReason::NotInAllowedDirectory)
        );
        assert_eq!(
            policy.check_top_level("/private-area/x"),
            Err(DenyReason::NotInAllowedDirectory)
        );
        // Only blocked at the top.
        assert_eq!(policy.check_directories("/docs/private-area"), Ok(()));
    }

    #[test]
    fn test_blocked_filenames() {
        let policy = GuardPolicy::default();
        for name in [
            ".bashrc",
            "id_rsa",
            "ID_RSA.pub",
            "server.pem",
            "tls.KEY",
            "app.env.local",
            "prod.env",
            "my-secrets.txt",
            "aws_credentials",
            "Passwords.xlsx",
            "github-token",
            "apikey.json",
            "private.txt",
            "shadow",
            "passwd",
            "cert.p12",
            "cert.pfx",
            "authorized_keys2",
        ] {
            assert!(policy.is_blocked_filename(name), "{}", name);
        }
        for name in ["report.txt", "photo.jpg", "keyboard.md", "passwd.txt", "notes"] {
            assert!(!policy.is_blocked_filename(name), "{}", name);
        }
    }

    #[test]
    fn test_check_filename_uses_last_segment() {
        let policy = GuardPolicy::default();
        assert_eq!(policy.check_filename("/docs/id_rsa"), Err(DenyReason::BlockedFilename));
        assert_eq!(policy.check_filename("/secret-dir/readme.md"), Ok(()));
        assert_eq!(policy.check_filename("/"), Ok(()));
    }

    #[test]
    fn test_extra_extensions() {
        let policy = GuardPolicy::default().with_extra_extensions(["kdbx", ".Vault", "  "]);
        assert!(policy.is_blocked_filename("passwords.kdbx"));
        assert!(policy.is_blocked_filename("db.KDBX"));
        assert!(policy.is_blocked_filename("team.vault"));
        assert!(!policy.is_blocked_filename("kdbx-notes.txt"));
        assert_eq!(policy.file_patterns().len(), BLOCKED_FILE_PATTERNS.len() + 2);
    }

    #[test]
    fn test_extra_directories_are_deduplicated() {
        let policy = GuardPolicy::default().with_extra_directories(["Vault", "vault", "logs"]);
        assert!(policy.is_blocked_directory("VAULT"));
        assert_eq!(policy.blocked_directories().len(), BLOCKED_DIRECTORIES.len() + 1);
    }

    #[test]
    fn test_check_relative_stage_order() {
        let policy = GuardPolicy::default();
        // Directory stage runs before the filename stage.
        assert_eq!(policy.check_relative("/logs/id_rsa"), Err(DenyReason::BlockedDirectory));
        assert_eq!(policy.check_relative("/docs/id_rsa"), Err(DenyReason::BlockedFilename));
        assert_eq!(policy.check_relative("/docs/readme.md"), Ok(()));
    }

    #[test]
    fn test_validate_entry_name() {
        assert_eq!(validate_entry_name("report.txt"), Ok(()));
        assert_eq!(validate_entry_name("My Folder"), Ok(()));
        for name in ["", ".", "..", ".hidden", "a/b", "a\\b", "a\0b"] {
            assert_eq!(validate_entry_name(name), Err(DenyReason::InvalidName), "{:?}", name);
        }
    }
}
