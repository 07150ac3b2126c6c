//! # Sandbox Containment Predicate
//!
//! Roots are kept as lexically normalized absolute paths; a candidate path
//! is contained when it equals a root or extends one past a separator.
//! Normalization collapses `.` and `..` segments without touching the
//! filesystem, so `..` escape sequences are blocked at the prefix level.
//! Symbolic links that point outside a root are a documented limitation:
//! the lexical check stays authoritative to avoid TOCTOU races, and a
//! `realpath` pass would be an addition, not a replacement.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A path failed the containment check against every configured root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sandbox violation: path '{path}' is outside all sandbox roots")]
pub struct SandboxViolation {
    pub path: String,
}

/// Ordered set of sandbox roots. Duplicates are removed on insertion.
///
/// An empty set means no enforcement: the predicate warns and allows any
/// path. This is inherited permissive behavior, preserved for
/// compatibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxSet {
    roots: Vec<PathBuf>,
}

impl SandboxSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes and inserts a root. Empty and duplicate roots are ignored.
    /// Returns `true` if the root was added.
    pub fn add(&mut self, root: impl AsRef<Path>) -> bool {
        let normalized = normalize_path(root.as_ref());
        if normalized.as_os_str().is_empty() {
            warn!("ignoring empty sandbox root");
            return false;
        }
        if self.roots.contains(&normalized) {
            return false;
        }
        debug!("sandbox root added: {}", normalized.display());
        self.roots.push(normalized);
        true
    }

    /// Removes a root by its normalized form. Returns `true` if present.
    pub fn remove(&mut self, root: impl AsRef<Path>) -> bool {
        let normalized = normalize_path(root.as_ref());
        let before = self.roots.len();
        self.roots.retain(|r| r != &normalized);
        self.roots.len() != before
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// The containment predicate.
    ///
    /// With no roots configured, any path passes (with a warning). A
    /// relative candidate is resolved against each root independently; an
    /// absolute candidate is normalized once and checked against every
    /// root.
    pub fn enforce(&self, path: impl AsRef<Path>) -> Result<(), SandboxViolation> {
        let path = path.as_ref();
        if self.roots.is_empty() {
            warn!(
                "sandbox has no roots; allowing path '{}' unchecked",
                path.display()
            );
            return Ok(());
        }
        for root in &self.roots {
            let candidate = if path.is_absolute() {
                normalize_path(path)
            } else {
                normalize_path(&root.join(path))
            };
            if path_under_root(root, &candidate) {
                return Ok(());
            }
        }
        Err(SandboxViolation {
            path: normalize_path(path).display().to_string(),
        })
    }
}

/// Lexically normalizes a path: collapses `.` segments and resolves `..`
/// against preceding components, without consulting the filesystem. A `..`
/// at an absolute root is dropped (`/.. == /`); a leading `..` on a
/// relative path is kept so it still fails containment after joining.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// `candidate` equals `root` or extends it past a component boundary.
/// Both arguments must already be normalized.
fn path_under_root(root: &Path, candidate: &Path) -> bool {
    candidate == root || candidate.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dot_and_dotdot() {
        assert_eq!(
            normalize_path(Path::new("/a/b/./c/../d")),
            PathBuf::from("/a/b/d")
        );
        assert_eq!(normalize_path(Path::new("/a/b/..")), PathBuf::from("/a"));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn no_roots_allows_any_path() {
        let sandbox = SandboxSet::new();
        assert!(sandbox.enforce("/some/random/path/file.txt").is_ok());
        assert!(sandbox.enforce("/etc/shadow").is_ok());
    }

    #[test]
    fn path_within_root_is_allowed() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/ok");
        assert!(sandbox.enforce("/srv/ok/file_allowed.txt").is_ok());
        assert!(sandbox.enforce("/srv/ok/nested/deep/file.txt").is_ok());
    }

    #[test]
    fn path_outside_root_is_denied() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/ok");
        let err = sandbox.enforce("/etc/shadow").unwrap_err();
        assert!(err.to_string().contains("Sandbox violation"));
        assert!(err.to_string().contains("/etc/shadow"));
    }

    #[test]
    fn sibling_prefix_is_not_containment() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/ok");
        assert!(sandbox.enforce("/srv/okay/file.txt").is_err());
    }

    #[test]
    fn multiple_roots_any_match_allows() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/a");
        sandbox.add("/srv/b");
        assert!(sandbox.enforce("/srv/a/file.txt").is_ok());
        assert!(sandbox.enforce("/srv/b/another.txt").is_ok());
        assert!(sandbox.enforce("/srv/c/other.txt").is_err());
    }

    #[test]
    fn path_equal_to_root_is_allowed() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/ok");
        assert!(sandbox.enforce("/srv/ok").is_ok());
    }

    #[test]
    fn tricky_path_resolving_inside_is_allowed() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/parent");
        assert!(sandbox.enforce("/srv/parent/child/../file_in_root.txt").is_ok());
    }

    #[test]
    fn tricky_path_escaping_is_denied() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/escape");
        assert!(sandbox.enforce("/srv/escape/../../escaped_file.txt").is_err());
    }

    #[test]
    fn relative_path_resolves_against_each_root() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/a");
        assert!(sandbox.enforce("inside.txt").is_ok());
        assert!(sandbox.enforce("../outside.txt").is_err());
    }

    #[test]
    fn duplicate_roots_are_deduplicated() {
        let mut sandbox = SandboxSet::new();
        assert!(sandbox.add("/srv/ok"));
        assert!(!sandbox.add("/srv/ok"));
        assert!(!sandbox.add("/srv/ok/sub/.."));
        assert_eq!(sandbox.roots().len(), 1);
    }

    #[test]
    fn remove_uses_normalized_form() {
        let mut sandbox = SandboxSet::new();
        sandbox.add("/srv/ok");
        assert!(sandbox.remove("/srv/ok/x/.."));
        assert!(sandbox.is_empty());
        assert!(!sandbox.remove("/srv/ok"));
    }
}
