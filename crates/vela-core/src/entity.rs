//! Identity types: code entities and project files.
//!
//! [`EntityId`] names a code element by its qualified name. Nesting is
//! marked with `$` (`app.io.Reader$Inner` is nested inside
//! `app.io.Reader`). [`ProjectFile`] names a file by its path relative to
//! a project root; equality is by identity, not by any open handle, so
//! de-duplication works across reconstructions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// EntityId
// ─────────────────────────────────────────────────────────────────────────────

/// Stable identifier of a code entity (a type or member).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id from a qualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The full qualified name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short (unqualified) display name — everything after the last `.`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Whether this entity is nested inside another (`$` in the name).
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.0.contains('$')
    }

    /// The outermost enclosing entity, if this one is nested.
    #[must_use]
    pub fn outermost(&self) -> Option<EntityId> {
        self.0.find('$').map(|i| EntityId::new(&self.0[..i]))
    }

    /// The immediately enclosing entity, if this one is nested.
    #[must_use]
    pub fn outer(&self) -> Option<EntityId> {
        self.0.rfind('$').map(|i| EntityId::new(&self.0[..i]))
    }

    /// Iterate this entity followed by each enclosing entity, innermost first.
    pub fn enclosing_chain(&self) -> impl Iterator<Item = EntityId> + '_ {
        let mut current = Some(self.clone());
        std::iter::from_fn(move || {
            let this = current.take()?;
            current = this.outer();
            Some(this)
        })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProjectFile
// ─────────────────────────────────────────────────────────────────────────────

/// A file identified by its path relative to a project root.
///
/// The root is shared by `Arc` since every file in a snapshot lives under
/// the same root. Ordering and equality use `(root, rel)` so the type can
/// key the undo-backup map deterministically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectFile {
    root: Arc<PathBuf>,
    rel: PathBuf,
}

impl ProjectFile {
    /// Create a file reference under the given root.
    pub fn new(root: Arc<PathBuf>, rel: impl Into<PathBuf>) -> Self {
        Self {
            root,
            rel: rel.into(),
        }
    }

    /// The project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The path relative to the root.
    #[must_use]
    pub fn rel(&self) -> &Path {
        &self.rel
    }

    /// The absolute path.
    #[must_use]
    pub fn abs(&self) -> PathBuf {
        self.root.join(&self.rel)
    }

    /// Read the file contents. May fail with an I/O error.
    pub fn read(&self) -> std::io::Result<String> {
        std::fs::read_to_string(self.abs())
    }
}

impl fmt::Display for ProjectFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rel.display())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_package() {
        assert_eq!(EntityId::new("app.io.Reader").short_name(), "Reader");
        assert_eq!(EntityId::new("Reader").short_name(), "Reader");
    }

    #[test]
    fn nesting_accessors() {
        let inner = EntityId::new("app.Reader$Buf$Slot");
        assert!(inner.is_nested());
        assert_eq!(inner.outermost().unwrap().as_str(), "app.Reader");
        assert_eq!(inner.outer().unwrap().as_str(), "app.Reader$Buf");

        let chain: Vec<_> = inner.enclosing_chain().collect();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[2].as_str(), "app.Reader");
    }

    #[test]
    fn top_level_has_no_enclosing() {
        let top = EntityId::new("app.Reader");
        assert!(!top.is_nested());
        assert!(top.outermost().is_none());
        assert_eq!(top.enclosing_chain().count(), 1);
    }

    #[test]
    fn project_file_identity() {
        let root = Arc::new(PathBuf::from("/proj"));
        let a = ProjectFile::new(Arc::clone(&root), "src/lib.rs");
        let b = ProjectFile::new(Arc::clone(&root), "src/lib.rs");
        let c = ProjectFile::new(root, "src/main.rs");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.abs(), PathBuf::from("/proj/src/lib.rs"));
        assert_eq!(a.to_string(), "src/lib.rs");
    }

    #[test]
    fn project_file_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let root = Arc::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let file = ProjectFile::new(root, "a.txt");
        assert_eq!(file.read().unwrap(), "hello");

        let missing = ProjectFile::new(Arc::new(dir.path().to_path_buf()), "b.txt");
        assert!(missing.read().is_err());
    }

    #[test]
    fn entity_serde_roundtrip() {
        let id = EntityId::new("app.Reader$Inner");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"app.Reader$Inner\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
