//! Repository access contract.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::context::FetchContext;
use crate::error::Result;

/// A commit resolved from a revision query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevInfo {
    /// Full commit identifier
    pub id: String,
    /// Commit timestamp
    pub time: DateTime<Utc>,
    /// What the query resolved through: a full ref name or the commit id
    pub name: String,
}

impl RevInfo {
    /// First 12 characters of the commit identifier.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

/// A tag and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    pub commit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Symlink,
    Submodule,
    /// Any other tree entry mode
    Other(u32),
}

impl EntryKind {
    pub fn describe(&self) -> String {
        match self {
            EntryKind::File => "regular file".to_string(),
            EntryKind::Symlink => "symbolic link".to_string(),
            EntryKind::Submodule => "submodule".to_string(),
            EntryKind::Other(mode) => format!("mode {:o}", mode),
        }
    }
}

/// A non-directory entry of a tree, relative to the walked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// `/`-separated path relative to the walk root
    pub path: String,
    pub kind: EntryKind,
    /// Content size in bytes (zero for non-files)
    pub size: u64,
    /// Object identifier used by [`CodeHost::read_blob`]
    pub id: String,
}

/// Read-only view of a repository.
///
/// Implementations observe the [`FetchContext`] they were opened with and
/// fail with `Cancelled` once it fires.
pub trait CodeHost {
    /// Location the host was opened from.
    fn location(&self) -> &str;

    /// All tags that point (possibly through an annotated tag) at commits.
    fn tags(&self) -> Result<Vec<TagRef>>;

    /// Resolve a tag, branch, `HEAD` or hex commit prefix.
    ///
    /// Fails with `RevisionNotFound` or `AmbiguousVersion`.
    fn stat(&self, rev: &str) -> Result<RevInfo>;

    /// Whether `ancestor` is `descendant` or one of its ancestors.
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;

    /// Whether `path` (file or directory) exists at `rev`. The empty path is the root.
    fn has_path(&self, rev: &str, path: &str) -> Result<bool>;

    /// Contents of the regular file at `path`, or `None` if absent.
    fn read_file(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>>;

    /// Every non-directory entry beneath `root`, or `None` if `root` is not a directory.
    fn walk_tree(&self, rev: &str, root: &str) -> Result<Option<Vec<TreeEntry>>>;

    /// Contents of a file entry returned by [`CodeHost::walk_tree`].
    fn read_blob(&self, entry: &TreeEntry) -> Result<Vec<u8>>;
}

/// Opens a [`CodeHost`] for a repository location inside a workspace.
pub trait RepositoryOpener: Send + Sync {
    /// Fails with `RepositoryUnreachable` on transport or auth problems and
    /// with `Cancelled` if `ctx` fires while opening.
    fn open(
        &self,
        ctx: &FetchContext,
        workspace: &Path,
        location: &str,
    ) -> Result<Box<dyn CodeHost>>;
}

/// Join a normalized subdirectory and a relative path.
pub(crate) fn join_path(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        dir.to_string()
    } else {
        format!("{}/{}", dir, rel)
    }
}
