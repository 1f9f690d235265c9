//! In-memory repository host.
//!
//! Commits are plain file maps with parents and timestamps. Used to exercise
//! the resolver and archive builder without a real repository, including
//! trees git itself would refuse to create.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::host::{CodeHost, EntryKind, RepositoryOpener, RevInfo, TagRef, TreeEntry};
use crate::context::FetchContext;
use crate::error::{Error, ErrorKind, Result};

/// Invoked before each blob read; lets tests interrupt an archive walk.
pub type BlobHook = Arc<dyn Fn(&TreeEntry) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFile {
    Regular(Vec<u8>),
    Symlink(String),
    Submodule,
}

#[derive(Debug, Clone)]
pub struct MemoryCommit {
    pub id: String,
    pub time: DateTime<Utc>,
    pub parents: Vec<String>,
    pub files: BTreeMap<String, MemoryFile>,
}

/// Repository state held in memory.
#[derive(Clone, Default)]
pub struct MemoryHost {
    location: String,
    commits: Vec<MemoryCommit>,
    tags: Vec<TagRef>,
    branches: BTreeMap<String, String>,
    head: Option<String>,
    ctx: FetchContext,
    on_read_blob: Option<BlobHook>,
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("location", &self.location)
            .field("commits", &self.commits.len())
            .field("tags", &self.tags)
            .field("branches", &self.branches)
            .finish_non_exhaustive()
    }
}

impl MemoryHost {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Append a commit whose parent is the current head (if any), then move
    /// the head and the `main` branch to it.
    pub fn commit(
        &mut self,
        id: &str,
        time: DateTime<Utc>,
        files: &[(&str, MemoryFile)],
    ) -> &mut Self {
        let parents = self.head.iter().cloned().collect();
        self.commit_with_parents(id, time, parents, files);
        self.head = Some(id.to_string());
        self.branches.insert("main".to_string(), id.to_string());
        self
    }

    /// Append a commit with explicit parents without moving any ref.
    pub fn commit_with_parents(
        &mut self,
        id: &str,
        time: DateTime<Utc>,
        parents: Vec<String>,
        files: &[(&str, MemoryFile)],
    ) -> &mut Self {
        self.commits.push(MemoryCommit {
            id: id.to_string(),
            time,
            parents,
            files: files
                .iter()
                .map(|(path, file)| (path.to_string(), file.clone()))
                .collect(),
        });
        self
    }

    pub fn tag(&mut self, name: &str, commit: &str) -> &mut Self {
        self.tags.push(TagRef {
            name: name.to_string(),
            commit: commit.to_string(),
        });
        self.tags.sort_by(|a, b| a.name.cmp(&b.name));
        self
    }

    pub fn branch(&mut self, name: &str, commit: &str) -> &mut Self {
        self.branches.insert(name.to_string(), commit.to_string());
        self
    }

    pub fn with_context(mut self, ctx: &FetchContext) -> Self {
        self.ctx = ctx.clone();
        self
    }

    pub fn on_read_blob(mut self, hook: BlobHook) -> Self {
        self.on_read_blob = Some(hook);
        self
    }

    fn find(&self, id: &str, op: &'static str) -> Result<&MemoryCommit> {
        self.commits.iter().find(|c| c.id == id).ok_or_else(|| {
            Error::new(
                op,
                ErrorKind::RevisionNotFound {
                    query: id.to_string(),
                    detail: "unknown commit".to_string(),
                },
            )
        })
    }

    fn info(&self, id: &str, name: String, op: &'static str) -> Result<RevInfo> {
        let commit = self.find(id, op)?;
        Ok(RevInfo {
            id: commit.id.clone(),
            time: commit.time,
            name,
        })
    }
}

fn blob_id(commit: &str, path: &str) -> String {
    format!("{}:{}", commit, path)
}

impl CodeHost for MemoryHost {
    fn location(&self) -> &str {
        &self.location
    }

    fn tags(&self) -> Result<Vec<TagRef>> {
        self.ctx.check("memory.tags")?;
        Ok(self.tags.clone())
    }

    fn stat(&self, rev: &str) -> Result<RevInfo> {
        const OP: &str = "memory.stat";
        self.ctx.check(OP)?;
        if let Some(tag) = self.tags.iter().find(|t| t.name == rev) {
            return self.info(&tag.commit, format!("refs/tags/{}", rev), OP);
        }
        if let Some(id) = self.branches.get(rev) {
            return self.info(id, format!("refs/heads/{}", rev), OP);
        }
        if rev == "HEAD"
            && let Some(id) = &self.head
        {
            return self.info(id, "refs/heads/main".to_string(), OP);
        }
        let matches: Vec<&MemoryCommit> = self
            .commits
            .iter()
            .filter(|c| rev.len() >= 4 && c.id.starts_with(rev))
            .collect();
        match matches.as_slice() {
            [one] => self.info(&one.id, one.id.clone(), OP),
            [] => Err(Error::new(
                OP,
                ErrorKind::RevisionNotFound {
                    query: rev.to_string(),
                    detail: "no matching tag, branch or commit".to_string(),
                },
            )),
            many => Err(Error::new(
                OP,
                ErrorKind::AmbiguousVersion {
                    query: rev.to_string(),
                    candidates: many.iter().map(|c| c.id.clone()).collect(),
                },
            )),
        }
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut stack = vec![descendant.to_string()];
        while let Some(id) = stack.pop() {
            if id == ancestor {
                return Ok(true);
            }
            if seen.insert(id.clone()) {
                stack.extend(self.find(&id, "memory.is_ancestor")?.parents.iter().cloned());
            }
        }
        Ok(false)
    }

    fn has_path(&self, rev: &str, path: &str) -> Result<bool> {
        let commit = self.find(rev, "memory.has_path")?;
        if path.is_empty() {
            return Ok(true);
        }
        let dir = format!("{}/", path);
        Ok(commit
            .files
            .keys()
            .any(|p| p == path || p.starts_with(&dir)))
    }

    fn read_file(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>> {
        const OP: &str = "memory.read_file";
        self.ctx.check(OP)?;
        match self.find(rev, OP)?.files.get(path) {
            None => Ok(None),
            Some(MemoryFile::Regular(data)) => Ok(Some(data.clone())),
            Some(other) => Err(Error::new(
                OP,
                ErrorKind::UnsupportedFileType {
                    path: path.to_string(),
                    file_type: kind_of(other).describe(),
                },
            )),
        }
    }

    fn walk_tree(&self, rev: &str, root: &str) -> Result<Option<Vec<TreeEntry>>> {
        const OP: &str = "memory.walk_tree";
        self.ctx.check(OP)?;
        let commit = self.find(rev, OP)?;
        let prefix = if root.is_empty() {
            String::new()
        } else {
            format!("{}/", root)
        };
        let entries: Vec<TreeEntry> = commit
            .files
            .iter()
            .filter_map(|(path, file)| {
                let rel = path.strip_prefix(&prefix)?;
                Some(TreeEntry {
                    path: rel.to_string(),
                    kind: kind_of(file),
                    size: match file {
                        MemoryFile::Regular(data) => data.len() as u64,
                        _ => 0,
                    },
                    id: blob_id(&commit.id, path),
                })
            })
            .collect();
        if entries.is_empty() && !root.is_empty() {
            return Ok(None);
        }
        Ok(Some(entries))
    }

    fn read_blob(&self, entry: &TreeEntry) -> Result<Vec<u8>> {
        const OP: &str = "memory.read_blob";
        if let Some(hook) = &self.on_read_blob {
            hook(entry);
        }
        self.ctx.check(OP)?;
        let (commit, path) = entry.id.split_once(':').unwrap_or((&entry.id, ""));
        match self.find(commit, OP)?.files.get(path) {
            Some(MemoryFile::Regular(data)) => Ok(data.clone()),
            _ => Err(Error::new(
                OP,
                ErrorKind::UnsupportedFileType {
                    path: entry.path.clone(),
                    file_type: entry.kind.describe(),
                },
            )),
        }
    }
}

fn kind_of(file: &MemoryFile) -> EntryKind {
    match file {
        MemoryFile::Regular(_) => EntryKind::File,
        MemoryFile::Symlink(_) => EntryKind::Symlink,
        MemoryFile::Submodule => EntryKind::Submodule,
    }
}

/// Opens the same shared [`MemoryHost`] for every location.
#[derive(Debug, Clone)]
pub struct MemoryOpener {
    host: MemoryHost,
}

impl MemoryOpener {
    pub fn new(host: MemoryHost) -> Self {
        Self { host }
    }
}

impl RepositoryOpener for MemoryOpener {
    fn open(
        &self,
        ctx: &FetchContext,
        _workspace: &Path,
        location: &str,
    ) -> Result<Box<dyn CodeHost>> {
        ctx.check("memory.open")?;
        let mut host = self.host.clone().with_context(ctx);
        host.location = location.to_string();
        Ok(Box::new(host))
    }
}
