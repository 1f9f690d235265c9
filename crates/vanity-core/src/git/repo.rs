//! libgit2-backed repository access.

use std::path::Path;

use chrono::{DateTime, Utc};
use git2::{
    AutotagOption, CredentialType, Cred, Direction, ErrorCode, FetchOptions, ObjectType, Oid,
    RemoteCallbacks, Repository, Tree, TreeWalkMode, TreeWalkResult,
};

use super::host::{CodeHost, EntryKind, RepositoryOpener, RevInfo, TagRef, TreeEntry};
use crate::context::FetchContext;
use crate::error::{Error, ErrorKind, Result, ResultExt};

const FETCH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];
const MAX_AUTH_ATTEMPTS: usize = 3;

/// Opens repositories by fetching every branch and tag into a bare clone
/// inside the workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitOpener;

impl RepositoryOpener for GitOpener {
    fn open(
        &self,
        ctx: &FetchContext,
        workspace: &Path,
        location: &str,
    ) -> Result<Box<dyn CodeHost>> {
        Ok(Box::new(GitRepo::fetch(ctx, workspace, location)?))
    }
}

/// A bare clone with every remote branch and tag.
pub struct GitRepo {
    repo: Repository,
    location: String,
    ctx: FetchContext,
}

impl GitRepo {
    /// Fetch `location` into `<workspace>/repo.git`.
    pub fn fetch(ctx: &FetchContext, workspace: &Path, location: &str) -> Result<Self> {
        const OP: &str = "git.open";
        ctx.check(OP)?;

        let repo = Repository::init_bare(workspace.join("repo.git")).op(OP)?;
        let head = {
            let mut remote = repo
                .remote_anonymous(location)
                .map_err(|e| unreachable(ctx, location, e))?;

            let head = {
                let conn = remote
                    .connect_auth(Direction::Fetch, Some(callbacks(ctx)), None)
                    .map_err(|e| unreachable(ctx, location, e))?;
                conn.default_branch()
                    .ok()
                    .and_then(|buf| buf.as_str().map(str::to_owned))
            };

            let mut opts = FetchOptions::new();
            opts.remote_callbacks(callbacks(ctx));
            opts.download_tags(AutotagOption::All);
            remote
                .fetch(&FETCH_REFSPECS[..], Some(&mut opts), None)
                .map_err(|e| unreachable(ctx, location, e))?;
            head
        };

        if let Some(head) = &head {
            repo.set_head(head).op(OP)?;
        }
        tracing::debug!(location, head = head.as_deref(), "Fetched repository");

        Ok(Self {
            repo,
            location: location.to_string(),
            ctx: ctx.clone(),
        })
    }

    fn tree_at(&self, rev: &str, op: &'static str) -> Result<Tree<'_>> {
        let oid = Oid::from_str(rev).op(op)?;
        let commit = self.repo.find_commit(oid).op(op)?;
        commit.tree().op(op)
    }

    fn subtree<'r>(
        &'r self,
        tree: Tree<'r>,
        root: &str,
        op: &'static str,
    ) -> Result<Option<Tree<'r>>> {
        if root.is_empty() {
            return Ok(Some(tree));
        }
        let entry = match tree.get_path(Path::new(root)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(Error::new(op, e.into())),
        };
        if entry.kind() != Some(ObjectType::Tree) {
            return Ok(None);
        }
        let object = entry.to_object(&self.repo).op(op)?;
        Ok(object.into_tree().ok())
    }

    /// Object ids starting with `prefix`, listed in ambiguity errors.
    fn prefix_candidates(&self, prefix: &str, op: &'static str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        let odb = self.repo.odb().op(op)?;
        odb.foreach(|oid| {
            let id = oid.to_string();
            if id.starts_with(prefix) {
                found.push(id);
            }
            true
        })
        .op(op)?;
        found.sort();
        Ok(found)
    }
}

impl CodeHost for GitRepo {
    fn location(&self) -> &str {
        &self.location
    }

    fn tags(&self) -> Result<Vec<TagRef>> {
        const OP: &str = "git.tags";
        self.ctx.check(OP)?;

        let names = self.repo.tag_names(None).op(OP)?;
        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            let reference = self
                .repo
                .find_reference(&format!("refs/tags/{}", name))
                .op(OP)?;
            // Tags on trees or blobs cannot name a module version.
            if let Ok(commit) = reference.peel_to_commit() {
                tags.push(TagRef {
                    name: name.to_string(),
                    commit: commit.id().to_string(),
                });
            }
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    fn stat(&self, rev: &str) -> Result<RevInfo> {
        const OP: &str = "git.stat";
        self.ctx.check(OP)?;

        for name in [format!("refs/tags/{}", rev), format!("refs/heads/{}", rev)] {
            if let Ok(reference) = self.repo.find_reference(&name) {
                let commit = reference.peel_to_commit().op(OP)?;
                return Ok(rev_info(&commit, name));
            }
        }

        if rev == "HEAD" {
            let commit = self
                .repo
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(|e| not_found(OP, rev, e.message()))?;
            let name = self
                .repo
                .head()
                .ok()
                .and_then(|head| head.name().map(str::to_owned))
                .unwrap_or_else(|| "HEAD".to_string());
            return Ok(rev_info(&commit, name));
        }

        if !is_commit_prefix(rev) {
            return Err(not_found(OP, rev, "no matching tag, branch or commit"));
        }
        match self.repo.revparse_single(rev) {
            Ok(object) => match object.peel_to_commit() {
                Ok(commit) => {
                    let id = commit.id().to_string();
                    Ok(rev_info(&commit, id))
                }
                Err(_) => Err(not_found(OP, rev, "object is not a commit")),
            },
            Err(e) if e.code() == ErrorCode::Ambiguous => Err(Error::new(
                OP,
                ErrorKind::AmbiguousVersion {
                    query: rev.to_string(),
                    candidates: self.prefix_candidates(rev, OP)?,
                },
            )),
            Err(e) => Err(not_found(OP, rev, e.message())),
        }
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        const OP: &str = "git.is_ancestor";
        if ancestor == descendant {
            return Ok(true);
        }
        let ancestor = Oid::from_str(ancestor).op(OP)?;
        let descendant = Oid::from_str(descendant).op(OP)?;
        self.repo.graph_descendant_of(descendant, ancestor).op(OP)
    }

    fn has_path(&self, rev: &str, path: &str) -> Result<bool> {
        const OP: &str = "git.has_path";
        self.ctx.check(OP)?;
        let tree = self.tree_at(rev, OP)?;
        if path.is_empty() {
            return Ok(true);
        }
        match tree.get_path(Path::new(path)) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(Error::new(OP, e.into())),
        }
    }

    fn read_file(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>> {
        const OP: &str = "git.read_file";
        self.ctx.check(OP)?;
        let tree = self.tree_at(rev, OP)?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(Error::new(OP, e.into())),
        };
        match entry_kind(entry.kind(), entry.filemode()) {
            Some(EntryKind::File) => {
                let blob = self.repo.find_blob(entry.id()).op(OP)?;
                Ok(Some(blob.content().to_vec()))
            }
            None => Ok(None),
            Some(other) => Err(Error::new(
                OP,
                ErrorKind::UnsupportedFileType {
                    path: path.to_string(),
                    file_type: other.describe(),
                },
            )),
        }
    }

    fn walk_tree(&self, rev: &str, root: &str) -> Result<Option<Vec<TreeEntry>>> {
        const OP: &str = "git.walk_tree";
        self.ctx.check(OP)?;
        let tree = self.tree_at(rev, OP)?;
        let Some(tree) = self.subtree(tree, root, OP)? else {
            return Ok(None);
        };
        let odb = self.repo.odb().op(OP)?;

        let mut entries = Vec::new();
        let mut failure: Option<Error> = None;
        let walked = tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if self.ctx.is_cancelled() {
                failure = Some(Error::new(OP, ErrorKind::Cancelled));
                return TreeWalkResult::Abort;
            }
            let Some(name) = entry.name() else {
                failure = Some(Error::new(
                    OP,
                    ErrorKind::InvalidPath {
                        path: format!("{}{}", dir, String::from_utf8_lossy(entry.name_bytes())),
                        reason: "name is not valid UTF-8".to_string(),
                    },
                ));
                return TreeWalkResult::Abort;
            };
            let Some(kind) = entry_kind(entry.kind(), entry.filemode()) else {
                // Directories are descended into, not listed.
                return TreeWalkResult::Ok;
            };
            let size = if kind == EntryKind::File {
                match odb.read_header(entry.id()) {
                    Ok((size, _)) => size as u64,
                    Err(e) => {
                        failure = Some(Error::new(OP, e.into()));
                        return TreeWalkResult::Abort;
                    }
                }
            } else {
                0
            };
            entries.push(TreeEntry {
                path: format!("{}{}", dir, name),
                kind,
                size,
                id: entry.id().to_string(),
            });
            TreeWalkResult::Ok
        });

        if let Some(failure) = failure {
            return Err(failure);
        }
        walked.op(OP)?;
        Ok(Some(entries))
    }

    fn read_blob(&self, entry: &TreeEntry) -> Result<Vec<u8>> {
        const OP: &str = "git.read_blob";
        self.ctx.check(OP)?;
        let oid = Oid::from_str(&entry.id).op(OP)?;
        let blob = self.repo.find_blob(oid).op(OP)?;
        Ok(blob.content().to_vec())
    }
}

/// Classify a tree entry; `None` for directories.
fn entry_kind(object: Option<ObjectType>, filemode: i32) -> Option<EntryKind> {
    if object == Some(ObjectType::Tree) {
        return None;
    }
    Some(match filemode {
        0o100644 | 0o100755 | 0o100664 => EntryKind::File,
        0o120000 => EntryKind::Symlink,
        0o160000 => EntryKind::Submodule,
        other => EntryKind::Other(other as u32),
    })
}

fn rev_info(commit: &git2::Commit<'_>, name: String) -> RevInfo {
    RevInfo {
        id: commit.id().to_string(),
        time: DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0).unwrap_or_default(),
        name,
    }
}

fn is_commit_prefix(rev: &str) -> bool {
    (4..=40).contains(&rev.len()) && rev.bytes().all(|b| b.is_ascii_hexdigit())
}

fn not_found(op: &'static str, rev: &str, detail: &str) -> Error {
    Error::new(
        op,
        ErrorKind::RevisionNotFound {
            query: rev.to_string(),
            detail: detail.to_string(),
        },
    )
}

fn unreachable(ctx: &FetchContext, location: &str, err: git2::Error) -> Error {
    if ctx.is_cancelled() {
        return Error::new("git.open", ErrorKind::Cancelled);
    }
    Error::new(
        "git.open",
        ErrorKind::RepositoryUnreachable {
            location: location.to_string(),
            detail: err.message().to_string(),
        },
    )
}

fn callbacks(ctx: &FetchContext) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();

    let transfer_ctx = ctx.clone();
    callbacks.transfer_progress(move |_| !transfer_ctx.is_cancelled());
    let sideband_ctx = ctx.clone();
    callbacks.sideband_progress(move |_| !sideband_ctx.is_cancelled());

    let mut attempts = 0;
    callbacks.credentials(move |_url, username, allowed| {
        attempts += 1;
        if attempts > MAX_AUTH_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }
        Err(git2::Error::from_str("no supported credential type"))
    });

    callbacks
}
