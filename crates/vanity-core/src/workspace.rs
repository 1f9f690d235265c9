//! Scoped temporary workspaces for repository clones.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::error::{Error, ErrorKind, Result};

/// Called with the workspace path after its directory has been removed.
pub type ReleaseHook = Arc<dyn Fn(&Path) + Send + Sync>;

/// Hands out one private directory per fetch.
pub trait WorkspaceProvider: Send + Sync {
    fn acquire(&self) -> Result<Workspace>;
}

/// A temporary directory removed when dropped, on every exit path.
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    on_release: Option<ReleaseHook>,
}

impl Workspace {
    pub fn new(dir: TempDir, on_release: Option<ReleaseHook>) -> Self {
        let path = dir.path().to_path_buf();
        Self {
            dir: Some(dir),
            path,
            on_release,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take()
            && let Err(err) = dir.close()
        {
            tracing::warn!(path = %self.path.display(), error = %err, "Failed to remove workspace");
        }
        if let Some(hook) = &self.on_release {
            hook(&self.path);
        }
    }
}

/// Workspaces created with `tempfile` under a root directory.
#[derive(Clone, Default)]
pub struct TempWorkspaces {
    root: Option<PathBuf>,
    on_release: Option<ReleaseHook>,
}

impl TempWorkspaces {
    /// Workspaces under the system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Workspaces under `root` instead of the system temporary directory.
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            on_release: None,
        }
    }

    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.on_release = Some(hook);
        self
    }
}

impl fmt::Debug for TempWorkspaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempWorkspaces")
            .field("root", &self.root)
            .field("on_release", &self.on_release.is_some())
            .finish()
    }
}

impl WorkspaceProvider for TempWorkspaces {
    fn acquire(&self) -> Result<Workspace> {
        let root = self.root.clone().unwrap_or_else(std::env::temp_dir);
        let dir = std::fs::create_dir_all(&root)
            .and_then(|_| tempfile::Builder::new().prefix("vanity").tempdir_in(&root))
            .map_err(|source| {
                Error::new(
                    "workspace.acquire",
                    ErrorKind::WorkspaceUnavailable { root, source },
                )
            })?;
        Ok(Workspace::new(dir, self.on_release.clone()))
    }
}
