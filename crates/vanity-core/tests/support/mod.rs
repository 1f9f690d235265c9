#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::{IndexAddOption, Repository, Signature, Time};
use tempfile::TempDir;

use vanity_core::workspace::{ReleaseHook, TempWorkspaces};

/// A scratch git repository with controlled commit times.
pub struct Origin {
    pub temp: TempDir,
    pub repo: Repository,
}

impl Origin {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path().join("origin")).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        Self { temp, repo }
    }

    pub fn path(&self) -> PathBuf {
        self.temp.path().join("origin")
    }

    pub fn location(&self) -> String {
        self.path().to_str().unwrap().to_string()
    }

    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    pub fn commit(&self, message: &str, secs: i64) -> String {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::new("Test User", "test@example.com", &Time::new(secs, 0)).unwrap();

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .map(|oid| self.repo.find_commit(oid).unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }

    pub fn tag(&self, name: &str, commit: &str) {
        let object = self.repo.revparse_single(commit).unwrap();
        self.repo.tag_lightweight(name, &object, false).unwrap();
    }
}

/// Workspaces under a private root that record every released path.
pub struct RecordingWorkspaces {
    pub root: TempDir,
    pub released: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingWorkspaces {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            released: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn provider(&self) -> TempWorkspaces {
        let sink = self.released.clone();
        let hook: ReleaseHook = Arc::new(move |path: &Path| sink.lock().unwrap().push(path.into()));
        TempWorkspaces::in_dir(self.root.path()).with_release_hook(hook)
    }

    pub fn released(&self) -> Vec<PathBuf> {
        self.released.lock().unwrap().clone()
    }

    /// Nothing is left behind under the workspace root.
    pub fn assert_all_released(&self) {
        let leftover: Vec<_> = fs::read_dir(self.root.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(leftover.is_empty(), "workspaces left behind: {leftover:?}");
        for path in self.released() {
            assert!(!path.exists(), "{} still exists", path.display());
        }
    }
}

/// Entry names of a zip archive, in stored order.
pub fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
