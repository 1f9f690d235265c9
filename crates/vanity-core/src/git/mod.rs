//! Read-only repository access.
//!
//! This module provides the interface the resolver and archive builder work
//! against:
//! - [`CodeHost`]: tags, revision lookup, ancestry and tree content
//! - [`RepositoryOpener`]: acquires a host for a repository location
//! - [`GitOpener`]: the libgit2 implementation (bare fetch into a workspace)
//! - [`MemoryHost`]: an in-memory host for tests and tooling

mod host;
mod memory;
mod repo;

pub use host::{CodeHost, EntryKind, RepositoryOpener, RevInfo, TagRef, TreeEntry};
pub(crate) use host::join_path;
pub use memory::{MemoryCommit, MemoryFile, MemoryHost, MemoryOpener};
pub use repo::{GitOpener, GitRepo};
