//! Vanity Core Library
//!
//! Serves Go modules whose import paths are redirected into a subdirectory
//! of another repository: resolves the requested version, reads the
//! module's `go.mod` and builds the module zip rooted at the subdirectory.

pub mod archive;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod git;
pub mod manifest;
pub mod prefix;
pub mod version;
pub mod workspace;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{FetchSettings, VanityConfig};
    pub use crate::prefix::{PrefixTable, RedirectRule};

    // Fetching
    pub use crate::context::FetchContext;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::fetch::{FetchResult, InfoRecord, ModuleFetcher, ProxyFetcher, SubdirFetcher};

    // Pipeline
    pub use crate::archive::{ArchiveBuilder, ArchiveLimits, ArchiveStream};
    pub use crate::git::{CodeHost, GitOpener, RepositoryOpener};
    pub use crate::manifest::ManifestReader;
    pub use crate::version::{CanonicalVersion, RevisionResolver};
    pub use crate::workspace::{TempWorkspaces, Workspace, WorkspaceProvider};
}
