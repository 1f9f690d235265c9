//! Module fetchers
//!
//! Every fetcher implements [`ModuleFetcher`], so callers can use the
//! redirecting [`SubdirFetcher`] and the upstream [`ProxyFetcher`]
//! interchangeably. `SubdirFetcher` delegates to another fetcher for module
//! paths no redirect rule covers.

mod info;
mod proxy;
mod subdir;

use std::future::Future;

pub use info::{InfoRecord, Origin};
pub use proxy::{ProxyFetcher, escape_path};
pub use subdir::SubdirFetcher;

use crate::archive::ArchiveStream;
use crate::context::FetchContext;
use crate::error::Result;

/// Everything a module proxy serves for one module version.
#[derive(Debug)]
pub struct FetchResult {
    /// `.info` JSON document
    pub info: Vec<u8>,
    /// `go.mod` contents, verbatim
    pub manifest: Vec<u8>,
    /// Module zip, positioned at the start
    pub archive: ArchiveStream,
    /// Canonical version the request resolved to
    pub version: String,
}

/// Fetch a module version as info, manifest and archive.
pub trait ModuleFetcher: Send + Sync {
    /// Fails without a partial result. Observes `ctx` cancellation.
    fn fetch(
        &self,
        ctx: &FetchContext,
        module: &str,
        version: &str,
    ) -> impl Future<Output = Result<FetchResult>> + Send;
}
