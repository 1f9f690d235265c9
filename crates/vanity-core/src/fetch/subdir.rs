//! Fetcher for modules redirected into a repository subdirectory.

use std::fmt;
use std::sync::Arc;

use super::{FetchResult, InfoRecord, ModuleFetcher};
use crate::archive::{ArchiveBuilder, ArchiveLimits, ArchiveStream};
use crate::config::VanityConfig;
use crate::context::{CancelOnDrop, FetchContext};
use crate::error::{Error, ErrorKind, Result, WrapOp};
use crate::git::{GitOpener, RepositoryOpener};
use crate::manifest::ManifestReader;
use crate::prefix::{PrefixTable, RedirectRule};
use crate::version::RevisionResolver;
use crate::workspace::{TempWorkspaces, WorkspaceProvider};

const OP: &str = "SubdirFetcher.fetch";

const DEFAULT_SPOOL_THRESHOLD: usize = 32 << 20;

/// Serves module paths covered by a [`PrefixTable`] from the configured
/// repository subdirectory, and hands every other path to `fallback`.
pub struct SubdirFetcher<F> {
    table: Arc<PrefixTable>,
    fallback: F,
    opener: Arc<dyn RepositoryOpener>,
    workspaces: Arc<dyn WorkspaceProvider>,
    limits: ArchiveLimits,
    spool_threshold: usize,
}

impl<F: ModuleFetcher> SubdirFetcher<F> {
    /// Fetcher using git and workspaces under the system temporary directory.
    pub fn new(table: PrefixTable, fallback: F) -> Self {
        Self {
            table: Arc::new(table),
            fallback,
            opener: Arc::new(GitOpener),
            workspaces: Arc::new(TempWorkspaces::new()),
            limits: ArchiveLimits::default(),
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }

    /// Fetcher configured from the `[fetch]` and `[[redirect]]` sections.
    pub fn from_config(config: &VanityConfig, fallback: F) -> anyhow::Result<Self> {
        config.fetch.validate()?;
        let workspaces = match &config.fetch.workspace_dir {
            Some(dir) => TempWorkspaces::in_dir(dir),
            None => TempWorkspaces::new(),
        };
        Ok(Self::new(config.prefix_table()?, fallback)
            .with_workspaces(Arc::new(workspaces))
            .with_limits(config.fetch.limits())
            .with_spool_threshold(config.fetch.spool_threshold))
    }

    pub fn with_opener(mut self, opener: Arc<dyn RepositoryOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_workspaces(mut self, workspaces: Arc<dyn WorkspaceProvider>) -> Self {
        self.workspaces = workspaces;
        self
    }

    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_spool_threshold(mut self, threshold: usize) -> Self {
        self.spool_threshold = threshold;
        self
    }

    pub fn table(&self) -> &PrefixTable {
        &self.table
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

impl<F> fmt::Debug for SubdirFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubdirFetcher")
            .field("rules", &self.table.len())
            .field("limits", &self.limits)
            .field("spool_threshold", &self.spool_threshold)
            .finish_non_exhaustive()
    }
}

impl<F: ModuleFetcher> ModuleFetcher for SubdirFetcher<F> {
    async fn fetch(&self, ctx: &FetchContext, module: &str, version: &str) -> Result<FetchResult> {
        let Some(rule) = self.table.find_prefix(module) else {
            tracing::debug!(module, version, "No redirect rule, delegating");
            return self.fallback.fetch(ctx, module, version).await;
        };
        tracing::info!(
            module,
            version,
            prefix = %rule.prefix,
            repository = %rule.repository,
            subdir = rule.subdir(),
            "Fetching redirected module"
        );

        // Abandoning this future cancels the pipeline on the blocking pool.
        let job_ctx = ctx.child();
        let _guard = CancelOnDrop(job_ctx.clone());
        let job = RedirectJob {
            ctx: job_ctx,
            rule: rule.clone(),
            module: module.to_string(),
            version: version.to_string(),
            opener: self.opener.clone(),
            workspaces: self.workspaces.clone(),
            limits: self.limits,
            spool_threshold: self.spool_threshold,
        };

        match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(result) => result.wrap(OP),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(Error::new(OP, ErrorKind::Cancelled)),
        }
    }
}

/// One redirected fetch, run to completion on a blocking thread.
struct RedirectJob {
    ctx: FetchContext,
    rule: RedirectRule,
    module: String,
    version: String,
    opener: Arc<dyn RepositoryOpener>,
    workspaces: Arc<dyn WorkspaceProvider>,
    limits: ArchiveLimits,
    spool_threshold: usize,
}

impl RedirectJob {
    fn run(self) -> Result<FetchResult> {
        let result = self.pipeline();
        match result {
            // Failures caused by cancellation are reported as such.
            Err(err) if !err.is_cancelled() && self.ctx.is_cancelled() => {
                tracing::debug!(error = %err, "Fetch failed after cancellation");
                Err(Error::new(OP, ErrorKind::Cancelled))
            }
            other => other,
        }
    }

    fn pipeline(&self) -> Result<FetchResult> {
        let ctx = &self.ctx;
        ctx.check(OP)?;
        let subdir = self.rule.subdir();

        let workspace = self.workspaces.acquire()?;
        let host = self
            .opener
            .open(ctx, workspace.path(), &self.rule.repository)?;

        let resolved = RevisionResolver::new(host.as_ref(), &self.module, subdir)
            .resolve(&self.version)?;
        let manifest = ManifestReader::read(host.as_ref(), subdir, &resolved.revision)?;
        let sink = ArchiveBuilder::new(host.as_ref(), ctx)
            .with_limits(self.limits)
            .build(
                &self.module,
                &resolved.version,
                subdir,
                &resolved.revision,
                ArchiveStream::spooled(self.spool_threshold),
            )?;
        let archive = ArchiveStream::from_spooled(sink)?;
        let info = InfoRecord::from_git(&resolved, &self.rule.repository, subdir).to_json()?;

        tracing::info!(
            module = %self.module,
            version = %resolved.version,
            revision = %resolved.revision.id,
            archive_bytes = archive.len(),
            "Fetched redirected module"
        );
        Ok(FetchResult {
            info,
            manifest,
            archive,
            version: resolved.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{MemoryFile, MemoryHost, MemoryOpener};
    use chrono::DateTime;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFallback(AtomicUsize);

    impl ModuleFetcher for CountingFallback {
        async fn fetch(
            &self,
            _ctx: &FetchContext,
            _module: &str,
            version: &str,
        ) -> Result<FetchResult> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(FetchResult {
                info: b"{}".to_vec(),
                manifest: b"module fallback\n".to_vec(),
                archive: ArchiveStream::from_bytes(b"zip")?,
                version: version.to_string(),
            })
        }
    }

    fn fetcher() -> SubdirFetcher<CountingFallback> {
        let mut host = MemoryHost::new("mem");
        host.commit(
            "abcdef0123456789abcdef0123456789abcdef01",
            DateTime::from_timestamp(1_554_120_000, 0).unwrap(),
            &[(
                "src/golang/go.mod",
                MemoryFile::Regular(b"module foo.com/go/pkg/test/sub\n".to_vec()),
            )],
        )
        .tag("src/golang/v1.2.0", "abcdef0123456789abcdef0123456789abcdef01");
        let table = PrefixTable::new(vec![RedirectRule::new(
            "foo.com/go/pkg/test",
            "mem://repo",
            "/src/golang",
        )])
        .unwrap();
        SubdirFetcher::new(table, CountingFallback(AtomicUsize::new(0)))
            .with_opener(Arc::new(MemoryOpener::new(host)))
    }

    #[tokio::test]
    async fn redirected_fetch_produces_all_artifacts() {
        let fetcher = fetcher();
        let mut result = fetcher
            .fetch(&FetchContext::new(), "foo.com/go/pkg/test/sub", "v1.2.0")
            .await
            .unwrap();
        assert_eq!(result.version, "v1.2.0");
        assert_eq!(result.manifest, b"module foo.com/go/pkg/test/sub\n");

        let info = InfoRecord::from_json(&result.info).unwrap();
        assert_eq!(info.version, "v1.2.0");
        assert_eq!(info.origin.unwrap().url, "mem://repo");

        let mut zip = Vec::new();
        result.archive.read_to_end(&mut zip).unwrap();
        assert!(zip.starts_with(b"PK"));
        assert_eq!(fetcher.fallback().0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmatched_module_goes_to_fallback() {
        let fetcher = fetcher();
        let result = fetcher
            .fetch(&FetchContext::new(), "github.com/other/mod", "v0.1.0")
            .await
            .unwrap();
        assert_eq!(result.manifest, b"module fallback\n");
        assert_eq!(fetcher.fallback().0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolver_errors_carry_fetch_op() {
        let err = fetcher()
            .fetch(&FetchContext::new(), "foo.com/go/pkg/test/sub", "v9.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RevisionNotFound { .. }));
        assert_eq!(err.ops().last(), Some(&OP));
        assert!(err.to_string().starts_with("SubdirFetcher.fetch: resolver.resolve: "));
    }

    #[tokio::test]
    async fn cancelled_context_fails_fast() {
        let ctx = FetchContext::new();
        ctx.cancel();
        let err = fetcher()
            .fetch(&ctx, "foo.com/go/pkg/test/sub", "v1.2.0")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
