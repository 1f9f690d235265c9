//! Generic fetcher for GOPROXY-protocol upstreams.

use std::io::Write;

use reqwest::StatusCode;
use url::Url;

use super::{FetchResult, InfoRecord, ModuleFetcher};
use crate::archive::ArchiveStream;
use crate::context::FetchContext;
use crate::error::{Error, ErrorKind, Result, ResultExt, WrapOp};
use crate::version::LATEST;

const OP: &str = "ProxyFetcher.fetch";

/// Fetches modules from a module proxy such as `https://proxy.golang.org`.
#[derive(Debug, Clone)]
pub struct ProxyFetcher {
    client: reqwest::Client,
    base: Url,
    spool_threshold: usize,
}

impl ProxyFetcher {
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| anyhow::anyhow!("Invalid proxy URL '{}': {}", base, e))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("vanity/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base,
            spool_threshold: 32 << 20,
        })
    }

    pub fn with_spool_threshold(mut self, threshold: usize) -> Self {
        self.spool_threshold = threshold;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `<base>/<escaped module>/<suffix>`
    fn endpoint(&self, module: &str, suffix: &str) -> Result<String> {
        Ok(format!(
            "{}/{}/{}",
            self.base.as_str().trim_end_matches('/'),
            escape_path(module)?,
            suffix
        ))
    }

    async fn get(&self, ctx: &FetchContext, url: &str, query: &str) -> Result<Vec<u8>> {
        ctx.check(OP)?;
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| upstream(format!("request to {} failed: {}", url, e)))?;
        check_status(response.status(), url, query)?;
        let body = response
            .bytes()
            .await
            .map_err(|e| upstream(format!("failed to read body from {}: {}", url, e)))?;
        ctx.check(OP)?;
        Ok(body.to_vec())
    }
}

impl ModuleFetcher for ProxyFetcher {
    async fn fetch(&self, ctx: &FetchContext, module: &str, version: &str) -> Result<FetchResult> {
        let info_url = if version == LATEST {
            self.endpoint(module, "@latest")?
        } else {
            self.endpoint(module, &format!("@v/{}.info", escape_path(version)?))?
        };
        let info = self.get(ctx, &info_url, version).await?;
        let record = InfoRecord::from_json(&info).wrap(OP)?;

        let escaped = escape_path(&record.version)?;
        let manifest = self
            .get(ctx, &self.endpoint(module, &format!("@v/{}.mod", escaped))?, version)
            .await?;
        let zip = self
            .get(ctx, &self.endpoint(module, &format!("@v/{}.zip", escaped))?, version)
            .await?;

        let mut sink = ArchiveStream::spooled(self.spool_threshold);
        sink.write_all(&zip).op(OP)?;
        let archive = ArchiveStream::from_spooled(sink)?;

        tracing::info!(module, version = %record.version, "Fetched module from proxy");
        Ok(FetchResult {
            info,
            manifest,
            archive,
            version: record.version,
        })
    }
}

fn upstream(detail: String) -> Error {
    Error::new(OP, ErrorKind::Upstream(detail))
}

fn check_status(status: StatusCode, url: &str, query: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(Error::new(
            OP,
            ErrorKind::RevisionNotFound {
                query: query.to_string(),
                detail: format!("{} returned {}", url, status),
            },
        ));
    }
    Err(upstream(format!("{} returned {}", url, status)))
}

/// Case-encode a module path or version for proxy URLs and cache paths:
/// each upper-case letter becomes `!` followed by its lower-case form.
pub fn escape_path(path: &str) -> Result<String> {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '!' {
            return Err(Error::new(
                "escape_path",
                ErrorKind::InvalidPath {
                    path: path.to_string(),
                    reason: "'!' is not allowed".to_string(),
                },
            ));
        }
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    Ok(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_upper_case() {
        assert_eq!(
            escape_path("github.com/Azure/azure-sdk").unwrap(),
            "github.com/!azure/azure-sdk"
        );
        assert_eq!(escape_path("v1.0.0-RC1").unwrap(), "v1.0.0-!r!c1");
        assert!(escape_path("bad!path").is_err());
    }

    #[test]
    fn endpoints_join_base_and_escaped_module() {
        let fetcher = ProxyFetcher::new("https://proxy.example.com/go/").unwrap();
        assert_eq!(
            fetcher.endpoint("example.com/Mod", "@v/v1.0.0.info").unwrap(),
            "https://proxy.example.com/go/example.com/!mod/@v/v1.0.0.info"
        );
    }

    #[test]
    fn missing_versions_are_not_found() {
        let err = check_status(StatusCode::GONE, "u", "v1.0.0").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RevisionNotFound { .. }));
        let err = check_status(StatusCode::BAD_GATEWAY, "u", "v1.0.0").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Upstream(_)));
        assert!(check_status(StatusCode::OK, "u", "v1.0.0").is_ok());
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(ProxyFetcher::new("not a url").is_err());
    }

    #[tokio::test]
    async fn cancelled_fetch_makes_no_request() {
        let fetcher = ProxyFetcher::new("http://127.0.0.1:9").unwrap();
        let ctx = FetchContext::new();
        ctx.cancel();
        let err = fetcher.fetch(&ctx, "example.com/m", "v1.0.0").await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
