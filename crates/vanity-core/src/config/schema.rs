//! Configuration schema for vanity.toml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveLimits;
use crate::prefix::{PrefixTable, RedirectRule};

/// Root configuration structure for vanity.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VanityConfig {
    /// Fetch behaviour shared by all redirects
    #[serde(default)]
    pub fetch: FetchSettings,

    /// Redirect rules, in match order
    #[serde(default)]
    pub redirect: Vec<RedirectRule>,
}

impl VanityConfig {
    /// Build the redirect table. Validates every rule.
    pub fn prefix_table(&self) -> anyhow::Result<PrefixTable> {
        PrefixTable::new(self.redirect.clone())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.prefix_table()?;
        self.fetch.validate()
    }
}

/// `[fetch]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Upstream module proxy for modules without a redirect
    #[serde(default = "default_proxy")]
    pub proxy: String,

    /// Per-fetch deadline in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Parent directory for temporary workspaces (system temp dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,

    /// Cumulative uncompressed archive ceiling in bytes
    #[serde(default = "default_max_archive_size")]
    pub max_archive_size: u64,

    /// Per-file uncompressed ceiling in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Archive bytes kept in memory before spilling to a temp file
    #[serde(default = "default_spool_threshold")]
    pub spool_threshold: usize,
}

fn default_proxy() -> String {
    "https://proxy.golang.org".to_string()
}

fn default_max_archive_size() -> u64 {
    ArchiveLimits::DEFAULT_MAX_TOTAL
}

fn default_max_file_size() -> u64 {
    ArchiveLimits::DEFAULT_MAX_FILE
}

fn default_spool_threshold() -> usize {
    32 << 20
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            proxy: default_proxy(),
            timeout_secs: None,
            workspace_dir: None,
            max_archive_size: default_max_archive_size(),
            max_file_size: default_max_file_size(),
            spool_threshold: default_spool_threshold(),
        }
    }
}

impl FetchSettings {
    pub fn limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_total: self.max_archive_size,
            max_file: self.max_file_size,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.proxy)
            .map_err(|e| anyhow::anyhow!("Invalid proxy URL '{}': {}", self.proxy, e))?;
        if self.max_file_size == 0 || self.max_archive_size == 0 {
            anyhow::bail!("Archive size ceilings must be greater than zero");
        }
        Ok(())
    }
}
