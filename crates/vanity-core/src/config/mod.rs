//! Configuration for the fetcher: the redirect table and fetch limits.
//!
//! Loaded from `vanity.toml`:
//! - Default location: `<config dir>/vanity/vanity.toml`
//! - Explicit location: passed by the front end (e.g. `--config`)

pub mod parser;
pub mod schema;

use std::path::{Path, PathBuf};

pub use parser::{parse_vanity_toml, parse_vanity_toml_str, rules_to_toml, to_toml};
pub use schema::{FetchSettings, VanityConfig};

/// Default configuration file path, if a config directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vanity").join("vanity.toml"))
}

/// Load configuration from `path`, or from the default location.
///
/// An explicit path must exist. A missing default file yields an empty
/// configuration (no redirects, default limits).
pub fn load(path: Option<&Path>) -> anyhow::Result<VanityConfig> {
    match path {
        Some(path) => parse_vanity_toml(path),
        None => match default_config_path() {
            Some(path) if path.exists() => parse_vanity_toml(&path),
            _ => Ok(VanityConfig::default()),
        },
    }
}
