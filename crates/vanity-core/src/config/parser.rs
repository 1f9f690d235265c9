//! TOML parser with helpful error messages

use super::schema::VanityConfig;
use crate::prefix::RedirectRule;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Parse vanity.toml with detailed error messages
pub fn parse_vanity_toml(path: &Path) -> Result<VanityConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_vanity_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse vanity.toml content from string
pub fn parse_vanity_toml_str(content: &str) -> Result<VanityConfig> {
    let config: VanityConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Enhance TOML parsing errors with the offending line
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.to_string();

    let line_hint = error.span().map(|span| {
        content[..span.start.min(content.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    });

    if let Some(line_num) = line_hint {
        let context = get_line_context(content, line_num);
        anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            context,
            error_msg
        )
    } else {
        anyhow::anyhow!("TOML parsing error: {}", error_msg)
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 2).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &VanityConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}

/// Serialize rules as `[[redirect]]` tables, ready to paste into `vanity.toml`
pub fn rules_to_toml(rules: &[RedirectRule]) -> Result<String> {
    #[derive(Serialize)]
    struct Fragment<'a> {
        redirect: &'a [RedirectRule],
    }
    toml::to_string_pretty(&Fragment { redirect: rules })
        .context("Failed to serialize redirect rules to TOML")
}
