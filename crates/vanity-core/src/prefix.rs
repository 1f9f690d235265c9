//! Redirect rules mapping module path prefixes to repository subdirectories.

use serde::{Deserialize, Serialize};

/// Redirect a module path prefix to a subdirectory of another repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRule {
    /// Literal module path prefix (e.g., "foo.com/go/pkg/test")
    pub prefix: String,
    /// Repository location handed to the repository opener
    pub repository: String,
    /// Subdirectory inside the repository holding the module
    #[serde(default)]
    pub subdir: String,
}

impl RedirectRule {
    pub fn new(
        prefix: impl Into<String>,
        repository: impl Into<String>,
        subdir: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            repository: repository.into(),
            subdir: subdir.into(),
        }
    }

    pub fn matches(&self, module: &str) -> bool {
        module.starts_with(&self.prefix)
    }

    /// Subdirectory with surrounding slashes removed; empty means the root.
    pub fn subdir(&self) -> &str {
        normalize_subdir(&self.subdir)
    }
}

/// Trim leading and trailing `/` from a subdirectory offset.
pub fn normalize_subdir(subdir: &str) -> &str {
    subdir.trim_matches('/')
}

/// Ordered redirect table. First match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    rules: Vec<RedirectRule>,
}

impl PrefixTable {
    /// Build a table, rejecting rules with an empty prefix or repository.
    pub fn new(rules: Vec<RedirectRule>) -> anyhow::Result<Self> {
        for (idx, rule) in rules.iter().enumerate() {
            if rule.prefix.is_empty() {
                anyhow::bail!("Redirect rule #{} has an empty prefix", idx + 1);
            }
            if rule.repository.trim().is_empty() {
                anyhow::bail!(
                    "Redirect rule '{}' has an empty repository location",
                    rule.prefix
                );
            }
        }
        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// First rule, in declaration order, whose prefix is a literal prefix of `module`.
    pub fn find_prefix(&self, module: &str) -> Option<&RedirectRule> {
        self.rules.iter().find(|rule| rule.matches(module))
    }

    pub fn rules(&self) -> &[RedirectRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
