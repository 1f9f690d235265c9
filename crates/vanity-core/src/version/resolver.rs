//! Map a requested version onto a commit and its canonical module version.

use std::collections::BTreeSet;

use semver::Version;

use super::pseudo::{
    REV_PREFIX_LEN, format_timestamp, is_pseudo_version, major_matches, parse_canonical,
    parse_pseudo, path_major, pseudo_version,
};
use crate::error::{Error, ErrorKind, Result, WrapOp};
use crate::git::{CodeHost, RevInfo};

const OP: &str = "resolver.resolve";

/// Meta-query for the newest available version.
pub const LATEST: &str = "latest";

/// The version string assigned to a resolved revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalVersion {
    /// Exact release tag or derived pseudo-version
    pub version: String,
    pub revision: RevInfo,
    /// Full tag name when `version` comes from a tag
    pub tag: Option<String>,
}

impl CanonicalVersion {
    pub fn is_pseudo(&self) -> bool {
        self.tag.is_none()
    }
}

/// A repository tag that names a version of this module.
#[derive(Debug, Clone)]
struct ModuleTag {
    /// Version text, e.g. "v1.2.0"
    text: String,
    version: Version,
    /// Full tag name, e.g. "src/golang/v1.2.0"
    name: String,
    commit: String,
    prefixed: bool,
}

/// Resolves versions of one module living in a subdirectory of a repository.
pub struct RevisionResolver<'a> {
    host: &'a dyn CodeHost,
    module: &'a str,
    subdir: &'a str,
    tag_prefix: String,
    path_major: Option<u64>,
}

impl<'a> RevisionResolver<'a> {
    /// `subdir` must already be normalized (no leading or trailing `/`).
    pub fn new(host: &'a dyn CodeHost, module: &'a str, subdir: &'a str) -> Self {
        let tag_prefix = if subdir.is_empty() {
            String::new()
        } else {
            format!("{}/", subdir)
        };
        Self {
            host,
            module,
            subdir,
            tag_prefix,
            path_major: path_major(module),
        }
    }

    /// Resolve `query`: `latest`, a module tag, a pseudo-version, or any
    /// commit-ish (tag, branch, `HEAD`, commit hash prefix).
    pub fn resolve(&self, query: &str) -> Result<CanonicalVersion> {
        let tags = self.module_tags().wrap(OP)?;

        let resolved = if query == LATEST {
            self.latest(&tags)
        } else if is_pseudo_version(query) {
            self.pseudo(query, &tags)
        } else if let Some(exact) = self.exact(query, &tags)? {
            Ok(exact)
        } else {
            let info = self.host.stat(query).wrap(OP)?;
            self.from_commit(info, &tags)
        }?;

        tracing::debug!(
            module = self.module,
            query,
            version = %resolved.version,
            revision = %resolved.revision.id,
            "Resolved module version"
        );
        Ok(resolved)
    }

    fn module_tags(&self) -> Result<Vec<ModuleTag>> {
        let mut tags = Vec::new();
        for tag in self.host.tags()? {
            let (text, prefixed) = match tag.name.strip_prefix(&self.tag_prefix) {
                Some(rest) if !self.tag_prefix.is_empty() => (rest, true),
                _ if !tag.name.contains('/') => (tag.name.as_str(), false),
                _ => continue,
            };
            let Some(version) = parse_canonical(text) else {
                continue;
            };
            if is_pseudo_version(text) || !major_matches(&version, self.path_major) {
                continue;
            }
            tags.push(ModuleTag {
                text: text.to_string(),
                version,
                name: tag.name.clone(),
                commit: tag.commit,
                prefixed,
            });
        }
        Ok(tags)
    }

    /// The tag named exactly `query`, if one exists for this module.
    fn exact(&self, query: &str, tags: &[ModuleTag]) -> Result<Option<CanonicalVersion>> {
        let candidates: Vec<&ModuleTag> = tags.iter().filter(|t| t.text == query).collect();
        let commits: BTreeSet<&str> = candidates.iter().map(|t| t.commit.as_str()).collect();
        if commits.len() > 1 {
            return Err(Error::new(
                OP,
                ErrorKind::AmbiguousVersion {
                    query: query.to_string(),
                    candidates: candidates.iter().map(|t| t.name.clone()).collect(),
                },
            ));
        }
        // Prefer the subdirectory-scoped tag when both forms agree.
        let Some(tag) = candidates
            .iter()
            .find(|t| t.prefixed)
            .or_else(|| candidates.first())
        else {
            return Ok(None);
        };
        if !self.host.has_path(&tag.commit, self.subdir).wrap(OP)? {
            return Err(Error::new(
                OP,
                ErrorKind::RevisionNotFound {
                    query: query.to_string(),
                    detail: format!("module directory '{}' absent at tag {}", self.subdir, tag.name),
                },
            ));
        }
        Ok(Some(self.tagged(tag)?))
    }

    fn tagged(&self, tag: &ModuleTag) -> Result<CanonicalVersion> {
        let revision = self.host.stat(&tag.name).wrap(OP)?;
        Ok(CanonicalVersion {
            version: tag.text.clone(),
            revision,
            tag: Some(tag.name.clone()),
        })
    }

    fn latest(&self, tags: &[ModuleTag]) -> Result<CanonicalVersion> {
        let mut present = Vec::new();
        for tag in tags {
            if self.host.has_path(&tag.commit, self.subdir).wrap(OP)? {
                present.push(tag);
            }
        }
        let release = present
            .iter()
            .filter(|t| t.version.pre.is_empty())
            .max_by(|a, b| a.version.cmp(&b.version));
        let newest = release.or_else(|| present.iter().max_by(|a, b| a.version.cmp(&b.version)));
        match newest {
            Some(tag) => self.tagged(tag),
            None => {
                let head = self.host.stat("HEAD").wrap(OP)?;
                self.from_commit(head, tags)
            }
        }
    }

    /// Accept a pseudo-version only when it is the one this repository
    /// derives for its revision: same major, base tag, timestamp and hash.
    fn pseudo(&self, query: &str, tags: &[ModuleTag]) -> Result<CanonicalVersion> {
        let Some(parts) = parse_pseudo(query) else {
            return Err(not_found(query, "malformed pseudo-version"));
        };
        if parts.revision.len() < REV_PREFIX_LEN {
            return Err(not_found(query, "pseudo-version revision is too short"));
        }
        let major_ok = parse_canonical(query).is_some_and(|v| major_matches(&v, self.path_major));
        if !major_ok {
            return Err(not_found(
                query,
                &format!("pseudo-version major does not match module path {}", self.module),
            ));
        }
        let revision = self.host.stat(&parts.revision).wrap(OP)?;
        if !revision.id.starts_with(&parts.revision) {
            return Err(not_found(query, "revision does not match"));
        }
        if format_timestamp(&revision.time) != parts.timestamp {
            return Err(not_found(
                query,
                &format!(
                    "pseudo-version timestamp does not match commit time {}",
                    format_timestamp(&revision.time)
                ),
            ));
        }
        let expected = self.derive_pseudo(&revision, tags)?;
        if expected != query {
            return Err(not_found(
                query,
                &format!("revision {} has pseudo-version {}", parts.revision, expected),
            ));
        }
        Ok(CanonicalVersion {
            version: expected,
            revision,
            tag: None,
        })
    }

    /// Version for an arbitrary commit: its highest module tag, or a pseudo-version.
    fn from_commit(&self, revision: RevInfo, tags: &[ModuleTag]) -> Result<CanonicalVersion> {
        if let Some(tag) = tags
            .iter()
            .filter(|t| t.commit == revision.id)
            .max_by(|a, b| a.version.cmp(&b.version))
        {
            return Ok(CanonicalVersion {
                version: tag.text.clone(),
                revision,
                tag: Some(tag.name.clone()),
            });
        }

        let version = self.derive_pseudo(&revision, tags)?;
        Ok(CanonicalVersion {
            version,
            revision,
            tag: None,
        })
    }

    /// Pseudo-version based on the highest module tag reachable from `revision`.
    fn derive_pseudo(&self, revision: &RevInfo, tags: &[ModuleTag]) -> Result<String> {
        let mut base: Option<&ModuleTag> = None;
        for tag in tags {
            if base.is_some_and(|b| b.version >= tag.version) {
                continue;
            }
            if self.host.is_ancestor(&tag.commit, &revision.id).wrap(OP)? {
                base = Some(tag);
            }
        }
        Ok(pseudo_version(
            self.path_major.unwrap_or(0),
            base.map(|t| &t.version),
            &revision.time,
            &revision.id,
        ))
    }
}

fn not_found(query: &str, detail: &str) -> Error {
    Error::new(
        OP,
        ErrorKind::RevisionNotFound {
            query: query.to_string(),
            detail: detail.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{MemoryFile, MemoryHost};
    use chrono::{DateTime, Utc};

    const MODULE: &str = "foo.com/go/pkg/test/sub";
    const SUBDIR: &str = "src/golang";

    const C1: &str = "1111111111111111111111111111111111111111";
    const C2: &str = "2222222222222222222222222222222222222222";
    const C3: &str = "3333333333333333333333333333333333333333";
    const C4: &str = "4444444444444444444444444444444444444444";

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn gomod() -> (&'static str, MemoryFile) {
        (
            "src/golang/go.mod",
            MemoryFile::Regular(b"module foo.com/go/pkg/test/sub\n".to_vec()),
        )
    }

    /// C1 (v1.1.0) -> C2 (v1.2.0) -> C3 -> C4
    fn host() -> MemoryHost {
        let mut host = MemoryHost::new("mem");
        host.commit(C1, ts(1_554_000_000), &[gomod()])
            .commit(C2, ts(1_554_100_000), &[gomod()])
            .commit(C3, ts(1_554_120_000), &[gomod()])
            .commit(C4, ts(1_554_130_000), &[gomod()])
            .tag("src/golang/v1.1.0", C1)
            .tag("src/golang/v1.2.0", C2);
        host
    }

    fn resolve(host: &MemoryHost, query: &str) -> Result<CanonicalVersion> {
        RevisionResolver::new(host, MODULE, SUBDIR).resolve(query)
    }

    #[test]
    fn exact_tag_is_canonical() {
        let host = host();
        let v = resolve(&host, "v1.2.0").unwrap();
        assert_eq!(v.version, "v1.2.0");
        assert_eq!(v.revision.id, C2);
        assert_eq!(v.tag.as_deref(), Some("src/golang/v1.2.0"));
        assert!(!v.is_pseudo());
    }

    #[test]
    fn untagged_commit_gets_pseudo_version_after_nearest_tag() {
        let host = host();
        let v = resolve(&host, &C3[..12]).unwrap();
        assert_eq!(v.version, "v1.2.1-0.20190401120000-333333333333");
        assert!(v.is_pseudo());
        assert!(v.version.starts_with("v1.2."));
    }

    #[test]
    fn tagged_commit_reached_by_hash_uses_tag() {
        let host = host();
        let v = resolve(&host, C2).unwrap();
        assert_eq!(v.version, "v1.2.0");
    }

    #[test]
    fn branch_head_resolves() {
        let host = host();
        let v = resolve(&host, "main").unwrap();
        assert_eq!(v.revision.id, C4);
        assert!(v.version.starts_with("v1.2.1-0."));
    }

    #[test]
    fn resolve_is_deterministic() {
        let host = host();
        let a = resolve(&host, &C4[..8]).unwrap();
        let b = resolve(&host, &C4[..8]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn pseudo_versions_differ_and_sort_by_time() {
        let host = host();
        let a = resolve(&host, C3).unwrap().version;
        let b = resolve(&host, C4).unwrap().version;
        assert_ne!(a, b);
        assert!(parse_canonical(&a).unwrap() < parse_canonical(&b).unwrap());
        assert!(parse_canonical("v1.2.0").unwrap() < parse_canonical(&a).unwrap());
    }

    #[test]
    fn no_tags_uses_zero_baseline() {
        let mut host = MemoryHost::new("mem");
        host.commit(C1, ts(1_554_120_000), &[gomod()]);
        let v = resolve(&host, "HEAD").unwrap();
        assert_eq!(v.version, "v0.0.0-20190401120000-111111111111");
    }

    #[test]
    fn major_suffix_filters_tags_and_sets_baseline() {
        let mut host = host();
        host.tag("src/golang/v2.0.0", C3);
        let v2 = RevisionResolver::new(&host, "foo.com/go/pkg/test/v2", SUBDIR);

        assert!(matches!(
            v2.resolve("v1.2.0").unwrap_err().kind(),
            ErrorKind::RevisionNotFound { .. }
        ));
        assert_eq!(v2.resolve("v2.0.0").unwrap().revision.id, C3);
        assert_eq!(
            v2.resolve(&C2[..12]).unwrap().version,
            "v2.0.0-20190401062640-222222222222"
        );

        // v1 path ignores the v2 tag.
        assert_eq!(resolve(&host, "latest").unwrap().version, "v1.2.0");
    }

    #[test]
    fn latest_prefers_releases() {
        let mut host = host();
        host.tag("src/golang/v1.3.0-rc.1", C4);
        assert_eq!(resolve(&host, "latest").unwrap().version, "v1.2.0");

        let mut pre_only = MemoryHost::new("mem");
        pre_only
            .commit(C1, ts(1_554_000_000), &[gomod()])
            .tag("src/golang/v0.1.0-alpha", C1);
        assert_eq!(resolve(&pre_only, "latest").unwrap().version, "v0.1.0-alpha");
    }

    #[test]
    fn latest_without_tags_is_head_pseudo_version() {
        let mut host = MemoryHost::new("mem");
        host.commit(C1, ts(1_554_000_000), &[gomod()])
            .commit(C2, ts(1_554_120_000), &[gomod()]);
        let v = resolve(&host, "latest").unwrap();
        assert_eq!(v.revision.id, C2);
        assert_eq!(v.version, "v0.0.0-20190401120000-222222222222");
    }

    #[test]
    fn plain_tag_is_accepted_when_subdir_exists() {
        let mut host = host();
        host.tag("v1.4.0", C4);
        let v = resolve(&host, "v1.4.0").unwrap();
        assert_eq!(v.revision.id, C4);
        assert_eq!(v.tag.as_deref(), Some("v1.4.0"));
    }

    #[test]
    fn conflicting_tag_forms_are_ambiguous() {
        let mut host = host();
        host.tag("v1.2.0", C4);
        let err = resolve(&host, "v1.2.0").unwrap_err();
        match err.kind() {
            ErrorKind::AmbiguousVersion { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.ops().last(), Some(&"resolver.resolve"));
    }

    #[test]
    fn agreeing_tag_forms_prefer_prefixed() {
        let mut host = host();
        host.tag("v1.2.0", C2);
        let v = resolve(&host, "v1.2.0").unwrap();
        assert_eq!(v.tag.as_deref(), Some("src/golang/v1.2.0"));
    }

    #[test]
    fn tag_without_module_directory_is_not_found() {
        let mut host = host();
        host.commit(
            "5555555555555555555555555555555555555555",
            ts(1_554_140_000),
            &[("README.md", MemoryFile::Regular(b"moved".to_vec()))],
        )
        .tag("src/golang/v1.5.0", "5555555555555555555555555555555555555555");
        let err = resolve(&host, "v1.5.0").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RevisionNotFound { .. }));
    }

    #[test]
    fn unknown_query_is_not_found() {
        let host = host();
        let err = resolve(&host, "v9.9.9").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RevisionNotFound { .. }));
        let err = resolve(&host, "feature-branch").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RevisionNotFound { .. }));
    }

    #[test]
    fn ambiguous_hash_prefix_propagates() {
        let mut host = MemoryHost::new("mem");
        host.commit("abcd000000000000000000000000000000000001", ts(1), &[gomod()])
            .commit("abcd000000000000000000000000000000000002", ts(2), &[gomod()]);
        let err = resolve(&host, "abcd").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AmbiguousVersion { .. }));
    }

    #[test]
    fn pseudo_version_query_is_verified() {
        let host = host();
        let derived = resolve(&host, C3).unwrap().version;

        let again = resolve(&host, &derived).unwrap();
        assert_eq!(again.version, derived);
        assert_eq!(again.revision.id, C3);

        let wrong_time = derived.replace("20190401120000", "20190401120001");
        let err = resolve(&host, &wrong_time).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RevisionNotFound { .. }));
    }

    #[test]
    fn pseudo_version_with_foreign_major_is_rejected() {
        let host = host();
        for query in [
            "v5.0.0-20190401120000-333333333333",
            "v2.0.0-20190401120000-333333333333",
        ] {
            let err = resolve(&host, query).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::RevisionNotFound { .. }),
                "{query} accepted"
            );
        }
    }

    #[test]
    fn pseudo_version_with_wrong_base_is_rejected() {
        let host = host();
        assert_eq!(
            resolve(&host, "v1.2.1-0.20190401120000-333333333333")
                .unwrap()
                .version,
            "v1.2.1-0.20190401120000-333333333333"
        );

        for query in [
            "v1.9.1-0.20190401120000-333333333333",
            "v1.1.1-0.20190401120000-333333333333",
            "v0.0.0-20190401120000-333333333333",
        ] {
            let err = resolve(&host, query).unwrap_err();
            match err.kind() {
                ErrorKind::RevisionNotFound { detail, .. } => {
                    assert!(detail.contains("v1.2.1-0.20190401120000-333333333333"), "{detail}");
                }
                other => panic!("{query}: unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn highest_tag_on_commit_wins() {
        let mut host = host();
        host.tag("src/golang/v1.2.1", C2);
        let v = resolve(&host, C2).unwrap();
        assert_eq!(v.version, "v1.2.1");
    }

    #[test]
    fn tags_of_other_subdirectories_are_ignored() {
        let mut host = host();
        host.tag("other/module/v3.0.0", C4).tag("src/golang/not-a-version", C4);
        let v = resolve(&host, C4).unwrap();
        assert_eq!(v.version, "v1.2.1-0.20190401144640-444444444444");
    }
}
