//! Canonical and pseudo-version encoding.
//!
//! A pseudo-version names an untagged commit relative to the closest tagged
//! ancestor:
//! - no tagged ancestor: `vM.0.0-<yyyymmddhhmmss>-<rev12>`
//! - release base `vX.Y.Z`: `vX.Y.(Z+1)-0.<yyyymmddhhmmss>-<rev12>`
//! - prerelease base `vX.Y.Z-pre`: `vX.Y.Z-pre.0.<yyyymmddhhmmss>-<rev12>`

use chrono::{DateTime, Utc};
use semver::Version;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TIMESTAMP_LEN: usize = 14;
pub const REV_PREFIX_LEN: usize = 12;

/// Parse `vX.Y.Z[-pre]`. Build metadata and missing components are rejected.
pub fn parse_canonical(version: &str) -> Option<Version> {
    let parsed = Version::parse(version.strip_prefix('v')?).ok()?;
    parsed.build.is_empty().then_some(parsed)
}

/// Major version implied by a module path's `/vN` suffix (N >= 2).
pub fn path_major(module: &str) -> Option<u64> {
    let last = module.rsplit('/').next()?;
    let digits = last.strip_prefix('v')?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok().filter(|major| *major >= 2)
}

/// Whether `version` may be used by a module whose path has `path_major`.
pub fn major_matches(version: &Version, path_major: Option<u64>) -> bool {
    match path_major {
        Some(major) => version.major == major,
        None => version.major <= 1,
    }
}

/// Timestamp and revision prefix carried by a pseudo-version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoParts {
    pub timestamp: String,
    pub revision: String,
}

/// Split a pseudo-version into its timestamp and revision, if it is one.
pub fn parse_pseudo(version: &str) -> Option<PseudoParts> {
    let parsed = parse_canonical(version)?;
    let pre = parsed.pre.as_str();
    let (left, revision) = pre.rsplit_once('-')?;
    if revision.is_empty() || !revision.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    if left.len() < TIMESTAMP_LEN {
        return None;
    }
    let (head, timestamp) = left.split_at(left.len() - TIMESTAMP_LEN);
    if !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let shape_ok = if head.is_empty() {
        parsed.minor == 0 && parsed.patch == 0
    } else {
        head == "0." || head.ends_with(".0.")
    };
    shape_ok.then(|| PseudoParts {
        timestamp: timestamp.to_string(),
        revision: revision.to_string(),
    })
}

pub fn is_pseudo_version(version: &str) -> bool {
    parse_pseudo(version).is_some()
}

pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Derive the pseudo-version for a commit.
///
/// `base` is the highest tagged ancestor; `major` is used when there is none.
pub fn pseudo_version(
    major: u64,
    base: Option<&Version>,
    time: &DateTime<Utc>,
    revision: &str,
) -> String {
    let ts = format_timestamp(time);
    let rev = &revision[..revision.len().min(REV_PREFIX_LEN)];
    match base {
        None => format!("v{}.0.0-{}-{}", major, ts, rev),
        Some(base) if base.pre.is_empty() => format!(
            "v{}.{}.{}-0.{}-{}",
            base.major,
            base.minor,
            base.patch + 1,
            ts,
            rev
        ),
        Some(base) => format!(
            "v{}.{}.{}-{}.0.{}-{}",
            base.major, base.minor, base.patch, base.pre, ts, rev
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    const REV: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn canonical_versions() {
        assert!(parse_canonical("v1.2.0").is_some());
        assert!(parse_canonical("v1.2.0-rc.1").is_some());
        assert!(parse_canonical("1.2.0").is_none());
        assert!(parse_canonical("v1.2").is_none());
        assert!(parse_canonical("v1.2.0+meta").is_none());
        assert!(parse_canonical("latest").is_none());
    }

    #[test]
    fn path_major_suffix() {
        assert_eq!(path_major("foo.com/go/pkg/test"), None);
        assert_eq!(path_major("foo.com/go/pkg/test/v2"), Some(2));
        assert_eq!(path_major("foo.com/go/pkg/test/v1"), None);
        assert_eq!(path_major("foo.com/go/pkg/test/v02"), None);
        assert_eq!(path_major("foo.com/go/pkg/vendor"), None);
    }

    #[test]
    fn pseudo_without_base() {
        let t = at(1_554_120_000); // 2019-04-01 12:00:00 UTC
        assert_eq!(
            pseudo_version(0, None, &t, REV),
            "v0.0.0-20190401120000-0123456789ab"
        );
        assert_eq!(
            pseudo_version(3, None, &t, REV),
            "v3.0.0-20190401120000-0123456789ab"
        );
    }

    #[test]
    fn pseudo_after_release_and_prerelease() {
        let t = at(1_554_120_000);
        let release = parse_canonical("v1.2.0").unwrap();
        assert_eq!(
            pseudo_version(0, Some(&release), &t, REV),
            "v1.2.1-0.20190401120000-0123456789ab"
        );
        let pre = parse_canonical("v1.3.0-rc.1").unwrap();
        assert_eq!(
            pseudo_version(0, Some(&pre), &t, REV),
            "v1.3.0-rc.1.0.20190401120000-0123456789ab"
        );
    }

    #[test]
    fn pseudo_sorts_after_base_and_by_time() {
        let base = parse_canonical("v1.2.0").unwrap();
        let early = pseudo_version(0, Some(&base), &at(1_000_000_000), "ffffffffffff");
        let late = pseudo_version(0, Some(&base), &at(1_000_000_001), "000000000000");

        let early = parse_canonical(&early).unwrap();
        let late = parse_canonical(&late).unwrap();
        assert!(base < early);
        assert!(early < late);
        assert!(late < parse_canonical("v1.2.1").unwrap());
    }

    #[test]
    fn recognizes_pseudo_versions() {
        assert!(is_pseudo_version("v0.0.0-20190401120000-0123456789ab"));
        assert!(is_pseudo_version("v1.2.1-0.20190401120000-0123456789ab"));
        assert!(is_pseudo_version("v1.3.0-rc.1.0.20190401120000-0123456789ab"));
        assert!(!is_pseudo_version("v1.2.0"));
        assert!(!is_pseudo_version("v1.2.0-rc.1"));
        assert!(!is_pseudo_version("v1.2.1-20190401120000-0123456789ab"));

        let parts = parse_pseudo("v1.2.1-0.20190401120000-0123456789ab").unwrap();
        assert_eq!(parts.timestamp, "20190401120000");
        assert_eq!(parts.revision, "0123456789ab");
    }
}
