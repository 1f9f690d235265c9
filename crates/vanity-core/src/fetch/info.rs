use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ResultExt};
use crate::version::CanonicalVersion;

/// The `.info` document served for a module version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoRecord {
    pub version: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

/// Where a version came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    #[serde(rename = "VCS")]
    pub vcs: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    pub hash: String,
    #[serde(rename = "Ref", default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
}

impl InfoRecord {
    /// Record for a version resolved from a git repository.
    pub fn from_git(resolved: &CanonicalVersion, url: &str, subdir: &str) -> Self {
        Self {
            version: resolved.version.clone(),
            time: resolved.revision.time,
            origin: Some(Origin {
                vcs: "git".to_string(),
                url: url.to_string(),
                subdir: (!subdir.is_empty()).then(|| subdir.to_string()),
                hash: resolved.revision.id.clone(),
                r#ref: resolved.tag.as_ref().map(|tag| format!("refs/tags/{}", tag)),
            }),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).op("info.encode")
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).op("info.decode")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::RevInfo;

    fn resolved(tag: Option<&str>) -> CanonicalVersion {
        CanonicalVersion {
            version: "v1.2.0".to_string(),
            revision: RevInfo {
                id: "0123456789abcdef0123456789abcdef01234567".to_string(),
                time: DateTime::from_timestamp(1_554_120_000, 0).unwrap(),
                name: "refs/tags/src/golang/v1.2.0".to_string(),
            },
            tag: tag.map(str::to_string),
        }
    }

    #[test]
    fn tagged_record_matches_proxy_shape() {
        let record = InfoRecord::from_git(
            &resolved(Some("src/golang/v1.2.0")),
            "git@bitbucket.org:fooOrg/test",
            "src/golang",
        );
        let json: serde_json::Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Version": "v1.2.0",
                "Time": "2019-04-01T12:00:00Z",
                "Origin": {
                    "VCS": "git",
                    "URL": "git@bitbucket.org:fooOrg/test",
                    "Subdir": "src/golang",
                    "Hash": "0123456789abcdef0123456789abcdef01234567",
                    "Ref": "refs/tags/src/golang/v1.2.0"
                }
            })
        );
    }

    #[test]
    fn derived_record_at_root_omits_optional_fields() {
        let record = InfoRecord::from_git(&resolved(None), "https://example.com/repo", "");
        let json = String::from_utf8(record.to_json().unwrap()).unwrap();
        assert!(!json.contains("Subdir"));
        assert!(!json.contains("Ref"));
    }

    #[test]
    fn upstream_record_without_origin_parses() {
        let record =
            InfoRecord::from_json(br#"{"Version":"v0.3.1","Time":"2021-06-01T10:00:00Z"}"#)
                .unwrap();
        assert_eq!(record.version, "v0.3.1");
        assert!(record.origin.is_none());
    }
}
