use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::ModelId;

/// Archive format versions this build reads and writes, newest last.
pub const SUPPORTED_FORMAT_VERSIONS: &[&str] = &["1.0.0"];

/// A `MAJOR.MINOR.PATCH` archive format version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// How a reader should treat an archive's format version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionSupport {
    /// Listed in [`SUPPORTED_FORMAT_VERSIONS`].
    Supported,
    /// Same major as the current version but not listed; readable, with a warning.
    Compatible,
    /// Different major version; must be rejected.
    Unsupported,
}

impl FormatVersion {
    /// The version written by this build.
    pub const CURRENT: Self = Self {
        major: 1,
        minor: 0,
        patch: 0,
    };

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Classify this version against what the reader understands.
    pub fn support(&self) -> VersionSupport {
        let listed = SUPPORTED_FORMAT_VERSIONS
            .iter()
            .filter_map(|v| v.parse::<FormatVersion>().ok())
            .any(|v| v == *self);
        if listed {
            VersionSupport::Supported
        } else if self.major == Self::CURRENT.major {
            VersionSupport::Compatible
        } else {
            VersionSupport::Unsupported
        }
    }
}

impl FromStr for FormatVersion {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidFormatVersion(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, TypeError> {
            parts
                .next()
                .ok_or_else(invalid)?
                .parse::<u32>()
                .map_err(|_| invalid())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Summary and index of an archive, stored as `manifest.json`.
///
/// The object list in `data.json` is authoritative; the manifest exists so
/// that an archive can be previewed and version-checked cheaply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_tenant_id: Option<String>,
    pub object_count: u64,
    #[serde(default)]
    pub per_model_counts: BTreeMap<ModelId, u64>,
    /// Lower bound of an incremental backup; absent for full backups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachment_count: u64,
    /// BLAKE3 hex digest of the `data.json` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_checksum: Option<String>,
}

impl Manifest {
    /// An empty manifest for the current format version.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            format_version: FormatVersion::CURRENT.to_string(),
            created_at,
            origin_tenant_id: None,
            object_count: 0,
            per_model_counts: BTreeMap::new(),
            since: None,
            attachment_count: 0,
            data_checksum: None,
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.since.is_some()
    }

    /// Record one more object of `model`.
    pub fn count_object(&mut self, model: &ModelId) {
        self.object_count += 1;
        *self.per_model_counts.entry(model.clone()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let v: FormatVersion = "1.2.3".parse().unwrap();
        assert_eq!(v, FormatVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "1", "1.0", "1.0.0.0", "a.b.c", "1.-1.0"] {
            assert!(bad.parse::<FormatVersion>().is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn current_is_supported() {
        assert_eq!(FormatVersion::CURRENT.support(), VersionSupport::Supported);
        assert_eq!(
            FormatVersion::CURRENT.to_string(),
            *SUPPORTED_FORMAT_VERSIONS.last().unwrap()
        );
    }

    #[test]
    fn newer_minor_is_compatible() {
        assert_eq!(
            FormatVersion::new(1, 4, 0).support(),
            VersionSupport::Compatible
        );
    }

    #[test]
    fn other_major_is_unsupported() {
        assert_eq!(
            FormatVersion::new(2, 0, 0).support(),
            VersionSupport::Unsupported
        );
        assert_eq!(
            FormatVersion::new(0, 9, 0).support(),
            VersionSupport::Unsupported
        );
    }

    #[test]
    fn manifest_counts_objects() {
        let mut manifest = Manifest::new(Utc::now());
        let framework = ModelId::new("core.framework").unwrap();
        let control = ModelId::new("core.control").unwrap();
        manifest.count_object(&framework);
        manifest.count_object(&control);
        manifest.count_object(&control);
        assert_eq!(manifest.object_count, 3);
        assert_eq!(manifest.per_model_counts[&control], 2);
        assert!(!manifest.is_incremental());
    }

    #[test]
    fn manifest_omits_absent_optionals() {
        let manifest = Manifest::new(Utc::now());
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["format_version"], "1.0.0");
        assert!(json.get("since").is_none());
        assert!(json.get("origin_tenant_id").is_none());
        let back: Manifest = serde_json::from_value(json).unwrap();
        assert_eq!(back, manifest);
    }
}
