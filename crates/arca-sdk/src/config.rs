use std::path::Path;

use serde::{Deserialize, Serialize};

use arca_archive::Compression;
use arca_engine::{RestoreOptions, WriteOptions};
use arca_types::ModelId;

use crate::error::{SdkError, SdkResult};

/// Defaults applied by [`Arca`](crate::Arca), loaded from TOML.
///
/// ```toml
/// [backup]
/// models = ["core.framework", "core.control"]
/// include_attachments = true
/// origin_tenant_id = "acme"
/// compression = "deflated"
///
/// [restore]
/// preserve_ids = false
/// skip_existing = false
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArcaConfig {
    pub backup: BackupConfig,
    pub restore: RestoreConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupConfig {
    /// Models to back up. `None` uses the registry's default list.
    pub models: Option<Vec<ModelId>>,
    pub include_attachments: bool,
    /// Recorded in the manifest.
    pub origin_tenant_id: Option<String>,
    pub compression: Compression,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            models: None,
            include_attachments: true,
            origin_tenant_id: None,
            compression: Compression::default(),
        }
    }
}

impl BackupConfig {
    pub(crate) fn write_options(&self) -> WriteOptions {
        WriteOptions {
            models: self.models.clone(),
            since: None,
            include_attachments: self.include_attachments,
            origin_tenant_id: self.origin_tenant_id.clone(),
            compression: self.compression,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestoreConfig {
    pub preserve_ids: bool,
    pub skip_existing: bool,
}

impl From<RestoreConfig> for RestoreOptions {
    fn from(c: RestoreConfig) -> Self {
        RestoreOptions {
            preserve_ids: c.preserve_ids,
            skip_existing: c.skip_existing,
        }
    }
}

impl ArcaConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SdkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
