use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use arca_archive::ArchiveReader;
use arca_engine::RestorePlan;
use arca_types::ModelId;

/// What an archive holds, counted from its object list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackupPreview {
    pub format_version: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_tenant_id: Option<String>,
    pub object_count: u64,
    pub by_model: BTreeMap<ModelId, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    pub attachment_count: u64,
}

impl BackupPreview {
    pub fn from_archive(archive: &ArchiveReader) -> Self {
        let manifest = archive.manifest();
        let mut by_model = BTreeMap::new();
        for record in archive.objects() {
            *by_model.entry(record.model_id.clone()).or_insert(0) += 1;
        }
        Self {
            format_version: manifest.format_version.clone(),
            created_at: manifest.created_at,
            origin_tenant_id: manifest.origin_tenant_id.clone(),
            object_count: archive.objects().len() as u64,
            by_model,
            since: manifest.since,
            attachment_count: archive.attachments().len() as u64,
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.since.is_some()
    }
}

/// Outcome of a dry run: the archive decodes, matches the registry schema
/// and has a creation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub preview: BackupPreview,
    /// BLAKE3 digest the archive carried, if any. It was checked on load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_checksum: Option<String>,
    /// In-archive dependency edges.
    pub edges: usize,
    /// Record count of each creation level, in order.
    pub level_sizes: Vec<usize>,
}

impl VerifyReport {
    pub(crate) fn new(archive: &ArchiveReader, plan: &RestorePlan) -> Self {
        Self {
            preview: BackupPreview::from_archive(archive),
            data_checksum: archive.manifest().data_checksum.clone(),
            edges: plan.graph().edge_count(),
            level_sizes: plan.levels().iter().map(Vec::len).collect(),
        }
    }

    /// Length of the longest dependency chain.
    pub fn depth(&self) -> usize {
        self.level_sizes.len()
    }
}
