use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use arca_archive::ArchiveReader;
use arca_engine::{
    EngineError, IncrementalWriter, RestoreOptions, RestorePlan, RestoreReport, Restorer,
    SelectiveRestorer, WriteOutcome, Writer,
};
use arca_registry::ModelRegistry;
use arca_types::{ModelId, PrimaryKey};

use crate::config::ArcaConfig;
use crate::error::SdkResult;
use crate::preview::{BackupPreview, VerifyReport};

/// Backup and restore over one model registry.
pub struct Arca {
    registry: Arc<dyn ModelRegistry>,
    config: ArcaConfig,
}

impl Arca {
    pub fn new(registry: Arc<dyn ModelRegistry>, config: ArcaConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &dyn ModelRegistry {
        self.registry.as_ref()
    }

    pub fn config(&self) -> &ArcaConfig {
        &self.config
    }

    // ---- Backup ----

    /// Back up `models` (or the configured list, or the registry default).
    pub fn create_backup(
        &self,
        models: Option<Vec<ModelId>>,
        include_attachments: bool,
    ) -> SdkResult<WriteOutcome> {
        let mut options = self.config.backup.write_options();
        if models.is_some() {
            options.models = models;
        }
        options.include_attachments = include_attachments;
        Ok(Writer::new(self.registry()).write(&options)?)
    }

    /// Back up instances modified at or after `since`.
    pub fn create_incremental_backup(
        &self,
        since: DateTime<Utc>,
        models: Option<Vec<ModelId>>,
    ) -> SdkResult<WriteOutcome> {
        let mut options = self.config.backup.write_options();
        if models.is_some() {
            options.models = models;
        }
        Ok(IncrementalWriter::new(self.registry(), since).write(&options)?)
    }

    // ---- Inspection ----

    /// Decode and validate an archive without touching the registry.
    pub fn preview_backup(&self, bytes: &[u8]) -> SdkResult<BackupPreview> {
        let archive = ArchiveReader::from_bytes(bytes)?;
        Ok(BackupPreview::from_archive(&archive))
    }

    /// Run every restore pre-flight check against the registry without
    /// writing anything.
    pub fn verify_backup(&self, bytes: &[u8]) -> SdkResult<VerifyReport> {
        let archive = ArchiveReader::from_bytes(bytes)?;
        let plan = RestorePlan::prepare(self.registry(), archive.objects())?;
        let report = VerifyReport::new(&archive, &plan);
        info!(
            objects = report.preview.object_count,
            edges = report.edges,
            depth = report.depth(),
            "archive verified"
        );
        Ok(report)
    }

    // ---- Restore ----

    pub fn restore_backup(
        &self,
        bytes: &[u8],
        preserve_ids: bool,
        skip_existing: bool,
    ) -> SdkResult<RestoreReport> {
        let options = RestoreOptions {
            preserve_ids,
            skip_existing,
        };
        Ok(Restorer::new(self.registry(), options).restore_bytes(bytes)?)
    }

    /// Restore the records of `models` and the records with `pks`, using the
    /// configured identifier mode.
    pub fn selective_restore(
        &self,
        bytes: &[u8],
        models: Option<Vec<ModelId>>,
        pks: Option<Vec<PrimaryKey>>,
    ) -> SdkResult<RestoreReport> {
        let loaded = SelectiveRestorer::load(bytes)?;
        let filtered = match (models, pks) {
            (None, None) => return Err(EngineError::NoSelection.into()),
            (Some(models), None) => loaded.select_by_model(models),
            (None, Some(pks)) => loaded.select_by_pk(pks),
            (Some(models), Some(pks)) => loaded.select_by_model(models).select_by_pk(pks),
        };
        Ok(filtered.restore(self.registry(), self.config.restore.into())?)
    }
}
