use std::collections::BTreeSet;
use std::marker::PhantomData;

use tracing::{debug, info};

use arca_archive::ArchiveReader;
use arca_registry::ModelRegistry;
use arca_types::{AttachmentBlob, ModelId, ObjectRecord, PrimaryKey};

use crate::error::{EngineError, EngineResult};
use crate::report::RestoreReport;
use crate::restorer::{RestoreOptions, Restorer};

/// Archive opened, nothing selected yet.
#[derive(Debug)]
pub struct Loaded;

/// At least one selection call made.
#[derive(Debug)]
pub struct Filtered;

/// Restores a caller-chosen subset of an archive.
///
/// Records are chosen by model and/or by original primary key; a record is
/// restored if it matches either. Dependencies of the subset are not pulled
/// in: references to records outside the selection are resolved against the
/// target registry and cleared when absent.
///
/// ```text
/// SelectiveRestorer::load(bytes)?        // Loaded
///     .select_by_model([framework])      // Filtered
///     .select_by_pk([pk])                // Filtered
///     .restore(&registry, options)?      // consumed
/// ```
#[derive(Debug)]
pub struct SelectiveRestorer<S> {
    archive: ArchiveReader,
    models: BTreeSet<ModelId>,
    pks: BTreeSet<PrimaryKey>,
    _state: PhantomData<S>,
}

impl SelectiveRestorer<Loaded> {
    /// Decode and validate archive bytes.
    pub fn load(bytes: &[u8]) -> EngineResult<Self> {
        Ok(Self::from_archive(ArchiveReader::from_bytes(bytes)?))
    }

    pub fn from_archive(archive: ArchiveReader) -> Self {
        Self {
            archive,
            models: BTreeSet::new(),
            pks: BTreeSet::new(),
            _state: PhantomData,
        }
    }
}

impl<S> SelectiveRestorer<S> {
    /// Add every record of the given models to the selection.
    pub fn select_by_model(
        self,
        models: impl IntoIterator<Item = ModelId>,
    ) -> SelectiveRestorer<Filtered> {
        let mut next = self.filtered();
        next.models.extend(models);
        next
    }

    /// Add the records with the given original primary keys to the selection.
    pub fn select_by_pk(
        self,
        pks: impl IntoIterator<Item = PrimaryKey>,
    ) -> SelectiveRestorer<Filtered> {
        let mut next = self.filtered();
        next.pks.extend(pks);
        next
    }

    pub fn archive(&self) -> &ArchiveReader {
        &self.archive
    }

    fn filtered(self) -> SelectiveRestorer<Filtered> {
        SelectiveRestorer {
            archive: self.archive,
            models: self.models,
            pks: self.pks,
            _state: PhantomData,
        }
    }

    fn matches(&self, record: &ObjectRecord) -> bool {
        self.models.contains(&record.model_id) || self.pks.contains(&record.original_primary_key)
    }
}

impl SelectiveRestorer<Filtered> {
    /// Records the current selection matches, in archive order.
    pub fn selected(&self) -> Vec<&ObjectRecord> {
        self.archive
            .objects()
            .iter()
            .filter(|r| self.matches(r))
            .collect()
    }

    /// Restore the selected records.
    ///
    /// Fails with [`EngineError::NoSelection`] when the selection matches no
    /// record. Otherwise behaves like [`Restorer::restore`] on the subset.
    pub fn restore(
        self,
        registry: &dyn ModelRegistry,
        options: RestoreOptions,
    ) -> EngineResult<RestoreReport> {
        let records: Vec<ObjectRecord> = self.selected().into_iter().cloned().collect();
        if records.is_empty() {
            return Err(EngineError::NoSelection);
        }
        let attachments: Vec<AttachmentBlob> = self
            .archive
            .attachments()
            .iter()
            .filter(|b| {
                self.models.contains(&b.owner_model_id) || self.pks.contains(&b.owner_original_pk)
            })
            .cloned()
            .collect();
        debug!(
            models = self.models.len(),
            pks = self.pks.len(),
            records = records.len(),
            attachments = attachments.len(),
            "selection resolved"
        );
        info!(
            selected = records.len(),
            total = self.archive.objects().len(),
            "selective restore"
        );
        Restorer::new(registry, options).restore_records(
            self.archive.manifest(),
            &records,
            &attachments,
        )
    }
}
