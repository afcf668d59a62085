use std::collections::HashMap;

use tracing::{debug, info, warn};

use arca_archive::ArchiveReader;
use arca_codec::ValueCodec;
use arca_registry::{InstanceWrite, ModelRegistry, RegistryError, RegistryResult};
use arca_types::{
    AttachmentBlob, FieldKind, Manifest, ModelId, ObjectRecord, PrimaryKey, RecordKey, Schema,
};

use crate::error::{EngineError, EngineResult};
use crate::mapping::IdMapping;
use crate::plan::RestorePlan;
use crate::report::{RestoreIssue, RestoreReport};

/// How archived identifiers map onto the target registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Keep every record's original primary key.
    pub preserve_ids: bool,
    /// With `preserve_ids`, leave records that already exist untouched
    /// instead of failing.
    pub skip_existing: bool,
}

/// What happened to one record in phase 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Created,
    Skipped,
    Failed,
}

/// Replays archived records into a registry.
///
/// A restore runs in this order:
///
/// 1. Pre-flight: schema check, dependency order and, when preserving ids
///    without `skip_existing`, a primary key collision check. A failure here
///    leaves the registry untouched.
/// 2. Identifier mapping for every record.
/// 3. Phase 1: `create_or_update` in dependency order with scalars and
///    rewritten single references.
/// 4. Attachments for every created record.
/// 5. Phase 2: reference lists, many-to-many links and self references.
///
/// Past pre-flight, a failing record is reported and the restore continues.
/// Only an unreachable registry stops it.
pub struct Restorer<'a> {
    registry: &'a dyn ModelRegistry,
    options: RestoreOptions,
}

impl<'a> Restorer<'a> {
    pub fn new(registry: &'a dyn ModelRegistry, options: RestoreOptions) -> Self {
        Self { registry, options }
    }

    /// Decode archive bytes and restore every record.
    pub fn restore_bytes(&self, bytes: &[u8]) -> EngineResult<RestoreReport> {
        let archive = ArchiveReader::from_bytes(bytes)?;
        self.restore(&archive)
    }

    /// Restore every record of an opened archive.
    pub fn restore(&self, archive: &ArchiveReader) -> EngineResult<RestoreReport> {
        self.restore_records(archive.manifest(), archive.objects(), archive.attachments())
    }

    /// Restore a set of records with the attachments that belong to them.
    pub(crate) fn restore_records(
        &self,
        manifest: &Manifest,
        records: &[ObjectRecord],
        attachments: &[AttachmentBlob],
    ) -> EngineResult<RestoreReport> {
        let plan = RestorePlan::prepare(self.registry, records)?;
        if self.options.preserve_ids && !self.options.skip_existing {
            self.check_collisions(records)?;
        }

        let mapping = IdMapping::build(records, self.options.preserve_ids);
        let mut run = RestoreRun {
            registry: self.registry,
            options: self.options,
            schema: plan.schema(),
            records: records.iter().map(|r| (r.key(), r)).collect(),
            mapping,
            outcomes: HashMap::with_capacity(records.len()),
            deferred: Vec::new(),
            report: RestoreReport {
                incremental_since: manifest.since,
                remapped: !self.options.preserve_ids,
                ..RestoreReport::default()
            },
        };
        if let Some(since) = manifest.since {
            info!(%since, "applying incremental archive");
        }

        run.create_records(plan.order())?;
        run.restore_attachments(attachments)?;
        run.wire_relations(plan.order())?;

        let report = run.report;
        info!(
            created = report.total_created(),
            skipped = report.total_skipped(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            attachments = report.attachments_restored,
            "restore finished"
        );
        Ok(report)
    }

    fn check_collisions(&self, records: &[ObjectRecord]) -> EngineResult<()> {
        let mut collisions = Vec::new();
        for record in records {
            if self
                .registry
                .exists(&record.model_id, &record.original_primary_key)?
            {
                collisions.push(record.key());
            }
        }
        if collisions.is_empty() {
            return Ok(());
        }
        collisions.sort();
        warn!(records = collisions.len(), "primary key collisions, nothing restored");
        Err(EngineError::PrimaryKeyCollision(collisions))
    }
}

/// State owned by one restore invocation.
struct RestoreRun<'a> {
    registry: &'a dyn ModelRegistry,
    options: RestoreOptions,
    schema: &'a Schema,
    records: HashMap<RecordKey, &'a ObjectRecord>,
    mapping: IdMapping,
    outcomes: HashMap<RecordKey, Outcome>,
    /// Self references to re-point after the registry rebound their record:
    /// (record, field).
    deferred: Vec<(RecordKey, String)>,
    report: RestoreReport,
}

/// Registry failures that end the restore; everything else is a per-record
/// problem.
fn fatal(error: RegistryError) -> Result<RegistryError, EngineError> {
    if error.is_unavailable() {
        Err(EngineError::Registry(error))
    } else {
        Ok(error)
    }
}

impl<'a> RestoreRun<'a> {
    // ---------------------------------------------------------------
    // Phase 1
    // ---------------------------------------------------------------

    fn create_records<'k>(
        &mut self,
        order: impl Iterator<Item = &'k RecordKey>,
    ) -> EngineResult<()> {
        for key in order {
            let Some(record) = self.records.get(key).copied() else {
                continue;
            };
            let outcome = self.create_one(key, record)?;
            self.outcomes.insert(key.clone(), outcome);
        }
        debug!(records = self.outcomes.len(), "phase 1 complete");
        Ok(())
    }

    fn create_one(&mut self, key: &RecordKey, record: &ObjectRecord) -> EngineResult<Outcome> {
        let model = &record.model_id;
        if self.options.preserve_ids && self.options.skip_existing {
            let exists = self
                .registry
                .exists(model, &record.original_primary_key)
                .or_else(|e| fatal(e).map(|_| false))?;
            if exists {
                debug!(record = %key, "record exists, skipped");
                self.report.record_skipped(model);
                return Ok(Outcome::Skipped);
            }
        }

        let Some(target_pk) = self.mapping.get(key) else {
            return Ok(Outcome::Failed);
        };
        let mut write = InstanceWrite::new(target_pk);

        for (name, json) in &record.scalar_fields {
            let Some(FieldKind::Scalar { value: kind }) = self.kind_of(model, name) else {
                continue;
            };
            match ValueCodec::decode_field(name, json, kind) {
                Ok(value) => {
                    write.scalars.insert(name.clone(), value);
                }
                Err(e) => {
                    self.report
                        .errors
                        .push(RestoreIssue::on_field(key.clone(), name.clone(), e.to_string()));
                    return Ok(Outcome::Failed);
                }
            }
        }

        let schema = self.schema;
        let mut self_refs = Vec::new();
        for (name, target) in &record.single_refs {
            let rewritten = match target {
                None => None,
                Some(source_pk) => {
                    let Some(target_model) = schema.relation_target(model, name) else {
                        continue;
                    };
                    let target_key = RecordKey::new(target_model.clone(), *source_pk);
                    if target_key == *key {
                        self_refs.push(name.clone());
                        Some(target_pk)
                    } else {
                        self.rewrite_single(key, name, &target_key)?
                    }
                }
            };
            write.single_refs.insert(name.clone(), rewritten);
        }

        match self.registry.create_or_update(model, &write) {
            Ok(effective) => {
                if effective != target_pk {
                    self.mapping.rebind(key, effective);
                    // Self-references were written with the planned key.
                    self.deferred
                        .extend(self_refs.into_iter().map(|field| (key.clone(), field)));
                }
                self.report.record_created(model);
                Ok(Outcome::Created)
            }
            Err(e) => {
                let e = fatal(e)?;
                warn!(record = %key, error = %e, "record not restored");
                self.report
                    .errors
                    .push(RestoreIssue::new(key.clone(), e.to_string()));
                Ok(Outcome::Failed)
            }
        }
    }

    /// Target primary key for a single reference, or `None` with a warning
    /// when the target is unavailable.
    fn rewrite_single(
        &mut self,
        key: &RecordKey,
        field: &str,
        target: &RecordKey,
    ) -> EngineResult<Option<PrimaryKey>> {
        match self.resolve(target)? {
            Some(pk) => Ok(Some(pk)),
            None => {
                self.warn_field(
                    key,
                    field,
                    format!("target {target} is unavailable, reference cleared"),
                );
                Ok(None)
            }
        }
    }

    /// Where a reference to `target` points in the registry, if anywhere.
    ///
    /// Archived targets resolve through the mapping once created or skipped.
    /// Targets outside the archive are kept as-is if the registry has them.
    fn resolve(&self, target: &RecordKey) -> EngineResult<Option<PrimaryKey>> {
        if self.mapping.contains(target) {
            return Ok(match self.outcomes.get(target) {
                Some(Outcome::Created | Outcome::Skipped) => self.mapping.get(target),
                _ => None,
            });
        }
        let exists = self
            .registry
            .exists(&target.model, &target.pk)
            .or_else(|e| fatal(e).map(|_| false))?;
        Ok(exists.then_some(target.pk))
    }

    // ---------------------------------------------------------------
    // Attachments
    // ---------------------------------------------------------------

    fn restore_attachments(&mut self, attachments: &[AttachmentBlob]) -> EngineResult<()> {
        for blob in attachments {
            let owner = blob.owner();
            match self.outcomes.get(&owner) {
                Some(Outcome::Created) => {}
                Some(Outcome::Skipped) => continue,
                _ => {
                    self.warn_field(
                        &owner,
                        &blob.field_name,
                        "owner was not restored, attachment dropped",
                    );
                    continue;
                }
            }
            let Some(pk) = self.mapping.get(&owner) else {
                continue;
            };
            let result: RegistryResult<()> = self.registry.attach(
                &owner.model,
                &pk,
                &blob.field_name,
                &blob.filename,
                &blob.bytes,
            );
            match result {
                Ok(()) => self.report.attachments_restored += 1,
                Err(e) => {
                    let e = fatal(e)?;
                    self.report.errors.push(RestoreIssue::on_field(
                        owner,
                        blob.field_name.clone(),
                        e.to_string(),
                    ));
                }
            }
        }
        debug!(restored = self.report.attachments_restored, "attachments complete");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Phase 2
    // ---------------------------------------------------------------

    fn wire_relations<'k>(
        &mut self,
        order: impl Iterator<Item = &'k RecordKey>,
    ) -> EngineResult<()> {
        let schema = self.schema;
        let mut links = 0usize;
        for key in order {
            if self.outcomes.get(key) != Some(&Outcome::Created) {
                continue;
            }
            let Some(record) = self.records.get(key).copied() else {
                continue;
            };
            let Some(pk) = self.mapping.get(key) else {
                continue;
            };
            for (name, targets) in &record.array_refs {
                let Some(target_model) = schema.relation_target(&record.model_id, name) else {
                    continue;
                };
                let mut rewritten = Vec::with_capacity(targets.len());
                for target_pk in targets {
                    let target = RecordKey::new(target_model.clone(), *target_pk);
                    match self.resolve(&target)? {
                        Some(resolved) => rewritten.push(resolved),
                        None => self.warn_field(
                            key,
                            name,
                            format!("target {target} is unavailable, link dropped"),
                        ),
                    }
                }
                if let Err(e) = self
                    .registry
                    .set_many_to_many(&record.model_id, &pk, name, &rewritten)
                {
                    let e = fatal(e)?;
                    self.report
                        .errors
                        .push(RestoreIssue::on_field(key.clone(), name.clone(), e.to_string()));
                } else {
                    links += rewritten.len();
                }
            }
        }

        for (key, field) in std::mem::take(&mut self.deferred) {
            let Some(pk) = self.mapping.get(&key) else {
                continue;
            };
            if let Err(e) = self.registry.set_single_ref(&key.model, &pk, &field, Some(pk)) {
                let e = fatal(e)?;
                self.report
                    .errors
                    .push(RestoreIssue::on_field(key, field, e.to_string()));
            }
        }
        debug!(links, "phase 2 complete");
        Ok(())
    }

    fn kind_of(&self, model: &ModelId, field: &str) -> Option<&'a FieldKind> {
        self.schema.field(model, field).map(|f| &f.kind)
    }

    fn warn_field(&mut self, key: &RecordKey, field: &str, message: impl Into<String>) {
        let issue = RestoreIssue::on_field(key.clone(), field, message);
        warn!(issue = %issue, "restore warning");
        self.report.warnings.push(issue);
    }
}
