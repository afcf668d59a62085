use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use arca_archive::{layout, ArchiveWriter, Compression};
use arca_codec::ValueCodec;
use arca_registry::{Instance, ModelRegistry};
use arca_types::{AttachmentBlob, FieldDescriptor, FieldKind, Manifest, ModelId, ObjectRecord, PrimaryKey};

use crate::error::{EngineError, EngineResult};

/// What to back up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOptions {
    /// Models to include, in order. `None` uses the registry's default list.
    pub models: Option<Vec<ModelId>>,
    /// Only include instances modified at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub include_attachments: bool,
    pub origin_tenant_id: Option<String>,
    pub compression: Compression,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            models: None,
            since: None,
            include_attachments: true,
            origin_tenant_id: None,
            compression: Compression::default(),
        }
    }
}

/// An instance left out of the archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WriteWarning {
    pub model: ModelId,
    pub pk: PrimaryKey,
    pub message: String,
}

impl fmt::Display for WriteWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.model, self.pk, self.message)
    }
}

/// A finished archive.
#[derive(Clone, Debug)]
pub struct WriteOutcome {
    pub manifest: Manifest,
    pub bytes: Vec<u8>,
    pub warnings: Vec<WriteWarning>,
}

/// Serializes registry contents into an archive. Never writes to the
/// registry.
pub struct Writer<'a> {
    registry: &'a dyn ModelRegistry,
}

impl<'a> Writer<'a> {
    pub fn new(registry: &'a dyn ModelRegistry) -> Self {
        Self { registry }
    }

    /// Produce an archive.
    ///
    /// Fails if a requested model is unknown or the registry cannot be read.
    /// Instances that cannot be encoded are left out and reported as
    /// warnings.
    pub fn write(&self, options: &WriteOptions) -> EngineResult<WriteOutcome> {
        let models = self.resolve_models(options.models.as_deref())?;

        let mut archive = ArchiveWriter::new(Utc::now())
            .with_compression(options.compression)
            .with_origin_tenant(options.origin_tenant_id.clone())
            .with_since(options.since);
        let mut warnings = Vec::new();

        for model in &models {
            let fields = self.registry.list_fields(model)?;
            let instances = self.registry.iterate(model, options.since)?;
            let mut written = 0usize;
            for instance in &instances {
                match encode_instance(model, &fields, instance, options.include_attachments) {
                    Ok((record, blobs)) => {
                        archive.add_object(record);
                        for blob in blobs {
                            archive.add_attachment(blob)?;
                        }
                        written += 1;
                    }
                    Err(message) => {
                        warn!(model = %model, pk = %instance.pk, %message, "instance excluded from backup");
                        warnings.push(WriteWarning {
                            model: model.clone(),
                            pk: instance.pk,
                            message,
                        });
                    }
                }
            }
            debug!(model = %model, written, seen = instances.len(), "model serialized");
        }

        let (manifest, bytes) = archive.finish_to_bytes()?;
        info!(
            objects = manifest.object_count,
            attachments = manifest.attachment_count,
            warnings = warnings.len(),
            incremental = manifest.is_incremental(),
            "backup written"
        );
        Ok(WriteOutcome {
            manifest,
            bytes,
            warnings,
        })
    }

    /// The caller's model list, deduplicated and checked against the
    /// registry, or the registry default.
    fn resolve_models(&self, requested: Option<&[ModelId]>) -> EngineResult<Vec<ModelId>> {
        let Some(requested) = requested else {
            return Ok(self.registry.default_models()?);
        };
        let known: HashSet<ModelId> = self.registry.models()?.into_iter().collect();
        let mut seen = HashSet::new();
        let mut models = Vec::with_capacity(requested.len());
        for model in requested {
            if !known.contains(model) {
                return Err(EngineError::UnknownModel(model.clone()));
            }
            if seen.insert(model) {
                models.push(model.clone());
            }
        }
        Ok(models)
    }
}

/// Turn one instance into an object record plus its attachment blobs.
///
/// Fields are driven by the declared descriptors. A scalar the instance does
/// not carry is written as null. A relation field the instance does not
/// carry makes the whole instance unencodable.
fn encode_instance(
    model: &ModelId,
    fields: &[FieldDescriptor],
    instance: &Instance,
    include_attachments: bool,
) -> Result<(ObjectRecord, Vec<AttachmentBlob>), String> {
    let mut record = ObjectRecord::new(model.clone(), instance.pk);
    let mut blobs = Vec::new();

    for field in fields {
        let name = &field.name;
        match &field.kind {
            FieldKind::Scalar { value: kind } => {
                let encoded = match instance.scalars.get(name) {
                    Some(value) => {
                        ValueCodec::encode_field(name, value, kind).map_err(|e| e.to_string())?
                    }
                    None => serde_json::Value::Null,
                };
                record.scalar_fields.insert(name.clone(), encoded);
            }
            FieldKind::Attachment => {
                if !include_attachments {
                    continue;
                }
                if let Some(attachment) = instance.attachments.get(name) {
                    layout::check_field_name(name)
                        .map_err(|e| format!("attachment field cannot be archived: {e}"))?;
                    blobs.push(AttachmentBlob {
                        owner_model_id: model.clone(),
                        owner_original_pk: instance.pk,
                        field_name: name.clone(),
                        filename: attachment.filename.clone(),
                        bytes: attachment.bytes.clone(),
                    });
                }
            }
            FieldKind::SingleRef { .. } => {
                let target = instance
                    .single_refs
                    .get(name)
                    .ok_or_else(|| format!("relation field `{name}` is missing"))?;
                record.single_refs.insert(name.clone(), *target);
            }
            FieldKind::ArrayRef { .. } | FieldKind::ManyToMany { .. } => {
                let targets = instance
                    .multi_refs
                    .get(name)
                    .ok_or_else(|| format!("relation field `{name}` is missing"))?;
                record.array_refs.insert(name.clone(), targets.clone());
            }
        }
    }
    Ok((record, blobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{grc_registry, model, seed_chain};
    use arca_archive::ArchiveReader;
    use arca_codec::Value;
    use arca_registry::{Attachment, InMemoryRegistry, RegistryError};
    use chrono::Duration;

    fn read(bytes: &[u8]) -> ArchiveReader {
        ArchiveReader::from_bytes(bytes).unwrap()
    }

    #[test]
    fn full_backup_covers_every_model() {
        let registry = grc_registry();
        let chain = seed_chain(&registry);

        let outcome = Writer::new(&registry).write(&WriteOptions::default()).unwrap();
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.manifest.object_count, 3);
        assert_eq!(outcome.manifest.per_model_counts.len(), 3);

        let archive = read(&outcome.bytes);
        let control = archive
            .objects()
            .iter()
            .find(|r| r.original_primary_key == chain.control)
            .unwrap();
        assert_eq!(control.single_refs["framework"], Some(chain.framework));
        assert_eq!(control.scalar_fields["name"], serde_json::json!("A.5.1"));
        assert_eq!(archive.attachments().len(), 1);
    }

    #[test]
    fn attachments_can_be_left_out() {
        let registry = grc_registry();
        seed_chain(&registry);
        let options = WriteOptions {
            include_attachments: false,
            ..WriteOptions::default()
        };
        let outcome = Writer::new(&registry).write(&options).unwrap();
        assert_eq!(outcome.manifest.attachment_count, 0);
        assert!(read(&outcome.bytes).attachments().is_empty());
    }

    #[test]
    fn requested_models_limit_the_archive() {
        let registry = grc_registry();
        seed_chain(&registry);
        let options = WriteOptions {
            models: Some(vec![model("core.framework"), model("core.framework")]),
            ..WriteOptions::default()
        };
        let outcome = Writer::new(&registry).write(&options).unwrap();
        assert_eq!(outcome.manifest.object_count, 1);
    }

    #[test]
    fn unknown_requested_model_is_fatal() {
        let registry = grc_registry();
        let options = WriteOptions {
            models: Some(vec![model("core.nope")]),
            ..WriteOptions::default()
        };
        let err = Writer::new(&registry).write(&options).unwrap_err();
        assert!(matches!(err, EngineError::UnknownModel(m) if m == model("core.nope")));
    }

    #[test]
    fn unavailable_registry_is_fatal() {
        let registry = grc_registry();
        registry.set_offline(true);
        let err = Writer::new(&registry).write(&WriteOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Registry(RegistryError::Unavailable(_))));
    }

    #[test]
    fn unencodable_instance_becomes_warning() {
        let registry = grc_registry();
        let chain = seed_chain(&registry);
        // A text field holding an integer cannot be encoded.
        let bad = PrimaryKey::generate();
        registry
            .insert(
                &model("core.framework"),
                Instance::new(bad).with_scalar("name", Value::Integer(7)),
            )
            .unwrap();

        let outcome = Writer::new(&registry).write(&WriteOptions::default()).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].pk, bad);
        assert_eq!(outcome.manifest.object_count, 3);
        assert!(read(&outcome.bytes)
            .objects()
            .iter()
            .all(|r| r.original_primary_key != bad));
        assert!(read(&outcome.bytes)
            .objects()
            .iter()
            .any(|r| r.original_primary_key == chain.framework));
    }

    #[test]
    fn missing_relation_field_excludes_instance() {
        let registry = grc_registry();
        seed_chain(&registry);
        let orphan = PrimaryKey::generate();
        registry
            .insert(
                &model("core.control"),
                Instance::new(orphan).with_scalar("name", "A.9"),
            )
            .unwrap();
        let outcome = Writer::new(&registry).write(&WriteOptions::default()).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].message.contains("framework"));
        assert!(outcome.warnings[0].to_string().starts_with("core.control:"));
    }

    #[test]
    fn since_filters_tracked_instances() {
        let registry = InMemoryRegistry::new();
        registry.register_model(
            model("core.framework"),
            vec![arca_types::FieldDescriptor::scalar(
                "name",
                arca_types::ValueKind::Text,
            )],
        );
        let now = Utc::now();
        for (name, age) in [("old", 10), ("new", 0)] {
            registry
                .insert(
                    &model("core.framework"),
                    Instance::new(PrimaryKey::generate())
                        .with_scalar("name", name)
                        .with_updated_at(now - Duration::minutes(age)),
                )
                .unwrap();
        }
        let options = WriteOptions {
            since: Some(now - Duration::minutes(1)),
            ..WriteOptions::default()
        };
        let outcome = Writer::new(&registry).write(&options).unwrap();
        assert_eq!(outcome.manifest.object_count, 1);
        assert_eq!(outcome.manifest.since, options.since);
    }

    #[test]
    fn attachment_filename_is_sanitized() {
        let registry = grc_registry();
        let chain = seed_chain(&registry);
        let mut row = registry
            .fetch(&model("core.applied"), &chain.applied)
            .unwrap()
            .unwrap();
        row.attachments
            .insert("evidence".into(), Attachment::new("../../etc/shadow", b"x".to_vec()));
        registry.insert(&model("core.applied"), row).unwrap();

        let outcome = Writer::new(&registry).write(&WriteOptions::default()).unwrap();
        let archive = read(&outcome.bytes);
        assert_eq!(archive.attachments()[0].filename, "shadow");
    }

    #[test]
    fn unplaceable_attachment_field_is_a_warning() {
        let registry = InMemoryRegistry::new();
        let evidence = model("core.evidence");
        registry.register_model(
            evidence.clone(),
            vec![
                FieldDescriptor::scalar("name", arca_types::ValueKind::Text),
                FieldDescriptor::attachment("files/main"),
            ],
        );
        let kept = PrimaryKey::generate();
        let dropped = PrimaryKey::generate();
        registry
            .insert(&evidence, Instance::new(kept).with_scalar("name", "no file"))
            .unwrap();
        registry
            .insert(
                &evidence,
                Instance::new(dropped)
                    .with_scalar("name", "scan")
                    .with_attachment("files/main", Attachment::new("a.pdf", b"pdf".to_vec())),
            )
            .unwrap();

        let outcome = Writer::new(&registry).write(&WriteOptions::default()).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].pk, dropped);
        let archive = read(&outcome.bytes);
        assert_eq!(archive.objects().len(), 1);
        assert_eq!(archive.objects()[0].original_primary_key, kept);
        assert!(archive.attachments().is_empty());
    }
}
