use chrono::{DateTime, Utc};

use arca_registry::ModelRegistry;

use crate::error::EngineResult;
use crate::writer::{WriteOptions, WriteOutcome, Writer};

/// A [`Writer`] that only picks up instances modified at or after a fixed
/// instant.
///
/// Models whose registry backend does not track modification are written in
/// full. The manifest records `since`, so a restore can tell it is applying
/// an incremental layer.
pub struct IncrementalWriter<'a> {
    writer: Writer<'a>,
    since: DateTime<Utc>,
}

impl<'a> IncrementalWriter<'a> {
    pub fn new(registry: &'a dyn ModelRegistry, since: DateTime<Utc>) -> Self {
        Self {
            writer: Writer::new(registry),
            since,
        }
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Write an archive. Any `since` in `options` is replaced.
    pub fn write(&self, options: &WriteOptions) -> EngineResult<WriteOutcome> {
        let options = WriteOptions {
            since: Some(self.since),
            ..options.clone()
        };
        self.writer.write(&options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::model;
    use arca_registry::{InMemoryRegistry, Instance};
    use arca_types::{FieldDescriptor, PrimaryKey, ValueKind};
    use chrono::Duration;

    fn registry_at(t: DateTime<Utc>) -> (InMemoryRegistry, PrimaryKey) {
        let registry = InMemoryRegistry::new();
        registry.register_model(
            model("core.framework"),
            vec![FieldDescriptor::scalar("name", ValueKind::Text)],
        );
        registry.register_untracked_model(
            model("core.library"),
            vec![FieldDescriptor::scalar("urn", ValueKind::Text)],
        );
        let recent = PrimaryKey::generate();
        registry
            .insert(
                &model("core.framework"),
                Instance::new(PrimaryKey::generate())
                    .with_scalar("name", "before")
                    .with_updated_at(t - Duration::seconds(1)),
            )
            .unwrap();
        registry
            .insert(
                &model("core.framework"),
                Instance::new(recent)
                    .with_scalar("name", "after")
                    .with_updated_at(t + Duration::seconds(1)),
            )
            .unwrap();
        registry
            .insert(
                &model("core.library"),
                Instance::new(PrimaryKey::generate()).with_scalar("urn", "urn:lib"),
            )
            .unwrap();
        (registry, recent)
    }

    #[test]
    fn only_recent_tracked_instances_are_written() {
        let t = Utc::now();
        let (registry, recent) = registry_at(t);
        let outcome = IncrementalWriter::new(&registry, t)
            .write(&WriteOptions::default())
            .unwrap();

        assert_eq!(outcome.manifest.since, Some(t));
        assert!(outcome.manifest.is_incremental());
        assert_eq!(outcome.manifest.per_model_counts[&model("core.framework")], 1);
        // Untracked models are always written in full.
        assert_eq!(outcome.manifest.per_model_counts[&model("core.library")], 1);

        let archive = arca_archive::ArchiveReader::from_bytes(&outcome.bytes).unwrap();
        assert!(archive
            .objects()
            .iter()
            .any(|r| r.original_primary_key == recent));
    }

    #[test]
    fn caller_since_is_overridden() {
        let t = Utc::now();
        let (registry, _) = registry_at(t);
        let options = WriteOptions {
            since: Some(t - Duration::days(1)),
            ..WriteOptions::default()
        };
        let outcome = IncrementalWriter::new(&registry, t).write(&options).unwrap();
        assert_eq!(outcome.manifest.since, Some(t));
        assert_eq!(outcome.manifest.object_count, 2);
    }
}
