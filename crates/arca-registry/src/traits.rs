use arca_types::{FieldDescriptor, ModelId, PrimaryKey, Schema};
use chrono::{DateTime, Utc};

use crate::error::RegistryResult;
use crate::instance::{Instance, InstanceWrite};

/// Capability interface over a live database.
///
/// All implementations must satisfy these invariants:
/// - `list_fields` is the single source of truth for a model's shape.
/// - `iterate` never mutates the store.
/// - `create_or_update` returns the primary key the record ended up with.
/// - Relation writes only name records that exist at call time.
/// - Errors are propagated, never silently ignored.
pub trait ModelRegistry: Send + Sync {
    /// Every model the registry exposes.
    fn models(&self) -> RegistryResult<Vec<ModelId>>;

    /// Models included in a backup when the caller does not name any.
    ///
    /// Defaults to every model.
    fn default_models(&self) -> RegistryResult<Vec<ModelId>> {
        self.models()
    }

    /// Declared fields of a model.
    fn list_fields(&self, model: &ModelId) -> RegistryResult<Vec<FieldDescriptor>>;

    /// Collect the field descriptors of several models into a [`Schema`].
    fn schema(&self, models: &[ModelId]) -> RegistryResult<Schema> {
        let mut schema = Schema::new();
        for model in models {
            schema.insert(model.clone(), self.list_fields(model)?);
        }
        Ok(schema)
    }

    /// Instances of a model, optionally only those modified at or after
    /// `since`. Models without a modification time return every instance.
    fn iterate(
        &self,
        model: &ModelId,
        since: Option<DateTime<Utc>>,
    ) -> RegistryResult<Vec<Instance>>;

    /// Fetch one instance by primary key.
    fn fetch(&self, model: &ModelId, pk: &PrimaryKey) -> RegistryResult<Option<Instance>>;

    /// Whether a record exists.
    ///
    /// Default implementation calls `fetch()`. Backends may override with a
    /// cheaper existence query.
    fn exists(&self, model: &ModelId, pk: &PrimaryKey) -> RegistryResult<bool> {
        Ok(self.fetch(model, pk)?.is_some())
    }

    /// Number of stored instances of a model.
    fn count(&self, model: &ModelId) -> RegistryResult<u64>;

    /// Insert a record, or overwrite the scalars and single references of an
    /// existing one. Returns the effective primary key.
    fn create_or_update(&self, model: &ModelId, write: &InstanceWrite)
        -> RegistryResult<PrimaryKey>;

    /// Point a single-reference field at `target` (or clear it).
    fn set_single_ref(
        &self,
        model: &ModelId,
        pk: &PrimaryKey,
        field: &str,
        target: Option<PrimaryKey>,
    ) -> RegistryResult<()>;

    /// Replace the full target set of an array-of-reference or many-to-many
    /// field.
    fn set_many_to_many(
        &self,
        model: &ModelId,
        pk: &PrimaryKey,
        field: &str,
        targets: &[PrimaryKey],
    ) -> RegistryResult<()>;

    /// Store attachment content on an attachment field.
    fn attach(
        &self,
        model: &ModelId,
        pk: &PrimaryKey,
        field: &str,
        filename: &str,
        bytes: &[u8],
    ) -> RegistryResult<()>;
}
