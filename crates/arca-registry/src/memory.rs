use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use arca_codec::ValueCodec;
use arca_types::{FieldDescriptor, FieldKind, ModelId, PrimaryKey};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::instance::{Attachment, Instance, InstanceWrite};
use crate::traits::ModelRegistry;

/// Storage for one model.
#[derive(Clone, Debug)]
pub(crate) struct ModelTable {
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) tracks_modification: bool,
    pub(crate) rows: BTreeMap<PrimaryKey, Instance>,
}

impl ModelTable {
    fn field(&self, model: &ModelId, name: &str) -> RegistryResult<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| RegistryError::UnknownField {
                model: model.clone(),
                field: name.to_string(),
            })
    }
}

#[derive(Default)]
pub(crate) struct RegistryState {
    /// Registration order; also the default backup order.
    pub(crate) order: Vec<ModelId>,
    pub(crate) tables: HashMap<ModelId, ModelTable>,
    offline: bool,
}

impl RegistryState {
    fn table(&self, model: &ModelId) -> RegistryResult<&ModelTable> {
        self.tables
            .get(model)
            .ok_or_else(|| RegistryError::UnknownModel(model.clone()))
    }

    fn table_mut(&mut self, model: &ModelId) -> RegistryResult<&mut ModelTable> {
        self.tables
            .get_mut(model)
            .ok_or_else(|| RegistryError::UnknownModel(model.clone()))
    }

    fn contains(&self, model: &ModelId, pk: &PrimaryKey) -> bool {
        self.tables
            .get(model)
            .is_some_and(|t| t.rows.contains_key(pk))
    }

    fn require_target(
        &self,
        model: &ModelId,
        field: &str,
        target_model: &ModelId,
        target_pk: &PrimaryKey,
    ) -> RegistryResult<()> {
        if self.contains(target_model, target_pk) {
            Ok(())
        } else {
            Err(RegistryError::DanglingReference {
                model: model.clone(),
                field: field.to_string(),
                target_model: target_model.clone(),
                target_pk: *target_pk,
            })
        }
    }

    /// Check a create/update payload against the model's declared fields and
    /// the current contents of the store.
    fn validate_write(&self, model: &ModelId, write: &InstanceWrite) -> RegistryResult<()> {
        let table = self.table(model)?;
        let violation = |reason: String| RegistryError::ConstraintViolation {
            model: model.clone(),
            pk: write.pk,
            reason,
        };

        for (name, value) in &write.scalars {
            match &table.field(model, name)?.kind {
                FieldKind::Scalar { value: kind } => {
                    ValueCodec::encode_field(name, value, kind)
                        .map_err(|e| violation(e.to_string()))?;
                }
                other => {
                    return Err(violation(format!(
                        "{name} is a {} field, not a scalar",
                        other.label()
                    )))
                }
            }
        }

        for (name, target) in &write.single_refs {
            let field = table.field(model, name)?;
            let FieldKind::SingleRef {
                target: target_model,
            } = &field.kind
            else {
                return Err(violation(format!(
                    "{name} is a {} field, not a single reference",
                    field.kind.label()
                )));
            };
            if let Some(target_pk) = target {
                let is_self = target_model == model && *target_pk == write.pk;
                if !is_self {
                    self.require_target(model, name, target_model, target_pk)?;
                }
            }
        }

        for field in table.fields.iter().filter(|f| !f.nullable) {
            let missing = match &field.kind {
                FieldKind::Scalar { .. } => write
                    .scalars
                    .get(&field.name)
                    .map_or(true, |v| v.is_null()),
                FieldKind::SingleRef { .. } => write
                    .single_refs
                    .get(&field.name)
                    .map_or(true, Option::is_none),
                _ => false,
            };
            if missing {
                return Err(violation(format!("{} is required", field.name)));
            }
        }
        Ok(())
    }
}

/// In-memory, table-per-model registry.
///
/// Intended for tests, embedding and the CLI's fixture stores. Tables live
/// behind a `RwLock`; instances are cloned on read and write. Relation writes
/// are checked against the stored rows, so a caller that creates records out
/// of dependency order gets a [`RegistryError::DanglingReference`].
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    /// Create an empty registry with no models.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a model whose instances carry a modification time.
    pub fn register_model(&self, model: ModelId, fields: Vec<FieldDescriptor>) {
        self.register(model, fields, true);
    }

    /// Register a model without a modification time. Incremental backups
    /// always include such models in full.
    pub fn register_untracked_model(&self, model: ModelId, fields: Vec<FieldDescriptor>) {
        self.register(model, fields, false);
    }

    pub(crate) fn register(
        &self,
        model: ModelId,
        fields: Vec<FieldDescriptor>,
        tracks_modification: bool,
    ) {
        let mut state = self.state.write().expect("lock poisoned");
        if !state.tables.contains_key(&model) {
            state.order.push(model.clone());
        }
        state.tables.insert(
            model,
            ModelTable {
                fields,
                tracks_modification,
                rows: BTreeMap::new(),
            },
        );
    }

    /// Seed an instance directly, bypassing relation checks.
    ///
    /// Field names must be declared. A missing `updated_at` on a tracked
    /// model is stamped with the current time.
    pub fn insert(&self, model: &ModelId, mut instance: Instance) -> RegistryResult<()> {
        let mut state = self.write()?;
        let table = state.table_mut(model)?;
        let names = instance
            .scalars
            .keys()
            .chain(instance.single_refs.keys())
            .chain(instance.multi_refs.keys())
            .chain(instance.attachments.keys());
        for name in names {
            table.field(model, name)?;
        }
        if table.tracks_modification && instance.updated_at.is_none() {
            instance.updated_at = Some(Utc::now());
        }
        table.rows.insert(instance.pk, instance);
        Ok(())
    }

    /// Simulate an unreachable backend: every operation fails with
    /// [`RegistryError::Unavailable`] while set.
    pub fn set_offline(&self, offline: bool) {
        self.state.write().expect("lock poisoned").offline = offline;
    }

    /// Total number of rows across all models.
    pub fn total_rows(&self) -> usize {
        let state = self.state.read().expect("lock poisoned");
        state.tables.values().map(|t| t.rows.len()).sum()
    }

    /// Remove every row, keeping the registered models.
    pub fn clear_rows(&self) {
        let mut state = self.state.write().expect("lock poisoned");
        for table in state.tables.values_mut() {
            table.rows.clear();
        }
    }

    pub(crate) fn read(&self) -> RegistryResult<RwLockReadGuard<'_, RegistryState>> {
        let state = self.state.read().expect("lock poisoned");
        if state.offline {
            return Err(RegistryError::Unavailable("in-memory registry is offline".into()));
        }
        Ok(state)
    }

    fn write(&self) -> RegistryResult<RwLockWriteGuard<'_, RegistryState>> {
        let state = self.state.write().expect("lock poisoned");
        if state.offline {
            return Err(RegistryError::Unavailable("in-memory registry is offline".into()));
        }
        Ok(state)
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn touch(table: &ModelTable, row: &mut Instance) {
    if table.tracks_modification {
        row.updated_at = Some(Utc::now());
    }
}

impl ModelRegistry for InMemoryRegistry {
    fn models(&self) -> RegistryResult<Vec<ModelId>> {
        Ok(self.read()?.order.clone())
    }

    fn list_fields(&self, model: &ModelId) -> RegistryResult<Vec<FieldDescriptor>> {
        Ok(self.read()?.table(model)?.fields.clone())
    }

    fn iterate(
        &self,
        model: &ModelId,
        since: Option<DateTime<Utc>>,
    ) -> RegistryResult<Vec<Instance>> {
        let state = self.read()?;
        let table = state.table(model)?;
        let since = since.filter(|_| table.tracks_modification);
        let rows: Vec<Instance> = table
            .rows
            .values()
            .filter(|row| match (since, row.updated_at) {
                (Some(since), Some(updated_at)) => updated_at >= since,
                _ => true,
            })
            .cloned()
            .collect();
        debug!(model = %model, rows = rows.len(), incremental = since.is_some(), "iterated model");
        Ok(rows)
    }

    fn fetch(&self, model: &ModelId, pk: &PrimaryKey) -> RegistryResult<Option<Instance>> {
        Ok(self.read()?.table(model)?.rows.get(pk).cloned())
    }

    fn exists(&self, model: &ModelId, pk: &PrimaryKey) -> RegistryResult<bool> {
        Ok(self.read()?.table(model)?.rows.contains_key(pk))
    }

    fn count(&self, model: &ModelId) -> RegistryResult<u64> {
        Ok(self.read()?.table(model)?.rows.len() as u64)
    }

    fn create_or_update(
        &self,
        model: &ModelId,
        write: &InstanceWrite,
    ) -> RegistryResult<PrimaryKey> {
        let mut state = self.write()?;
        state.validate_write(model, write)?;
        let table = state.table_mut(model)?;
        let mut row = table
            .rows
            .remove(&write.pk)
            .unwrap_or_else(|| Instance::new(write.pk));
        row.scalars = write.scalars.clone();
        row.single_refs = write.single_refs.clone();
        touch(table, &mut row);
        table.rows.insert(write.pk, row);
        Ok(write.pk)
    }

    fn set_single_ref(
        &self,
        model: &ModelId,
        pk: &PrimaryKey,
        field: &str,
        target: Option<PrimaryKey>,
    ) -> RegistryResult<()> {
        let mut state = self.write()?;
        let descriptor = state.table(model)?.field(model, field)?.clone();
        let FieldKind::SingleRef {
            target: target_model,
        } = &descriptor.kind
        else {
            return Err(RegistryError::UnknownField {
                model: model.clone(),
                field: field.to_string(),
            });
        };
        match target {
            Some(target_pk) => state.require_target(model, field, target_model, &target_pk)?,
            None if !descriptor.nullable => {
                return Err(RegistryError::ConstraintViolation {
                    model: model.clone(),
                    pk: *pk,
                    reason: format!("{field} is required"),
                })
            }
            None => {}
        }
        let table = state.table_mut(model)?;
        let mut row = table.rows.remove(pk).ok_or_else(|| RegistryError::NotFound {
            model: model.clone(),
            pk: *pk,
        })?;
        row.single_refs.insert(field.to_string(), target);
        touch(table, &mut row);
        table.rows.insert(*pk, row);
        Ok(())
    }

    fn set_many_to_many(
        &self,
        model: &ModelId,
        pk: &PrimaryKey,
        field: &str,
        targets: &[PrimaryKey],
    ) -> RegistryResult<()> {
        let mut state = self.write()?;
        let descriptor = state.table(model)?.field(model, field)?.clone();
        let target_model = match &descriptor.kind {
            FieldKind::ArrayRef { target } | FieldKind::ManyToMany { target } => target,
            _ => {
                return Err(RegistryError::UnknownField {
                    model: model.clone(),
                    field: field.to_string(),
                })
            }
        };
        for target_pk in targets {
            state.require_target(model, field, target_model, target_pk)?;
        }
        let table = state.table_mut(model)?;
        let mut row = table.rows.remove(pk).ok_or_else(|| RegistryError::NotFound {
            model: model.clone(),
            pk: *pk,
        })?;
        row.multi_refs.insert(field.to_string(), targets.to_vec());
        touch(table, &mut row);
        table.rows.insert(*pk, row);
        Ok(())
    }

    fn attach(
        &self,
        model: &ModelId,
        pk: &PrimaryKey,
        field: &str,
        filename: &str,
        bytes: &[u8],
    ) -> RegistryResult<()> {
        let mut state = self.write()?;
        let table = state.table_mut(model)?;
        if table.field(model, field)?.kind != FieldKind::Attachment {
            return Err(RegistryError::UnknownField {
                model: model.clone(),
                field: field.to_string(),
            });
        }
        let row = table.rows.get_mut(pk).ok_or_else(|| RegistryError::NotFound {
            model: model.clone(),
            pk: *pk,
        })?;
        row.attachments
            .insert(field.to_string(), Attachment::new(filename, bytes));
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        f.debug_struct("InMemoryRegistry")
            .field("models", &state.order)
            .field("rows", &state.tables.values().map(|t| t.rows.len()).sum::<usize>())
            .finish()
    }
}
