use std::collections::{HashMap, HashSet};

use arca_types::{ObjectRecord, PrimaryKey, RecordKey};

/// Original `(model, pk)` to the primary key the record gets in the target
/// registry.
///
/// Built once, before any record is created, so that every reference
/// (including references a record makes to itself) can be rewritten without
/// waiting for its target.
#[derive(Clone, Debug, Default)]
pub struct IdMapping {
    map: HashMap<RecordKey, PrimaryKey>,
    preserve: bool,
}

impl IdMapping {
    /// Map every record to itself.
    pub fn preserving<'r>(records: impl IntoIterator<Item = &'r ObjectRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.key(), r.original_primary_key))
            .collect();
        Self {
            map,
            preserve: true,
        }
    }

    /// Map every record to a freshly generated key.
    pub fn regenerating<'r>(records: impl IntoIterator<Item = &'r ObjectRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.key(), PrimaryKey::generate()))
            .collect();
        Self {
            map,
            preserve: false,
        }
    }

    /// Identity or fresh keys, depending on `preserve_ids`.
    pub fn build(records: &[ObjectRecord], preserve_ids: bool) -> Self {
        if preserve_ids {
            Self::preserving(records)
        } else {
            Self::regenerating(records)
        }
    }

    /// Target key for an archived record, if it is part of this mapping.
    pub fn get(&self, key: &RecordKey) -> Option<PrimaryKey> {
        self.map.get(key).copied()
    }

    /// Whether the record belongs to the archive being restored.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.map.contains_key(key)
    }

    /// Record the key a registry actually assigned.
    pub(crate) fn rebind(&mut self, key: &RecordKey, pk: PrimaryKey) {
        if let Some(slot) = self.map.get_mut(key) {
            *slot = pk;
        }
    }

    pub fn preserves_ids(&self) -> bool {
        self.preserve
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// No two records of the same model map to the same key.
    pub fn is_bijective(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.map.len());
        self.map
            .iter()
            .all(|(key, pk)| seen.insert((&key.model, *pk)))
    }

    /// Every `(original, target)` pair, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &PrimaryKey)> {
        self.map.iter()
    }
}
