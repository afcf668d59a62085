use std::collections::HashSet;

use tracing::debug;

use arca_graph::DependencyGraph;
use arca_registry::ModelRegistry;
use arca_types::{FieldKind, ModelId, ObjectRecord, RecordKey, Schema};

use crate::error::{EngineError, EngineResult};

/// Result of the read-only pre-flight over a set of archived records.
///
/// Holds the registry schema for every model the records use and the
/// dependency levels they must be created in.
#[derive(Clone, Debug)]
pub struct RestorePlan {
    schema: Schema,
    graph: DependencyGraph,
    levels: Vec<Vec<RecordKey>>,
}

impl RestorePlan {
    /// Check `records` against the registry and order them.
    ///
    /// Every model must be known and every field must be declared with the
    /// shape the record stores it in; all mismatches are reported together
    /// as [`EngineError::Validation`]. A dependency cycle fails with
    /// [`EngineError::Graph`]. Nothing is written.
    pub fn prepare(registry: &dyn ModelRegistry, records: &[ObjectRecord]) -> EngineResult<Self> {
        let known: HashSet<ModelId> = registry.models()?.into_iter().collect();

        let mut models = Vec::new();
        let mut problems = Vec::new();
        for record in records {
            let model = &record.model_id;
            if models.contains(model) {
                continue;
            }
            if known.contains(model) {
                models.push(model.clone());
            } else {
                problems.push(format!("unknown model {model}"));
            }
        }
        let schema = registry.schema(&models)?;

        for record in records.iter().filter(|r| schema.contains(&r.model_id)) {
            problems.extend(field_problems(&schema, record));
        }
        if !problems.is_empty() {
            return Err(EngineError::Validation(problems));
        }

        let graph = DependencyGraph::build(records, &schema);
        let levels = graph.levels()?;
        debug!(
            records = graph.len(),
            edges = graph.edge_count(),
            levels = levels.len(),
            "restore plan ready"
        );
        Ok(Self {
            schema,
            graph,
            levels,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Groups of records with no dependencies among themselves, in creation
    /// order.
    pub fn levels(&self) -> &[Vec<RecordKey>] {
        &self.levels
    }

    /// Every record in creation order.
    pub fn order(&self) -> impl Iterator<Item = &RecordKey> {
        self.levels.iter().flatten()
    }
}

/// Fields of `record` that its model does not declare, or declares with a
/// different shape.
fn field_problems(schema: &Schema, record: &ObjectRecord) -> Vec<String> {
    let key = record.key();
    let model = &record.model_id;
    let mut problems = Vec::new();
    let mut check = |name: &str, stored_as: &str, accepts: fn(&FieldKind) -> bool| {
        match schema.field(model, name) {
            None => problems.push(format!("{key}: field `{name}` is not declared by {model}")),
            Some(field) if !accepts(&field.kind) => problems.push(format!(
                "{key}: field `{name}` is a {} field but is stored as {stored_as}",
                field.kind.label()
            )),
            Some(_) => {}
        }
    };

    for name in record.scalar_fields.keys() {
        check(name, "a scalar", |k| matches!(k, FieldKind::Scalar { .. }));
    }
    for name in record.single_refs.keys() {
        check(name, "a single reference", |k| matches!(k, FieldKind::SingleRef { .. }));
    }
    for name in record.array_refs.keys() {
        check(name, "a reference list", FieldKind::is_multi_ref);
    }
    problems
}
