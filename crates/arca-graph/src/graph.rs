//! The record dependency graph and its creation order.
//!
//! Nodes are the records of one archive, identified by [`RecordKey`]. An
//! edge `target -> dependent` exists when the dependent holds a single or
//! array reference to a target that is also in the archive.
//!
//! # Invariants
//!
//! - References to records outside the archive add no edge.
//! - Many-to-many links add no edge; they are wired after every record
//!   exists.
//! - A record referencing itself adds no edge; its key is planned before
//!   any record is created.
//! - Ready records are emitted lowest archive position first, so the order
//!   is a deterministic function of the archive.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use arca_types::{ObjectRecord, RecordKey, Schema};

use crate::error::{GraphError, GraphResult};

/// Dependencies between the records of one archive.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    /// Nodes in archive order.
    nodes: Vec<RecordKey>,
    index: HashMap<RecordKey, usize>,
    /// Per node: the nodes it references, deduplicated.
    parents: Vec<Vec<usize>>,
    /// Per node: the nodes that reference it.
    children: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph for `records`, reading field kinds from `schema`.
    ///
    /// A record whose `(model, pk)` repeats an earlier one is ignored.
    /// Fields the schema does not declare as single or array references
    /// contribute no edges.
    pub fn build(records: &[ObjectRecord], schema: &Schema) -> Self {
        let mut graph = Self::default();
        for record in records {
            let key = record.key();
            if graph.index.contains_key(&key) {
                continue;
            }
            graph.index.insert(key.clone(), graph.nodes.len());
            graph.nodes.push(key);
        }
        graph.parents = vec![Vec::new(); graph.nodes.len()];
        graph.children = vec![Vec::new(); graph.nodes.len()];

        for record in records {
            let Some(&node) = graph.index.get(&record.key()) else {
                continue;
            };
            let single = record
                .single_refs
                .iter()
                .filter_map(|(field, target)| target.map(|pk| (field, pk)));
            let multi = record
                .array_refs
                .iter()
                .flat_map(|(field, targets)| targets.iter().map(move |pk| (field, *pk)));

            for (field, target_pk) in single.chain(multi) {
                let Some(descriptor) = schema.field(&record.model_id, field) else {
                    continue;
                };
                if !descriptor.kind.orders_creation() {
                    continue;
                }
                let Some(target_model) = descriptor.kind.relation_target() else {
                    continue;
                };
                let target_key = RecordKey::new(target_model.clone(), target_pk);
                let Some(&target) = graph.index.get(&target_key) else {
                    continue;
                };
                if target == node || graph.parents[node].contains(&target) {
                    continue;
                }
                graph.parents[node].push(target);
                graph.children[target].push(node);
            }
        }

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        graph
    }

    /// Number of records in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no records.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct dependency edges.
    pub fn edge_count(&self) -> usize {
        self.parents.iter().map(Vec::len).sum()
    }

    /// Whether `key` is a record of this archive.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    /// Records that `key` references within the archive.
    pub fn dependencies_of(&self, key: &RecordKey) -> Option<Vec<&RecordKey>> {
        let node = *self.index.get(key)?;
        Some(self.parents[node].iter().map(|&p| &self.nodes[p]).collect())
    }

    /// Records within the archive that reference `key`.
    pub fn dependents_of(&self, key: &RecordKey) -> Option<Vec<&RecordKey>> {
        let node = *self.index.get(key)?;
        Some(self.children[node].iter().map(|&c| &self.nodes[c]).collect())
    }

    // ---------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------

    /// Every record, each after all the records it references.
    ///
    /// Uses Kahn's algorithm. Fails with [`GraphError::CircularDependency`]
    /// naming the records on or between cycles when no order exists.
    pub fn topological_order(&self) -> GraphResult<Vec<RecordKey>> {
        Ok(self
            .levels()?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Records grouped into waves: every record in a wave only references
    /// records of earlier waves. Records within one wave are independent of
    /// each other.
    pub fn levels(&self) -> GraphResult<Vec<Vec<RecordKey>>> {
        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&n| in_degree[n] == 0)
            .collect();

        let mut levels = Vec::new();
        let mut emitted = 0;
        while !ready.is_empty() {
            let wave = std::mem::take(&mut ready);
            for &node in &wave {
                for &child in &self.children[node] {
                    in_degree[child] -= 1;
                    if in_degree[child] == 0 {
                        ready.insert(child);
                    }
                }
            }
            emitted += wave.len();
            levels.push(wave.into_iter().map(|n| self.nodes[n].clone()).collect());
        }

        if emitted < self.nodes.len() {
            let nodes = self.cycle_members(&in_degree);
            warn!(records = nodes.len(), "dependency cycle detected");
            return Err(GraphError::CircularDependency { nodes });
        }
        Ok(levels)
    }

    /// Narrow the records Kahn's algorithm could not emit to those on or
    /// between cycles.
    ///
    /// The leftovers are cycle members plus everything downstream of them.
    /// Repeatedly dropping leftovers that no other leftover depends on
    /// removes the purely downstream records.
    fn cycle_members(&self, in_degree: &[usize]) -> Vec<RecordKey> {
        let mut alive: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
        let mut out_degree: Vec<usize> = (0..self.nodes.len())
            .map(|n| {
                if alive[n] {
                    self.children[n].iter().filter(|&&c| alive[c]).count()
                } else {
                    0
                }
            })
            .collect();

        let mut sinks: Vec<usize> = (0..self.nodes.len())
            .filter(|&n| alive[n] && out_degree[n] == 0)
            .collect();
        while let Some(node) = sinks.pop() {
            alive[node] = false;
            for &parent in &self.parents[node] {
                if alive[parent] {
                    out_degree[parent] -= 1;
                    if out_degree[parent] == 0 {
                        sinks.push(parent);
                    }
                }
            }
        }

        let mut members: Vec<RecordKey> = (0..self.nodes.len())
            .filter(|&n| alive[n])
            .map(|n| self.nodes[n].clone())
            .collect();
        members.sort();
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_types::{FieldDescriptor, ModelId, PrimaryKey, ValueKind};
    use proptest::prelude::*;

    fn model(name: &str) -> ModelId {
        ModelId::new(name).unwrap()
    }

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.insert(
            model("core.framework"),
            vec![FieldDescriptor::scalar("name", ValueKind::Text)],
        );
        schema.insert(
            model("core.control"),
            vec![
                FieldDescriptor::single_ref("framework", model("core.framework")),
                FieldDescriptor::single_ref("parent", model("core.control")).nullable(),
                FieldDescriptor::many_to_many("related", model("core.control")),
            ],
        );
        schema.insert(
            model("core.applied"),
            vec![
                FieldDescriptor::array_ref("controls", model("core.control")),
                FieldDescriptor::single_ref("next", model("core.applied")).nullable(),
                FieldDescriptor::single_ref("prior", model("core.applied")).nullable(),
            ],
        );
        schema
    }

    fn record(name: &str) -> ObjectRecord {
        ObjectRecord::new(model(name), PrimaryKey::generate())
    }

    fn single(mut r: ObjectRecord, field: &str, target: &ObjectRecord) -> ObjectRecord {
        r.single_refs
            .insert(field.into(), Some(target.original_primary_key));
        r
    }

    fn multi(mut r: ObjectRecord, field: &str, targets: &[&ObjectRecord]) -> ObjectRecord {
        r.array_refs.insert(
            field.into(),
            targets.iter().map(|t| t.original_primary_key).collect(),
        );
        r
    }

    fn position(order: &[RecordKey], r: &ObjectRecord) -> usize {
        order.iter().position(|k| *k == r.key()).unwrap()
    }

    // ---------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------

    #[test]
    fn chain_is_created_target_first() {
        let f1 = record("core.framework");
        let c1 = single(record("core.control"), "framework", &f1);
        let a1 = multi(record("core.applied"), "controls", &[&c1]);

        // Archive order deliberately reversed.
        let records = vec![a1.clone(), c1.clone(), f1.clone()];
        let graph = DependencyGraph::build(&records, &schema());
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![f1.key(), c1.key(), a1.key()]);
    }

    #[test]
    fn independent_records_keep_archive_order() {
        let records = vec![
            record("core.framework"),
            record("core.framework"),
            record("core.framework"),
        ];
        let graph = DependencyGraph::build(&records, &schema());
        let order = graph.topological_order().unwrap();
        let expected: Vec<RecordKey> = records.iter().map(ObjectRecord::key).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn diamond_levels() {
        let f = record("core.framework");
        let left = single(record("core.control"), "framework", &f);
        let right = single(record("core.control"), "framework", &f);
        let top = multi(record("core.applied"), "controls", &[&left, &right]);

        let graph = DependencyGraph::build(
            &[top.clone(), left.clone(), right.clone(), f.clone()],
            &schema(),
        );
        let levels = graph.levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec![f.key()]);
        assert_eq!(levels[1], vec![left.key(), right.key()]);
        assert_eq!(levels[2], vec![top.key()]);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn external_targets_add_no_edge() {
        let outside = record("core.framework");
        let c1 = single(record("core.control"), "framework", &outside);
        let graph = DependencyGraph::build(&[c1.clone()], &schema());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.topological_order().unwrap(), vec![c1.key()]);
    }

    #[test]
    fn many_to_many_adds_no_edge() {
        let c1 = record("core.control");
        let c2 = multi(record("core.control"), "related", &[&c1]);
        let c1 = multi(c1, "related", &[&c2]);
        let graph = DependencyGraph::build(&[c1, c2], &schema());
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.topological_order().is_ok());
    }

    #[test]
    fn self_reference_adds_no_edge() {
        let c1 = record("core.control");
        let c1 = single(c1.clone(), "parent", &c1);
        let graph = DependencyGraph::build(&[c1.clone()], &schema());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.topological_order().unwrap(), vec![c1.key()]);
    }

    #[test]
    fn duplicate_targets_are_one_edge() {
        let c1 = record("core.control");
        let a1 = multi(record("core.applied"), "controls", &[&c1, &c1]);
        let graph = DependencyGraph::build(&[a1.clone(), c1.clone()], &schema());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependencies_of(&a1.key()).unwrap(), vec![&c1.key()]);
        assert_eq!(graph.dependents_of(&c1.key()).unwrap(), vec![&a1.key()]);
    }

    #[test]
    fn undeclared_fields_are_ignored() {
        let f1 = record("core.framework");
        let c1 = single(record("core.control"), "owner", &f1);
        let graph = DependencyGraph::build(&[c1, f1], &schema());
        assert_eq!(graph.edge_count(), 0);
    }

    // ---------------------------------------------------------------
    // Cycles
    // ---------------------------------------------------------------

    #[test]
    fn two_record_cycle_names_both() {
        let r1 = record("core.applied");
        let r2 = single(record("core.applied"), "next", &r1);
        let r1 = single(r1, "next", &r2);

        let graph = DependencyGraph::build(&[r1.clone(), r2.clone()], &schema());
        let err = graph.topological_order().unwrap_err();
        let GraphError::CircularDependency { nodes } = err;
        let mut expected = vec![r1.key(), r2.key()];
        expected.sort();
        assert_eq!(nodes, expected);
    }

    #[test]
    fn downstream_records_are_not_blamed() {
        // r1 <-> r2 cycle; tail references r2 but nothing references tail.
        let r1 = record("core.applied");
        let r2 = single(record("core.applied"), "next", &r1);
        let r1 = single(r1, "next", &r2);
        let tail = single(record("core.applied"), "next", &r2);
        let f = record("core.framework");

        let graph = DependencyGraph::build(
            &[r1.clone(), r2.clone(), tail.clone(), f],
            &schema(),
        );
        let GraphError::CircularDependency { nodes } = graph.levels().unwrap_err();
        assert_eq!(nodes.len(), 2);
        assert!(!nodes.contains(&tail.key()));
    }

    #[test]
    fn record_between_two_cycles_is_blamed() {
        // c <-> d, x -> c, a <-> b, a -> x: x links the two cycles.
        let c = record("core.control");
        let d = single(record("core.control"), "parent", &c);
        let c = single(c, "parent", &d);
        let x = multi(record("core.applied"), "controls", &[&c]);
        let a = record("core.applied");
        let b = single(record("core.applied"), "next", &a);
        let a = single(single(a, "next", &b), "prior", &x);

        let graph = DependencyGraph::build(
            &[a.clone(), b.clone(), c.clone(), d.clone(), x.clone()],
            &schema(),
        );
        let GraphError::CircularDependency { nodes } = graph.topological_order().unwrap_err();
        assert_eq!(nodes.len(), 5);
        assert!(nodes.contains(&x.key()));
    }

    #[test]
    fn error_message_lists_records() {
        let r1 = record("core.applied");
        let r2 = single(record("core.applied"), "next", &r1);
        let r1 = single(r1, "next", &r2);
        let graph = DependencyGraph::build(&[r1, r2], &schema());
        let msg = graph.topological_order().unwrap_err().to_string();
        assert!(msg.starts_with("circular dependency among 2 records"));
        assert!(msg.contains("core.applied:"));
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    proptest! {
        /// Records that only reference earlier records always order, and
        /// every reference points backwards in the result.
        #[test]
        fn acyclic_inputs_respect_every_edge(
            links in proptest::collection::vec(proptest::option::of(any::<prop::sample::Index>()), 1..40)
        ) {
            let mut records: Vec<ObjectRecord> = Vec::new();
            for (i, link) in links.iter().enumerate() {
                let mut r = record("core.applied");
                if let (Some(idx), true) = (link, i > 0) {
                    let target = &records[idx.index(i)];
                    r = single(r, "next", target);
                }
                records.push(r);
            }
            records.reverse();

            let graph = DependencyGraph::build(&records, &schema());
            let order = graph.topological_order().unwrap();
            prop_assert_eq!(order.len(), records.len());
            for r in &records {
                if let Some(Some(target)) = r.single_refs.get("next") {
                    let t = RecordKey::new(r.model_id.clone(), *target);
                    prop_assert!(order.iter().position(|k| *k == t) < Some(position(&order, r)));
                }
            }
        }
    }
}
