//! The fact store (spec §4.1): entities, signals, relations, behind a small
//! API surface. Mutations are single-threaded within a stage; once a stage
//! closes its writes are immutable and free to share across reader threads
//! (spec §5 "Shared-resource policy").

pub mod artifacts;
pub mod entity;
pub mod kernel;
pub mod registry;
pub mod relation;
pub mod signal;

use std::collections::BTreeMap;

use artifacts::ArtifactBag;
use entity::{Author, Codebase, Commit, EntityId, File, Module};
use relation::{Relation, RelationStore, RelationType};
use signal::{SignalValue, SignalVector};

#[derive(Debug, Default, Clone)]
pub struct FactStore {
    pub codebase: Option<Codebase>,
    pub modules: BTreeMap<String, Module>,
    pub files: BTreeMap<String, File>,
    pub authors: BTreeMap<String, Author>,
    pub commits: BTreeMap<String, Commit>,

    signals: std::collections::HashMap<EntityId, SignalVector>,
    pub relations: RelationStore,

    /// Structured per-file intermediate artifacts (parsed syntax trees,
    /// semantic token indices) that don't fit the scalar signal model —
    /// spec §9's "dynamic attribute bags" generalized to whole data
    /// structures rather than single values. Consumed by the stage that
    /// produced them and any downstream reader; never serialized into a
    /// snapshot.
    pub artifacts: ArtifactBag,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.codebase
            .iter()
            .map(|_| EntityId::Codebase)
            .chain(self.modules.keys().map(|n| EntityId::Module(n.clone())))
            .chain(self.files.keys().map(|p| EntityId::File(p.clone())))
            .chain(self.authors.keys().map(|e| EntityId::Author(e.clone())))
            .chain(self.commits.keys().map(|h| EntityId::Commit(h.clone())))
    }

    pub fn file_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.files.keys().map(|p| EntityId::File(p.clone()))
    }

    pub fn module_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.modules.keys().map(|n| EntityId::Module(n.clone()))
    }

    pub fn get_signal(&self, entity: &EntityId, name: &str) -> Option<&SignalValue> {
        self.signals.get(entity).and_then(|v| v.get(name))
    }

    pub fn get_signal_f64(&self, entity: &EntityId, name: &str) -> Option<f64> {
        self.get_signal(entity, name).and_then(|v| v.as_f64())
    }

    /// Signals are written exactly once per snapshot (spec §3 Lifecycles).
    /// Re-setting the same (entity, name) pair within a run is a logic bug;
    /// we overwrite rather than panic to keep the kernel resilient to a
    /// mis-ordered retry, but this path is not expected to be hit.
    pub fn set_signal(&mut self, entity: EntityId, name: &'static str, value: SignalValue) {
        self.signals.entry(entity).or_default().set(name, value);
    }

    pub fn add_relation(&mut self, rel: Relation) {
        self.relations.add(rel);
    }

    pub fn relations_of(&self, kind: RelationType) -> impl Iterator<Item = &Relation> {
        self.relations.by_type(kind)
    }

    /// All signal values recorded for `name` across every entity of `scope`
    /// — the input to percentile ranking (spec §4.6).
    pub fn signal_column(&self, ids: &[EntityId], name: &str) -> Vec<(EntityId, f64)> {
        ids.iter()
            .filter_map(|id| self.get_signal_f64(id, name).map(|v| (id.clone(), v)))
            .collect()
    }

    /// Union `other`'s new entities, signals, and relations into `self`.
    /// Safe because each stage (and so each chain) owns a disjoint write
    /// scope (spec §5 "write-partitioned"): the structural and temporal
    /// chains never write the same signal name, so there is nothing to
    /// reconcile beyond a plain union.
    pub fn merge_from(&mut self, other: FactStore) {
        self.modules.extend(other.modules);
        self.authors.extend(other.authors);
        self.commits.extend(other.commits);
        for (entity, vector) in other.signals {
            for (name, value) in vector.iter() {
                self.signals.entry(entity.clone()).or_default().set(name, value.clone());
            }
        }
        for kind in [
            RelationType::Imports,
            RelationType::CochangesWith,
            RelationType::SimilarTo,
            RelationType::AuthoredBy,
            RelationType::InModule,
            RelationType::Contains,
            RelationType::DependsOn,
            RelationType::ClonedFrom,
        ] {
            for rel in other.relations.by_type(kind) {
                self.relations.add(rel.clone());
            }
        }
        self.artifacts.merge(other.artifacts);
    }
}
