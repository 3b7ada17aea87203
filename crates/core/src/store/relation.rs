//! Typed relation edges (spec §3): eight kinds, directed or symmetric.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Imports,
    CochangesWith,
    SimilarTo,
    AuthoredBy,
    InModule,
    Contains,
    DependsOn,
    ClonedFrom,
}

impl RelationType {
    /// Symmetric relations store one canonical direction plus a reverse
    /// index (spec §3 invariant); directed ones have a single meaningful
    /// orientation.
    pub fn is_symmetric(self) -> bool {
        matches!(
            self,
            RelationType::CochangesWith | RelationType::SimilarTo | RelationType::ClonedFrom
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CochangeMeta {
    pub count: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationMeta {
    pub cochange: Option<CochangeMeta>,
    pub commit_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationType,
    pub from: EntityId,
    pub to: EntityId,
    pub weight: f64,
    pub meta: RelationMeta,
}

/// Canonical ordering for symmetric edges so exactly one direction is stored
/// (spec §3 invariant).
fn canonical_order(a: &EntityId, b: &EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RelationStore {
    relations: Vec<Relation>,
    by_type: HashMap<RelationType, Vec<usize>>,
    outgoing: HashMap<(EntityId, RelationType), Vec<usize>>,
    incoming: HashMap<(EntityId, RelationType), Vec<usize>>,
}

impl RelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relations accumulate monotonically within a snapshot (spec §3
    /// Lifecycles) — no remove/update API is exposed.
    pub fn add(&mut self, mut rel: Relation) {
        if rel.kind.is_symmetric() {
            let (a, b) = canonical_order(&rel.from, &rel.to);
            rel.from = a;
            rel.to = b;
        }
        let idx = self.relations.len();
        self.by_type.entry(rel.kind).or_default().push(idx);
        self.outgoing.entry((rel.from.clone(), rel.kind)).or_default().push(idx);
        self.incoming.entry((rel.to.clone(), rel.kind)).or_default().push(idx);
        if rel.kind.is_symmetric() {
            self.outgoing.entry((rel.to.clone(), rel.kind)).or_default().push(idx);
            self.incoming.entry((rel.from.clone(), rel.kind)).or_default().push(idx);
        }
        self.relations.push(rel);
    }

    pub fn by_type(&self, kind: RelationType) -> impl Iterator<Item = &Relation> {
        self.by_type.get(&kind).into_iter().flatten().map(move |&i| &self.relations[i])
    }

    /// Outgoing edges from `entity` of `kind` (or reverse index for a
    /// symmetric relation where `entity` is the canonical `to`).
    pub fn outgoing(&self, entity: &EntityId, kind: RelationType) -> Vec<&Relation> {
        self.outgoing
            .get(&(entity.clone(), kind))
            .into_iter()
            .flatten()
            .map(|&i| &self.relations[i])
            .collect()
    }

    pub fn incoming(&self, entity: &EntityId, kind: RelationType) -> Vec<&Relation> {
        self.incoming
            .get(&(entity.clone(), kind))
            .into_iter()
            .flatten()
            .map(|&i| &self.relations[i])
            .collect()
    }

    pub fn has(&self, from: &EntityId, to: &EntityId, kind: RelationType) -> bool {
        self.outgoing(from, kind).iter().any(|r| &r.to == to || (&r.from == to && kind.is_symmetric()))
    }

    pub fn weight(&self, from: &EntityId, to: &EntityId, kind: RelationType) -> Option<f64> {
        self.outgoing(from, kind)
            .into_iter()
            .find(|r| &r.to == to || (&r.from == to && kind.is_symmetric()))
            .map(|r| r.weight)
    }

    /// Dense adjacency matrix over an explicit ordered set of entities, for
    /// algorithms (Laplacian, spectral gap) that want matrix form directly.
    pub fn adjacency_matrix(&self, entities: &[EntityId], kind: RelationType) -> Vec<Vec<f64>> {
        let index: HashMap<&EntityId, usize> =
            entities.iter().enumerate().map(|(i, e)| (e, i)).collect();
        let n = entities.len();
        let mut m = vec![vec![0.0; n]; n];
        for rel in self.by_type(kind) {
            if let (Some(&i), Some(&j)) = (index.get(&rel.from), index.get(&rel.to)) {
                m[i][j] = rel.weight;
                if kind.is_symmetric() {
                    m[j][i] = rel.weight;
                }
            }
        }
        m
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}
