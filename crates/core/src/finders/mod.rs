//! The finder engine (spec §4.7, IR6): declarative predicates over the
//! closed fact store, producing evidence-backed, ranked findings.

pub mod confidence;
pub mod patterns;

use std::collections::{BTreeSet, HashMap};

use crate::config::AnalysisConfig;
use crate::store::entity::EntityId;
use crate::store::relation::{Relation, RelationType};
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    File(String),
    FilePair(String, String),
    Module(String),
    ModulePair(String, String),
    Codebase,
}

impl Target {
    /// Sorted target identifiers, used for stable finding identity (spec §4.8).
    pub fn sorted_ids(&self) -> Vec<String> {
        match self {
            Target::File(f) => vec![f.clone()],
            Target::FilePair(a, b) => {
                let mut v = vec![a.clone(), b.clone()];
                v.sort();
                v
            }
            Target::Module(m) => vec![m.clone()],
            Target::ModulePair(a, b) => {
                let mut v = vec![a.clone(), b.clone()];
                v.sort();
                v
            }
            Target::Codebase => vec!["codebase".to_string()],
        }
    }

    fn file_a(&self) -> EntityId {
        match self {
            Target::File(f) => EntityId::File(f.clone()),
            Target::FilePair(a, _) => EntityId::File(a.clone()),
            _ => unreachable!("file_a called on non-file target"),
        }
    }

    fn file_b(&self) -> EntityId {
        match self {
            Target::FilePair(_, b) => EntityId::File(b.clone()),
            _ => unreachable!("file_b called on non-pair target"),
        }
    }

    fn module_a(&self) -> EntityId {
        match self {
            Target::Module(m) => EntityId::Module(m.clone()),
            Target::ModulePair(a, _) => EntityId::Module(a.clone()),
            _ => unreachable!("module_a called on non-module target"),
        }
    }

    fn module_b(&self) -> EntityId {
        match self {
            Target::ModulePair(_, b) => EntityId::Module(b.clone()),
            _ => unreachable!("module_b called on non-pair target"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScope {
    File,
    FilePair,
    Module,
    ModulePair,
    Codebase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct Evidence {
    pub ir_source: IrStage,
    pub signal: &'static str,
    pub value: SignalValue,
    pub percentile: Option<f64>,
    pub description: String,
}

/// What a pattern's evaluation produces on a hit: the per-condition margins
/// (confidence scoring, spec §4.7) and the evidence chain.
pub struct PatternMatch {
    pub margins: Vec<f64>,
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub pattern: &'static str,
    pub category: &'static str,
    pub target: Target,
    pub severity: f64,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub remediation: &'static str,
    pub effort: Effort,
}

pub struct Pattern {
    pub name: &'static str,
    pub scope: TargetScope,
    pub base_severity: f64,
    pub category: &'static str,
    pub phase: IrStage,
    pub hotspot: bool,
    pub remediation: &'static str,
    pub effort: Effort,
    pub evaluate: fn(&Target, &Context) -> Option<PatternMatch>,
}

/// Precomputed, pattern-shared inputs (spec §4.7 predicates reference
/// `pctl(signal)` directly; computed once per run rather than per pattern).
pub struct Context<'a> {
    pub store: &'a FactStore,
    pub pctl_pagerank: HashMap<EntityId, f64>,
    pub pctl_blast: HashMap<EntityId, f64>,
    pub pctl_cognitive: HashMap<EntityId, f64>,
    pub pctl_semantic_coherence: HashMap<EntityId, f64>,
    pub median_total_changes_non_test: f64,
    pub max_bus_factor: f64,
}

fn percentile(ids: &[EntityId], column: &[(EntityId, f64)]) -> HashMap<EntityId, f64> {
    let mut result = HashMap::new();
    if column.is_empty() {
        return result;
    }
    let n = column.len() as f64;
    for id in ids {
        if let Some(&(_, v)) = column.iter().find(|(i, _)| i == id) {
            let rank = column.iter().filter(|(_, x)| *x <= v).count() as f64;
            result.insert(id.clone(), rank / n);
        }
    }
    result
}

impl<'a> Context<'a> {
    pub fn build(store: &'a FactStore) -> Self {
        let file_ids: Vec<EntityId> = store.file_ids().collect();
        let pagerank_col = store.signal_column(&file_ids, "pagerank");
        let blast_col = store.signal_column(&file_ids, "blast_radius_size");
        let cognitive_col = store.signal_column(&file_ids, "cognitive_load");
        let coherence_col = store.signal_column(&file_ids, "semantic_coherence");
        let bus_factor_col = store.signal_column(&file_ids, "bus_factor");

        let mut non_test_changes: Vec<f64> = file_ids
            .iter()
            .filter(|id| !store.get_signal(id, "is_test").and_then(|v| v.as_bool()).unwrap_or(false))
            .filter_map(|id| store.get_signal_f64(id, "total_changes"))
            .collect();
        non_test_changes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median_total_changes_non_test = if non_test_changes.is_empty() {
            0.0
        } else if non_test_changes.len() % 2 == 1 {
            non_test_changes[non_test_changes.len() / 2]
        } else {
            (non_test_changes[non_test_changes.len() / 2 - 1] + non_test_changes[non_test_changes.len() / 2]) / 2.0
        };

        let max_bus_factor = bus_factor_col.iter().map(|(_, v)| *v).fold(1.0_f64, f64::max);

        Context {
            store,
            pctl_pagerank: percentile(&file_ids, &pagerank_col),
            pctl_blast: percentile(&file_ids, &blast_col),
            pctl_cognitive: percentile(&file_ids, &cognitive_col),
            pctl_semantic_coherence: percentile(&file_ids, &coherence_col),
            median_total_changes_non_test,
            max_bus_factor,
        }
    }

    pub fn total_changes(&self, id: &EntityId) -> f64 {
        self.store.get_signal_f64(id, "total_changes").unwrap_or(0.0)
    }

    pub fn find_relation(&self, a: &EntityId, b: &EntityId, kind: RelationType) -> Option<&'a Relation> {
        find_relation(self.store, a, b, kind)
    }
}

pub fn evidence(ir_source: IrStage, signal: &'static str, value: SignalValue, percentile: Option<f64>, description: impl Into<String>) -> Evidence {
    Evidence { ir_source, signal, value, percentile, description: description.into() }
}

fn find_relation<'a>(store: &'a FactStore, a: &EntityId, b: &EntityId, kind: RelationType) -> Option<&'a Relation> {
    store
        .relations
        .outgoing(a, kind)
        .into_iter()
        .find(|r| &r.to == b || (&r.from == b && kind.is_symmetric()))
}

fn candidate_targets(store: &FactStore, scope: TargetScope) -> Vec<Target> {
    match scope {
        TargetScope::File => store.file_ids().map(|id| match id {
            EntityId::File(f) => Target::File(f),
            _ => unreachable!(),
        }).collect(),
        TargetScope::Module => store.module_ids().map(|id| match id {
            EntityId::Module(m) => Target::Module(m),
            _ => unreachable!(),
        }).collect(),
        TargetScope::Codebase => vec![Target::Codebase],
        TargetScope::FilePair => {
            let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
            for kind in [RelationType::Imports, RelationType::CochangesWith, RelationType::ClonedFrom, RelationType::SimilarTo] {
                for rel in store.relations_of(kind) {
                    if let (EntityId::File(a), EntityId::File(b)) = (&rel.from, &rel.to) {
                        let pair = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
                        pairs.insert(pair);
                    }
                }
            }
            pairs.into_iter().map(|(a, b)| Target::FilePair(a, b)).collect()
        }
        TargetScope::ModulePair => {
            let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
            for rel in store.relations_of(RelationType::DependsOn) {
                if let (EntityId::Module(a), EntityId::Module(b)) = (&rel.from, &rel.to) {
                    let pair = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
                    pairs.insert(pair);
                }
            }
            pairs.into_iter().map(|(a, b)| Target::ModulePair(a, b)).collect()
        }
    }
}

fn scope_breadth(target: &Target) -> u8 {
    match target {
        Target::Codebase => 3,
        Target::Module(_) | Target::ModulePair(_, _) => 2,
        Target::File(_) | Target::FilePair(_, _) => 1,
    }
}

/// Runs every pattern over its candidate targets and returns findings
/// ordered by `rank_key` (spec §4.7 ranking + tiebreakers).
pub fn run_finders(store: &FactStore, _cfg: &AnalysisConfig) -> Vec<Finding> {
    let ctx = Context::build(store);
    let mut findings = Vec::new();

    for pattern in patterns::all_patterns() {
        let targets = candidate_targets(store, pattern.scope);
        for target in targets {
            if pattern.hotspot {
                let tc = match &target {
                    Target::File(f) => ctx.total_changes(&EntityId::File(f.clone())),
                    _ => 0.0,
                };
                if tc <= ctx.median_total_changes_non_test {
                    continue;
                }
            }
            let Some(m) = (pattern.evaluate)(&target, &ctx) else { continue };
            if m.margins.is_empty() {
                continue;
            }
            let confidence = m.margins.iter().sum::<f64>() / m.margins.len() as f64;
            let severity = confidence::adjusted_severity(pattern.base_severity, &m.margins);
            findings.push(Finding {
                pattern: pattern.name,
                category: pattern.category,
                target,
                severity,
                confidence,
                evidence: m.evidence,
                remediation: pattern.remediation,
                effort: pattern.effort,
            });
        }
    }

    findings.sort_by(|a, b| {
        let rank_a = 0.7 * a.severity + 0.3 * a.confidence;
        let rank_b = 0.7 * b.severity + 0.3 * b.confidence;
        rank_b
            .partial_cmp(&rank_a)
            .unwrap()
            .then_with(|| scope_breadth(&b.target).cmp(&scope_breadth(&a.target)))
            .then_with(|| b.evidence.len().cmp(&a.evidence.len()))
            .then_with(|| a.pattern.cmp(b.pattern))
    });
    findings
}
