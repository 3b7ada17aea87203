//! IR4 architecture: module detection and cohesion/coupling/layering
//! metrics (spec §4.5).

use std::collections::{HashMap, HashSet};

use petgraph::graph::DiGraph;

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::ir1_syntax::{SyntaxIndex, SYNTAX_ARTIFACT_KEY};
use crate::store::entity::{EntityId, Module};
use crate::store::kernel::{Stage, StageWrites};
use crate::store::relation::{Relation, RelationMeta, RelationType};
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;

fn top_level_dir(rel_path: &str) -> String {
    rel_path.split('/').next().unwrap_or(rel_path).to_string()
}

/// Picks a module name for a Louvain community: the most common top-level
/// directory among its files, disambiguated by community id on collision.
fn name_communities(files_by_community: &HashMap<i64, Vec<&str>>) -> HashMap<i64, String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut names = HashMap::new();
    let mut ordered: Vec<&i64> = files_by_community.keys().collect();
    ordered.sort();
    for &community in ordered {
        let members = &files_by_community[community];
        let mut dir_counts: HashMap<String, usize> = HashMap::new();
        for path in members {
            *dir_counts.entry(top_level_dir(path)).or_insert(0) += 1;
        }
        let mut candidate = dir_counts
            .into_iter()
            .max_by_key(|(_, c)| *c)
            .map(|(d, _)| d)
            .unwrap_or_else(|| format!("community_{community}"));
        if used.contains(&candidate) {
            candidate = format!("{candidate}_{community}");
        }
        used.insert(candidate.clone());
        names.insert(*community, candidate);
    }
    names
}

/// Determines each file's module name in priority order: explicit config,
/// then IR3 Louvain communities, then top-level directory (spec §4.5).
fn assign_modules(store: &FactStore, cfg: &AnalysisConfig) -> HashMap<String, String> {
    if !cfg.explicit_modules.is_empty() {
        return store
            .files
            .keys()
            .map(|rel| {
                let module = cfg
                    .explicit_modules
                    .get(rel)
                    .cloned()
                    .unwrap_or_else(|| top_level_dir(rel));
                (rel.clone(), module)
            })
            .collect();
    }

    let mut by_community: HashMap<i64, Vec<&str>> = HashMap::new();
    let mut have_communities = true;
    for rel in store.files.keys() {
        match store.get_signal_f64(&EntityId::File(rel.clone()), "community") {
            Some(c) => by_community.entry(c as i64).or_default().push(rel.as_str()),
            None => {
                have_communities = false;
                break;
            }
        }
    }

    if have_communities && !by_community.is_empty() {
        let names = name_communities(&by_community);
        let mut result = HashMap::new();
        for (&community, members) in &by_community {
            let name = names.get(&community).cloned().unwrap_or_default();
            for rel in members {
                result.insert(rel.to_string(), name.clone());
            }
        }
        return result;
    }

    store.files.keys().map(|rel| (rel.clone(), top_level_dir(rel))).collect()
}

fn mode<'a, I: Iterator<Item = &'a str>>(values: I) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, c)| *c).map(|(v, _)| v.to_string())
}

pub struct Ir4Architecture;

impl Stage for Ir4Architecture {
    fn name(&self) -> &'static str {
        "ir4_architecture"
    }

    fn ir_level(&self) -> IrStage {
        IrStage::Ir4
    }

    fn provides(&self) -> &'static [&'static str] {
        &[
            "ca", "ce", "instability", "abstractness", "main_seq_distance", "cohesion",
            "coupling", "boundary_alignment", "role_consistency", "layer_violation_count",
            "file_count",
        ]
    }

    fn requires(&self) -> &'static [&'static str] {
        &["ir3_graph"]
    }

    fn run(&self, store: &FactStore, _cfg: &AnalysisConfig) -> Result<StageWrites> {
        let mut writes = StageWrites::default();
        let module_of = assign_modules(store, _cfg);

        let mut files_by_module: HashMap<&str, Vec<&str>> = HashMap::new();
        for (rel, module) in &module_of {
            files_by_module.entry(module.as_str()).or_default().push(rel.as_str());
        }

        for module in files_by_module.keys() {
            writes.new_modules.push(Module { name: module.to_string(), meta: Default::default() });
            for file in &files_by_module[module] {
                writes.relations.push(Relation {
                    kind: RelationType::InModule,
                    from: EntityId::File(file.to_string()),
                    to: EntityId::Module(module.to_string()),
                    weight: 1.0,
                    meta: RelationMeta::default(),
                });
            }
        }

        // Aggregate IMPORTS edges into module-pair DEPENDS_ON counts.
        let mut depends_on: HashMap<(String, String), u32> = HashMap::new();
        let mut cross_edges_incident: HashMap<&str, usize> = HashMap::new();
        let mut total_edges_incident: HashMap<&str, usize> = HashMap::new();
        let mut total_edges = 0usize;
        let mut shared_module_edges = 0usize;

        for rel in store.relations_of(RelationType::Imports) {
            let (EntityId::File(a), EntityId::File(b)) = (&rel.from, &rel.to) else { continue };
            let (Some(ma), Some(mb)) = (module_of.get(a), module_of.get(b)) else { continue };
            total_edges += 1;
            *total_edges_incident.entry(ma.as_str()).or_insert(0) += 1;
            if ma != mb {
                *total_edges_incident.entry(mb.as_str()).or_insert(0) += 1;
                *cross_edges_incident.entry(ma.as_str()).or_insert(0) += 1;
                *cross_edges_incident.entry(mb.as_str()).or_insert(0) += 1;
                *depends_on.entry((ma.clone(), mb.clone())).or_insert(0) += 1;
            } else {
                shared_module_edges += 1;
            }
        }
        let _ = (total_edges, shared_module_edges);

        for ((from, to), count) in &depends_on {
            writes.relations.push(Relation {
                kind: RelationType::DependsOn,
                from: EntityId::Module(from.clone()),
                to: EntityId::Module(to.clone()),
                weight: *count as f64,
                meta: RelationMeta::default(),
            });
        }

        let mut ca: HashMap<&str, u32> = HashMap::new();
        let mut ce: HashMap<&str, u32> = HashMap::new();
        for ((from, to), count) in &depends_on {
            *ce.entry(from.as_str()).or_insert(0) += count;
            *ca.entry(to.as_str()).or_insert(0) += count;
        }

        let syntax_index = store.artifacts.get::<SyntaxIndex>(SYNTAX_ARTIFACT_KEY).cloned().unwrap_or_default();

        for (&module, members) in &files_by_module {
            let module_id = EntityId::Module(module.to_string());
            let file_count = members.len();
            writes.signals.push((module_id.clone(), "file_count", SignalValue::Int(file_count as i64)));

            let module_ca = ca.get(module).copied().unwrap_or(0);
            let module_ce = ce.get(module).copied().unwrap_or(0);
            writes.signals.push((module_id.clone(), "ca", SignalValue::Int(module_ca as i64)));
            writes.signals.push((module_id.clone(), "ce", SignalValue::Int(module_ce as i64)));

            let instability = if module_ca + module_ce == 0 {
                None
            } else {
                Some(module_ce as f64 / (module_ca + module_ce) as f64)
            };
            writes.signals.push((module_id.clone(), "instability", instability.map(SignalValue::Float).unwrap_or(SignalValue::Null)));

            let (mut abstract_classes, mut total_classes) = (0usize, 0usize);
            for file in members {
                if let Some(syntax) = syntax_index.get(*file) {
                    total_classes += syntax.classes.len();
                    abstract_classes += syntax.classes.iter().filter(|c| c.is_abstract).count();
                }
            }
            let abstractness = if total_classes == 0 { 0.0 } else { abstract_classes as f64 / total_classes as f64 };
            writes.signals.push((module_id.clone(), "abstractness", SignalValue::clamped_unit(abstractness)));

            let main_seq = instability.map(|i| (abstractness + i - 1.0).abs());
            writes.signals.push((module_id.clone(), "main_seq_distance", main_seq.map(SignalValue::clamped_unit).unwrap_or(SignalValue::Null)));

            let incident = total_edges_incident.get(module).copied().unwrap_or(0);
            let cross = cross_edges_incident.get(module).copied().unwrap_or(0);
            let cohesion = if incident == 0 { 1.0 } else { 1.0 - cross as f64 / incident as f64 };
            writes.signals.push((module_id.clone(), "cohesion", SignalValue::clamped_unit(cohesion)));

            let coupling = cross as f64 / file_count.max(1) as f64;
            writes.signals.push((module_id.clone(), "coupling", SignalValue::Float(coupling.max(0.0))));

            let communities: Vec<i64> = members
                .iter()
                .filter_map(|f| store.get_signal_f64(&EntityId::File(f.to_string()), "community").map(|c| c as i64))
                .collect();
            let majority_community = communities.iter().copied().fold(HashMap::<i64, usize>::new(), |mut acc, c| {
                *acc.entry(c).or_insert(0) += 1;
                acc
            }).into_iter().max_by_key(|(_, n)| *n).map(|(c, _)| c);
            let boundary_alignment = match majority_community {
                Some(mc) => communities.iter().filter(|&&c| c == mc).count() as f64 / file_count.max(1) as f64,
                None => 1.0,
            };
            writes.signals.push((module_id.clone(), "boundary_alignment", SignalValue::clamped_unit(boundary_alignment)));

            let roles: Vec<String> = members
                .iter()
                .filter_map(|f| store.get_signal(&EntityId::File(f.to_string()), "role").map(|v| match v {
                    SignalValue::Enum(s) => s.clone(),
                    _ => "UNKNOWN".to_string(),
                }))
                .collect();
            let modal_role = mode(roles.iter().map(|s| s.as_str()));
            let role_consistency = match modal_role {
                Some(ref r) => roles.iter().filter(|x| *x == r).count() as f64 / file_count.max(1) as f64,
                None => 1.0,
            };
            writes.signals.push((module_id.clone(), "role_consistency", SignalValue::clamped_unit(role_consistency)));
        }

        let layer_violations = layer_violation_counts(&depends_on);
        for (&module, _) in &files_by_module {
            let count = layer_violations.get(module).copied().unwrap_or(0);
            writes.signals.push((EntityId::Module(module.to_string()), "layer_violation_count", SignalValue::Int(count as i64)));
        }

        tracing::info!(modules = files_by_module.len(), "ir4 architecture analysis complete");
        Ok(writes)
    }
}

/// Condenses the DEPENDS_ON graph's cycles into single SCC nodes, assigns
/// each resulting node a longest-path layer (roots with no incoming edge
/// sit at layer 0; every other node sits one layer above its highest
/// predecessor), and flags edges that land more than one layer apart.
///
/// Plain topological order can't tell a skip-level dependency apart from
/// clean layering: in an acyclic graph `index(u) < index(v)` holds for
/// *every* edge `u -> v`, valid or not (e.g. a straight A -> B -> C chain
/// has `index(A) < index(B) < index(C)` even though nothing is wrong with
/// it). Longest-path layering fixes that — a clean chain places each edge's
/// endpoints on adjacent layers, so only an edge that bypasses the modules
/// that should sit between its endpoints shows a gap (spec §4.5).
fn layer_violation_counts(depends_on: &HashMap<(String, String), u32>) -> HashMap<String, usize> {
    let mut modules: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (from, to) in depends_on.keys() {
        for m in [from, to] {
            if !index.contains_key(m) {
                index.insert(m.clone(), modules.len());
                modules.push(m.clone());
            }
        }
    }
    if modules.is_empty() {
        return HashMap::new();
    }

    let mut g = DiGraph::<(), ()>::with_capacity(modules.len(), depends_on.len());
    let nodes: Vec<_> = (0..modules.len()).map(|_| g.add_node(())).collect();
    for (from, to) in depends_on.keys() {
        g.add_edge(nodes[index[from]], nodes[index[to]], ());
    }

    let condensed = petgraph::algo::condensation(g, true);
    let topo = match petgraph::algo::toposort(&condensed, None) {
        Ok(order) => order,
        Err(_) => return HashMap::new(),
    };

    let mut scc_layer: HashMap<petgraph::graph::NodeIndex, usize> = HashMap::new();
    for &scc_node in &topo {
        let layer = condensed
            .neighbors_directed(scc_node, petgraph::Direction::Incoming)
            .map(|pred| scc_layer.get(&pred).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        scc_layer.insert(scc_node, layer);
    }

    let mut node_layer: HashMap<petgraph::graph::NodeIndex, usize> = HashMap::new();
    for (&scc_node, &layer) in &scc_layer {
        for &orig in &condensed[scc_node] {
            node_layer.insert(orig, layer);
        }
    }

    let mut violations: HashMap<String, usize> = HashMap::new();
    for (from, to) in depends_on.keys() {
        let (fi, ti) = (nodes[index[from]], nodes[index[to]]);
        if let (Some(&lf), Some(&lt)) = (node_layer.get(&fi), node_layer.get(&ti)) {
            if lt > lf + 1 {
                *violations.entry(from.clone()).or_insert(0) += 1;
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_chain_has_no_layer_violations() {
        let mut depends_on = HashMap::new();
        depends_on.insert(("a".to_string(), "b".to_string()), 1);
        depends_on.insert(("b".to_string(), "c".to_string()), 1);
        let violations = layer_violation_counts(&depends_on);
        assert!(violations.is_empty(), "clean A->B->C layering must not be flagged: {violations:?}");
    }

    #[test]
    fn skip_level_edge_is_flagged() {
        let mut depends_on = HashMap::new();
        depends_on.insert(("a".to_string(), "b".to_string()), 1);
        depends_on.insert(("b".to_string(), "c".to_string()), 1);
        depends_on.insert(("a".to_string(), "c".to_string()), 1);
        let violations = layer_violation_counts(&depends_on);
        assert_eq!(violations.get("a").copied(), Some(1));
        assert!(!violations.contains_key("b"));
    }
}
