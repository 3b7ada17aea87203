//! IR5s signal fusion (spec §4.6): percentile/Bayesian normalization,
//! composite scores, and the health Laplacian. Runs single-threaded on the
//! joined store, after the structural and temporal chains merge.

use std::collections::{HashMap, HashSet};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::store::entity::EntityId;
use crate::store::kernel::{Stage, StageWrites, Tier};
use crate::store::relation::RelationType;
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;

/// Beta-prior shape parameters for the Bayesian tier's posterior percentile
/// (spec §4.6 doesn't pin exact values — `α=β=2` is a weakly informative
/// prior centered at 0.5, documented in DESIGN.md).
const BAYES_ALPHA: f64 = 2.0;
const BAYES_BETA: f64 = 2.0;

fn percentile_map(tier: Tier, column: &[(EntityId, f64)]) -> HashMap<EntityId, f64> {
    let mut result = HashMap::new();
    if column.is_empty() {
        return result;
    }
    let values: Vec<f64> = column.iter().map(|(_, v)| *v).collect();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < 1e-12 {
        for (id, _) in column {
            result.insert(id.clone(), 0.5);
        }
        return result;
    }
    let n = values.len() as f64;
    for (id, v) in column {
        let rank = values.iter().filter(|&&x| x <= *v).count() as f64;
        let pctl = match tier {
            Tier::Full => rank / n,
            Tier::Bayesian => (BAYES_ALPHA + rank) / (BAYES_ALPHA + BAYES_BETA + n),
            Tier::Absolute => 0.5,
        };
        result.insert(id.clone(), pctl);
    }
    result
}

/// Weighted convex combination with missing-input dropping and weight
/// renormalization (spec §4.6 "Missing inputs are dropped and remaining
/// weights renormalized to 1").
fn weighted_composite(terms: &[(f64, Option<f64>)]) -> Option<f64> {
    let mut weight_sum = 0.0;
    let mut value_sum = 0.0;
    for &(weight, value) in terms {
        if let Some(v) = value {
            weight_sum += weight;
            value_sum += weight * v;
        }
    }
    if weight_sum <= 0.0 {
        None
    } else {
        Some((value_sum / weight_sum).clamp(0.0, 1.0))
    }
}

fn max_of(column: &[(EntityId, f64)]) -> f64 {
    column.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max)
}

pub struct Ir5sFusion;

impl Stage for Ir5sFusion {
    fn name(&self) -> &'static str {
        "ir5s_fusion"
    }

    fn ir_level(&self) -> IrStage {
        IrStage::Ir5s
    }

    fn provides(&self) -> &'static [&'static str] {
        &[
            "risk_score", "wiring_quality", "health_laplacian", "avg_risk_score", "health_score",
            "wiring_score", "architecture_health", "codebase_health",
        ]
    }

    fn requires(&self) -> &'static [&'static str] {
        &["ir4_architecture"]
    }

    fn run(&self, store: &FactStore, _cfg: &AnalysisConfig) -> Result<StageWrites> {
        let mut writes = StageWrites::default();
        let tier = Tier::select(store.files.len());

        // ABSOLUTE tier computes no percentiles and no composites (spec
        // §4.1, §4.6): raw signals with hard thresholds only.
        if tier == Tier::Absolute {
            tracing::info!("ir5s fusion skipped: ABSOLUTE tier computes no composites");
            return Ok(writes);
        }

        let file_ids: Vec<EntityId> = store.file_ids().collect();

        let pagerank_col = store.signal_column(&file_ids, "pagerank");
        let blast_col = store.signal_column(&file_ids, "blast_radius_size");
        let cognitive_col = store.signal_column(&file_ids, "cognitive_load");
        let bus_factor_col = store.signal_column(&file_ids, "bus_factor");

        let pctl_pagerank = percentile_map(tier, &pagerank_col);
        let pctl_blast = percentile_map(tier, &blast_col);
        let pctl_cognitive = percentile_map(tier, &cognitive_col);
        let max_bus_factor = if bus_factor_col.is_empty() { 1.0 } else { max_of(&bus_factor_col).max(1.0) };
        let max_pagerank = if pagerank_col.is_empty() { 1.0 } else { max_of(&pagerank_col).max(1e-9) };
        let max_blast = if blast_col.is_empty() { 1.0 } else { max_of(&blast_col).max(1e-9) };
        let max_cognitive = if cognitive_col.is_empty() { 1.0 } else { max_of(&cognitive_col).max(1e-9) };

        let mut file_risk: HashMap<EntityId, f64> = HashMap::new();
        let mut raw_risk: HashMap<EntityId, f64> = HashMap::new();

        for file_id in &file_ids {
            let trajectory_instability = store
                .get_signal(file_id, "churn_trajectory")
                .map(|v| match v {
                    SignalValue::Enum(s) if s == "CHURNING" || s == "SPIKING" => 1.0,
                    SignalValue::Enum(_) => 0.3,
                    _ => 0.3,
                });
            let bus_factor_term = store
                .get_signal_f64(file_id, "bus_factor")
                .map(|b| 1.0 - b / max_bus_factor);

            let risk = weighted_composite(&[
                (0.25, pctl_pagerank.get(file_id).copied()),
                (0.20, pctl_blast.get(file_id).copied()),
                (0.20, pctl_cognitive.get(file_id).copied()),
                (0.20, trajectory_instability),
                (0.15, bus_factor_term),
            ]);
            if let Some(r) = risk {
                file_risk.insert(file_id.clone(), r);
                writes.signals.push((file_id.clone(), "risk_score", SignalValue::clamped_unit(r)));
            }

            let raw = weighted_composite(&[
                (0.25, store.get_signal_f64(file_id, "pagerank").map(|v| v / max_pagerank)),
                (0.20, store.get_signal_f64(file_id, "blast_radius_size").map(|v| v / max_blast)),
                (0.20, store.get_signal_f64(file_id, "cognitive_load").map(|v| v / max_cognitive)),
                (0.20, trajectory_instability),
                (0.15, bus_factor_term),
            ]);
            if let Some(r) = raw {
                raw_risk.insert(file_id.clone(), r);
            }

            let is_orphan_term = store.get_signal(file_id, "is_orphan").and_then(|v| v.as_bool()).map(|b| if b { 1.0 } else { 0.0 });
            let stub_ratio_term = store.get_signal_f64(file_id, "stub_ratio");
            let phantom_term = match (store.get_signal_f64(file_id, "phantom_import_count"), store.get_signal_f64(file_id, "import_count")) {
                (Some(p), Some(i)) => Some(p / i.max(1.0)),
                _ => None,
            };
            // broken_call_count is hard-coded 0 (spec §9 open question: no
            // call-resolution pass exists), so this term is always 0.
            let broken_call_term = store.get_signal_f64(file_id, "broken_call_count").map(|_| 0.0);

            let wiring = weighted_composite(&[
                (0.30, is_orphan_term.map(|v| 1.0 - v)),
                (0.25, stub_ratio_term.map(|v| 1.0 - v)),
                (0.25, phantom_term.map(|v| 1.0 - v)),
                (0.20, broken_call_term.map(|v| 1.0 - v)),
            ]);
            if let Some(w) = wiring {
                writes.signals.push((file_id.clone(), "wiring_quality", SignalValue::clamped_unit(w)));
            }
        }

        // Health Laplacian: Δh(f) = raw_risk(f) − mean(raw_risk(n) for n in
        // undirected IMPORT-neighbors(f)); orphans yield 0.
        let mut neighbors: HashMap<EntityId, HashSet<EntityId>> = HashMap::new();
        for rel in store.relations_of(RelationType::Imports) {
            neighbors.entry(rel.from.clone()).or_default().insert(rel.to.clone());
            neighbors.entry(rel.to.clone()).or_default().insert(rel.from.clone());
        }
        for file_id in &file_ids {
            let Some(&own_risk) = raw_risk.get(file_id) else { continue };
            let neighbor_set = neighbors.get(file_id);
            let delta = match neighbor_set {
                None => 0.0,
                Some(ns) if ns.is_empty() => 0.0,
                Some(ns) => {
                    let values: Vec<f64> = ns.iter().filter_map(|n| raw_risk.get(n).copied()).collect();
                    if values.is_empty() {
                        0.0
                    } else {
                        own_risk - values.iter().sum::<f64>() / values.len() as f64
                    }
                }
            };
            writes.signals.push((file_id.clone(), "health_laplacian", SignalValue::Float(delta)));
        }

        // Module-level composites.
        let module_ids: Vec<EntityId> = store.module_ids().collect();
        let mut module_health: HashMap<EntityId, f64> = HashMap::new();
        let coupling_col = store.signal_column(&module_ids, "coupling");
        let max_coupling = if coupling_col.is_empty() { 1.0 } else { max_of(&coupling_col).max(1e-9) };

        for module_id in &module_ids {
            let module_name = match module_id {
                EntityId::Module(n) => n.clone(),
                _ => continue,
            };
            let member_files: Vec<&EntityId> = store
                .relations_of(RelationType::InModule)
                .filter(|r| matches!(&r.to, EntityId::Module(m) if m == &module_name))
                .map(|r| &r.from)
                .collect();
            let avg_risk = {
                let vals: Vec<f64> = member_files.iter().filter_map(|f| file_risk.get(*f).copied()).collect();
                if vals.is_empty() { None } else { Some(vals.iter().sum::<f64>() / vals.len() as f64) }
            };
            if let Some(avg) = avg_risk {
                writes.signals.push((module_id.clone(), "avg_risk_score", SignalValue::clamped_unit(avg)));
            }

            let cohesion = store.get_signal_f64(module_id, "cohesion");
            let coupling_norm = store.get_signal_f64(module_id, "coupling").map(|c| 1.0 - (c / max_coupling).min(1.0));
            let main_seq = store.get_signal_f64(module_id, "main_seq_distance").map(|d| 1.0 - d);
            let avg_risk_term = avg_risk.map(|r| 1.0 - r);

            let health = weighted_composite(&[
                (0.30, cohesion),
                (0.25, coupling_norm),
                (0.20, main_seq),
                (0.25, avg_risk_term),
            ]);
            if let Some(h) = health {
                module_health.insert(module_id.clone(), h);
                writes.signals.push((module_id.clone(), "health_score", SignalValue::clamped_unit(h)));
            }
        }

        // Codebase-wide composites.
        let codebase_id = EntityId::Codebase;
        let orphan_ratio = store.get_signal_f64(&codebase_id, "orphan_ratio");
        let phantom_ratio = store.get_signal_f64(&codebase_id, "phantom_ratio");
        let wiring_score = weighted_composite(&[
            (0.5, orphan_ratio.map(|v| 1.0 - v)),
            (0.5, phantom_ratio.map(|v| 1.0 - v)),
        ]);
        if let Some(w) = wiring_score {
            writes.signals.push((codebase_id.clone(), "wiring_score", SignalValue::clamped_unit(w)));
        }

        let architecture_health = if module_health.is_empty() {
            None
        } else {
            Some(module_health.values().sum::<f64>() / module_health.len() as f64)
        };
        if let Some(a) = architecture_health {
            writes.signals.push((codebase_id.clone(), "architecture_health", SignalValue::clamped_unit(a)));
        }

        let codebase_health = weighted_composite(&[(0.5, wiring_score), (0.5, architecture_health)]);
        if let Some(c) = codebase_health {
            writes.signals.push((codebase_id.clone(), "codebase_health", SignalValue::clamped_unit(c)));
        }

        tracing::info!(tier = ?tier, files = file_ids.len(), "ir5s fusion complete");
        Ok(writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_variance_percentile_is_one_half() {
        let ids = vec![EntityId::File("a".into()), EntityId::File("b".into())];
        let column: Vec<(EntityId, f64)> = ids.iter().map(|i| (i.clone(), 3.0)).collect();
        let pctl = percentile_map(Tier::Full, &column);
        assert!((pctl[&ids[0]] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn percentile_is_monotone() {
        let ids: Vec<EntityId> = (0..5).map(|i| EntityId::File(format!("f{i}"))).collect();
        let column: Vec<(EntityId, f64)> = ids.iter().enumerate().map(|(i, id)| (id.clone(), i as f64)).collect();
        let pctl = percentile_map(Tier::Full, &column);
        for w in column.windows(2) {
            assert!(pctl[&w[0].0] <= pctl[&w[1].0]);
        }
    }

    #[test]
    fn weighted_composite_renormalizes_missing_inputs() {
        let result = weighted_composite(&[(0.5, Some(1.0)), (0.5, None)]);
        assert!((result.unwrap() - 1.0).abs() < 1e-9);
    }
}
