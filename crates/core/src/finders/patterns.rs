//! The pattern catalog (spec §4.7). Each pattern's `evaluate` gates on the
//! literal predicate first, then computes confidence margins for the
//! components that held — a hit at exactly the threshold still fires, just
//! with margin 0 (spec's clamp formula allows this at the boundary).

use std::collections::HashMap;

use crate::store::entity::EntityId;
use crate::store::relation::RelationType;
use crate::store::signal::{IrStage, SignalValue};

use super::confidence::{
    bool_margin, disjunction, margin_unbounded_high_is_bad, threshold_margin_high_is_bad,
    threshold_margin_high_is_good,
};
use super::{evidence, Context, Effort, Pattern, PatternMatch, Target, TargetScope};

fn enum_signal(ctx: &Context, id: &EntityId, name: &'static str) -> Option<String> {
    match ctx.store.get_signal(id, name) {
        Some(SignalValue::Enum(s)) => Some(s.clone()),
        _ => None,
    }
}

fn f64_signal(ctx: &Context, id: &EntityId, name: &'static str) -> f64 {
    ctx.store.get_signal_f64(id, name).unwrap_or(0.0)
}

fn high_risk_hub(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let pr = ctx.pctl_pagerank.get(&id).copied().unwrap_or(0.0);
    let blast = ctx.pctl_blast.get(&id).copied().unwrap_or(0.0);
    let cog = ctx.pctl_cognitive.get(&id).copied().unwrap_or(0.0);
    let trajectory = enum_signal(ctx, &id, "churn_trajectory");
    let trajectory_hit = matches!(trajectory.as_deref(), Some("CHURNING") | Some("SPIKING"));

    if !((pr >= 0.90 || blast >= 0.90) && (cog >= 0.90 || trajectory_hit)) {
        return None;
    }

    let margins = vec![
        disjunction(&[threshold_margin_high_is_bad(pr, 0.90), threshold_margin_high_is_bad(blast, 0.90)]),
        disjunction(&[threshold_margin_high_is_bad(cog, 0.90), bool_margin(trajectory_hit)]),
    ];
    let ev = vec![
        evidence(IrStage::Ir3, "pagerank", SignalValue::Float(f64_signal(ctx, &id, "pagerank")), Some(pr), "centrality in the top decile of the codebase"),
        evidence(IrStage::Ir3, "blast_radius_size", SignalValue::Float(f64_signal(ctx, &id, "blast_radius_size")), Some(blast), "reverse-reachable file count in the top decile"),
        evidence(IrStage::Ir3, "cognitive_load", SignalValue::Float(f64_signal(ctx, &id, "cognitive_load")), Some(cog), "structural complexity in the top decile"),
    ];
    Some(PatternMatch { margins, evidence: ev })
}

fn hidden_coupling(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let a = target.file_a();
    let b = target.file_b();
    let rel = ctx.find_relation(&a, &b, RelationType::CochangesWith)?;
    let lift = rel.weight;
    let cochange = rel.meta.cochange.as_ref()?;
    let confidence = cochange.confidence;
    let count = cochange.count;
    let imports_ab = ctx.store.relations.has(&a, &b, RelationType::Imports);
    let imports_ba = ctx.store.relations.has(&b, &a, RelationType::Imports);

    if !(lift >= 2.0 && confidence >= 0.5 && count >= 3 && !imports_ab && !imports_ba) {
        return None;
    }

    let margins = vec![
        margin_unbounded_high_is_bad(lift, 2.0, 5.0),
        threshold_margin_high_is_bad(confidence, 0.5),
        bool_margin(count >= 3),
    ];
    let ev = vec![
        evidence(IrStage::Ir5t, "cochange_lift", SignalValue::Float(lift), None, format!("co-changed with {count} shared commits, lift {lift:.2}")),
        evidence(IrStage::Ir5t, "cochange_confidence", SignalValue::Float(confidence), None, "directional co-change confidence"),
    ];
    Some(PatternMatch { margins, evidence: ev })
}

fn dead_dependency(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let a = target.file_a();
    let b = target.file_b();
    let imports = ctx.store.relations.has(&a, &b, RelationType::Imports) || ctx.store.relations.has(&b, &a, RelationType::Imports);
    if !imports {
        return None;
    }
    let cochange_count = ctx.find_relation(&a, &b, RelationType::CochangesWith).and_then(|r| r.meta.cochange.as_ref()).map(|c| c.count).unwrap_or(0);
    let ta = ctx.total_changes(&a);
    let tb = ctx.total_changes(&b);
    if !(cochange_count == 0 && ta >= 50.0 && tb >= 50.0) {
        return None;
    }

    let margins = vec![
        bool_margin(true),
        margin_unbounded_high_is_bad(ta.min(tb), 50.0, 200.0),
    ];
    let ev = vec![
        evidence(IrStage::Ir1, "imports", SignalValue::Bool(true), None, "declared import edge with zero observed co-change"),
        evidence(IrStage::Ir5t, "total_changes", SignalValue::Float(ta.min(tb)), None, "both files independently churn heavily"),
    ];
    Some(PatternMatch { margins, evidence: ev })
}

fn god_file(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let cog = ctx.pctl_cognitive.get(&id).copied().unwrap_or(0.0);
    let coherence = ctx.pctl_semantic_coherence.get(&id).copied().unwrap_or(1.0);
    let function_count = f64_signal(ctx, &id, "function_count");
    let total_changes = ctx.total_changes(&id);

    if !(cog >= 0.95 && coherence < 0.20 && function_count >= 3.0 && total_changes > 0.0) {
        return None;
    }

    let margins = vec![
        threshold_margin_high_is_bad(cog, 0.95),
        threshold_margin_high_is_good(coherence, 0.20),
        bool_margin(function_count >= 3.0),
        bool_margin(total_changes > 0.0),
    ];
    let ev = vec![
        evidence(IrStage::Ir3, "cognitive_load", SignalValue::Float(f64_signal(ctx, &id, "cognitive_load")), Some(cog), "99th-percentile structural complexity"),
        evidence(IrStage::Ir3, "semantic_coherence", SignalValue::Float(f64_signal(ctx, &id, "semantic_coherence")), Some(coherence), "low coherence across its own responsibilities"),
    ];
    Some(PatternMatch { margins, evidence: ev })
}

fn hollow_code(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let stub_ratio = f64_signal(ctx, &id, "stub_ratio");
    let function_count = f64_signal(ctx, &id, "function_count");
    if !(stub_ratio >= 0.5 && function_count >= 3.0) {
        return None;
    }
    let margins = vec![threshold_margin_high_is_bad(stub_ratio, 0.5), bool_margin(function_count >= 3.0)];
    let ev = vec![evidence(IrStage::Ir1, "stub_ratio", SignalValue::Float(stub_ratio), None, "majority of functions are unimplemented stubs")];
    Some(PatternMatch { margins, evidence: ev })
}

fn phantom_imports(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let phantom = f64_signal(ctx, &id, "phantom_import_count");
    let imports = f64_signal(ctx, &id, "import_count").max(1.0);
    let ratio = phantom / imports;
    if !(phantom >= 1.0 && ratio >= 0.2) {
        return None;
    }
    let margins = vec![threshold_margin_high_is_bad(ratio, 0.2)];
    let ev = vec![evidence(IrStage::Ir1, "phantom_import_count", SignalValue::Int(phantom as i64), None, "imports that resolve to nothing in this codebase")];
    Some(PatternMatch { margins, evidence: ev })
}

fn orphan_code(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let is_orphan = ctx.store.get_signal(&id, "is_orphan").and_then(|v| v.as_bool()).unwrap_or(false);
    if !is_orphan {
        return None;
    }
    let margins = vec![bool_margin(true)];
    let ev = vec![evidence(IrStage::Ir3, "is_orphan", SignalValue::Bool(true), None, "zero inbound reference edges, not an entry point or test")];
    Some(PatternMatch { margins, evidence: ev })
}

fn copy_paste_clone(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let a = target.file_a();
    let b = target.file_b();
    let rel = ctx.find_relation(&a, &b, RelationType::ClonedFrom)?;
    let similarity = rel.weight;
    let margins = vec![threshold_margin_high_is_bad(similarity, 0.7)];
    let ev = vec![evidence(IrStage::Ir3, "clone_similarity", SignalValue::Float(similarity), None, format!("near-duplicate content, similarity {similarity:.2}"))];
    Some(PatternMatch { margins, evidence: ev })
}

fn naming_drift_pattern(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let drift = ctx.store.get_signal_f64(&id, "naming_drift")?;
    if !(drift > 0.7) {
        return None;
    }
    let margins = vec![threshold_margin_high_is_bad(drift, 0.7)];
    let ev = vec![evidence(IrStage::Ir2, "naming_drift", SignalValue::Float(drift), None, "filename no longer matches the file's dominant concepts")];
    Some(PatternMatch { margins, evidence: ev })
}

fn weak_link(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let delta_h = ctx.store.get_signal_f64(&id, "health_laplacian")?;
    let total_changes = ctx.total_changes(&id);
    if !(delta_h > 0.4 && total_changes > ctx.median_total_changes_non_test) {
        return None;
    }
    let margins = vec![margin_unbounded_high_is_bad(delta_h, 0.4, 1.0), bool_margin(true)];
    let ev = vec![evidence(IrStage::Ir5s, "health_laplacian", SignalValue::Float(delta_h), None, "riskier than its direct neighbors and actively changing")];
    Some(PatternMatch { margins, evidence: ev })
}

fn knowledge_silo(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let bus_factor = ctx.store.get_signal_f64(&id, "bus_factor")?;
    if !(bus_factor < 1.5) {
        return None;
    }
    let margins = vec![threshold_margin_high_is_good(bus_factor, 1.5)];
    let ev = vec![evidence(IrStage::Ir5t, "bus_factor", SignalValue::Float(bus_factor), None, "effectively one author across its history")];
    Some(PatternMatch { margins, evidence: ev })
}

fn review_blindspot(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let share = ctx.store.get_signal_f64(&id, "owner_commit_share")?;
    if !(share >= 0.8) {
        return None;
    }
    let margins = vec![threshold_margin_high_is_bad(share, 0.8)];
    let ev = vec![evidence(IrStage::Ir5t, "owner_commit_share", SignalValue::Float(share), None, "one author accounts for most commits")];
    Some(PatternMatch { margins, evidence: ev })
}

fn bug_attractor(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.file_a();
    let fix_ratio = ctx.store.get_signal_f64(&id, "fix_ratio")?;
    if !(fix_ratio >= 0.4) {
        return None;
    }
    let margins = vec![threshold_margin_high_is_bad(fix_ratio, 0.4)];
    let ev = vec![evidence(IrStage::Ir5t, "fix_ratio", SignalValue::Float(fix_ratio), None, "large share of commits are bug fixes")];
    Some(PatternMatch { margins, evidence: ev })
}

fn accidental_coupling(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let a = target.file_a();
    let b = target.file_b();
    let imports = ctx.store.relations.has(&a, &b, RelationType::Imports) || ctx.store.relations.has(&b, &a, RelationType::Imports);
    if !imports {
        return None;
    }
    // No stored SIMILAR_TO edge implies cosine below the 0.5 indexing
    // threshold (spec §3); used here as a proxy for "concept Jaccard < 0.2"
    // since the full pairwise similarity matrix is never materialized.
    if ctx.find_relation(&a, &b, RelationType::SimilarTo).is_some() {
        return None;
    }
    let margins = vec![bool_margin(true)];
    let ev = vec![evidence(IrStage::Ir2, "concept_overlap", SignalValue::Bool(false), None, "imports a file with no shared concept vocabulary")];
    Some(PatternMatch { margins, evidence: ev })
}

fn module_author_weights(ctx: &Context, module: &EntityId) -> HashMap<String, f64> {
    let mut weights = HashMap::new();
    for in_module in ctx.store.relations_of(RelationType::InModule) {
        if &in_module.to != module {
            continue;
        }
        for authored in ctx.store.relations.outgoing(&in_module.from, RelationType::AuthoredBy) {
            if let EntityId::Author(email) = &authored.to {
                *weights.entry(email.clone()).or_insert(0.0) += authored.weight;
            }
        }
    }
    weights
}

fn weighted_jaccard_distance(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let keys: std::collections::HashSet<&String> = a.keys().chain(b.keys()).collect();
    let mut min_sum = 0.0;
    let mut max_sum = 0.0;
    for k in keys {
        let va = a.get(k).copied().unwrap_or(0.0);
        let vb = b.get(k).copied().unwrap_or(0.0);
        min_sum += va.min(vb);
        max_sum += va.max(vb);
    }
    if max_sum <= 0.0 {
        0.0
    } else {
        1.0 - min_sum / max_sum
    }
}

fn conway_violation(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let a = target.module_a();
    let b = target.module_b();
    let wa = module_author_weights(ctx, &a);
    let wb = module_author_weights(ctx, &b);
    if wa.is_empty() || wb.is_empty() {
        return None;
    }
    let jaccard_distance = weighted_jaccard_distance(&wa, &wb);
    let depends_weight = ctx
        .find_relation(&a, &b, RelationType::DependsOn)
        .or_else(|| ctx.find_relation(&b, &a, RelationType::DependsOn))
        .map(|r| r.weight)
        .unwrap_or(0.0);
    let ce_a = ctx.store.get_signal_f64(&a, "ce").unwrap_or(0.0).max(1.0);
    let structural_coupling = depends_weight / ce_a;

    if !(jaccard_distance > 0.8 && structural_coupling > 0.3) {
        return None;
    }
    let margins = vec![
        threshold_margin_high_is_bad(jaccard_distance, 0.8),
        margin_unbounded_high_is_bad(structural_coupling, 0.3, 1.0),
    ];
    let ev = vec![
        evidence(IrStage::Ir5t, "author_overlap", SignalValue::Float(1.0 - jaccard_distance), None, "near-disjoint author sets across coupled modules"),
        evidence(IrStage::Ir4, "structural_coupling", SignalValue::Float(structural_coupling), None, "modules import each other heavily"),
    ];
    Some(PatternMatch { margins, evidence: ev })
}

fn layer_violation(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.module_a();
    let count = ctx.store.get_signal_f64(&id, "layer_violation_count").unwrap_or(0.0);
    if count < 1.0 {
        return None;
    }
    let margins = vec![margin_unbounded_high_is_bad(count, 1.0, 5.0)];
    let ev = vec![evidence(IrStage::Ir4, "layer_violation_count", SignalValue::Int(count as i64), None, "imports a module from a higher architectural layer")];
    Some(PatternMatch { margins, evidence: ev })
}

fn zone_of_pain(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.module_a();
    let instability = match ctx.store.get_signal(&id, "instability") {
        Some(v) => v.as_f64(),
        None => None,
    }?;
    let abstractness = ctx.store.get_signal_f64(&id, "abstractness").unwrap_or(1.0);
    if !(abstractness < 0.3 && instability < 0.3) {
        return None;
    }
    let margins = vec![
        threshold_margin_high_is_good(abstractness, 0.3),
        threshold_margin_high_is_good(instability, 0.3),
    ];
    let ev = vec![
        evidence(IrStage::Ir4, "abstractness", SignalValue::Float(abstractness), None, "concrete, rigid module"),
        evidence(IrStage::Ir4, "instability", SignalValue::Float(instability), None, "few dependents depend on changing it further"),
    ];
    Some(PatternMatch { margins, evidence: ev })
}

fn flat_architecture(_target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let file_count = ctx.store.files.len() as f64;
    let module_count = ctx.store.modules.len() as f64;
    if !(file_count >= 30.0 && module_count <= 1.0) {
        return None;
    }
    let margins = vec![bool_margin(true)];
    let ev = vec![evidence(IrStage::Ir4, "module_count", SignalValue::Int(module_count as i64), None, format!("{file_count} files with no architectural decomposition"))];
    Some(PatternMatch { margins, evidence: ev })
}

fn boundary_mismatch(target: &Target, ctx: &Context) -> Option<PatternMatch> {
    let id = target.module_a();
    let alignment = ctx.store.get_signal_f64(&id, "boundary_alignment")?;
    if !(alignment < 0.5) {
        return None;
    }
    let margins = vec![threshold_margin_high_is_good(alignment, 0.5)];
    let ev = vec![evidence(IrStage::Ir4, "boundary_alignment", SignalValue::Float(alignment), None, "module assignment doesn't match the natural import-graph communities")];
    Some(PatternMatch { margins, evidence: ev })
}

pub fn all_patterns() -> Vec<Pattern> {
    vec![
        Pattern { name: "HIGH_RISK_HUB", scope: TargetScope::File, base_severity: 0.85, category: "risk", phase: IrStage::Ir5s, hotspot: false, remediation: "Add characterization tests and split responsibilities before further changes land here.", effort: Effort::High, evaluate: high_risk_hub },
        Pattern { name: "HIDDEN_COUPLING", scope: TargetScope::FilePair, base_severity: 0.6, category: "coupling", phase: IrStage::Ir5t, hotspot: false, remediation: "Make the implicit dependency explicit (shared interface, event contract, or import).", effort: Effort::Medium, evaluate: hidden_coupling },
        Pattern { name: "DEAD_DEPENDENCY", scope: TargetScope::FilePair, base_severity: 0.3, category: "dependency", phase: IrStage::Ir5t, hotspot: false, remediation: "Confirm the import is still needed; remove it if the two files have drifted apart.", effort: Effort::Low, evaluate: dead_dependency },
        Pattern { name: "GOD_FILE", scope: TargetScope::File, base_severity: 0.8, category: "complexity", phase: IrStage::Ir5s, hotspot: false, remediation: "Split by responsibility; each extracted piece should raise its own semantic_coherence.", effort: Effort::High, evaluate: god_file },
        Pattern { name: "HOLLOW_CODE", scope: TargetScope::File, base_severity: 0.5, category: "completeness", phase: IrStage::Ir1, hotspot: false, remediation: "Implement the stubbed functions or remove them if the feature was abandoned.", effort: Effort::Medium, evaluate: hollow_code },
        Pattern { name: "PHANTOM_IMPORTS", scope: TargetScope::File, base_severity: 0.4, category: "imports", phase: IrStage::Ir1, hotspot: false, remediation: "Resolve or remove imports that no longer point at anything in the codebase.", effort: Effort::Low, evaluate: phantom_imports },
        Pattern { name: "ORPHAN_CODE", scope: TargetScope::File, base_severity: 0.35, category: "connectivity", phase: IrStage::Ir3, hotspot: false, remediation: "Confirm the file is still used; wire it in or delete it.", effort: Effort::Low, evaluate: orphan_code },
        Pattern { name: "COPY_PASTE_CLONE", scope: TargetScope::FilePair, base_severity: 0.45, category: "duplication", phase: IrStage::Ir3, hotspot: false, remediation: "Extract the shared logic into one place both files call.", effort: Effort::Medium, evaluate: copy_paste_clone },
        Pattern { name: "NAMING_DRIFT", scope: TargetScope::File, base_severity: 0.3, category: "naming", phase: IrStage::Ir2, hotspot: false, remediation: "Rename the file to match what it now does, or move the drifted responsibility out.", effort: Effort::Low, evaluate: naming_drift_pattern },
        Pattern { name: "WEAK_LINK", scope: TargetScope::File, base_severity: 0.55, category: "risk", phase: IrStage::Ir5s, hotspot: false, remediation: "This file is riskier than its neighbors and still changing; prioritize it for review.", effort: Effort::Medium, evaluate: weak_link },
        Pattern { name: "KNOWLEDGE_SILO", scope: TargetScope::File, base_severity: 0.4, category: "ownership", phase: IrStage::Ir5t, hotspot: true, remediation: "Pair on the next change here; document tacit knowledge.", effort: Effort::Low, evaluate: knowledge_silo },
        Pattern { name: "REVIEW_BLINDSPOT", scope: TargetScope::File, base_severity: 0.4, category: "process", phase: IrStage::Ir5t, hotspot: true, remediation: "Route the next change through a reviewer other than its usual author.", effort: Effort::Low, evaluate: review_blindspot },
        Pattern { name: "BUG_ATTRACTOR", scope: TargetScope::File, base_severity: 0.6, category: "quality", phase: IrStage::Ir5t, hotspot: true, remediation: "Add regression tests around the fixes already made here.", effort: Effort::Medium, evaluate: bug_attractor },
        Pattern { name: "CONWAY_VIOLATION", scope: TargetScope::ModulePair, base_severity: 0.5, category: "architecture", phase: IrStage::Ir5t, hotspot: false, remediation: "Either align team ownership to the dependency, or cut the dependency along the team boundary.", effort: Effort::High, evaluate: conway_violation },
        Pattern { name: "LAYER_VIOLATION", scope: TargetScope::Module, base_severity: 0.55, category: "architecture", phase: IrStage::Ir4, hotspot: false, remediation: "Invert the dependency or introduce an interface at the layer boundary.", effort: Effort::Medium, evaluate: layer_violation },
        Pattern { name: "ZONE_OF_PAIN", scope: TargetScope::Module, base_severity: 0.5, category: "architecture", phase: IrStage::Ir4, hotspot: false, remediation: "Either make the module more abstract or reduce how many modules depend on it directly.", effort: Effort::High, evaluate: zone_of_pain },
        Pattern { name: "FLAT_ARCHITECTURE", scope: TargetScope::Codebase, base_severity: 0.3, category: "architecture", phase: IrStage::Ir4, hotspot: false, remediation: "Introduce module boundaries before the codebase grows further.", effort: Effort::High, evaluate: flat_architecture },
        Pattern { name: "BOUNDARY_MISMATCH", scope: TargetScope::Module, base_severity: 0.4, category: "architecture", phase: IrStage::Ir4, hotspot: false, remediation: "Reassign the module's files to match where the import graph naturally clusters them.", effort: Effort::Medium, evaluate: boundary_mismatch },
        Pattern { name: "ACCIDENTAL_COUPLING", scope: TargetScope::FilePair, base_severity: 0.35, category: "coupling", phase: IrStage::Ir2, hotspot: false, remediation: "Check whether this import is load-bearing; it shares no concept vocabulary with its target.", effort: Effort::Low, evaluate: accidental_coupling },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_no_duplicate_names() {
        let mut names: Vec<&str> = all_patterns().iter().map(|p| p.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }
}
