//! Snapshot, identity, and lifecycle layer (spec §4.8, §6). Turns one run's
//! `FactStore` + findings into a serializable `TensorSnapshot`, and diffs two
//! snapshots into new/resolved/persisting/regression buckets.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::finders::{Effort, Evidence, Finding};
use crate::store::kernel::{ExecutionReport, StageOutcome, Tier};
use crate::store::signal::SignalValue;
use crate::store::FactStore;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub schema_version: u32,
    pub timestamp: i64,
    pub commit_sha: Option<String>,
    pub tool_version: &'static str,
    pub config_hash: String,
    pub tier: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingEvidence {
    pub ir_source: String,
    pub signal: String,
    pub value: SignalValue,
    pub percentile: Option<f64>,
    pub description: String,
}

impl From<&Evidence> for FindingEvidence {
    fn from(e: &Evidence) -> Self {
        FindingEvidence {
            ir_source: format!("{:?}", e.ir_source),
            signal: e.signal.to_string(),
            value: e.value.clone(),
            percentile: e.percentile,
            description: e.description.clone(),
        }
    }
}

/// Lifecycle fields populated by diffing against prior snapshots (spec §4.8).
/// Absent (`None`) on a finding's first appearance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Lifecycle {
    pub first_seen: Option<i64>,
    pub persistence_count: u32,
    pub trend: Option<Trend>,
    pub regression: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Improving,
    Stable,
    Worsening,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingRecord {
    pub id: String,
    pub pattern: String,
    pub category: String,
    pub targets: Vec<String>,
    pub severity: f64,
    pub confidence: f64,
    pub evidence: Vec<FindingEvidence>,
    pub remediation: String,
    pub effort: String,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub category: String,
    pub finding_ids: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlanRecord {
    pub ran: Vec<String>,
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
    pub timings_ms: BTreeMap<String, u64>,
    pub tier: String,
}

fn execution_plan_from_report(report: &ExecutionReport) -> ExecutionPlanRecord {
    let mut ran = Vec::new();
    let mut skipped = Vec::new();
    let mut failed = Vec::new();
    let mut timings_ms = BTreeMap::new();
    for (name, outcome) in &report.stages {
        match outcome {
            StageOutcome::Ran { duration_ms } => {
                ran.push(name.to_string());
                timings_ms.insert(name.to_string(), *duration_ms);
            }
            StageOutcome::Skipped { reason } => skipped.push((name.to_string(), reason.clone())),
            StageOutcome::Failed { error } => failed.push((name.to_string(), error.clone())),
        }
    }
    ExecutionPlanRecord { ran, skipped, failed, timings_ms, tier: format!("{:?}", report.tier) }
}

/// The document produced per run (spec §6 "Output"). Serializes
/// deterministically: `BTreeMap` everywhere a map is keyed by string, and
/// findings already carry a total order from `run_finders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorSnapshot {
    pub metadata: SnapshotMetadata,
    pub file_signals: BTreeMap<String, BTreeMap<String, SignalValue>>,
    pub module_signals: BTreeMap<String, BTreeMap<String, SignalValue>>,
    pub codebase_signals: BTreeMap<String, SignalValue>,
    pub findings: Vec<FindingRecord>,
    pub suggestions: Vec<Suggestion>,
    pub execution_plan: ExecutionPlanRecord,
}

fn effort_str(e: Effort) -> &'static str {
    match e {
        Effort::Low => "low",
        Effort::Medium => "medium",
        Effort::High => "high",
    }
}

/// `id = SHA-256(finding_type || '|' || sorted(targets))[:16]` hex (spec §4.8).
pub fn finding_id(pattern: &str, targets: &[String]) -> String {
    let mut sorted = targets.to_vec();
    sorted.sort();
    let payload = format!("{pattern}|{}", sorted.join(","));
    let digest = Sha256::digest(payload.as_bytes());
    hex_prefix(&digest, 8)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}

fn collect_signal_map(store: &FactStore, names: &[&'static str], id: &crate::store::entity::EntityId) -> BTreeMap<String, SignalValue> {
    let mut m = BTreeMap::new();
    for &name in names {
        if let Some(v) = store.get_signal(id, name) {
            m.insert(name.to_string(), v.clone());
        }
    }
    m
}

pub fn build_snapshot(
    store: &FactStore,
    findings: &[Finding],
    report: &ExecutionReport,
    tier: Tier,
    commit_sha: Option<String>,
    config_hash: String,
    timestamp: i64,
) -> TensorSnapshot {
    use crate::store::entity::EntityId;
    use crate::store::registry;

    let file_names: Vec<&'static str> = registry::file_signals().iter().map(|s| s.name).collect();
    let module_names: Vec<&'static str> = registry::module_signals().iter().map(|s| s.name).collect();
    let codebase_names: Vec<&'static str> = registry::codebase_signals().iter().map(|s| s.name).collect();

    let mut file_signals = BTreeMap::new();
    for (path, _) in &store.files {
        let id = EntityId::File(path.clone());
        file_signals.insert(path.clone(), collect_signal_map(store, &file_names, &id));
    }

    let mut module_signals = BTreeMap::new();
    for (name, _) in &store.modules {
        let id = EntityId::Module(name.clone());
        module_signals.insert(name.clone(), collect_signal_map(store, &module_names, &id));
    }

    let mut codebase_signals = BTreeMap::new();
    for &name in &codebase_names {
        if let Some(v) = store.get_signal(&EntityId::Codebase, name) {
            codebase_signals.insert(name.to_string(), v.clone());
        }
    }

    let finding_records: Vec<FindingRecord> = findings
        .iter()
        .map(|f| {
            let targets = f.target.sorted_ids();
            let id = finding_id(f.pattern, &targets);
            FindingRecord {
                id,
                pattern: f.pattern.to_string(),
                category: f.category.to_string(),
                targets,
                severity: f.severity,
                confidence: f.confidence,
                evidence: f.evidence.iter().map(FindingEvidence::from).collect(),
                remediation: f.remediation.to_string(),
                effort: effort_str(f.effort).to_string(),
                lifecycle: Lifecycle::default(),
            }
        })
        .collect();

    let suggestions = group_suggestions(&finding_records);

    let execution_plan = execution_plan_from_report(report);

    TensorSnapshot {
        metadata: SnapshotMetadata {
            schema_version: SCHEMA_VERSION,
            timestamp,
            commit_sha,
            tool_version: env!("CARGO_PKG_VERSION"),
            config_hash,
            tier: format!("{tier:?}"),
            file_count: store.files.len(),
        },
        file_signals,
        module_signals,
        codebase_signals,
        findings: finding_records,
        suggestions,
        execution_plan,
    }
}

/// Groups findings sharing a category into one actionable suggestion each —
/// the output's "grouped action items" (spec §6).
fn group_suggestions(findings: &[FindingRecord]) -> Vec<Suggestion> {
    let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for f in findings {
        by_category.entry(f.category.clone()).or_default().push(f.id.clone());
    }
    by_category
        .into_iter()
        .map(|(category, finding_ids)| {
            let description = format!("{} finding(s) in category '{category}'", finding_ids.len());
            Suggestion { category, finding_ids, description }
        })
        .collect()
}

/// Rewrites a finding's target ids using an old→new rename map (spec §4.8
/// "rename awareness") before recomputing its identity.
pub fn rename_aware_id(pattern: &str, targets: &[String], renames: &HashMap<String, String>) -> String {
    let rewritten: Vec<String> = targets.iter().map(|t| renames.get(t).cloned().unwrap_or_else(|| t.clone())).collect();
    finding_id(pattern, &rewritten)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub new: Vec<String>,
    pub resolved: Vec<String>,
    pub persisting: Vec<String>,
    pub regressions: Vec<String>,
    pub worsening: Vec<String>,
    pub improving: Vec<String>,
    pub debt_velocity: i64,
}

/// Diffs `current` against `previous`, applying `renames` (old path -> new
/// path) to `previous`'s finding ids before comparing (spec §4.8).
pub fn diff_snapshots(previous: &TensorSnapshot, current: &TensorSnapshot, renames: &HashMap<String, String>) -> SnapshotDiff {
    let prev_by_id: HashMap<String, &FindingRecord> = previous
        .findings
        .iter()
        .map(|f| (rename_aware_id(&f.pattern, &f.targets, renames), f))
        .collect();
    let curr_by_id: HashMap<String, &FindingRecord> = current.findings.iter().map(|f| (f.id.clone(), f)).collect();

    let prev_ids: HashSet<&String> = prev_by_id.keys().collect();
    let curr_ids: HashSet<&String> = curr_by_id.keys().collect();

    let mut diff = SnapshotDiff::default();
    for id in curr_ids.difference(&prev_ids) {
        diff.new.push((*id).clone());
    }
    for id in prev_ids.difference(&curr_ids) {
        diff.resolved.push((*id).clone());
    }
    for id in curr_ids.intersection(&prev_ids) {
        diff.persisting.push((*id).clone());
        let prev_f = prev_by_id[*id];
        let curr_f = curr_by_id[*id];
        match severity_trend(prev_f.severity, curr_f.severity) {
            Trend::Worsening => diff.worsening.push((*id).clone()),
            Trend::Improving => diff.improving.push((*id).clone()),
            Trend::Stable => {}
        }
    }
    diff.new.sort();
    diff.resolved.sort();
    diff.persisting.sort();
    diff.worsening.sort();
    diff.improving.sort();
    diff.debt_velocity = diff.new.len() as i64 - diff.resolved.len() as i64;
    diff
}

const TREND_EPSILON: f64 = 0.02;

fn severity_trend(prev_severity: f64, curr_severity: f64) -> Trend {
    let delta = curr_severity - prev_severity;
    if delta > TREND_EPSILON {
        Trend::Worsening
    } else if delta < -TREND_EPSILON {
        Trend::Improving
    } else {
        Trend::Stable
    }
}

/// Updates lifecycle fields on `current`'s findings given the full ordered
/// history of prior snapshots (oldest first). `regression` is true iff the
/// id was absent from the immediately preceding snapshot but present before
/// that (spec §4.8). `persistence_count` counts *consecutive* snapshots —
/// it's the length of the unbroken run of trailing snapshots (plus the
/// current one) a finding's id appears in, resetting to zero the moment it
/// disappears for even one snapshot (spec line 196).
pub fn apply_lifecycle(history: &[TensorSnapshot], current: &mut TensorSnapshot) {
    let mut first_seen: HashMap<String, i64> = HashMap::new();
    let mut ever_seen_before_last: HashSet<String> = HashSet::new();
    let mut present_in_last: HashSet<String> = HashSet::new();

    for (idx, snap) in history.iter().enumerate() {
        for f in &snap.findings {
            first_seen.entry(f.id.clone()).or_insert(snap.metadata.timestamp);
            if idx + 1 < history.len() {
                ever_seen_before_last.insert(f.id.clone());
            }
        }
        if idx == history.len().saturating_sub(1) {
            present_in_last.extend(snap.findings.iter().map(|f| f.id.clone()));
        }
    }

    let last = history.last();
    for f in &mut current.findings {
        let fs = first_seen.get(&f.id).copied().unwrap_or(current.metadata.timestamp);
        let streak = consecutive_streak(history, &f.id);
        let was_in_last = present_in_last.contains(&f.id);
        let seen_earlier = ever_seen_before_last.contains(&f.id);

        let trend = last.and_then(|l| l.findings.iter().find(|lf| lf.id == f.id)).map(|lf| severity_trend(lf.severity, f.severity));

        f.lifecycle = Lifecycle {
            first_seen: Some(fs),
            persistence_count: streak + 1,
            trend,
            regression: !was_in_last && seen_earlier,
        };
    }
}

/// Length of the run of trailing snapshots (most recent first) that carry
/// `id`, stopping at the first gap.
fn consecutive_streak(history: &[TensorSnapshot], id: &str) -> u32 {
    let mut streak = 0;
    for snap in history.iter().rev() {
        if snap.findings.iter().any(|f| f.id == id) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// CHRONIC_PROBLEM: wraps any finding present in >= 3 snapshots (spec §4.8).
/// `severity = min(1.0, base.severity * 1.25 * clamp(persistence_count/10, 0.3, 1.0))`.
pub fn chronic_problem_findings(snapshot: &TensorSnapshot) -> Vec<FindingRecord> {
    snapshot
        .findings
        .iter()
        .filter(|f| f.lifecycle.persistence_count >= 3)
        .map(|base| {
            let k = base.lifecycle.persistence_count as f64;
            let severity = (base.severity * 1.25 * (k / 10.0).clamp(0.3, 1.0)).min(1.0);
            let mut evidence = base.evidence.clone();
            evidence.push(FindingEvidence {
                ir_source: "Snapshot".to_string(),
                signal: "persistence_count".to_string(),
                value: SignalValue::Int(base.lifecycle.persistence_count as i64),
                percentile: None,
                description: format!("present in {} consecutive snapshots", base.lifecycle.persistence_count),
            });
            FindingRecord {
                id: format!("chronic_problem:{}", base.id),
                pattern: "CHRONIC_PROBLEM".to_string(),
                category: base.category.clone(),
                targets: base.targets.clone(),
                severity,
                confidence: base.confidence,
                evidence,
                remediation: base.remediation.clone(),
                effort: base.effort.clone(),
                lifecycle: base.lifecycle.clone(),
            }
        })
        .collect()
}

/// ARCHITECTURE_EROSION: fires when a module's `layer_violation_count` (or
/// codebase-wide violation rate) has strictly increased across at least
/// three consecutive snapshots. Deferred to this layer because it needs
/// multi-snapshot trend data no single `FactStore` run can supply.
pub fn architecture_erosion_findings(history: &[TensorSnapshot]) -> Vec<FindingRecord> {
    if history.len() < 3 {
        return Vec::new();
    }
    let window = &history[history.len() - 3..];
    let mut module_violations: Vec<BTreeMap<String, f64>> = Vec::new();
    for snap in window {
        let mut m = BTreeMap::new();
        for (name, signals) in &snap.module_signals {
            if let Some(v) = signals.get("layer_violation_count").and_then(|v| v.as_f64()) {
                m.insert(name.clone(), v);
            }
        }
        module_violations.push(m);
    }

    let mut findings = Vec::new();
    let module_names: HashSet<&String> = module_violations.iter().flat_map(|m| m.keys()).collect();
    for name in module_names {
        let series: Vec<f64> = module_violations.iter().map(|m| m.get(name).copied().unwrap_or(0.0)).collect();
        let strictly_increasing = series.windows(2).all(|w| w[1] > w[0]) && series[series.len() - 1] > 0.0;
        if strictly_increasing {
            let id = finding_id("ARCHITECTURE_EROSION", &[name.clone()]);
            findings.push(FindingRecord {
                id,
                pattern: "ARCHITECTURE_EROSION".to_string(),
                category: "architecture".to_string(),
                targets: vec![name.clone()],
                severity: (series[series.len() - 1] / 10.0).clamp(0.0, 1.0).max(0.4),
                confidence: 0.7,
                evidence: vec![FindingEvidence {
                    ir_source: "Snapshot".to_string(),
                    signal: "layer_violation_count".to_string(),
                    value: SignalValue::Float(series[series.len() - 1]),
                    percentile: None,
                    description: format!("layer violations rising across the last {} snapshots", window.len()),
                }],
                remediation: "The layering boundary around this module is eroding; review recent dependency additions.".to_string(),
                effort: "high".to_string(),
                lifecycle: Lifecycle::default(),
            });
        }
    }
    findings.sort_by(|a, b| a.id.cmp(&b.id));
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_ids(timestamp: i64, ids: &[&str]) -> TensorSnapshot {
        TensorSnapshot {
            metadata: SnapshotMetadata {
                schema_version: 1,
                timestamp,
                commit_sha: None,
                tool_version: "test",
                config_hash: String::new(),
                tier: "Full".to_string(),
                file_count: 1,
            },
            file_signals: BTreeMap::new(),
            module_signals: BTreeMap::new(),
            codebase_signals: BTreeMap::new(),
            findings: ids
                .iter()
                .map(|id| FindingRecord {
                    id: id.to_string(),
                    pattern: "WEAK_LINK".to_string(),
                    category: "risk".to_string(),
                    targets: vec!["a.py".to_string()],
                    severity: 0.5,
                    confidence: 0.9,
                    evidence: vec![],
                    remediation: String::new(),
                    effort: "medium".to_string(),
                    lifecycle: Lifecycle::default(),
                })
                .collect(),
            suggestions: vec![],
            execution_plan: ExecutionPlanRecord {
                ran: vec![],
                skipped: vec![],
                failed: vec![],
                timings_ms: BTreeMap::new(),
                tier: "Full".to_string(),
            },
        }
    }

    #[test]
    fn persistence_count_resets_after_a_gap() {
        let history = vec![
            snapshot_with_ids(0, &["x"]),
            snapshot_with_ids(1, &["x"]),
            snapshot_with_ids(2, &[]),
            snapshot_with_ids(3, &["x"]),
        ];
        let mut current = snapshot_with_ids(4, &["x"]);
        apply_lifecycle(&history, &mut current);
        assert_eq!(current.findings[0].lifecycle.persistence_count, 2);
    }

    #[test]
    fn persistence_count_is_one_on_first_appearance() {
        let history = vec![snapshot_with_ids(0, &["other"])];
        let mut current = snapshot_with_ids(1, &["x"]);
        apply_lifecycle(&history, &mut current);
        assert_eq!(current.findings[0].lifecycle.persistence_count, 1);
    }

    #[test]
    fn finding_id_invariant_under_target_swap() {
        let a = finding_id("HIDDEN_COUPLING", &["b.py".to_string(), "a.py".to_string()]);
        let b = finding_id("HIDDEN_COUPLING", &["a.py".to_string(), "b.py".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn chronic_amplification_matches_formula() {
        let snap = TensorSnapshot {
            metadata: SnapshotMetadata {
                schema_version: 1,
                timestamp: 0,
                commit_sha: None,
                tool_version: "test",
                config_hash: String::new(),
                tier: "Full".to_string(),
                file_count: 1,
            },
            file_signals: BTreeMap::new(),
            module_signals: BTreeMap::new(),
            codebase_signals: BTreeMap::new(),
            findings: vec![FindingRecord {
                id: "x".to_string(),
                pattern: "WEAK_LINK".to_string(),
                category: "risk".to_string(),
                targets: vec!["a.py".to_string()],
                severity: 0.7,
                confidence: 0.9,
                evidence: vec![],
                remediation: String::new(),
                effort: "medium".to_string(),
                lifecycle: Lifecycle { first_seen: Some(0), persistence_count: 5, trend: None, regression: false },
            }],
            suggestions: vec![],
            execution_plan: ExecutionPlanRecord {
                ran: vec![],
                skipped: vec![],
                failed: vec![],
                timings_ms: BTreeMap::new(),
                tier: "Full".to_string(),
            },
        };
        let chronic = chronic_problem_findings(&snap);
        assert_eq!(chronic.len(), 1);
        assert!((chronic[0].severity - 0.4375).abs() < 1e-9);
    }

    #[test]
    fn rename_round_trip_preserves_identity() {
        let mut renames = HashMap::new();
        renames.insert("old.py".to_string(), "new.py".to_string());
        let before = finding_id("ORPHAN_CODE", &["new.py".to_string()]);
        let after = rename_aware_id("ORPHAN_CODE", &["old.py".to_string()], &renames);
        assert_eq!(before, after);
    }

    #[test]
    fn debt_velocity_is_new_minus_resolved() {
        let diff = SnapshotDiff {
            new: vec!["a".to_string(), "b".to_string()],
            resolved: vec!["c".to_string()],
            ..Default::default()
        };
        assert_eq!(diff.new.len() as i64 - diff.resolved.len() as i64, 1);
        let _ = diff;
    }
}
