//! The static signal registry (spec §3, §4.1). 36 file signals across eight
//! dimensions, 15 module signals, 11 codebase signals. The kernel's DAG is
//! derived from this table (producing IR + `depends_on`), never hand-wired
//! per call site.

use crate::store::signal::{Domain, IrStage, Polarity, Scope, SignalDecl};

macro_rules! decl {
    ($name:expr, $scope:expr, $domain:expr, $pol:expr, $ir:expr, [$($dep:expr),* $(,)?]) => {
        SignalDecl {
            name: $name,
            scope: $scope,
            domain: $domain,
            polarity: $pol,
            producing_ir: $ir,
            depends_on: &[$($dep),*],
        }
    };
}

/// 36 per-file signals, grouped by dimension as in spec §3.
pub fn file_signals() -> Vec<SignalDecl> {
    use Domain::*;
    use IrStage::*;
    use Polarity::*;
    use Scope::File as F;
    vec![
        // SIZE (4)
        decl!("lines", F, NonNegativeInt, Neutral, Ir0, []),
        decl!("function_count", F, NonNegativeInt, Neutral, Ir1, []),
        decl!("class_count", F, NonNegativeInt, Neutral, Ir1, []),
        decl!("import_count", F, NonNegativeInt, Neutral, Ir1, []),
        // SHAPE (5)
        decl!("max_nesting_depth", F, NonNegativeInt, HighIsBad, Ir1, []),
        decl!("impl_gini", F, UnitInterval, Neutral, Ir1, []),
        decl!("cognitive_load", F, UnitInterval, HighIsBad, Ir3, ["max_nesting_depth", "function_count", "impl_gini"]),
        decl!("compression_ratio", F, UnitInterval, HighIsGood, Ir3, []),
        decl!("stub_ratio", F, UnitInterval, HighIsBad, Ir1, []),
        // NAMING (3)
        decl!("naming_drift", F, UnitInterval, HighIsBad, Ir2, []),
        decl!("concept_count", F, NonNegativeInt, Neutral, Ir2, []),
        decl!("concept_entropy", F, NonNegativeFloat, Neutral, Ir2, []),
        // REFERENCE (8)
        decl!("in_degree", F, NonNegativeInt, Neutral, Ir3, []),
        decl!("out_degree", F, NonNegativeInt, Neutral, Ir3, []),
        decl!("pagerank", F, UnitInterval, HighIsBad, Ir3, []),
        decl!("betweenness", F, NonNegativeFloat, HighIsBad, Ir3, []),
        decl!("depth", F, Any, Neutral, Ir3, []),
        decl!("is_orphan", F, Bool, HighIsBad, Ir3, ["in_degree"]),
        decl!("blast_radius_size", F, NonNegativeInt, HighIsBad, Ir3, []),
        decl!("community", F, NonNegativeInt, Neutral, Ir3, []),
        // INFORMATION (5)
        decl!("semantic_coherence", F, UnitInterval, HighIsGood, Ir3, ["concept_count"]),
        decl!("docstring_coverage", F, UnitInterval, HighIsGood, Ir2, []),
        decl!("todo_density", F, NonNegativeFloat, HighIsBad, Ir2, []),
        decl!("phantom_import_count", F, NonNegativeInt, HighIsBad, Ir1, []),
        decl!("broken_call_count", F, NonNegativeInt, HighIsBad, Ir3, []),
        // CHANGE (5)
        decl!("total_changes", F, NonNegativeInt, Neutral, Ir5t, []),
        decl!("churn_trajectory", F, Enum(&["STABLE", "CHURNING", "SPIKING", "DORMANT"]), Neutral, Ir5t, ["total_changes"]),
        decl!("fix_ratio", F, UnitInterval, HighIsBad, Ir5t, []),
        decl!("refactor_ratio", F, UnitInterval, HighIsGood, Ir5t, []),
        decl!("commit_recency_days", F, NonNegativeFloat, Neutral, Ir5t, []),
        // AUTHORSHIP (3)
        decl!("author_count", F, NonNegativeInt, Neutral, Ir5t, []),
        decl!("bus_factor", F, NonNegativeFloat, HighIsGood, Ir5t, ["author_count"]),
        decl!("owner_commit_share", F, UnitInterval, HighIsBad, Ir5t, ["author_count"]),
        // INTENT (3)
        decl!("role", F, Enum(&[
            "TEST", "MIGRATION", "ENTRY_POINT", "INTERFACE", "CONSTANT", "EXCEPTION",
            "MODEL", "CLI", "CONFIG", "SERVICE", "UTILITY", "UNKNOWN",
        ]), Neutral, Ir2, []),
        decl!("is_test", F, Bool, Neutral, Ir2, ["role"]),
        decl!("is_entry_point", F, Bool, Neutral, Ir2, ["role"]),
        // Composites (fusion layer, spec §4.6) — counted within REFERENCE/SHAPE
        // conceptually but declared once here to avoid double-counting.
        decl!("risk_score", F, UnitInterval, HighIsBad, Ir5s, [
            "pagerank", "blast_radius_size", "cognitive_load", "churn_trajectory", "bus_factor",
        ]),
        decl!("wiring_quality", F, UnitInterval, HighIsGood, Ir5s, [
            "is_orphan", "stub_ratio", "phantom_import_count", "broken_call_count",
        ]),
        decl!("health_laplacian", F, Any, HighIsBad, Ir5s, ["risk_score"]),
    ]
}

/// 15 per-module signals.
pub fn module_signals() -> Vec<SignalDecl> {
    use Domain::*;
    use IrStage::*;
    use Polarity::*;
    use Scope::Module as M;
    vec![
        decl!("ca", M, NonNegativeInt, Neutral, Ir4, []),
        decl!("ce", M, NonNegativeInt, Neutral, Ir4, []),
        decl!("instability", M, Any, Neutral, Ir4, ["ca", "ce"]),
        decl!("abstractness", M, UnitInterval, Neutral, Ir4, []),
        decl!("main_seq_distance", M, UnitInterval, HighIsBad, Ir4, ["instability", "abstractness"]),
        decl!("cohesion", M, UnitInterval, HighIsGood, Ir4, []),
        decl!("coupling", M, NonNegativeFloat, HighIsBad, Ir4, []),
        decl!("boundary_alignment", M, UnitInterval, HighIsGood, Ir4, []),
        decl!("role_consistency", M, UnitInterval, HighIsGood, Ir4, []),
        decl!("layer_violation_count", M, NonNegativeInt, HighIsBad, Ir4, []),
        decl!("module_bus_factor", M, NonNegativeFloat, HighIsGood, Ir5t, []),
        decl!("file_count", M, NonNegativeInt, Neutral, Ir4, []),
        decl!("team_size", M, NonNegativeInt, Neutral, Ir5t, []),
        decl!("avg_risk_score", M, UnitInterval, HighIsBad, Ir5s, ["risk_score"]),
        decl!("health_score", M, UnitInterval, HighIsGood, Ir5s, [
            "cohesion", "coupling", "main_seq_distance", "avg_risk_score",
        ]),
    ]
}

/// 11 codebase-wide (topology) signals.
pub fn codebase_signals() -> Vec<SignalDecl> {
    use Domain::*;
    use IrStage::*;
    use Polarity::*;
    use Scope::Codebase as C;
    vec![
        decl!("modularity", C, Any, HighIsGood, Ir3, []),
        decl!("fiedler_value", C, Any, Neutral, Ir3, []),
        decl!("spectral_gap", C, Any, Neutral, Ir3, ["fiedler_value"]),
        decl!("cycle_count", C, NonNegativeInt, HighIsBad, Ir3, []),
        decl!("centrality_gini", C, UnitInterval, HighIsBad, Ir3, []),
        decl!("orphan_ratio", C, UnitInterval, HighIsBad, Ir3, []),
        decl!("phantom_ratio", C, UnitInterval, HighIsBad, Ir3, []),
        decl!("glue_deficit", C, UnitInterval, HighIsBad, Ir3, []),
        decl!("wiring_score", C, UnitInterval, HighIsGood, Ir5s, ["orphan_ratio", "phantom_ratio"]),
        decl!("architecture_health", C, UnitInterval, HighIsGood, Ir5s, ["health_score"]),
        decl!("codebase_health", C, UnitInterval, HighIsGood, Ir5s, ["wiring_score", "architecture_health"]),
    ]
}

pub fn all_signals() -> Vec<SignalDecl> {
    let mut v = file_signals();
    v.extend(module_signals());
    v.extend(codebase_signals());
    v
}

pub fn find(name: &str) -> Option<SignalDecl> {
    all_signals().into_iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_signal_count_matches_spec() {
        assert_eq!(file_signals().len(), 36, "spec §3 declares 36 per-file signals");
    }

    #[test]
    fn module_signal_count_matches_spec() {
        assert_eq!(module_signals().len(), 15, "spec §3 declares 15 per-module signals");
    }

    #[test]
    fn codebase_signal_count_matches_spec() {
        assert_eq!(codebase_signals().len(), 11, "spec §3 declares 11 per-codebase signals");
    }

    #[test]
    fn no_duplicate_names() {
        let mut names: Vec<&str> = all_signals().iter().map(|s| s.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len(), "signal names must be unique across scopes");
    }
}
