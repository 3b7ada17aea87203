//! Shannon Insight analysis engine: a demand-driven pipeline (IR0-IR6) over
//! a shared fact store, a finder engine producing ranked findings, and a
//! snapshot/diff layer for tracking findings across runs.

pub mod config;
pub mod error;
pub mod finders;
pub mod graph_algo;
pub mod ir0_discovery;
pub mod ir1_syntax;
pub mod ir2_semantic;
pub mod ir3_graph;
pub mod ir4_architecture;
pub mod ir5s_fusion;
pub mod ir5t_temporal;
pub mod snapshot;
pub mod store;
pub mod vcs;

pub use config::AnalysisConfig;
pub use error::{EngineError, Result};
pub use store::kernel::{ExecutionReport, Kernel, Stage, Tier};
pub use store::FactStore;

use std::collections::HashSet;
use std::sync::Arc;

use store::registry;
use store::signal::IrStage;

/// Runs the full pipeline: IR0 discovery, the structural (IR1-IR4) and
/// temporal (IR5t) chains concurrently, then IR5s fusion on the joined
/// store (spec §4.1, §5). Callers that only need a subset of signals
/// should trace their own `needed` set via `trace_required_stages` and call
/// `Kernel::execute` directly instead.
///
/// Returns `Err` if any stage hit a fatal error (`EngineError::is_fatal()`);
/// the kernel still runs every chain it can before the fatal point, but the
/// caller gets the error rather than a partial, silently-degraded store.
pub fn analyze(cfg: &AnalysisConfig) -> Result<(FactStore, ExecutionReport)> {
    let mut store = FactStore::new();
    ir0_discovery::seed_codebase(&mut store, cfg);
    let kernel = Kernel::new(cfg);
    let needed: HashSet<IrStage> = registry::all_signals().iter().map(|s| s.producing_ir).collect();

    let ir0: Arc<dyn Stage> = Arc::new(ir0_discovery::Ir0Discovery);
    let structural: Vec<Arc<dyn Stage>> = vec![
        Arc::new(ir1_syntax::Ir1SyntaxExtraction),
        Arc::new(ir2_semantic::Ir2Semantic),
        Arc::new(ir3_graph::Ir3Graph),
        Arc::new(ir4_architecture::Ir4Architecture),
    ];
    let temporal: Vec<Arc<dyn Stage>> = vec![Arc::new(ir5t_temporal::Ir5tTemporal)];
    let fusion_and_finders: Vec<Arc<dyn Stage>> = vec![Arc::new(ir5s_fusion::Ir5sFusion)];

    let report = kernel.execute(&mut store, ir0, structural, temporal, fusion_and_finders, &needed);
    if let Some(err) = report.fatal.clone() {
        return Err(err);
    }
    Ok((store, report))
}
