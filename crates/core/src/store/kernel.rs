//! The demand-driven execution kernel (spec §4.1).
//!
//! `collect` → `trace` → `plan` → `execute`, then the caller drives find /
//! score / lifecycle / rank (spec §4.7, §4.8) on the closed store.
//!
//! Each [`Stage`] reads the store immutably and returns a [`StageWrites`]
//! batch; the kernel applies writes sequentially after a stage completes.
//! This is what spec §5's "write-partitioned... each stage owns an
//! exclusive write scope" means in practice: a stage never needs `&mut`
//! access to the shared store, so the two independent chains (structural,
//! temporal) can genuinely run on separate threads and simply hand back
//! their write batches to be merged at the join point.

use std::collections::HashSet;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::AnalysisConfig;
use crate::error::{EngineError, Result};
use crate::store::registry;
use crate::store::relation::Relation;
use crate::store::signal::{IrStage, SignalValue};
use crate::store::{entity::EntityId, FactStore};

/// Coarse codebase-size bucket (spec §4.1): controls whether percentiles and
/// composites run at all, and at what fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Absolute,
    Bayesian,
    Full,
}

impl Tier {
    pub fn select(file_count: usize) -> Tier {
        if file_count < 15 {
            Tier::Absolute
        } else if file_count < 50 {
            Tier::Bayesian
        } else {
            Tier::Full
        }
    }
}

/// Everything a stage produced, applied to the store by the kernel after
/// the stage returns. Mirrors the entities/signals/relations triad of the
/// fact store itself.
#[derive(Default)]
pub struct StageWrites {
    pub signals: Vec<(EntityId, &'static str, SignalValue)>,
    pub relations: Vec<Relation>,
    pub new_modules: Vec<crate::store::entity::Module>,
    pub new_authors: Vec<crate::store::entity::Author>,
    pub new_commits: Vec<crate::store::entity::Commit>,
    pub new_files: Vec<crate::store::entity::File>,
    /// Structured intermediates keyed by tag (spec §9 dynamic attribute
    /// bags), applied into the store's `artifacts` bag.
    pub artifacts: Vec<(&'static str, std::sync::Arc<dyn std::any::Any + Send + Sync>)>,
}

impl StageWrites {
    pub fn put_artifact<T: Send + Sync + 'static>(&mut self, key: &'static str, value: T) {
        self.artifacts.push((key, std::sync::Arc::new(value)));
    }

    pub fn apply(self, store: &mut FactStore) {
        for file in self.new_files {
            store.files.insert(file.rel_path.clone(), file);
        }
        for module in self.new_modules {
            store.modules.insert(module.name.clone(), module);
        }
        for author in self.new_authors {
            store.authors.insert(author.email_folded.clone(), author);
        }
        for commit in self.new_commits {
            store.commits.insert(commit.short_hash.clone(), commit);
        }
        for (entity, name, value) in self.signals {
            store.set_signal(entity, name, value);
        }
        for rel in self.relations {
            store.add_relation(rel);
        }
        for (key, value) in self.artifacts {
            store.artifacts.set_arc(key, value);
        }
    }
}

/// A single pipeline stage: a uniform capability rather than a class
/// hierarchy (spec §9 "Deep inheritance ... collapses to a uniform `Stage`
/// capability").
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn ir_level(&self) -> IrStage;
    /// Signal/relation names this stage's run() writes. Informational: used
    /// by snapshot metadata, not consulted by the scheduler (the scheduler
    /// derives IR dependencies from the signal registry's `depends_on`, see
    /// `trace_required_stages`).
    fn provides(&self) -> &'static [&'static str];
    /// Names of upstream *stages* (by `name()`) this stage must have seen
    /// run successfully before it can run.
    fn requires(&self) -> &'static [&'static str];
    fn run(&self, store: &FactStore, cfg: &AnalysisConfig) -> Result<StageWrites>;
    /// Wall-clock ceiling per spec §5 ("2 min collectors, 5 min analyzers").
    /// Defaults to `cfg.analyzer_timeout_secs`; collector stages (IR0) that
    /// need `cfg.collector_timeout_secs` instead override this.
    fn timeout(&self, cfg: &AnalysisConfig) -> Duration {
        Duration::from_secs(cfg.analyzer_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Ran { duration_ms: u64 },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierLabel {
    Absolute,
    Bayesian,
    Full,
}

impl From<Tier> for TierLabel {
    fn from(t: Tier) -> Self {
        match t {
            Tier::Absolute => TierLabel::Absolute,
            Tier::Bayesian => TierLabel::Bayesian,
            Tier::Full => TierLabel::Full,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub stages: Vec<(&'static str, StageOutcome)>,
    pub tier: TierLabel,
    /// Set when a fatal stage error (`EngineError::is_fatal()`) aborted the
    /// run partway through; every stage after the failing one is recorded
    /// as `Skipped` rather than attempted (spec §7).
    pub fatal: Option<EngineError>,
}

impl ExecutionReport {
    pub fn analyzers_ran(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .filter_map(|(name, outcome)| matches!(outcome, StageOutcome::Ran { .. }).then_some(*name))
            .collect()
    }

    pub fn ran(&self, stage_name: &str) -> bool {
        self.stages
            .iter()
            .any(|(name, outcome)| *name == stage_name && matches!(outcome, StageOutcome::Ran { .. }))
    }
}

/// Collect the union of signal names required by a set of finders, trace
/// each back to its producing IR and transitive `depends_on` set, and
/// return the minimal set of IR stages to run (spec §4.1 steps 1–2).
pub fn trace_required_stages(required_signals: &HashSet<&'static str>) -> HashSet<IrStage> {
    let mut stages = HashSet::new();
    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut frontier: Vec<&'static str> = required_signals.iter().copied().collect();

    while let Some(name) = frontier.pop() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(decl) = registry::find(name) {
            stages.insert(decl.producing_ir);
            for dep in decl.depends_on {
                frontier.push(dep);
            }
        }
    }
    stages
}

/// A stage's `requires()` is checked against everything seen so far in the
/// whole run, not just this chain: `prior` carries outcomes from chains
/// that already joined (e.g. IR0 before the structural/temporal fork),
/// `local` carries outcomes already produced earlier in *this* chain.
fn stage_deps_satisfied(
    stage: &dyn Stage,
    prior: &[(&'static str, StageOutcome)],
    local: &[(&'static str, StageOutcome)],
) -> bool {
    stage.requires().iter().all(|req| {
        prior
            .iter()
            .chain(local.iter())
            .any(|(name, outcome)| *name == *req && matches!(outcome, StageOutcome::Ran { .. }))
    })
}

/// Runs `stage` with a wall-clock ceiling. Since stage bodies are
/// synchronous CPU-bound code with no cancellation points, the deadline is
/// enforced by *not waiting* past `stage.timeout()` for a result rather
/// than by killing the worker thread: on expiry the kernel gives up on the
/// stage, records `EngineError::StageTimeout`, and the stage's writes (if
/// it eventually finishes) are simply never applied.
fn run_one(
    stage: &Arc<dyn Stage>,
    store: &FactStore,
    cfg: &AnalysisConfig,
) -> (Option<StageWrites>, StageOutcome, Option<EngineError>) {
    let start = Instant::now();
    let timeout = stage.timeout(cfg);

    let store_owned = store.clone();
    let cfg_owned = cfg.clone();
    let stage_handle = Arc::clone(stage);
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = stage_handle.run(&store_owned, &cfg_owned);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(writes)) => (
            Some(writes),
            StageOutcome::Ran { duration_ms: start.elapsed().as_millis() as u64 },
            None,
        ),
        Ok(Err(e)) => {
            let fatal = e.is_fatal().then(|| e.clone());
            if e.is_fatal() {
                tracing::error!(stage = stage.name(), error = %e, "fatal stage error");
            } else {
                tracing::warn!(stage = stage.name(), error = %e, "stage failed, skipping");
            }
            (None, StageOutcome::Failed { error: e.to_string() }, fatal)
        }
        Err(_) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            let err = EngineError::StageTimeout { stage: stage.name().to_string(), elapsed_ms };
            tracing::error!(stage = stage.name(), elapsed_ms, "stage timed out");
            (None, StageOutcome::Failed { error: err.to_string() }, None)
        }
    }
}

/// Runs a sequential chain of stages, applying each stage's writes before
/// the next stage runs (so later stages in the same chain can see earlier
/// outputs). Returns the outcomes in order plus the first fatal error hit
/// (if any). Stages whose `ir_level` isn't in `needed`, whose `requires`
/// aren't satisfied, or that run after a fatal error in this chain are
/// skipped without running.
fn run_chain(
    stages: &[Arc<dyn Stage>],
    store: &mut FactStore,
    cfg: &AnalysisConfig,
    needed: &HashSet<IrStage>,
    prior: &[(&'static str, StageOutcome)],
) -> (Vec<(&'static str, StageOutcome)>, Option<EngineError>) {
    let mut report = Vec::new();
    let mut fatal: Option<EngineError> = None;
    for stage in stages {
        if fatal.is_some() {
            report.push((stage.name(), StageOutcome::Skipped { reason: "aborted after fatal upstream error".into() }));
            continue;
        }
        if !needed.contains(&stage.ir_level()) {
            report.push((
                stage.name(),
                StageOutcome::Skipped { reason: "not required by active finders".into() },
            ));
            continue;
        }
        if !stage_deps_satisfied(stage.as_ref(), prior, &report) {
            report.push((
                stage.name(),
                StageOutcome::Skipped { reason: "upstream dependency unavailable".into() },
            ));
            continue;
        }
        let (writes, outcome, stage_fatal) = run_one(stage, store, cfg);
        if let Some(w) = writes {
            w.apply(store);
        }
        report.push((stage.name(), outcome));
        if stage_fatal.is_some() {
            fatal = stage_fatal;
        }
    }
    (report, fatal)
}

pub struct Kernel<'a> {
    pub cfg: &'a AnalysisConfig,
}

impl<'a> Kernel<'a> {
    pub fn new(cfg: &'a AnalysisConfig) -> Self {
        Self { cfg }
    }

    /// Runs IR0 (always needed, it seeds the file catalog), then the
    /// structural chain (IR1-IR4) and temporal chain (IR5t) concurrently on
    /// separate threads, joins their writes into one store, then runs
    /// fusion + finders (IR5s, IR6) sequentially (spec §5).
    ///
    /// Each chain works against its own clone of the post-IR0 store so that
    /// a later stage in the same chain (e.g. IR3 reading IR1/IR2 output)
    /// sees its predecessors' writes without any cross-thread `&mut`
    /// aliasing. The two clones are unioned back into `store` at the join
    /// point, which is sound because the chains never write the same
    /// signal name (spec §5 write-partitioning).
    ///
    /// A `requires()` check in any chain is evaluated against the *entire*
    /// run's accumulated report, not just the stages that ran in that
    /// chain: IR1/IR5t require IR0, and IR5s requires IR4, so each fork
    /// carries forward everything seen by the forks that joined before it.
    /// A fatal stage error aborts the rest of that chain immediately and
    /// short-circuits every chain still to come.
    pub fn execute(
        &self,
        store: &mut FactStore,
        ir0: Arc<dyn Stage>,
        structural: Vec<Arc<dyn Stage>>,
        temporal: Vec<Arc<dyn Stage>>,
        fusion_and_finders: Vec<Arc<dyn Stage>>,
        needed: &HashSet<IrStage>,
    ) -> ExecutionReport {
        let (mut report, mut fatal) = run_chain(std::slice::from_ref(&ir0), store, self.cfg, needed, &[]);

        if fatal.is_none() {
            let cfg = self.cfg;
            let base = store.clone();
            let prior = report.clone();
            let (structural_store, structural_report, structural_fatal, temporal_store, temporal_report, temporal_fatal) =
                std::thread::scope(|scope| {
                    let structural_handle = scope.spawn(|| {
                        let mut local = base.clone();
                        let (rep, f) = run_chain(&structural, &mut local, cfg, needed, &prior);
                        (local, rep, f)
                    });
                    let temporal_handle = scope.spawn(|| {
                        let mut local = base.clone();
                        let (rep, f) = run_chain(&temporal, &mut local, cfg, needed, &prior);
                        (local, rep, f)
                    });
                    let (s_store, s_rep, s_fatal) =
                        structural_handle.join().unwrap_or_else(|_| (base.clone(), Vec::new(), None));
                    let (t_store, t_rep, t_fatal) =
                        temporal_handle.join().unwrap_or_else(|_| (base.clone(), Vec::new(), None));
                    (s_store, s_rep, s_fatal, t_store, t_rep, t_fatal)
                });

            store.merge_from(structural_store);
            store.merge_from(temporal_store);
            report.extend(structural_report);
            report.extend(temporal_report);
            fatal = structural_fatal.or(temporal_fatal);

            if fatal.is_none() {
                let (fusion_report, fusion_fatal) = run_chain(&fusion_and_finders, store, self.cfg, needed, &report);
                report.extend(fusion_report);
                fatal = fusion_fatal;
            } else {
                for stage in &fusion_and_finders {
                    report.push((stage.name(), StageOutcome::Skipped { reason: "aborted after fatal upstream error".into() }));
                }
            }
        } else {
            for stage in structural.iter().chain(temporal.iter()).chain(fusion_and_finders.iter()) {
                report.push((stage.name(), StageOutcome::Skipped { reason: "aborted after fatal upstream error".into() }));
            }
        }

        let tier = Tier::select(store.files.len());
        ExecutionReport { stages: report, tier: tier.into(), fatal }
    }
}

/// Bounded worker-pool parallel map over file-level work within a stage
/// (spec §5 "within a chain, stages ... may internally parallelize
/// file-level work across a bounded worker pool").
pub fn parallel_map<T: Send, R: Send>(items: Vec<T>, ceiling: usize, f: impl Fn(T) -> R + Sync + Send) -> Vec<R> {
    match rayon::ThreadPoolBuilder::new().num_threads(ceiling.max(1)).build() {
        Ok(pool) => pool.install(|| items.into_par_iter().map(f).collect()),
        Err(_) => items.into_iter().map(f).collect(),
    }
}
