//! Engine-facing configuration boundary (spec §1, §6). Parsing a config
//! file into this struct is explicitly out of scope; callers construct it
//! programmatically. Shape follows the teacher's `ScanConfig`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub root: PathBuf,
    /// Directory names to skip during the IR0 walk.
    pub skip_dirs: HashSet<String>,
    /// File extensions to include. Empty = all recognized source files.
    pub extensions: HashSet<String>,
    /// Files larger than this (bytes) are skipped (spec §4.2 Failure model).
    pub max_file_bytes: u64,
    /// Worker-pool ceiling for file-level parallelism (spec §5).
    pub worker_ceiling: usize,
    /// Per-stage timeouts (spec §5): collectors vs analyzers vs finders.
    pub collector_timeout_secs: u64,
    pub analyzer_timeout_secs: u64,
    pub finder_timeout_secs: u64,
    /// NCD threshold below which a file pair is CLONED_FROM (spec §4.4).
    pub clone_ncd_threshold: f64,
    /// How many commits back IR5t looks (spec §6 history `window`).
    pub history_window: usize,
    /// Explicit file→module assignment, highest-priority module detection
    /// tier (spec §4.5). Populated by the config-parsing layer; empty means
    /// fall back to Louvain communities, then top-level directories.
    pub explicit_modules: HashMap<String, String>,
}

pub const DEFAULT_MAX_FILE_BYTES: u64 = 512 * 1024;

impl AnalysisConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            skip_dirs: [".git", "node_modules", "__pycache__", "target", "dist", "build", ".next", "vendor"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extensions: HashSet::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            worker_ceiling: num_cpus_approx(),
            collector_timeout_secs: 120,
            analyzer_timeout_secs: 300,
            finder_timeout_secs: 30,
            clone_ncd_threshold: 0.3,
            history_window: 2000,
            explicit_modules: HashMap::new(),
        }
    }
}

/// Avoids taking a `num_cpus` dependency for one call site; mirrors what the
/// teacher does ad hoc in a couple of places (`std::thread::available_parallelism`).
fn num_cpus_approx() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
