//! Shannon Insight CLI — thin invocation shell around `shannon-insight-core`.
//!
//! Runs the analysis pipeline against a project root and emits a
//! `TensorSnapshot`, either as a JSON document or a human-readable summary.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};

use shannon_insight_core::finders::run_finders;
use shannon_insight_core::snapshot::{apply_lifecycle, build_snapshot, diff_snapshots, TensorSnapshot};
use shannon_insight_core::store::kernel::Tier;
use shannon_insight_core::vcs::Git2HistoryProvider;
use shannon_insight_core::{analyze, AnalysisConfig};

/// Shannon Insight — multi-signal codebase analysis.
#[derive(Parser)]
#[command(name = "shannon-insight", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis pipeline and emit a snapshot
    Analyze {
        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Write the snapshot document to this path instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Diff against a prior snapshot and report lifecycle changes
        #[arg(long)]
        previous: Option<PathBuf>,

        /// How many commits back IR5t should look
        #[arg(long, default_value = "2000")]
        history_window: usize,

        /// Exit policy: "none", "any-finding", or "severe" (severity >= 0.8)
        #[arg(long, default_value = "none")]
        policy: String,

        /// Maximum findings to print in text mode
        #[arg(long, default_value = "25")]
        limit: usize,
    },
    /// Diff two previously saved snapshots
    Diff {
        /// Older snapshot
        previous: PathBuf,
        /// Newer snapshot
        current: PathBuf,
    },
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = root.unwrap_or_else(|| std::env::current_dir().expect("could not determine current directory"));
    root.canonicalize().with_context(|| format!("project root not found: {}", root.display()))
}

fn config_hash(cfg: &AnalysisConfig) -> String {
    use sha2::{Digest, Sha256};
    let payload = format!(
        "{}|{}|{}|{}",
        cfg.max_file_bytes, cfg.clone_ncd_threshold, cfg.history_window, cfg.worker_ceiling
    );
    let digest = Sha256::digest(payload.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

fn load_snapshot(path: &PathBuf) -> Result<TensorSnapshot> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
}

fn run_analyze(
    root: Option<PathBuf>,
    output: Option<PathBuf>,
    previous: Option<PathBuf>,
    history_window: usize,
    policy: String,
    limit: usize,
    json: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    let mut cfg = AnalysisConfig::new(root.clone());
    cfg.history_window = history_window;

    let (store, report) = analyze(&cfg).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let findings = run_finders(&store, &cfg);
    let tier = Tier::select(store.files.len());
    let commit_sha = Git2HistoryProvider::open(&root).and_then(|p| p.current_commit_sha());
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let mut snapshot = build_snapshot(&store, &findings, &report, tier, commit_sha, config_hash(&cfg), timestamp);

    if let Some(prev_path) = &previous {
        let prev = load_snapshot(prev_path)?;
        apply_lifecycle(std::slice::from_ref(&prev), &mut snapshot);
        let diff = diff_snapshots(&prev, &snapshot, &std::collections::HashMap::new());
        if json {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        } else {
            print_diff_summary(&diff);
        }
    }

    if let Some(out_path) = &output {
        std::fs::write(out_path, serde_json::to_string_pretty(&snapshot)?)
            .with_context(|| format!("writing snapshot to {}", out_path.display()))?;
    } else if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot_summary(&snapshot, limit);
    }

    check_policy(&policy, &snapshot)
}

fn print_snapshot_summary(snapshot: &TensorSnapshot, limit: usize) {
    println!("Tier:           {}", snapshot.metadata.tier);
    println!("Files analyzed: {}", snapshot.metadata.file_count);
    println!("Findings:       {}", snapshot.findings.len());
    println!("Analyzers ran:  {}", snapshot.execution_plan.ran.join(", "));
    if !snapshot.execution_plan.skipped.is_empty() {
        println!("Skipped:");
        for (stage, reason) in &snapshot.execution_plan.skipped {
            println!("  {stage:<20} {reason}");
        }
    }
    println!();
    for f in snapshot.findings.iter().take(limit) {
        println!(
            "[{:<5.2}] {:<22} {:<30} conf={:.2}",
            f.severity,
            f.pattern,
            f.targets.join(", "),
            f.confidence
        );
    }
    if snapshot.findings.len() > limit {
        eprintln!("\n... {} more findings omitted", snapshot.findings.len() - limit);
    }
}

fn print_diff_summary(diff: &shannon_insight_core::snapshot::SnapshotDiff) {
    println!("New:         {}", diff.new.len());
    println!("Resolved:    {}", diff.resolved.len());
    println!("Persisting:  {}", diff.persisting.len());
    println!("Worsening:   {}", diff.worsening.len());
    println!("Improving:   {}", diff.improving.len());
    println!("Debt velocity: {}", diff.debt_velocity);
}

fn check_policy(policy: &str, snapshot: &TensorSnapshot) -> Result<()> {
    match policy {
        "none" => Ok(()),
        "any-finding" => {
            if snapshot.findings.is_empty() {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        "severe" => {
            if snapshot.findings.iter().any(|f| f.severity >= 0.8) {
                std::process::exit(1);
            }
            Ok(())
        }
        other => bail!("unknown exit policy '{other}' (expected none, any-finding, or severe)"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("shannon_insight=warn".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { root, output, previous, history_window, policy, limit } => {
            run_analyze(root, output, previous, history_window, policy, limit, cli.json)
        }
        Commands::Diff { previous, current } => {
            let prev = load_snapshot(&previous)?;
            let curr = load_snapshot(&current)?;
            let diff = diff_snapshots(&prev, &curr, &std::collections::HashMap::new());
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                print_diff_summary(&diff);
            }
            Ok(())
        }
    }
}
