//! IR5t temporal analysis (spec §4.5 history-derived signals, §6 VCS
//! boundary). Runs against a `HistoryProvider`; if none is configured this
//! stage (and every finder depending on it) is skipped (spec §6).

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::AnalysisConfig;
use crate::error::{EngineError, Result};
use crate::store::entity::{fold_email, Author, Commit, EntityId};
use crate::store::kernel::{Stage, StageWrites};
use crate::store::relation::{CochangeMeta, Relation, RelationMeta, RelationType};
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;
use crate::vcs::{CommitRecord, Git2HistoryProvider, HistoryProvider};

/// Commits touching more files than this are excluded from co-change
/// counting — large sweeping commits (formatting, mass renames) would turn
/// every file pair in the repo into a spurious co-change edge.
const COCHANGE_COMMIT_FILE_CAP: usize = 50;

fn fix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(fix|bug|patch|hotfix|resolve|repair|correct)\b").unwrap())
}

fn refactor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(refactor|cleanup|rename|simplify)\b").unwrap())
}

fn shannon_entropy_bits(counts: &HashMap<String, u32>) -> f64 {
    let total: u32 = counts.values().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&c| {
            if c == 0 {
                0.0
            } else {
                let p = c as f64 / total as f64;
                -p * p.log2()
            }
        })
        .sum()
}

fn top_level_dir(rel_path: &str) -> String {
    rel_path.split('/').next().unwrap_or(rel_path).to_string()
}

struct FileHistory<'a> {
    commits: Vec<&'a CommitRecord>,
    author_counts: HashMap<String, u32>,
}

pub struct Ir5tTemporal;

impl Stage for Ir5tTemporal {
    fn name(&self) -> &'static str {
        "ir5t_temporal"
    }

    fn ir_level(&self) -> IrStage {
        IrStage::Ir5t
    }

    fn provides(&self) -> &'static [&'static str] {
        &[
            "total_changes", "churn_trajectory", "fix_ratio", "refactor_ratio",
            "commit_recency_days", "author_count", "bus_factor", "owner_commit_share",
            "module_bus_factor", "team_size",
        ]
    }

    fn requires(&self) -> &'static [&'static str] {
        &["ir0_discovery"]
    }

    fn run(&self, store: &FactStore, cfg: &AnalysisConfig) -> Result<StageWrites> {
        let provider = Git2HistoryProvider::open(&cfg.root)
            .ok_or_else(|| EngineError::StageDependencyMissing {
                stage: self.name().to_string(),
                missing: "history provider (no git repository found)".to_string(),
            })?;

        let mut writes = StageWrites::default();
        let known_files: HashSet<&str> = store.files.keys().map(|s| s.as_str()).collect();

        let commits = provider.list_commits(cfg.history_window);
        let mut commit_files: Vec<(CommitRecord, Vec<String>)> = commits
            .into_iter()
            .map(|c| {
                let files = provider
                    .files_in_commit(&c.sha)
                    .into_iter()
                    .filter(|f| known_files.contains(f.as_str()))
                    .collect();
                (c, files)
            })
            .filter(|(_, files): &(_, Vec<String>)| !files.is_empty())
            .collect();
        commit_files.sort_by_key(|(c, _)| c.timestamp);

        let mut by_file: HashMap<&str, FileHistory> = HashMap::new();
        let mut seen_authors: HashSet<String> = HashSet::new();
        for (commit, files) in &commit_files {
            let email = fold_email(&commit.author_email);
            seen_authors.insert(email.clone());
            for f in files {
                let entry = by_file.entry(f.as_str()).or_insert_with(|| FileHistory {
                    commits: Vec::new(),
                    author_counts: HashMap::new(),
                });
                entry.commits.push(commit);
                *entry.author_counts.entry(email.clone()).or_insert(0) += 1;
            }
        }

        for author in &seen_authors {
            writes.new_authors.push(Author { email_folded: author.clone(), meta: Default::default() });
        }
        for (commit, _) in &commit_files {
            writes.new_commits.push(Commit {
                short_hash: commit.sha.clone(),
                author_email_folded: fold_email(&commit.author_email),
                timestamp: commit.timestamp,
                message: commit.message.clone(),
                meta: Default::default(),
            });
        }

        let median_total_changes = {
            let mut counts: Vec<usize> = by_file.values().map(|h| h.commits.len()).filter(|&c| c > 0).collect();
            counts.sort_unstable();
            if counts.is_empty() {
                0.0
            } else if counts.len() % 2 == 1 {
                counts[counts.len() / 2] as f64
            } else {
                (counts[counts.len() / 2 - 1] + counts[counts.len() / 2]) as f64 / 2.0
            }
        };

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        for rel in store.files.keys() {
            let file_id = EntityId::File(rel.clone());
            let history = by_file.get(rel.as_str());
            let total_changes = history.map(|h| h.commits.len()).unwrap_or(0);
            writes.signals.push((file_id.clone(), "total_changes", SignalValue::Int(total_changes as i64)));

            let trajectory = match history {
                None => "DORMANT",
                Some(h) if h.commits.is_empty() => "DORMANT",
                Some(h) => {
                    let mid = h.commits.len() / 2;
                    let (older, newer) = h.commits.split_at(mid);
                    if total_changes >= 4 && newer.len() as f64 >= 2.0 * older.len().max(1) as f64 {
                        "SPIKING"
                    } else if total_changes as f64 > median_total_changes {
                        "CHURNING"
                    } else {
                        "STABLE"
                    }
                }
            };
            writes.signals.push((file_id.clone(), "churn_trajectory", SignalValue::Enum(trajectory.to_string())));

            let (fix_count, refactor_count) = history
                .map(|h| {
                    let fixes = h.commits.iter().filter(|c| fix_re().is_match(&c.message)).count();
                    let refactors = h.commits.iter().filter(|c| refactor_re().is_match(&c.message)).count();
                    (fixes, refactors)
                })
                .unwrap_or((0, 0));
            let denom = total_changes.max(1) as f64;
            writes.signals.push((file_id.clone(), "fix_ratio", SignalValue::clamped_unit(fix_count as f64 / denom)));
            writes.signals.push((file_id.clone(), "refactor_ratio", SignalValue::clamped_unit(refactor_count as f64 / denom)));

            if let Some(h) = history.filter(|h| !h.commits.is_empty()) {
                let last = h.commits.iter().map(|c| c.timestamp).max().unwrap_or(now);
                let recency_days = ((now - last).max(0) as f64) / 86400.0;
                writes.signals.push((file_id.clone(), "commit_recency_days", SignalValue::Float(recency_days)));
            }

            let author_count = history.map(|h| h.author_counts.len()).unwrap_or(0);
            writes.signals.push((file_id.clone(), "author_count", SignalValue::Int(author_count as i64)));

            let entropy = history.map(|h| shannon_entropy_bits(&h.author_counts)).unwrap_or(0.0);
            writes.signals.push((file_id.clone(), "bus_factor", SignalValue::Float(2f64.powf(entropy))));

            let owner_share = history
                .map(|h| {
                    let max_count = h.author_counts.values().copied().max().unwrap_or(0);
                    max_count as f64 / total_changes.max(1) as f64
                })
                .unwrap_or(0.0);
            writes.signals.push((file_id.clone(), "owner_commit_share", SignalValue::clamped_unit(owner_share)));

            if let Some(h) = history {
                for (author, count) in &h.author_counts {
                    writes.relations.push(Relation {
                        kind: RelationType::AuthoredBy,
                        from: file_id.clone(),
                        to: EntityId::Author(author.clone()),
                        weight: *count as f64,
                        meta: RelationMeta { cochange: None, commit_count: Some(*count) },
                    });
                }
            }
        }

        emit_cochange_relations(&commit_files, &by_file, &mut writes);

        // Module-level aggregates (spec §4.5 module_bus_factor, team_size).
        // Computed against top-level-directory grouping rather than IR4's
        // final module assignment: the temporal chain runs concurrently
        // with, and independently of, the structural chain (spec §5
        // write-partitioning), so IR3/IR4 outputs aren't visible here yet.
        let mut module_author_counts: HashMap<String, HashMap<String, u32>> = HashMap::new();
        for rel in store.files.keys() {
            let module = top_level_dir(rel);
            if let Some(h) = by_file.get(rel.as_str()) {
                let entry = module_author_counts.entry(module).or_default();
                for (author, count) in &h.author_counts {
                    *entry.entry(author.clone()).or_insert(0) += count;
                }
            }
        }
        for (module, counts) in &module_author_counts {
            let module_id = EntityId::Module(module.clone());
            let entropy = shannon_entropy_bits(counts);
            writes.signals.push((module_id.clone(), "module_bus_factor", SignalValue::Float(2f64.powf(entropy))));
            writes.signals.push((module_id.clone(), "team_size", SignalValue::Int(counts.len() as i64)));
        }

        tracing::info!(commits = commit_files.len(), files_with_history = by_file.len(), "ir5t temporal analysis complete");
        Ok(writes)
    }
}

/// Builds COCHANGES_WITH edges from commits touching multiple known files.
/// `lift = P(A∩B) / (P(A)·P(B))`, `confidence(A→B) = P(A∩B)/P(A)` (spec
/// §GLOSSARY), both measured against the window's commit count.
fn emit_cochange_relations(
    commit_files: &[(CommitRecord, Vec<String>)],
    by_file: &HashMap<&str, FileHistory>,
    writes: &mut StageWrites,
) {
    let total_commits = commit_files.len().max(1) as f64;
    let mut pair_counts: HashMap<(String, String), u32> = HashMap::new();
    for (_, files) in commit_files {
        if files.len() < 2 || files.len() > COCHANGE_COMMIT_FILE_CAP {
            continue;
        }
        let mut sorted = files.clone();
        sorted.sort();
        sorted.dedup();
        for i in 0..sorted.len() {
            for j in (i + 1)..sorted.len() {
                *pair_counts.entry((sorted[i].clone(), sorted[j].clone())).or_insert(0) += 1;
            }
        }
    }

    for ((a, b), count) in pair_counts {
        if count == 0 {
            continue;
        }
        let changes_a = by_file.get(a.as_str()).map(|h| h.commits.len()).unwrap_or(0) as f64;
        let changes_b = by_file.get(b.as_str()).map(|h| h.commits.len()).unwrap_or(0) as f64;
        if changes_a == 0.0 || changes_b == 0.0 {
            continue;
        }
        let p_a = changes_a / total_commits;
        let p_b = changes_b / total_commits;
        let p_ab = count as f64 / total_commits;
        let lift = p_ab / (p_a * p_b).max(1e-9);
        let conf_a_b = count as f64 / changes_a;
        let conf_b_a = count as f64 / changes_b;
        let confidence = conf_a_b.max(conf_b_a);

        writes.relations.push(Relation {
            kind: RelationType::CochangesWith,
            from: EntityId::File(a),
            to: EntityId::File(b),
            weight: lift,
            meta: RelationMeta { cochange: Some(CochangeMeta { count, confidence }), commit_count: None },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_is_zero_for_single_author() {
        let mut counts = HashMap::new();
        counts.insert("a@x.com".to_string(), 5);
        assert!(shannon_entropy_bits(&counts).abs() < 1e-9);
    }

    #[test]
    fn entropy_is_one_bit_for_two_equal_authors() {
        let mut counts = HashMap::new();
        counts.insert("a@x.com".to_string(), 5);
        counts.insert("b@x.com".to_string(), 5);
        assert!((shannon_entropy_bits(&counts) - 1.0).abs() < 1e-9);
    }
}
