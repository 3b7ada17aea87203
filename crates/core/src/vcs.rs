//! Version-control boundary (spec §6). The engine consumes this trait; it
//! never talks to git directly outside of the one concrete implementation
//! below, which is grounded in the teacher's `git.rs` (git2-based blame and
//! commit-history helpers).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{Repository, Sort};

#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub sha: String,
    pub author_email: String,
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DiffSummary {
    pub adds: Vec<String>,
    pub removes: Vec<String>,
    /// (old_path, new_path, similarity 0..100)
    pub renames: Vec<(String, String, u32)>,
}

/// Abstract history provider (spec §6). A missing provider disables IR5t
/// and every temporal-only finder.
pub trait HistoryProvider: Send + Sync {
    fn current_commit_sha(&self) -> Option<String>;
    fn list_commits(&self, window: usize) -> Vec<CommitRecord>;
    fn files_in_commit(&self, sha: &str) -> Vec<String>;
    fn diff(&self, sha_a: &str, sha_b: &str) -> DiffSummary;
    /// path -> (email, commit_count)
    fn authors(&self, path: &str, window: usize) -> HashMap<String, u32>;
    fn commit_messages(&self, path: &str, window: usize) -> Vec<String>;
}

/// `git2`-backed implementation, grounded in the teacher's `git.rs`.
pub struct Git2HistoryProvider {
    repo_root: PathBuf,
}

impl Git2HistoryProvider {
    pub fn open(repo_root: &Path) -> Option<Self> {
        Repository::discover(repo_root).ok()?;
        Some(Self { repo_root: repo_root.to_path_buf() })
    }

    fn repo(&self) -> Option<Repository> {
        Repository::discover(&self.repo_root).ok()
    }
}

impl HistoryProvider for Git2HistoryProvider {
    fn current_commit_sha(&self) -> Option<String> {
        let repo = self.repo()?;
        let head = repo.head().ok()?;
        let oid = head.target()?;
        Some(oid.to_string()[..12.min(oid.to_string().len())].to_string())
    }

    fn list_commits(&self, window: usize) -> Vec<CommitRecord> {
        let Some(repo) = self.repo() else { return Vec::new() };
        let mut revwalk = match repo.revwalk() {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        if revwalk.push_head().is_err() {
            return Vec::new();
        }
        let _ = revwalk.set_sorting(Sort::TIME);

        revwalk
            .filter_map(|oid| oid.ok())
            .take(window)
            .filter_map(|oid| {
                let commit = repo.find_commit(oid).ok()?;
                let author = commit.author();
                Some(CommitRecord {
                    sha: oid.to_string()[..12.min(oid.to_string().len())].to_string(),
                    author_email: author.email().unwrap_or_default().to_string(),
                    timestamp: commit.time().seconds(),
                    message: commit.message().unwrap_or_default().to_string(),
                })
            })
            .collect()
    }

    fn files_in_commit(&self, sha: &str) -> Vec<String> {
        let Some(repo) = self.repo() else { return Vec::new() };
        let Ok(oid) = git2::Oid::from_str(sha).or_else(|_| resolve_short(&repo, sha)) else {
            return Vec::new();
        };
        let Ok(commit) = repo.find_commit(oid) else { return Vec::new() };
        let tree = match commit.tree() {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };
        let parent_tree = commit.parents().next().and_then(|p| p.tree().ok());
        let diff = match repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None) {
            Ok(d) => d,
            Err(_) => return Vec::new(),
        };
        diff.deltas()
            .filter_map(|d| d.new_file().path().map(|p| p.to_string_lossy().replace('\\', "/")))
            .collect()
    }

    fn diff(&self, sha_a: &str, sha_b: &str) -> DiffSummary {
        let mut summary = DiffSummary { adds: Vec::new(), removes: Vec::new(), renames: Vec::new() };
        let Some(repo) = self.repo() else { return summary };
        let (Ok(oid_a), Ok(oid_b)) = (
            git2::Oid::from_str(sha_a).or_else(|_| resolve_short(&repo, sha_a)),
            git2::Oid::from_str(sha_b).or_else(|_| resolve_short(&repo, sha_b)),
        ) else {
            return summary;
        };
        let (Ok(commit_a), Ok(commit_b)) = (repo.find_commit(oid_a), repo.find_commit(oid_b)) else {
            return summary;
        };
        let (Ok(tree_a), Ok(tree_b)) = (commit_a.tree(), commit_b.tree()) else {
            return summary;
        };
        let mut opts = git2::DiffOptions::new();
        let Ok(mut diff) = repo.diff_tree_to_tree(Some(&tree_a), Some(&tree_b), Some(&mut opts)) else {
            return summary;
        };
        let mut find_opts = git2::DiffFindOptions::new();
        find_opts.renames(true).rename_threshold(50);
        let _ = diff.find_similar(Some(&mut find_opts));

        for delta in diff.deltas() {
            let new_path = delta.new_file().path().map(|p| p.to_string_lossy().replace('\\', "/"));
            let old_path = delta.old_file().path().map(|p| p.to_string_lossy().replace('\\', "/"));
            match delta.status() {
                git2::Delta::Added => {
                    if let Some(p) = new_path {
                        summary.adds.push(p);
                    }
                }
                git2::Delta::Deleted => {
                    if let Some(p) = old_path {
                        summary.removes.push(p);
                    }
                }
                git2::Delta::Renamed => {
                    if let (Some(o), Some(n)) = (old_path, new_path) {
                        summary.renames.push((o, n, 100));
                    }
                }
                _ => {}
            }
        }
        summary
    }

    fn authors(&self, path: &str, window: usize) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for commit in self.list_commits(window) {
            if self.files_in_commit(&commit.sha).iter().any(|f| f == path) {
                *counts.entry(commit.author_email).or_insert(0) += 1;
            }
        }
        counts
    }

    fn commit_messages(&self, path: &str, window: usize) -> Vec<String> {
        self.list_commits(window)
            .into_iter()
            .filter(|c| self.files_in_commit(&c.sha).iter().any(|f| f == path))
            .map(|c| c.message)
            .collect()
    }
}

fn resolve_short(repo: &Repository, short: &str) -> Result<git2::Oid, git2::Error> {
    repo.revparse_single(short).map(|o| o.id())
}
