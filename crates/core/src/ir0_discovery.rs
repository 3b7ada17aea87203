//! IR0 file discovery (spec §4.2 "IR0 input"). Walks the tree with `ignore`,
//! detects language by extension, hashes and sizes each file, and seeds the
//! `CONTAINS` relation from the codebase root. Grounded in the teacher's
//! `scan.rs` (`walk_files_parallel`, skip-dir filtering) and `types.rs`
//! (`ScanConfig` defaults).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

use crate::config::AnalysisConfig;
use crate::error::{EngineError, Result};
use crate::store::entity::{normalize_rel_path, Codebase, EntityId, File};
use crate::store::kernel::{Stage, StageWrites};
use crate::store::relation::{Relation, RelationMeta, RelationType};
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;

pub fn language_for_ext(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" | "pyi" => "python",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "java" => "java",
        _ => "unknown",
    }
}

fn is_text_file(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else { return false };
    let mut buf = [0u8; 8192];
    let n = match std::io::Read::read(&mut file, &mut buf) {
        Ok(n) => n,
        Err(_) => return false,
    };
    !buf[..n].contains(&0)
}

fn walk(cfg: &AnalysisConfig) -> Vec<(PathBuf, String)> {
    let results: Mutex<Vec<(PathBuf, String)>> = Mutex::new(Vec::new());
    let skip = cfg.skip_dirs.clone();
    let root = cfg.root.clone();
    let extensions = cfg.extensions.clone();

    WalkBuilder::new(&cfg.root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .threads(cfg.worker_ceiling.clamp(1, 12))
        .filter_entry(move |entry| {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                let name = entry.file_name().to_string_lossy();
                return !skip.contains(name.as_ref());
            }
            true
        })
        .build_parallel()
        .run(|| {
            let root = root.clone();
            let extensions = extensions.clone();
            Box::new(move |entry| {
                let Ok(entry) = entry else { return ignore::WalkState::Continue };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    return ignore::WalkState::Continue;
                }
                let abs = entry.path().to_path_buf();
                let ext = abs.extension().and_then(|e| e.to_str()).unwrap_or("").to_string();
                if !extensions.is_empty() && !extensions.contains(&ext) {
                    return ignore::WalkState::Continue;
                }
                let rel = normalize_rel_path(&root, &abs);
                results.lock().unwrap().push((abs, rel));
                ignore::WalkState::Continue
            })
        });

    results.into_inner().unwrap_or_default()
}

/// File discovery stage: walks the tree, reads each file once, and seeds
/// the file catalog (with size/hash/language on the entity itself) plus the
/// `lines` signal and the codebase's `CONTAINS` edges.
pub struct Ir0Discovery;

impl Stage for Ir0Discovery {
    fn name(&self) -> &'static str {
        "ir0_discovery"
    }

    fn ir_level(&self) -> IrStage {
        IrStage::Ir0
    }

    fn provides(&self) -> &'static [&'static str] {
        &["lines"]
    }

    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    fn timeout(&self, cfg: &AnalysisConfig) -> Duration {
        Duration::from_secs(cfg.collector_timeout_secs)
    }

    fn run(&self, _store: &FactStore, cfg: &AnalysisConfig) -> Result<StageWrites> {
        if !cfg.root.is_dir() {
            return Err(EngineError::CollectorFatal(format!(
                "root {} is not a directory",
                cfg.root.display()
            )));
        }

        let mut writes = StageWrites::default();
        let codebase_id = EntityId::Codebase;

        let mut discovered = HashSet::new();
        let mut skipped_large = 0u32;
        let mut skipped_binary = 0u32;

        for (abs, rel) in walk(cfg) {
            if !discovered.insert(rel.clone()) {
                continue;
            }
            let Ok(meta) = fs::metadata(&abs) else { continue };
            if meta.len() > cfg.max_file_bytes {
                skipped_large += 1;
                continue;
            }
            if !is_text_file(&abs) {
                skipped_binary += 1;
                continue;
            }
            let Ok(content) = fs::read_to_string(&abs) else {
                skipped_binary += 1;
                continue;
            };

            let ext = abs.extension().and_then(|e| e.to_str()).unwrap_or("");
            let language = language_for_ext(ext);
            let line_count = content.lines().count() as i64;
            let hash = format!("{:x}", Sha256::digest(content.as_bytes()));

            let file_entity = File {
                rel_path: rel.clone(),
                language: (language != "unknown").then(|| language.to_string()),
                content_hash: hash.clone(),
                size_bytes: meta.len(),
                meta: Default::default(),
            };

            let file_id = EntityId::File(rel.clone());
            writes.signals.push((file_id.clone(), "lines", SignalValue::Int(line_count)));
            writes.relations.push(Relation {
                kind: RelationType::Contains,
                from: codebase_id.clone(),
                to: file_id,
                weight: 1.0,
                meta: RelationMeta::default(),
            });

            writes.new_files.push(file_entity);
        }

        tracing::info!(
            discovered = discovered.len(),
            skipped_large,
            skipped_binary,
            "ir0 discovery complete"
        );

        Ok(writes)
    }
}

/// Seeds the codebase root entity itself. Not a `Stage` because it has no
/// dependencies and always runs before the kernel starts (it produces the
/// `Codebase` entity the rest of IR0 attaches signals to).
pub fn seed_codebase(store: &mut FactStore, cfg: &AnalysisConfig) {
    store.codebase = Some(Codebase {
        root: cfg.root.to_string_lossy().to_string(),
        meta: Default::default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection_covers_common_extensions() {
        assert_eq!(language_for_ext("rs"), "rust");
        assert_eq!(language_for_ext("tsx"), "typescript");
        assert_eq!(language_for_ext("xyz"), "unknown");
    }

    #[test]
    fn discovers_text_files_and_skips_oversized_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("big.rs"), "x".repeat(100)).unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8, 1, 2, 0, 3]).unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/ignored.rs"), "fn x() {}\n").unwrap();

        let mut cfg = AnalysisConfig::new(dir.path().to_path_buf());
        cfg.max_file_bytes = 50;

        let store = FactStore::new();
        let writes = Ir0Discovery.run(&store, &cfg).unwrap();

        let names: HashSet<_> = writes.new_files.iter().map(|f| f.rel_path.clone()).collect();
        assert!(names.contains("a.rs"));
        assert!(!names.contains("big.rs"), "oversized file should be skipped");
        assert!(!names.contains("blob.bin"), "binary file should be skipped");
        assert!(!names.iter().any(|n| n.starts_with("node_modules")));
    }

    #[test]
    fn fatal_on_missing_root() {
        let cfg = AnalysisConfig::new(PathBuf::from("/does/not/exist/shannon-insight"));
        let store = FactStore::new();
        let err = Ir0Discovery.run(&store, &cfg).unwrap_err();
        assert!(err.is_fatal());
    }
}
