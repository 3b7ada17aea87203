//! IR1 syntactic extraction (spec §4.2). Parses every file, classifies
//! stubs, and runs the cross-file import-resolution post-pass.

pub mod imports;
pub mod parser;
#[cfg(feature = "treesitter")]
pub mod tree_sitter_parser;
pub mod regex_fallback;
pub mod tokenize;
pub mod types;

use std::collections::{BTreeSet, HashMap};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::store::entity::EntityId;
use crate::store::kernel::{parallel_map, Stage, StageWrites};
use crate::store::relation::{Relation, RelationMeta, RelationType};
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;

use parser::SyntaxParser;
use types::FileSyntax;

pub const SYNTAX_ARTIFACT_KEY: &str = "ir1.syntax_index";

pub type SyntaxIndex = HashMap<String, FileSyntax>;

fn build_parser() -> Box<dyn SyntaxParser> {
    #[cfg(feature = "treesitter")]
    {
        Box::new(tree_sitter_parser::TreeSitterParser)
    }
    #[cfg(not(feature = "treesitter"))]
    {
        Box::new(regex_fallback::RegexFallbackParser)
    }
}

pub struct Ir1SyntaxExtraction;

impl Stage for Ir1SyntaxExtraction {
    fn name(&self) -> &'static str {
        "ir1_syntax"
    }

    fn ir_level(&self) -> IrStage {
        IrStage::Ir1
    }

    fn provides(&self) -> &'static [&'static str] {
        &["function_count", "class_count", "import_count", "max_nesting_depth", "impl_gini", "stub_ratio", "phantom_import_count"]
    }

    fn requires(&self) -> &'static [&'static str] {
        &["ir0_discovery"]
    }

    fn run(&self, store: &FactStore, cfg: &AnalysisConfig) -> Result<StageWrites> {
        let primary = build_parser();
        let fallback = regex_fallback::RegexFallbackParser;

        let entries: Vec<(String, std::path::PathBuf, String)> = store
            .files
            .values()
            .map(|f| {
                let ext = f.rel_path.rsplit_once('.').map(|(_, e)| e).unwrap_or("").to_string();
                (f.rel_path.clone(), cfg.root.join(&f.rel_path), ext)
            })
            .collect();

        let parsed: Vec<(String, FileSyntax)> = parallel_map(entries, cfg.worker_ceiling, |(rel, abs, ext)| {
            let content = std::fs::read_to_string(&abs).unwrap_or_default();
            let syntax = if primary.supports(&ext) {
                primary.parse(&content, &ext)
            } else {
                fallback.parse(&content, &ext)
            };
            (rel, syntax)
        });

        let mut index: SyntaxIndex = parsed.into_iter().collect();
        let known_paths: BTreeSet<String> = store.files.keys().cloned().collect();
        let mut import_map: HashMap<String, Vec<types::ImportDecl>> =
            index.iter().map(|(k, v)| (k.clone(), v.imports.clone())).collect();
        imports::resolve_imports(&mut import_map, &known_paths);
        for (path, decls) in import_map {
            if let Some(syntax) = index.get_mut(&path) {
                syntax.imports = decls;
            }
        }

        let mut writes = StageWrites::default();
        for (rel, syntax) in &index {
            let file_id = EntityId::File(rel.clone());
            writes.signals.push((file_id.clone(), "function_count", SignalValue::Int(syntax.function_count() as i64)));
            writes.signals.push((file_id.clone(), "class_count", SignalValue::Int(syntax.class_count() as i64)));
            writes.signals.push((file_id.clone(), "import_count", SignalValue::Int(syntax.import_count() as i64)));
            writes.signals.push((file_id.clone(), "max_nesting_depth", SignalValue::Int(syntax.max_nesting_depth() as i64)));
            writes.signals.push((file_id.clone(), "impl_gini", SignalValue::clamped_unit(syntax.impl_gini())));
            writes.signals.push((file_id.clone(), "stub_ratio", SignalValue::clamped_unit(syntax.stub_ratio())));

            let phantom_count = syntax.imports.iter().filter(|i| i.resolved_path.is_none() && !i.is_external).count();
            writes.signals.push((file_id.clone(), "phantom_import_count", SignalValue::Int(phantom_count as i64)));

            for imp in &syntax.imports {
                if let Some(target) = &imp.resolved_path {
                    if target != rel {
                        writes.relations.push(Relation {
                            kind: RelationType::Imports,
                            from: file_id.clone(),
                            to: EntityId::File(target.clone()),
                            weight: 1.0,
                            meta: RelationMeta::default(),
                        });
                    }
                }
            }
        }

        tracing::info!(files = index.len(), "ir1 syntax extraction complete");
        writes.put_artifact(SYNTAX_ARTIFACT_KEY, index);
        Ok(writes)
    }
}
