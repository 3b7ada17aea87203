//! Regex-based degraded parser (spec §4.2 `parse_mode=REGEX`), used when no
//! tree-sitter grammar covers an extension, or when the `treesitter` feature
//! is disabled. Coarser: no nesting/call-target detail, but still yields the
//! signal set downstream stages need.

use regex::Regex;
use std::sync::OnceLock;

use super::parser::SyntaxParser;
use super::tokenize::token_count;
use super::types::{ClassDef, FileSyntax, FunctionDef, ImportDecl, ParseMode};
use super::types::stub_score as compute_stub_score;

fn fn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:pub\s+|export\s+|async\s+|def\s+|func\s+|function\s+)*(?:fn|def|func|function)\s+([A-Za-z_][A-Za-z0-9_]*)")
            .unwrap()
    })
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:pub\s+|export\s+)*(?:class|struct|interface|trait)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap()
    })
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:use\s+|import\s+|from\s+\S+\s+import|#include\s*[<\x22])").unwrap()
    })
}

pub struct RegexFallbackParser;

impl SyntaxParser for RegexFallbackParser {
    fn supports(&self, _ext: &str) -> bool {
        true
    }

    fn parse(&self, content: &str, _ext: &str) -> FileSyntax {
        let lines = content.lines().count();
        let mut functions = Vec::new();

        let fn_matches: Vec<_> = fn_re().captures_iter(content).collect();
        for (i, cap) in fn_matches.iter().enumerate() {
            let name = cap.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let start_byte = cap.get(0).unwrap().start();
            let start_line = content[..start_byte].lines().count() + 1;
            let next_start = fn_matches
                .get(i + 1)
                .map(|c| c.get(0).unwrap().start())
                .unwrap_or(content.len());
            let body = &content[start_byte..next_start];
            let body_tokens = token_count(body);
            let sig_tokens = token_count(cap.get(0).unwrap().as_str());
            functions.push(FunctionDef {
                name,
                params: Vec::new(),
                return_type: None,
                body_token_count: body_tokens,
                signature_token_count: sig_tokens,
                start_line,
                end_line: start_line + body.lines().count(),
                call_targets: Vec::new(),
                max_nesting_depth: body.matches('{').count().max(body.matches(':').count()),
                decorators: Vec::new(),
                is_method: false,
                enclosing_class: None,
                stub_score: compute_stub_score(body_tokens, sig_tokens, body),
            });
        }

        let classes: Vec<ClassDef> = class_re()
            .captures_iter(content)
            .map(|cap| {
                let name = cap.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
                let start_byte = cap.get(0).unwrap().start();
                let start_line = content[..start_byte].lines().count() + 1;
                ClassDef {
                    name,
                    bases: Vec::new(),
                    methods: Vec::new(),
                    field_names: Vec::new(),
                    decorators: Vec::new(),
                    is_abstract: false,
                    start_line,
                    end_line: start_line,
                }
            })
            .collect();

        let imports: Vec<ImportDecl> = import_re()
            .find_iter(content)
            .map(|m| {
                let line = m.as_str().trim().to_string();
                let is_relative = line.contains('.') && (line.contains("from .") || line.contains("./"));
                ImportDecl {
                    source: line,
                    imported_names: Vec::new(),
                    is_relative,
                    resolved_path: None,
                    is_external: false,
                }
            })
            .collect();

        FileSyntax {
            parse_mode: ParseMode::Regex,
            has_errors: false,
            lines,
            functions,
            classes,
            imports,
            top_level_statements: 0,
        }
    }
}
