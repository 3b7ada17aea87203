//! Syntactic extraction output types (spec §4.2).

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub source: String,
    pub imported_names: Vec<String>,
    pub is_relative: bool,
    /// Filled in by the import-resolution post-pass.
    pub resolved_path: Option<String>,
    pub is_external: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: Option<String>,
    pub body_token_count: usize,
    pub signature_token_count: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub call_targets: Vec<String>,
    pub max_nesting_depth: usize,
    pub decorators: Vec<String>,
    pub is_method: bool,
    pub enclosing_class: Option<String>,
    pub stub_score: f64,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub methods: Vec<FunctionDef>,
    pub field_names: Vec<String>,
    pub decorators: Vec<String>,
    pub is_abstract: bool,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    TreeSitter,
    Regex,
}

#[derive(Debug, Clone)]
pub struct FileSyntax {
    pub parse_mode: ParseMode,
    pub has_errors: bool,
    pub lines: usize,
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<ClassDef>,
    pub imports: Vec<ImportDecl>,
    pub top_level_statements: usize,
}

impl FileSyntax {
    pub fn function_count(&self) -> usize {
        self.functions.len() + self.classes.iter().map(|c| c.methods.len()).sum::<usize>()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn import_count(&self) -> usize {
        self.imports.len()
    }

    pub fn max_nesting_depth(&self) -> usize {
        self.functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.methods.iter()))
            .map(|f| f.max_nesting_depth)
            .max()
            .unwrap_or(0)
    }

    pub fn stub_ratio(&self) -> f64 {
        let scores: Vec<f64> = self
            .functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.methods.iter()))
            .map(|f| f.stub_score)
            .collect();
        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }

    /// Gini coefficient of body-token counts (spec §4.2): measures how
    /// unevenly implementation weight is spread across a file's functions.
    pub fn impl_gini(&self) -> f64 {
        let mut counts: Vec<f64> = self
            .functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.methods.iter()))
            .map(|f| f.body_token_count as f64)
            .collect();
        if counts.len() < 2 {
            return 0.0;
        }
        counts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = counts.len() as f64;
        let sum: f64 = counts.iter().sum();
        if sum == 0.0 {
            return 0.0;
        }
        let weighted: f64 = counts.iter().enumerate().map(|(i, &x)| (i as f64 + 1.0) * x).sum();
        ((2.0 * weighted) / (n * sum) - (n + 1.0) / n).clamp(0.0, 1.0)
    }
}

/// `stub_score = 1 − min(1, body_tokens / max(2·signature_tokens, 8))`, with
/// hard overrides (spec §4.2): trivial-return / NotImplemented / empty body
/// force 1.0; a substantial body (≥40 tokens) forces 0.0.
pub fn stub_score(body_token_count: usize, signature_token_count: usize, body_text: &str) -> f64 {
    let trimmed = body_text.trim();
    if trimmed.is_empty()
        || trimmed.contains("NotImplementedError")
        || trimmed.contains("not_implemented")
        || trimmed.contains("unimplemented!")
        || trimmed.contains("todo!()")
        || is_trivial_constant_return(trimmed)
    {
        return 1.0;
    }
    if body_token_count >= 40 {
        return 0.0;
    }
    let denom = (2 * signature_token_count).max(8) as f64;
    1.0 - (body_token_count as f64 / denom).min(1.0)
}

fn is_trivial_constant_return(body: &str) -> bool {
    let b = body.trim().trim_end_matches(';').trim();
    matches!(b, "return" | "return None" | "return null" | "return nil" | "pass" | "...")
        || (b.starts_with("return ") && b["return ".len()..].trim().chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-'))
}
