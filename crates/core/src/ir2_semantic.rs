//! IR2 semantic layer (spec §4.3): role classification, concept extraction,
//! naming drift, completeness.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::graph_algo;
use crate::ir1_syntax::{SyntaxIndex, SYNTAX_ARTIFACT_KEY};
use crate::store::entity::EntityId;
use crate::store::kernel::{Stage, StageWrites};
use crate::store::relation::{Relation, RelationMeta, RelationType};
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;

const STRUCTURAL_STEMS: &[&str] = &["__init__", "index", "mod", "__main__", "main"];

const STOPWORDS: &[&str] = &[
    "get", "set", "the", "and", "for", "with", "new", "this", "that", "data", "value", "item",
    "list", "util", "utils", "helper", "impl", "type", "self", "args", "kwargs",
];

const KEYWORDS: &[&str] = &[
    "fn", "pub", "let", "mut", "if", "else", "for", "while", "match", "return", "struct", "enum",
    "impl", "trait", "use", "mod", "const", "static", "def", "class", "import", "from", "async",
    "await", "function", "var", "const", "interface", "extends", "implements",
];

fn identifier_boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z][A-Za-z0-9]*").unwrap())
}

/// Split on snake_case / camelCase / acronym boundaries, lowercase, drop
/// keywords/stopwords/single-character tokens (spec §4.3 pass 1).
pub fn tokenize_identifiers(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in identifier_boundary_re().find_iter(text) {
        for piece in split_camel(word.as_str()) {
            let lower = piece.to_lowercase();
            if lower.len() <= 1 || KEYWORDS.contains(&lower.as_str()) || STOPWORDS.contains(&lower.as_str()) {
                continue;
            }
            out.push(lower);
        }
    }
    out
}

fn split_camel(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_ascii_digit() != c.is_ascii_digit())
                || (i + 1 < chars.len() && prev.is_uppercase() && c.is_uppercase() && chars[i + 1].is_lowercase());
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[derive(Debug, Clone, Default)]
pub struct Concept {
    pub topic: String,
    pub tokens: Vec<String>,
    pub weight: f64,
}

fn todo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(TODO|FIXME|HACK)\b").unwrap())
}

fn all_caps_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*[A-Z][A-Z0-9_]{2,}\s*[:=]").unwrap())
}

/// Strictly ordered role decision tree (spec §4.3). First match wins.
fn classify_role(rel_path: &str, syntax: &crate::ir1_syntax::types::FileSyntax, content: &str) -> &'static str {
    let lower = rel_path.to_lowercase();
    let stem = rel_path.rsplit('/').next().unwrap_or(rel_path);

    if lower.contains("test") || lower.contains("spec.") || stem.starts_with("test_") || stem.ends_with("_test.rs") {
        return "TEST";
    }
    if lower.contains("migration") || lower.contains("/migrations/") {
        return "MIGRATION";
    }
    if matches!(stem, "main.rs" | "main.py" | "index.js" | "index.ts" | "__main__.py" | "app.py") {
        return "ENTRY_POINT";
    }
    if syntax.classes.iter().any(|c| c.is_abstract) || lower.contains("interface") || lower.ends_with(".d.ts") {
        return "INTERFACE";
    }
    let caps_lines = all_caps_assignment_re().find_iter(content).count();
    let total_lines = content.lines().count().max(1);
    if syntax.functions.is_empty() && syntax.classes.is_empty() && caps_lines as f64 / total_lines as f64 > 0.3 {
        return "CONSTANT";
    }
    if lower.contains("exception") || lower.contains("error") || syntax.classes.iter().any(|c| c.bases.iter().any(|b| b.to_lowercase().contains("exception") || b.to_lowercase().contains("error"))) {
        return "EXCEPTION";
    }
    if lower.contains("model") || lower.contains("/models/") || lower.contains("schema") || lower.contains("entity") {
        return "MODEL";
    }
    if lower.contains("cli") || lower.contains("/bin/") || lower.contains("command") {
        return "CLI";
    }
    if lower.contains("config") || lower.contains("settings") {
        return "CONFIG";
    }
    if lower.contains("service") || lower.contains("handler") || lower.contains("controller") || lower.contains("/api/") {
        return "SERVICE";
    }
    if lower.contains("util") || lower.contains("helper") || lower.contains("common") {
        return "UTILITY";
    }
    "UNKNOWN"
}

pub struct Ir2Semantic;

impl Stage for Ir2Semantic {
    fn name(&self) -> &'static str {
        "ir2_semantic"
    }

    fn ir_level(&self) -> IrStage {
        IrStage::Ir2
    }

    fn provides(&self) -> &'static [&'static str] {
        &["role", "is_test", "is_entry_point", "naming_drift", "concept_count", "concept_entropy", "docstring_coverage", "todo_density"]
    }

    fn requires(&self) -> &'static [&'static str] {
        &["ir1_syntax"]
    }

    fn run(&self, store: &FactStore, cfg: &AnalysisConfig) -> Result<StageWrites> {
        let syntax_index = store
            .artifacts
            .get::<SyntaxIndex>(SYNTAX_ARTIFACT_KEY)
            .cloned()
            .unwrap_or_default();

        let mut writes = StageWrites::default();
        let mut contents: HashMap<String, String> = HashMap::new();
        for rel in store.files.keys() {
            let content = std::fs::read_to_string(cfg.root.join(rel)).unwrap_or_default();
            contents.insert(rel.clone(), content);
        }

        // Pass 1: corpus-wide document frequency.
        let n_files = contents.len().max(1) as f64;
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut per_file_tokens: HashMap<String, Vec<String>> = HashMap::new();
        for (rel, content) in &contents {
            let tokens = tokenize_identifiers(content);
            let unique: HashSet<&str> = tokens.iter().map(|s| s.as_str()).collect();
            for t in unique {
                *df.entry(t.to_string()).or_insert(0) += 1;
            }
            per_file_tokens.insert(rel.clone(), tokens);
        }
        let idf = |term: &str| -> f64 { (n_files / df.get(term).copied().unwrap_or(1).max(1) as f64).ln().max(0.0) };

        // Collected alongside concept_count/naming_drift below, consumed
        // after the loop to emit SIMILAR_TO edges (spec §3 relation table).
        let mut file_concept_vecs: HashMap<String, HashMap<String, f64>> = HashMap::new();

        for (rel, syntax) in &syntax_index {
            let content = contents.get(rel).cloned().unwrap_or_default();
            let file_id = EntityId::File(rel.clone());

            let role = classify_role(rel, syntax, &content);
            writes.signals.push((file_id.clone(), "role", SignalValue::Enum(role.to_string())));
            writes.signals.push((file_id.clone(), "is_test", SignalValue::Bool(role == "TEST")));
            writes.signals.push((file_id.clone(), "is_entry_point", SignalValue::Bool(role == "ENTRY_POINT")));

            let tokens = per_file_tokens.get(rel).cloned().unwrap_or_default();
            let unique: HashSet<&str> = tokens.iter().map(|s| s.as_str()).collect();

            let stem = rel.rsplit('/').next().unwrap_or(rel).rsplit_once('.').map(|(s, _)| s).unwrap_or(rel);
            let is_structural_stem = STRUCTURAL_STEMS.contains(&stem);

            if unique.len() < 20 {
                writes.signals.push((file_id.clone(), "concept_count", SignalValue::Int(1)));
                writes.signals.push((file_id.clone(), "concept_entropy", SignalValue::Float(0.0)));
                writes.signals.push((file_id.clone(), "naming_drift", SignalValue::Null));
            } else {
                let concepts = extract_concepts(&tokens, &idf);
                let entropy: f64 = concepts.iter().map(|c| if c.weight > 0.0 { -c.weight * c.weight.log2() } else { 0.0 }).sum();
                writes.signals.push((file_id.clone(), "concept_count", SignalValue::Int(concepts.len() as i64)));
                writes.signals.push((file_id.clone(), "concept_entropy", SignalValue::Float(entropy)));
                file_concept_vecs.insert(rel.clone(), concept_vector(&concepts, &idf));

                if is_structural_stem {
                    writes.signals.push((file_id.clone(), "naming_drift", SignalValue::Null));
                } else {
                    let stem_tokens = tokenize_identifiers(stem);
                    if stem_tokens.is_empty() {
                        writes.signals.push((file_id.clone(), "naming_drift", SignalValue::Null));
                    } else {
                        let drift = naming_drift(&stem_tokens, &concepts, &idf);
                        match drift {
                            Some(d) => writes.signals.push((file_id.clone(), "naming_drift", SignalValue::clamped_unit(d))),
                            None => writes.signals.push((file_id.clone(), "naming_drift", SignalValue::Null)),
                        }
                    }
                }
            }

            let todo_count = todo_re().find_iter(&content).count();
            let lines = content.lines().count().max(1);
            writes.signals.push((file_id.clone(), "todo_density", SignalValue::Float(todo_count as f64 / lines as f64)));

            let (documented, public) = docstring_stats(syntax, &content);
            let coverage = if public == 0 { 1.0 } else { documented as f64 / public as f64 };
            writes.signals.push((file_id.clone(), "docstring_coverage", SignalValue::clamped_unit(coverage)));
        }

        emit_similar_to_relations(&file_concept_vecs, &mut writes);

        tracing::info!(files = syntax_index.len(), "ir2 semantic analysis complete");
        Ok(writes)
    }
}

/// Builds the weighted term vector for a file's concepts (spec §4.3,
/// shared between naming_drift, SIMILAR_TO cosine comparison, and IR3's
/// `semantic_coherence`).
pub(crate) fn concept_vector(concepts: &[Concept], idf: &impl Fn(&str) -> f64) -> HashMap<String, f64> {
    let mut v: HashMap<String, f64> = HashMap::new();
    for c in concepts {
        for t in &c.tokens {
            *v.entry(t.clone()).or_insert(0.0) += c.weight * idf(t);
        }
    }
    v
}

fn cosine_sparse(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.iter().map(|(k, v)| v * b.get(k).copied().unwrap_or(0.0)).sum();
    dot / (na * nb)
}

/// SIMILAR_TO (spec §3: "cosine ∈ [0,1]" over concept vectors). Candidate
/// pairs are files sharing at least one concept term, via an inverted
/// index, rather than the full O(n²) cross product; terms shared by more
/// than 50 files are dropped as too generic to be a useful bridge.
fn emit_similar_to_relations(file_concept_vecs: &HashMap<String, HashMap<String, f64>>, writes: &mut StageWrites) {
    const SIMILARITY_THRESHOLD: f64 = 0.5;
    let mut topic_index: HashMap<&str, Vec<&str>> = HashMap::new();
    for (rel, vec) in file_concept_vecs {
        for term in vec.keys() {
            topic_index.entry(term.as_str()).or_default().push(rel.as_str());
        }
    }

    let mut candidate_pairs: HashSet<(String, String)> = HashSet::new();
    for files in topic_index.values() {
        if files.len() > 50 {
            continue;
        }
        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                let (a, b) = if files[i] < files[j] { (files[i], files[j]) } else { (files[j], files[i]) };
                candidate_pairs.insert((a.to_string(), b.to_string()));
            }
        }
    }

    for (a, b) in candidate_pairs {
        let (Some(va), Some(vb)) = (file_concept_vecs.get(&a), file_concept_vecs.get(&b)) else { continue };
        let sim = cosine_sparse(va, vb);
        if sim >= SIMILARITY_THRESHOLD {
            writes.relations.push(Relation {
                kind: RelationType::SimilarTo,
                from: EntityId::File(a),
                to: EntityId::File(b),
                weight: sim,
                meta: RelationMeta::default(),
            });
        }
    }
}

pub(crate) fn extract_concepts(tokens: &[String], idf: &impl Fn(&str) -> f64) -> Vec<Concept> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut unique_tokens: Vec<&str> = Vec::new();
    for t in tokens {
        if !index.contains_key(t.as_str()) {
            index.insert(t.as_str(), unique_tokens.len());
            unique_tokens.push(t.as_str());
        }
    }
    let n = unique_tokens.len();

    // Co-occurrence within a sliding window, approximating "within function
    // bodies" when explicit body boundaries aren't tracked separately.
    let mut weight: HashMap<(usize, usize), f64> = HashMap::new();
    const WINDOW: usize = 8;
    for i in 0..tokens.len() {
        let a = index[tokens[i].as_str()];
        for j in (i + 1)..tokens.len().min(i + WINDOW) {
            let b = index[tokens[j].as_str()];
            if a == b {
                continue;
            }
            let key = if a < b { (a, b) } else { (b, a) };
            *weight.entry(key).or_insert(0.0) += 1.0;
        }
    }
    let mut edges: Vec<(usize, usize, f64)> = weight.into_iter().map(|((a, b), w)| (a, b, w)).collect();
    if edges.len() > 100 {
        edges.retain(|&(_, _, w)| w > 1.0);
    }

    let raw_communities = graph_algo::louvain_communities(n, &edges);
    let communities = graph_algo::absorb_singletons_and_cap(n, &edges, raw_communities, 10);

    let mut groups: HashMap<usize, Vec<&str>> = HashMap::new();
    for (i, &c) in communities.iter().enumerate() {
        groups.entry(c).or_default().push(unique_tokens[i]);
    }

    let mut tf: HashMap<&str, usize> = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    let total_tf = tokens.len().max(1) as f64;

    let mut concepts: Vec<Concept> = groups
        .into_values()
        .map(|members| {
            let topic = members
                .iter()
                .max_by(|a, b| {
                    let score_a = *tf.get(*a).unwrap_or(&0) as f64 * idf(a);
                    let score_b = *tf.get(*b).unwrap_or(&0) as f64 * idf(b);
                    score_a.partial_cmp(&score_b).unwrap()
                })
                .map(|s| s.to_string())
                .unwrap_or_default();
            let member_tf: usize = members.iter().map(|m| *tf.get(*m).unwrap_or(&0)).sum();
            Concept {
                topic,
                tokens: members.into_iter().map(|s| s.to_string()).collect(),
                weight: member_tf as f64 / total_tf,
            }
        })
        .collect();

    let weight_sum: f64 = concepts.iter().map(|c| c.weight).sum();
    if weight_sum > 0.0 {
        for c in &mut concepts {
            c.weight /= weight_sum;
        }
    }
    concepts
}

/// `naming_drift = 1 - cosine_similarity(filename_vector, content_vector)`.
fn naming_drift(stem_tokens: &[String], concepts: &[Concept], idf: &impl Fn(&str) -> f64) -> Option<f64> {
    let mut filename_vec: HashMap<String, f64> = HashMap::new();
    for t in stem_tokens {
        *filename_vec.entry(t.clone()).or_insert(0.0) += idf(t);
    }

    let mut content_vec: HashMap<String, f64> = HashMap::new();
    for c in concepts {
        for t in &c.tokens {
            *content_vec.entry(t.clone()).or_insert(0.0) += c.weight * idf(t);
        }
    }

    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let (na, nb) = (norm(&filename_vec), norm(&content_vec));
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    let dot: f64 = filename_vec.iter().map(|(k, v)| v * content_vec.get(k).copied().unwrap_or(0.0)).sum();
    Some(1.0 - (dot / (na * nb)))
}

fn docstring_stats(syntax: &crate::ir1_syntax::types::FileSyntax, content: &str) -> (usize, usize) {
    let public_fns = syntax
        .functions
        .iter()
        .chain(syntax.classes.iter().flat_map(|c| c.methods.iter()))
        .filter(|f| !f.name.starts_with('_'));
    let mut public = 0;
    let mut documented = 0;
    for f in public_fns {
        public += 1;
        let preceding = content.lines().nth(f.start_line.saturating_sub(2));
        let has_doc = preceding.map(|l| l.trim_start().starts_with("///") || l.trim_start().starts_with("\"\"\"") || l.trim_start().starts_with('#')).unwrap_or(false);
        if has_doc {
            documented += 1;
        }
    }
    (documented, public)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_splits_camel_and_snake_case() {
        let tokens = tokenize_identifiers("fn computeUserScore(user_id: u64)");
        assert!(tokens.contains(&"compute".to_string()));
        assert!(tokens.contains(&"user".to_string()));
        assert!(tokens.contains(&"score".to_string()));
        assert!(!tokens.contains(&"fn".to_string()));
    }

    #[test]
    fn structural_stems_are_recognized() {
        assert!(STRUCTURAL_STEMS.contains(&"__init__"));
        assert!(STRUCTURAL_STEMS.contains(&"mod"));
    }
}
