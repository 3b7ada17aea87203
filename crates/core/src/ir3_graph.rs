//! IR3 graph and per-file derived metrics (spec §4.4). Builds the IMPORTS
//! graph, runs centrality/community algorithms, clone detection, and global
//! topology signals.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use nalgebra::{DMatrix, SymmetricEigen};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::graph_algo;
use crate::ir1_syntax::{SyntaxIndex, SYNTAX_ARTIFACT_KEY};
use crate::store::entity::EntityId;
use crate::store::kernel::{Stage, StageWrites};
use crate::store::relation::RelationType;
use crate::store::signal::{IrStage, SignalValue};
use crate::store::FactStore;

const LARGE_GRAPH_BETWEENNESS_THRESHOLD: usize = 2000;
const BETWEENNESS_PIVOT_SAMPLE: usize = 200;

fn zlib_compressed_len(data: &[u8]) -> usize {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().map(|v| v.len()).unwrap_or(data.len())
}

/// Normalized compression distance between two byte strings, used both for
/// `compression_ratio` (self) and clone detection (pairwise).
fn ncd(a: &[u8], b: &[u8]) -> f64 {
    let ca = zlib_compressed_len(a) as f64;
    let cb = zlib_compressed_len(b) as f64;
    let mut combined = Vec::with_capacity(a.len() + b.len());
    combined.extend_from_slice(a);
    combined.extend_from_slice(b);
    let cab = zlib_compressed_len(&combined) as f64;
    (cab - ca.min(cb)) / ca.max(cb).max(1.0)
}

/// 128-bit MinHash signature over shingles of an already-tokenized stream,
/// cheap enough to keep per file instead of raw bytes (spec §5 "Memory
/// discipline").
fn minhash_signature(shingles: &HashSet<u64>, num_hashes: usize) -> Vec<u64> {
    (0..num_hashes)
        .map(|seed| {
            shingles
                .iter()
                .map(|&s| splitmix64(s ^ (seed as u64).wrapping_mul(0x9E3779B97F4A7C15)))
                .min()
                .unwrap_or(u64::MAX)
        })
        .collect()
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

fn shingles_of(content: &str, k: usize) -> HashSet<u64> {
    let bytes = content.as_bytes();
    if bytes.len() < k {
        return [splitmix64(bytes.len() as u64)].into_iter().collect();
    }
    (0..=bytes.len() - k)
        .map(|i| {
            let mut h = 0xcbf29ce484222325u64;
            for &b in &bytes[i..i + k] {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            h
        })
        .collect()
}

fn minhash_similarity(a: &[u64], b: &[u64]) -> f64 {
    let matches = a.iter().zip(b).filter(|(x, y)| x == y).count();
    matches as f64 / a.len().max(1) as f64
}

pub struct Ir3Graph;

impl Stage for Ir3Graph {
    fn name(&self) -> &'static str {
        "ir3_graph"
    }

    fn ir_level(&self) -> IrStage {
        IrStage::Ir3
    }

    fn provides(&self) -> &'static [&'static str] {
        &[
            "in_degree", "out_degree", "pagerank", "betweenness", "depth", "is_orphan",
            "blast_radius_size", "community", "compression_ratio", "semantic_coherence",
            "cognitive_load", "broken_call_count", "modularity", "fiedler_value", "spectral_gap",
            "cycle_count", "centrality_gini", "orphan_ratio", "phantom_ratio", "glue_deficit",
        ]
    }

    fn requires(&self) -> &'static [&'static str] {
        &["ir2_semantic"]
    }

    fn run(&self, store: &FactStore, cfg: &AnalysisConfig) -> Result<StageWrites> {
        let mut writes = StageWrites::default();

        let files: Vec<String> = store.files.keys().cloned().collect();
        let n = files.len();
        let index: HashMap<&str, usize> = files.iter().enumerate().map(|(i, f)| (f.as_str(), i)).collect();

        let directed_edges: Vec<(usize, usize)> = store
            .relations_of(RelationType::Imports)
            .filter_map(|r| {
                let (EntityId::File(a), EntityId::File(b)) = (&r.from, &r.to) else { return None };
                Some((*index.get(a.as_str())?, *index.get(b.as_str())?))
            })
            .collect();

        let mut in_degree = vec![0usize; n];
        let mut out_degree = vec![0usize; n];
        for &(a, b) in &directed_edges {
            out_degree[a] += 1;
            in_degree[b] += 1;
        }

        let ranks = graph_algo::pagerank(n, &directed_edges, 0.85, 1e-6);

        let pivots: Vec<usize> = if n > LARGE_GRAPH_BETWEENNESS_THRESHOLD {
            (0..n).step_by((n / BETWEENNESS_PIVOT_SAMPLE).max(1)).collect()
        } else {
            (0..n).collect()
        };
        let betweenness = graph_algo::betweenness(n, &directed_edges, &pivots);

        let entry_points: Vec<usize> = files
            .iter()
            .enumerate()
            .filter(|(_, f)| store.get_signal(&EntityId::File((*f).clone()), "is_entry_point").and_then(|v| v.as_bool()).unwrap_or(false))
            .map(|(i, _)| i)
            .collect();
        let depths = graph_algo::bfs_depths(n, &directed_edges, &entry_points);

        let reverse_edges: Vec<(usize, usize)> = directed_edges.iter().map(|&(a, b)| (b, a)).collect();
        let blast_radius: Vec<usize> = (0..n)
            .map(|i| graph_algo::bfs_depths(n, &reverse_edges, &[i]).iter().filter(|d| d.is_some()).count().saturating_sub(1))
            .collect();

        let undirected: Vec<(usize, usize, f64)> = directed_edges.iter().map(|&(a, b)| (a, b, 1.0)).collect();
        let raw_communities = graph_algo::louvain_communities(n, &undirected);
        let communities = graph_algo::absorb_singletons_and_cap(n, &undirected, raw_communities, (n / 3).max(1));

        // Clone detection: MinHash/LSH candidate pairs, NCD threshold.
        let contents: Vec<String> = files.iter().map(|f| std::fs::read_to_string(cfg.root.join(f)).unwrap_or_default()).collect();
        let signatures: Vec<Vec<u64>> = contents.iter().map(|c| minhash_signature(&shingles_of(c, 5), 32)).collect();
        let mut clone_edges = Vec::new();
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, sig) in signatures.iter().enumerate() {
            let band_hash = sig.iter().take(8).fold(0u64, |acc, &x| acc ^ x);
            buckets.entry(band_hash).or_default().push(i);
        }
        for bucket in buckets.values() {
            for bi in 0..bucket.len() {
                for bj in (bi + 1)..bucket.len() {
                    let (i, j) = (bucket[bi], bucket[bj]);
                    if minhash_similarity(&signatures[i], &signatures[j]) < 0.5 {
                        continue;
                    }
                    let d = ncd(contents[i].as_bytes(), contents[j].as_bytes());
                    if d < cfg.clone_ncd_threshold {
                        clone_edges.push((i, j, d));
                    }
                }
            }
        }

        let syntax_index = store.artifacts.get::<SyntaxIndex>(SYNTAX_ARTIFACT_KEY).cloned().unwrap_or_default();

        for (i, rel) in files.iter().enumerate() {
            let file_id = EntityId::File(rel.clone());
            let role = store.get_signal(&file_id, "role").map(|v| match v {
                SignalValue::Enum(s) => s.clone(),
                _ => "UNKNOWN".to_string(),
            }).unwrap_or_else(|| "UNKNOWN".to_string());

            writes.signals.push((file_id.clone(), "in_degree", SignalValue::Int(in_degree[i] as i64)));
            writes.signals.push((file_id.clone(), "out_degree", SignalValue::Int(out_degree[i] as i64)));
            writes.signals.push((file_id.clone(), "pagerank", SignalValue::clamped_unit(ranks[i])));
            writes.signals.push((file_id.clone(), "betweenness", SignalValue::Float(betweenness[i])));
            writes.signals.push((file_id.clone(), "depth", match depths[i] {
                Some(d) => SignalValue::Int(d as i64),
                None => SignalValue::Int(-1),
            }));
            let is_orphan = in_degree[i] == 0 && role != "ENTRY_POINT" && role != "TEST";
            writes.signals.push((file_id.clone(), "is_orphan", SignalValue::Bool(is_orphan)));
            writes.signals.push((file_id.clone(), "blast_radius_size", SignalValue::Int(blast_radius[i] as i64)));
            writes.signals.push((file_id.clone(), "community", SignalValue::Int(communities[i] as i64)));
            writes.signals.push((file_id.clone(), "broken_call_count", SignalValue::Int(0)));

            let content = &contents[i];
            let compressed = zlib_compressed_len(content.as_bytes()).max(1);
            let ratio = 1.0 - (compressed as f64 / content.len().max(1) as f64).min(1.0);
            writes.signals.push((file_id.clone(), "compression_ratio", SignalValue::clamped_unit(ratio)));

            let coherence = syntax_index.get(rel).and_then(|syntax| semantic_coherence(syntax));
            writes.signals.push((file_id.clone(), "semantic_coherence", match coherence {
                Some(c) => SignalValue::clamped_unit(c),
                None => SignalValue::Null,
            }));

            let max_nesting = store.get_signal_f64(&file_id, "max_nesting_depth").unwrap_or(0.0);
            let function_count = store.get_signal_f64(&file_id, "function_count").unwrap_or(0.0);
            let impl_gini = store.get_signal_f64(&file_id, "impl_gini").unwrap_or(0.0);
            let cognitive_load = 0.4 * (max_nesting / 10.0).min(1.0) + 0.3 * (function_count / 40.0).min(1.0) + 0.3 * impl_gini;
            writes.signals.push((file_id.clone(), "cognitive_load", SignalValue::clamped_unit(cognitive_load)));
        }

        for &(i, j, dist) in &clone_edges {
            writes.relations.push(crate::store::relation::Relation {
                kind: RelationType::ClonedFrom,
                from: EntityId::File(files[i].clone()),
                to: EntityId::File(files[j].clone()),
                weight: 1.0 - dist,
                meta: Default::default(),
            });
        }

        // Global topology.
        let codebase_id = EntityId::Codebase;
        let orphan_count = (0..n).filter(|&i| in_degree[i] == 0).count();
        writes.signals.push((codebase_id.clone(), "orphan_ratio", SignalValue::clamped_unit(orphan_count as f64 / n.max(1) as f64)));

        let phantom_total: usize = files
            .iter()
            .map(|f| store.get_signal_f64(&EntityId::File(f.clone()), "phantom_import_count").unwrap_or(0.0) as usize)
            .sum();
        let import_total: usize = files
            .iter()
            .map(|f| store.get_signal_f64(&EntityId::File(f.clone()), "import_count").unwrap_or(0.0) as usize)
            .sum();
        writes.signals.push((codebase_id.clone(), "phantom_ratio", SignalValue::clamped_unit(phantom_total as f64 / import_total.max(1) as f64)));

        let glued = (0..n).filter(|&i| in_degree[i] > 0 && out_degree[i] > 0).count();
        writes.signals.push((codebase_id.clone(), "glue_deficit", SignalValue::clamped_unit(1.0 - glued as f64 / n.max(1) as f64)));

        writes.signals.push((codebase_id.clone(), "centrality_gini", SignalValue::clamped_unit(graph_algo::gini(&ranks))));

        let cycle_count = scc_nontrivial_count(n, &directed_edges);
        writes.signals.push((codebase_id.clone(), "cycle_count", SignalValue::Int(cycle_count as i64)));

        let modularity = newman_modularity(n, &undirected, &communities);
        writes.signals.push((codebase_id.clone(), "modularity", SignalValue::Float(modularity)));

        match fiedler_value(n, &undirected) {
            Some(fv) => {
                writes.signals.push((codebase_id.clone(), "fiedler_value", SignalValue::Float(fv)));
                writes.signals.push((codebase_id.clone(), "spectral_gap", SignalValue::Float(fv)));
            }
            None => {
                writes.signals.push((codebase_id.clone(), "fiedler_value", SignalValue::Null));
                writes.signals.push((codebase_id.clone(), "spectral_gap", SignalValue::Null));
            }
        }

        tracing::info!(files = n, clone_pairs = clone_edges.len(), "ir3 graph analysis complete");
        Ok(writes)
    }
}

/// Mean pairwise cosine similarity of per-function concept vectors (spec
/// §4.4): each function's name plus its call targets stand in for its body
/// text (bodies themselves aren't retained past IR1), run through IR2's
/// `extract_concepts`/`concept_vector` machinery with an in-file IDF (rare
/// across this file's functions weighs more than a name shared by all of
/// them) rather than a flat token-overlap count.
fn semantic_coherence(syntax: &crate::ir1_syntax::types::FileSyntax) -> Option<f64> {
    let functions: Vec<&crate::ir1_syntax::types::FunctionDef> = syntax
        .functions
        .iter()
        .chain(syntax.classes.iter().flat_map(|c| c.methods.iter()))
        .collect();
    if functions.len() < 2 {
        return None;
    }

    let func_tokens: Vec<Vec<String>> = functions
        .iter()
        .map(|f| {
            let mut tokens = crate::ir2_semantic::tokenize_identifiers(&f.name);
            for call in &f.call_targets {
                tokens.extend(crate::ir2_semantic::tokenize_identifiers(call));
            }
            tokens
        })
        .collect();

    let mut df: HashMap<String, usize> = HashMap::new();
    for tokens in &func_tokens {
        let unique: HashSet<&str> = tokens.iter().map(|s| s.as_str()).collect();
        for t in unique {
            *df.entry(t.to_string()).or_insert(0) += 1;
        }
    }
    let n_functions = func_tokens.len().max(1) as f64;
    let idf = |term: &str| -> f64 { (n_functions / df.get(term).copied().unwrap_or(1).max(1) as f64).ln().max(0.0) };

    let vectors: Vec<HashMap<String, f64>> = func_tokens
        .iter()
        .map(|tokens| {
            let concepts = crate::ir2_semantic::extract_concepts(tokens, &idf);
            crate::ir2_semantic::concept_vector(&concepts, &idf)
        })
        .collect();

    let mut total = 0.0;
    let mut pairs = 0;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            total += cosine_sparse(&vectors[i], &vectors[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        None
    } else {
        Some(total / pairs as f64)
    }
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

/// Newman modularity `Q = sum_c[(e_c/m) - (k_c/2m)^2]` over the Louvain
/// partition already computed for `community` (spec §4.4): `e_c` is the
/// total edge weight inside community `c`, `k_c` its total incident degree,
/// `m` the graph's total edge weight. Replaces a placeholder that measured
/// community *count* rather than how well edges actually cluster within
/// communities.
fn newman_modularity(n: usize, edges: &[(usize, usize, f64)], communities: &[usize]) -> f64 {
    let m: f64 = edges.iter().map(|&(_, _, w)| w).sum();
    if n == 0 || m <= 0.0 {
        return 0.0;
    }
    let mut degree = vec![0.0; n];
    for &(a, b, w) in edges {
        degree[a] += w;
        degree[b] += w;
    }
    let within_weight: f64 = edges.iter().filter(|&&(a, b, _)| communities[a] == communities[b]).map(|&(_, _, w)| w).sum();

    let mut community_degree: HashMap<usize, f64> = HashMap::new();
    for i in 0..n {
        *community_degree.entry(communities[i]).or_insert(0.0) += degree[i];
    }
    let degree_term: f64 = community_degree.values().map(|&k| (k / (2.0 * m)).powi(2)).sum();

    (within_weight / m) - degree_term
}

/// Strongly-connected components of size > 1 via petgraph's Tarjan
/// implementation (spec §4.4 `cycle_count`).
fn scc_nontrivial_count(n: usize, edges: &[(usize, usize)]) -> usize {
    use petgraph::graph::DiGraph;
    let mut g = DiGraph::<(), ()>::with_capacity(n, edges.len());
    let nodes: Vec<_> = (0..n).map(|_| g.add_node(())).collect();
    for &(a, b) in edges {
        g.add_edge(nodes[a], nodes[b], ());
    }
    petgraph::algo::tarjan_scc(&g).into_iter().filter(|c| c.len() > 1).count()
}

/// Second-smallest eigenvalue of the graph Laplacian (spec §4.4
/// `fiedler_value`), `None` for an empty or single-node graph.
fn fiedler_value(n: usize, edges: &[(usize, usize, f64)]) -> Option<f64> {
    if n < 2 {
        return None;
    }
    let mut laplacian = DMatrix::<f64>::zeros(n, n);
    for &(a, b, w) in edges {
        laplacian[(a, a)] += w;
        laplacian[(b, b)] += w;
        laplacian[(a, b)] -= w;
        laplacian[(b, a)] -= w;
    }
    let eigen = SymmetricEigen::new(laplacian);
    let mut values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    values.get(1).copied()
}
