//! Graph algorithms shared across IR2 (token co-occurrence communities),
//! IR3 (import-graph centrality/communities) and IR5s (codebase Laplacian).
//! Kept separate from `store` because none of this needs entity/signal
//! types — it operates on plain indices and weights.

use std::collections::HashMap;

/// Single-level greedy modularity optimization: repeatedly moves each node
/// into the neighboring community that most increases modularity, until no
/// move improves it. This is the first (and, for our graph sizes, usually
/// only load-bearing) pass of Louvain — we skip the recursive
/// community-aggregation levels since file/token graphs here rarely need a
/// second pass to stabilize.
pub fn louvain_communities(n: usize, edges: &[(usize, usize, f64)]) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut total_weight = 0.0;
    for &(a, b, w) in edges {
        if a == b || a >= n || b >= n {
            continue;
        }
        adjacency[a].push((b, w));
        adjacency[b].push((a, w));
        total_weight += w;
    }
    if total_weight == 0.0 {
        return (0..n).collect();
    }
    let m2 = 2.0 * total_weight;
    let degree: Vec<f64> = adjacency.iter().map(|adj| adj.iter().map(|(_, w)| w).sum()).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let mut community_degree: Vec<f64> = degree.clone();

    let mut improved = true;
    let mut passes = 0;
    while improved && passes < 50 {
        improved = false;
        passes += 1;
        for node in 0..n {
            let current_comm = community[node];
            let mut neighbor_weight: HashMap<usize, f64> = HashMap::new();
            for &(nbr, w) in &adjacency[node] {
                *neighbor_weight.entry(community[nbr]).or_insert(0.0) += w;
            }
            community_degree[current_comm] -= degree[node];

            let mut best_comm = current_comm;
            let mut best_gain = neighbor_weight.get(&current_comm).copied().unwrap_or(0.0)
                - community_degree[current_comm] * degree[node] / m2;

            for (&comm, &w_to) in &neighbor_weight {
                if comm == current_comm {
                    continue;
                }
                let gain = w_to - community_degree[comm] * degree[node] / m2;
                if gain > best_gain {
                    best_gain = gain;
                    best_comm = comm;
                }
            }

            community_degree[best_comm] += degree[node];
            if best_comm != current_comm {
                community[node] = best_comm;
                improved = true;
            }
        }
    }

    relabel_dense(&community)
}

/// Merge singleton communities into the neighbor they share the most edge
/// weight with, then cap the total community count by merging the smallest
/// communities together (spec §4.3's community post-processing, generalized
/// for reuse at IR3).
pub fn absorb_singletons_and_cap(n: usize, edges: &[(usize, usize, f64)], mut community: Vec<usize>, max_communities: usize) -> Vec<usize> {
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for &c in &community {
        *sizes.entry(c).or_insert(0) += 1;
    }

    for node in 0..n {
        if sizes.get(&community[node]).copied().unwrap_or(0) != 1 {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for &(a, b, w) in edges {
            let other = if a == node { Some(b) } else if b == node { Some(a) } else { None };
            if let Some(other) = other {
                let c = community[other];
                if c == community[node] {
                    continue;
                }
                if best.map(|(_, bw)| w > bw).unwrap_or(true) {
                    best = Some((c, w));
                }
            }
        }
        if let Some((target, _)) = best {
            *sizes.get_mut(&community[node]).unwrap() -= 1;
            *sizes.entry(target).or_insert(0) += 1;
            community[node] = target;
        }
    }

    community = relabel_dense(&community);
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for &c in &community {
        *counts.entry(c).or_insert(0) += 1;
    }
    while counts.len() > max_communities {
        let mut ordered: Vec<(usize, usize)> = counts.iter().map(|(&c, &n)| (c, n)).collect();
        ordered.sort_by_key(|&(_, n)| n);
        let (smallest, _) = ordered[0];
        let target = ordered.get(1).map(|&(c, _)| c).unwrap_or(smallest);
        if smallest == target {
            break;
        }
        for c in community.iter_mut() {
            if *c == smallest {
                *c = target;
            }
        }
        let moved = counts.remove(&smallest).unwrap_or(0);
        *counts.entry(target).or_insert(0) += moved;
    }

    relabel_dense(&community)
}

fn relabel_dense(community: &[usize]) -> Vec<usize> {
    let mut remap: HashMap<usize, usize> = HashMap::new();
    community
        .iter()
        .map(|&c| {
            let next = remap.len();
            *remap.entry(c).or_insert(next)
        })
        .collect()
}

/// PageRank with damping 0.85, run to `eps` convergence or 100 iterations.
pub fn pagerank(n: usize, edges: &[(usize, usize)], damping: f64, eps: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let mut out_degree = vec![0usize; n];
    for &(from, _) in edges {
        if from < n {
            out_degree[from] += 1;
        }
    }
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(from, to) in edges {
        if from < n && to < n {
            incoming[to].push(from);
        }
    }
    let mut ranks = vec![1.0 / n as f64; n];
    for _ in 0..100 {
        let dangling_sum: f64 = (0..n).filter(|&i| out_degree[i] == 0).map(|i| ranks[i]).sum();
        let mut next = vec![(1.0 - damping) / n as f64; n];
        for i in 0..n {
            next[i] += damping * dangling_sum / n as f64;
        }
        for to in 0..n {
            for &from in &incoming[to] {
                next[to] += damping * ranks[from] / out_degree[from] as f64;
            }
        }
        let delta: f64 = next.iter().zip(&ranks).map(|(a, b)| (a - b).abs()).sum();
        ranks = next;
        if delta < eps {
            break;
        }
    }
    ranks
}

/// Unweighted BFS shortest-path betweenness, exact for small graphs. For
/// `n` above the approximation threshold the caller should sample pivots
/// instead of calling this with the full node set (spec §4.4: "approximation
/// for N>2000").
pub fn betweenness(n: usize, edges: &[(usize, usize)], pivots: &[usize]) -> Vec<f64> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in edges {
        if a < n && b < n {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }
    let mut centrality = vec![0.0; n];
    for &s in pivots {
        if s >= n {
            continue;
        }
        let mut stack = Vec::new();
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0; n];
        sigma[s] = 1.0;
        let mut dist = vec![-1i64; n];
        dist[s] = 0;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(s);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adjacency[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }
        let mut delta = vec![0.0; n];
        while let Some(w) = stack.pop() {
            for &v in &preds[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }
    let scale = if pivots.len() < n && !pivots.is_empty() { n as f64 / pivots.len() as f64 } else { 1.0 };
    centrality.iter().map(|&c| c * scale / 2.0).collect()
}

/// BFS hop distance from any of `roots`; `-1` (via `None`) for unreached
/// nodes.
pub fn bfs_depths(n: usize, edges: &[(usize, usize)], roots: &[usize]) -> Vec<Option<u32>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in edges {
        if a < n && b < n {
            adjacency[a].push(b);
        }
    }
    let mut depth = vec![None; n];
    let mut queue = std::collections::VecDeque::new();
    for &r in roots {
        if r < n && depth[r].is_none() {
            depth[r] = Some(0);
            queue.push_back(r);
        }
    }
    while let Some(v) = queue.pop_front() {
        let d = depth[v].unwrap();
        for &w in &adjacency[v] {
            if depth[w].is_none() {
                depth[w] = Some(d + 1);
                queue.push_back(w);
            }
        }
    }
    depth
}

/// Gini coefficient of a non-negative value vector.
pub fn gini(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.to_vec();
    if v.len() < 2 {
        return 0.0;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = v.len() as f64;
    let sum: f64 = v.iter().sum();
    if sum == 0.0 {
        return 0.0;
    }
    let weighted: f64 = v.iter().enumerate().map(|(i, &x)| (i as f64 + 1.0) * x).sum();
    ((2.0 * weighted) / (n * sum) - (n + 1.0) / n).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn louvain_splits_two_cliques() {
        let edges = vec![
            (0, 1, 1.0), (1, 2, 1.0), (0, 2, 1.0),
            (3, 4, 1.0), (4, 5, 1.0), (3, 5, 1.0),
        ];
        let communities = louvain_communities(6, &edges);
        assert_eq!(communities[0], communities[1]);
        assert_eq!(communities[1], communities[2]);
        assert_eq!(communities[3], communities[4]);
        assert_ne!(communities[0], communities[3]);
    }

    #[test]
    fn pagerank_sums_near_one() {
        let edges = vec![(0, 1), (1, 2), (2, 0)];
        let ranks = pagerank(3, &edges, 0.85, 1e-6);
        let sum: f64 = ranks.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn gini_zero_for_equal_distribution() {
        assert!(gini(&[5.0, 5.0, 5.0]) < 1e-9);
    }

    #[test]
    fn gini_high_for_concentrated_distribution() {
        assert!(gini(&[0.0, 0.0, 0.0, 100.0]) > 0.7);
    }
}
