//! Distance-2 graph coloring with weight-guided vertex ordering, used to
//! derive independent block partitions for block-Jacobi.
//! See Saad §10.7, §12.4 for background.

use std::collections::HashSet;

use rand::Rng;

use crate::matrix::seq_csr::SeqCsr;

/// How vertices are prioritized during greedy coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightType {
    /// Natural index order.
    Lexical,
    /// Uniform random weights, breaks adversarial orderings.
    Random,
    /// Distance-neighborhood degree plus a random tiebreak.
    LargestFirst,
}

/// Symmetrized adjacency of a sparsity pattern: adj[i] = { j | A[i,j] != 0 or A[j,i] != 0 }.
pub fn extract_adjacency(a: &SeqCsr) -> Vec<Vec<usize>> {
    let n = a.nrows();
    let mut adj: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    for i in 0..n {
        let (cols, _) = a.row(i);
        for &j in cols {
            if i != j && j < n {
                adj[i].insert(j);
                adj[j].insert(i);
            }
        }
    }
    adj.into_iter()
        .map(|s| {
            let mut v: Vec<usize> = s.into_iter().collect();
            v.sort_unstable();
            v
        })
        .collect()
}

/// Number of vertices reachable within `distance` hops of each vertex,
/// excluding the vertex itself. Stack-based walk with a per-source stamp
/// array, so each neighborhood costs O(edges visited).
pub fn degrees_at_distance(adj: &[Vec<usize>], distance: usize) -> Vec<usize> {
    let n = adj.len();
    let mut seen = vec![usize::MAX; n];
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut degrees = vec![0usize; n];
    for i in 0..n {
        stack.clear();
        // Stamp the source first so back-edges cannot re-reach it.
        seen[i] = i;
        for &j in &adj[i] {
            seen[j] = i;
            stack.push((j, 1));
        }
        let mut degree = 0;
        while let Some((idx, dist)) = stack.pop() {
            degree += 1;
            if dist < distance {
                for &j in &adj[idx] {
                    if seen[j] != i {
                        seen[j] = i;
                        stack.push((j, dist + 1));
                    }
                }
            }
        }
        degrees[i] = degree;
    }
    degrees
}

/// Per-vertex priority weights of the requested type.
pub fn create_weights<R: Rng>(adj: &[Vec<usize>], ty: WeightType, rng: &mut R) -> Vec<f64> {
    let n = adj.len();
    match ty {
        WeightType::Lexical => (0..n).map(|i| i as f64).collect(),
        WeightType::Random => (0..n).map(|_| rng.r#gen::<f64>().abs()).collect(),
        WeightType::LargestFirst => {
            let degrees = degrees_at_distance(adj, 2);
            degrees
                .iter()
                .map(|&d| d as f64 + rng.r#gen::<f64>())
                .collect()
        }
    }
}

/// Vertex visitation order: descending weight.
pub fn weight_ordering(weights: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        weights[b]
            .partial_cmp(&weights[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Distance-2 neighbor sets: dist2[i] = adj[i] union (union over j in adj[i] of adj[j]).
pub fn distance2_neighbors(adj: &[Vec<usize>]) -> Vec<HashSet<usize>> {
    let n = adj.len();
    let mut dist2 = vec![HashSet::new(); n];
    for i in 0..n {
        for &j in &adj[i] {
            dist2[i].insert(j);
            for &k in &adj[j] {
                dist2[i].insert(k);
            }
        }
        dist2[i].insert(i);
    }
    dist2
}

/// Greedy distance-2 coloring visiting vertices in the given order.
/// Returns colors[i] = color of vertex i.
pub fn greedy_distance2_coloring(dist2: &[HashSet<usize>], order: &[usize]) -> Vec<usize> {
    let n = dist2.len();
    let mut color_of = vec![None; n];
    let mut banned = HashSet::new();
    for &i in order {
        banned.clear();
        for &k in &dist2[i] {
            if let Some(c) = color_of[k] {
                banned.insert(c);
            }
        }
        let c = (0..).find(|c| !banned.contains(c)).unwrap();
        color_of[i] = Some(c);
    }
    color_of.into_iter().map(|c| c.unwrap()).collect()
}

/// Color a matrix pattern with the requested weight type.
pub fn color_pattern<R: Rng>(a: &SeqCsr, ty: WeightType, rng: &mut R) -> Vec<usize> {
    let adj = extract_adjacency(a);
    let weights = create_weights(&adj, ty, rng);
    let order = weight_ordering(&weights);
    let dist2 = distance2_neighbors(&adj);
    greedy_distance2_coloring(&dist2, &order)
}

/// Group vertices by color: blocks[c] = sorted indices with color c.
pub fn build_blocks_from_colors(colors: &[usize]) -> Vec<Vec<usize>> {
    let num_colors = colors.iter().copied().max().map(|c| c + 1).unwrap_or(0);
    let mut blocks = vec![Vec::new(); num_colors];
    for (i, &c) in colors.iter().enumerate() {
        blocks[c].push(i);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn path_graph(n: usize) -> SeqCsr {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        SeqCsr::from_triplets(n, n, &t).unwrap()
    }

    fn valid_distance2(colors: &[usize], dist2: &[HashSet<usize>]) -> bool {
        for (i, nbrs) in dist2.iter().enumerate() {
            for &j in nbrs {
                if j != i && colors[j] == colors[i] {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn path_coloring_is_valid() {
        let a = path_graph(10);
        let adj = extract_adjacency(&a);
        let dist2 = distance2_neighbors(&adj);
        let mut rng = StdRng::seed_from_u64(7);
        for ty in [WeightType::Lexical, WeightType::Random, WeightType::LargestFirst] {
            let colors = color_pattern(&a, ty, &mut rng);
            assert!(valid_distance2(&colors, &dist2), "{ty:?}");
        }
    }

    #[test]
    fn degrees_on_path() {
        let a = path_graph(5);
        let adj = extract_adjacency(&a);
        // Distance-1 degrees: endpoints 1, interior 2.
        assert_eq!(degrees_at_distance(&adj, 1), vec![1, 2, 2, 2, 1]);
        // Distance-2: the middle vertex reaches everyone else, and no
        // vertex counts itself through a back-edge.
        assert_eq!(degrees_at_distance(&adj, 2), vec![2, 3, 4, 3, 2]);
    }

    #[test]
    fn blocks_partition_all_vertices() {
        let a = path_graph(9);
        let mut rng = StdRng::seed_from_u64(3);
        let colors = color_pattern(&a, WeightType::LargestFirst, &mut rng);
        let blocks = build_blocks_from_colors(&colors);
        let total: usize = blocks.iter().map(|b| b.len()).sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn weight_ordering_is_descending() {
        let w = [0.5, 2.0, 1.0];
        assert_eq!(weight_ordering(&w), vec![1, 2, 0]);
    }
}
