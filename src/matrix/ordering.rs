//! Fill-reducing row/column orderings.
//!
//! Deterministic given the sparsity pattern and ordering type. The reverse
//! Cuthill–McKee variant runs a degree-sorted BFS from a minimum-degree
//! node of each connected component and reverses the visit order.

use crate::error::Error;
use crate::matrix::seq_csr::SeqCsr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingType {
    /// Identity permutation.
    Natural,
    /// Reverse Cuthill–McKee.
    Rcm,
}

impl OrderingType {
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "natural" => Ok(OrderingType::Natural),
            "rcm" => Ok(OrderingType::Rcm),
            other => Err(Error::NotFound(other.to_string())),
        }
    }
}

/// Compute a symmetric permutation of `a`'s pattern. `perm[k]` is the
/// original index placed at position `k`.
pub fn get_ordering(a: &SeqCsr, ty: OrderingType) -> Result<Vec<usize>, Error> {
    Error::check_lengths("ordering needs a square pattern", a.nrows(), a.ncols())?;
    match ty {
        OrderingType::Natural => Ok((0..a.nrows()).collect()),
        OrderingType::Rcm => Ok(rcm(a)),
    }
}

/// Symmetrized adjacency (structural), excluding the diagonal.
fn adjacency(a: &SeqCsr) -> Vec<Vec<usize>> {
    let n = a.nrows();
    let mut adj = vec![Vec::new(); n];
    for i in 0..n {
        let (cols, _) = a.row(i);
        for &j in cols {
            if i != j {
                adj[i].push(j);
                adj[j].push(i);
            }
        }
    }
    for nbrs in &mut adj {
        nbrs.sort_unstable();
        nbrs.dedup();
    }
    adj
}

fn rcm(a: &SeqCsr) -> Vec<usize> {
    let n = a.nrows();
    let adj = adjacency(a);
    let degree: Vec<usize> = adj.iter().map(|nb| nb.len()).collect();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);

    while order.len() < n {
        // Start each component at its minimum-degree node; tie broken by
        // index to keep the ordering deterministic.
        let start = (0..n)
            .filter(|&i| !visited[i])
            .min_by_key(|&i| (degree[i], i))
            .unwrap();
        visited[start] = true;
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(u) = queue.pop_front() {
            order.push(u);
            let mut next: Vec<usize> = adj[u].iter().copied().filter(|&v| !visited[v]).collect();
            next.sort_unstable_by_key(|&v| (degree[v], v));
            for v in next {
                visited[v] = true;
                queue.push_back(v);
            }
        }
    }
    order.reverse();
    order
}

/// Structural bandwidth of `a` under permutation `perm`.
pub fn bandwidth_under(a: &SeqCsr, perm: &[usize]) -> usize {
    let n = a.nrows();
    let mut pos = vec![0usize; n];
    for (k, &p) in perm.iter().enumerate() {
        pos[p] = k;
    }
    let mut bw = 0usize;
    for i in 0..n {
        let (cols, _) = a.row(i);
        for &j in cols {
            bw = bw.max(pos[i].abs_diff(pos[j]));
        }
    }
    bw
}
