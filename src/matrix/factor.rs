//! Incomplete factorizations on sequential CSR blocks.
//!
//! The symbolic phase computes the fill pattern of ICC(k) for a given level
//! of fill and ordering; the numeric phase fills in factor values and can be
//! re-run alone when the nonzero pattern is unchanged. A singular or
//! indefinite pivot is reported as a typed [`FactorFailure`] value so the
//! owning preconditioner can record it and let the solver decide how to
//! react (e.g. shift the diagonal and retry) instead of aborting.

use crate::error::{Error, FactorFailure};
use crate::matrix::seq_csr::SeqCsr;

/// Fill pattern of an incomplete Cholesky factor: lower triangle including
/// the diagonal, rows sorted ascending, in the permuted numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CholPattern {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl CholPattern {
    pub fn n(&self) -> usize {
        self.n
    }
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }
    fn row(&self, i: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]]
    }
}

/// Value of the permuted matrix at (i, j) given `perm[k]` = original index
/// at permuted position k. The pattern is treated symmetrically.
fn permuted_entry(a: &SeqCsr, perm: &[usize], i: usize, j: usize) -> f64 {
    let v = a.get(perm[i], perm[j]);
    if v != 0.0 { v } else { a.get(perm[j], perm[i]) }
}

/// Symbolic ICC(k): level-of-fill pattern of the (permuted, symmetrized)
/// sparsity of `a`. Level-0 entries are the original nonzeros; a fill entry
/// gets level lev(i,k) + lev(k,j) + 1 and is kept while <= `levels`.
pub fn icc_symbolic(a: &SeqCsr, levels: usize, perm: &[usize]) -> Result<CholPattern, Error> {
    Error::check_lengths("icc_symbolic square matrix", a.nrows(), a.ncols())?;
    Error::check_lengths("icc_symbolic permutation", perm.len(), a.nrows())?;
    let n = a.nrows();

    let mut inv = vec![0usize; n];
    for (k, &p) in perm.iter().enumerate() {
        inv[p] = k;
    }
    // Symmetrized pattern of the permuted matrix, rows sorted.
    let mut sym_rows: Vec<Vec<usize>> = vec![Vec::new(); n];
    for orig_i in 0..n {
        let (cols, _) = a.row(orig_i);
        let pi = inv[orig_i];
        for &orig_j in cols {
            let pj = inv[orig_j];
            sym_rows[pi].push(pj);
            sym_rows[pj].push(pi);
        }
        sym_rows[pi].push(pi);
    }
    for row in &mut sym_rows {
        row.sort_unstable();
        row.dedup();
    }

    // Row-merge symbolic phase (IKJ): levels kept per column in a BTreeMap
    // so the k-cursor can advance through fill created mid-row.
    let mut upper_rows: Vec<Vec<(usize, usize)>> = Vec::with_capacity(n);
    let mut row_ptr = vec![0usize];
    let mut col_idx = Vec::new();
    for i in 0..n {
        let mut row: std::collections::BTreeMap<usize, usize> =
            sym_rows[i].iter().map(|&j| (j, 0)).collect();
        row.insert(i, 0);
        let mut cursor = 0usize;
        loop {
            let Some((&k, &lev_ik)) = row.range(cursor..i).next() else {
                break;
            };
            cursor = k + 1;
            for &(j, lev_kj) in &upper_rows[k] {
                let lev = lev_ik + lev_kj + 1;
                if lev <= levels {
                    row.entry(j).and_modify(|l| *l = (*l).min(lev)).or_insert(lev);
                }
            }
        }
        upper_rows.push(row.range(i + 1..).map(|(&j, &l)| (j, l)).collect());
        col_idx.extend(row.range(..=i).map(|(&j, _)| j));
        row_ptr.push(col_idx.len());
    }
    tracing::debug!(n, levels, nnz = col_idx.len(), "icc symbolic pattern");
    Ok(CholPattern { n, row_ptr, col_idx })
}

/// Incomplete Cholesky factor L (A ≈ P^T L L^T P on the pattern).
#[derive(Debug, Clone)]
pub struct CholFactor {
    perm: Vec<usize>,
    /// Lower triangle including the diagonal, rows sorted ascending.
    l: SeqCsr,
}

/// Numeric ICC on a previously computed pattern. `shift` is added to every
/// diagonal entry before factorization (Manteuffel-style positive-definite
/// shift; pass 0.0 for none). Re-invoking with the same pattern is the cheap
/// numeric-only path for `SAME_NONZERO_PATTERN` operators.
pub fn icc_numeric(
    a: &SeqCsr,
    pattern: &CholPattern,
    perm: &[usize],
    shift: f64,
) -> Result<CholFactor, FactorFailure> {
    let n = pattern.n;
    let mut row_vals: Vec<f64> = vec![0.0; pattern.nnz()];
    let mut w = vec![0.0f64; n];

    for i in 0..n {
        let cols_i = pattern.row(i);
        // Scatter the permuted matrix row onto the work array.
        for &j in cols_i {
            w[j] = permuted_entry(a, perm, i, j);
        }
        w[i] += shift;

        // Up-looking sweep: w[j] becomes l_ij for each off-diagonal pattern
        // position, values outside the pattern are dropped.
        for &j in cols_i {
            if j == i {
                continue;
            }
            let cols_j = pattern.row(j);
            let vals_j = &row_vals[pattern.row_ptr[j]..pattern.row_ptr[j + 1]];
            let mut s = w[j];
            let mut djj = 0.0;
            for (&p, &ljp) in cols_j.iter().zip(vals_j) {
                if p == j {
                    djj = ljp;
                } else {
                    s -= ljp * w[p];
                }
            }
            debug_assert!(djj != 0.0);
            w[j] = s / djj;
        }

        // Diagonal pivot.
        let mut d = w[i];
        for &j in cols_i {
            if j != i {
                d -= w[j] * w[j];
            }
        }
        if d == 0.0 {
            for &j in cols_i {
                w[j] = 0.0;
            }
            return Err(FactorFailure::ZeroPivot { row: i });
        }
        if d < 0.0 {
            for &j in cols_i {
                w[j] = 0.0;
            }
            return Err(FactorFailure::IndefinitePivot { row: i, value: d });
        }
        w[i] = d.sqrt();

        let out = &mut row_vals[pattern.row_ptr[i]..pattern.row_ptr[i + 1]];
        for (slot, &j) in out.iter_mut().zip(cols_i) {
            *slot = w[j];
            w[j] = 0.0;
        }
    }

    let l = SeqCsr::from_csr(
        n,
        n,
        pattern.row_ptr.clone(),
        pattern.col_idx.clone(),
        row_vals,
    )
    .expect("pattern arrays are well formed");
    Ok(CholFactor { perm: perm.to_vec(), l })
}

impl CholFactor {
    pub fn n(&self) -> usize {
        self.l.nrows()
    }

    pub fn factor(&self) -> &SeqCsr {
        &self.l
    }

    /// y ← L⁻¹ P r (forward substitution into the permuted space).
    pub fn forward_solve(&self, r: &[f64], y: &mut [f64]) {
        let n = self.n();
        debug_assert_eq!(r.len(), n);
        for i in 0..n {
            let (cols, vals) = self.l.row(i);
            let mut s = r[self.perm[i]];
            let mut dii = 1.0;
            for (&j, &v) in cols.iter().zip(vals) {
                if j == i {
                    dii = v;
                } else {
                    s -= v * y[j];
                }
            }
            y[i] = s / dii;
        }
    }

    /// z ← P^T L⁻ᵀ y (backward substitution out of the permuted space).
    pub fn backward_solve(&self, y: &[f64], z: &mut [f64]) {
        let n = self.n();
        debug_assert_eq!(y.len(), n);
        let mut t = y.to_vec();
        for i in (0..n).rev() {
            let (cols, vals) = self.l.row(i);
            let mut dii = 1.0;
            for (&j, &v) in cols.iter().zip(vals) {
                if j == i {
                    dii = v;
                }
            }
            let xi = t[i] / dii;
            z[self.perm[i]] = xi;
            for (&j, &v) in cols.iter().zip(vals) {
                if j != i {
                    t[j] -= v * xi;
                }
            }
        }
    }

    /// z ← (P^T L L^T P)⁻¹ r: both triangular solves.
    pub fn solve(&self, r: &[f64], z: &mut [f64]) {
        let mut y = vec![0.0; self.n()];
        self.forward_solve(r, &mut y);
        self.backward_solve(&y, z);
    }
}

/// ILU(0) factor: L (unit lower, implicit diagonal) and U packed in the
/// pattern of A.
#[derive(Debug, Clone)]
pub struct LuFactor {
    lu: SeqCsr,
}

/// Numeric ILU(0) in the natural ordering (IKJ variant, Saad §10.3).
pub fn ilu0_numeric(a: &SeqCsr) -> Result<LuFactor, FactorFailure> {
    debug_assert_eq!(a.nrows(), a.ncols());
    let n = a.nrows();
    let mut lu = a.clone();
    for i in 0..n {
        let (cols_i, _) = a.row(i);
        for (ki, &k) in cols_i.iter().enumerate() {
            if k >= i {
                break;
            }
            let ukk = lu.get(k, k);
            if ukk == 0.0 {
                return Err(FactorFailure::ZeroPivot { row: k });
            }
            let lik = {
                let start = lu.row_ptr()[i];
                let vals = lu.values_mut();
                vals[start + ki] /= ukk;
                vals[start + ki]
            };
            // Update the remainder of row i on its own pattern.
            let (cols_k, _) = a.row(k);
            for &j in cols_k {
                if j <= k {
                    continue;
                }
                let ukj = lu.get(k, j);
                if ukj == 0.0 {
                    continue;
                }
                let ri = lu.row_ptr()[i];
                if let Ok(pos) = a.row(i).0.binary_search(&j) {
                    lu.values_mut()[ri + pos] -= lik * ukj;
                }
            }
        }
        if lu.get(i, i) == 0.0 {
            return Err(FactorFailure::ZeroPivot { row: i });
        }
    }
    Ok(LuFactor { lu })
}

impl LuFactor {
    pub fn n(&self) -> usize {
        self.lu.nrows()
    }

    /// z ← (L U)⁻¹ r.
    pub fn solve(&self, r: &[f64], z: &mut [f64]) {
        let n = self.n();
        debug_assert_eq!(r.len(), n);
        // Forward: unit lower triangle.
        for i in 0..n {
            let (cols, vals) = self.lu.row(i);
            let mut s = r[i];
            for (&j, &v) in cols.iter().zip(vals) {
                if j < i {
                    s -= v * z[j];
                }
            }
            z[i] = s;
        }
        // Backward: upper triangle with diagonal.
        for i in (0..n).rev() {
            let (cols, vals) = self.lu.row(i);
            let mut s = z[i];
            let mut dii = 1.0;
            for (&j, &v) in cols.iter().zip(vals) {
                if j > i {
                    s -= v * z[j];
                } else if j == i {
                    dii = v;
                }
            }
            z[i] = s / dii;
        }
    }
}
