//! Sequential CSR storage.
//!
//! The building block both for the diagonal/off-diagonal blocks of the
//! distributed matrix and for block-local factorization and sub-solves.

use crate::core::traits::MatVec;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct SeqCsr {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SeqCsr {
    /// Build from raw CSR arrays. Column indices must be sorted within each
    /// row and in bounds.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, Error> {
        if row_ptr.len() != nrows + 1 || *row_ptr.last().unwrap_or(&0) != col_idx.len() {
            return Err(Error::InvalidState("malformed CSR row pointers"));
        }
        Error::check_lengths("CSR col_idx vs values", col_idx.len(), values.len())?;
        for i in 0..nrows {
            let row = &col_idx[row_ptr[i]..row_ptr[i + 1]];
            if row.windows(2).any(|w| w[0] >= w[1]) || row.iter().any(|&c| c >= ncols) {
                return Err(Error::InvalidState("CSR columns unsorted or out of bounds"));
            }
        }
        Ok(SeqCsr { nrows, ncols, row_ptr, col_idx, values })
    }

    /// Build from (row, col, value) triplets; duplicates accumulate.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, Error> {
        let mut rows: Vec<std::collections::BTreeMap<usize, f64>> =
            vec![std::collections::BTreeMap::new(); nrows];
        for &(r, c, v) in triplets {
            if r >= nrows || c >= ncols {
                return Err(Error::InvalidState("triplet index out of bounds"));
            }
            *rows[r].entry(c).or_insert(0.0) += v;
        }
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in rows {
            for (c, v) in row {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        SeqCsr::from_csr(nrows, ncols, row_ptr, col_idx, values)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }
    pub fn ncols(&self) -> usize {
        self.ncols
    }
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }
    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let (s, e) = (self.row_ptr[i], self.row_ptr[i + 1]);
        (&self.col_idx[s..e], &self.values[s..e])
    }

    /// Stored value at (i, j), or 0.0 when outside the pattern.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (cols, vals) = self.row(i);
        match cols.binary_search(&j) {
            Ok(k) => vals[k],
            Err(_) => 0.0,
        }
    }

    /// The main diagonal as a dense vector (zeros where unstored).
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.nrows.min(self.ncols)).map(|i| self.get(i, i)).collect()
    }

    /// y = A x.
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.ncols);
        debug_assert_eq!(y.len(), self.nrows);
        for i in 0..self.nrows {
            let (cols, vals) = self.row(i);
            y[i] = cols.iter().zip(vals).map(|(&c, &v)| v * x[c]).sum();
        }
    }

    /// y += A x.
    pub fn spmv_add(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.ncols);
        debug_assert_eq!(y.len(), self.nrows);
        for i in 0..self.nrows {
            let (cols, vals) = self.row(i);
            y[i] += cols.iter().zip(vals).map(|(&c, &v)| v * x[c]).sum::<f64>();
        }
    }

    /// Principal submatrix over `indices` (sorted, distinct), renumbered
    /// to 0..len. Used to pull block-Jacobi sub-blocks out of the diagonal
    /// block.
    pub fn submatrix(&self, indices: &[usize]) -> Result<SeqCsr, Error> {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        let n = indices.len();
        let mut local_of = std::collections::HashMap::with_capacity(n);
        for (k, &i) in indices.iter().enumerate() {
            if i >= self.nrows || i >= self.ncols {
                return Err(Error::InvalidState("submatrix index out of bounds"));
            }
            local_of.insert(i, k);
        }
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for &i in indices {
            let (cols, vals) = self.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                if let Some(&lc) = local_of.get(&c) {
                    col_idx.push(lc);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        SeqCsr::from_csr(n, n, row_ptr, col_idx, values)
    }

    /// Dense copy, for the direct (faer) block solver.
    pub fn to_dense(&self) -> faer::Mat<f64> {
        faer::Mat::from_fn(self.nrows, self.ncols, |i, j| self.get(i, j))
    }
}

impl crate::core::traits::HasComm for SeqCsr {}

impl MatVec<Vec<f64>> for SeqCsr {
    fn matvec(&self, x: &Vec<f64>, y: &mut Vec<f64>) -> Result<(), Error> {
        Error::check_lengths("SeqCsr matvec input", x.len(), self.ncols)?;
        Error::check_lengths("SeqCsr matvec output", y.len(), self.nrows)?;
        self.spmv(x, y);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_spmv() {
        let m = SeqCsr::from_csr(3, 3, vec![0, 1, 2, 3], vec![0, 1, 2], vec![1.0, 1.0, 1.0])
            .unwrap();
        let x = vec![2.0, 3.0, 5.0];
        let mut y = vec![0.0; 3];
        m.spmv(&x, &mut y);
        assert_eq!(y, x);
    }

    #[test]
    fn simple_pattern() {
        // 2x3 matrix [[1,2,0],[0,3,4]]
        let m = SeqCsr::from_csr(2, 3, vec![0, 2, 4], vec![0, 1, 1, 2], vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![0.0; 2];
        m.spmv(&x, &mut y);
        assert_eq!(y, vec![3.0, 7.0]);
        assert_eq!(m.get(1, 0), 0.0);
        assert_eq!(m.get(1, 2), 4.0);
    }

    #[test]
    fn triplets_accumulate() {
        let m = SeqCsr::from_triplets(2, 2, &[(0, 0, 1.0), (0, 0, 2.0), (1, 1, 4.0)]).unwrap();
        assert_eq!(m.get(0, 0), 3.0);
        assert_eq!(m.nnz(), 2);
    }

    #[test]
    fn submatrix_extracts_block() {
        // [[2,1,0],[1,2,1],[0,1,2]], block {0,2} has no coupling
        let m = SeqCsr::from_triplets(
            3,
            3,
            &[
                (0, 0, 2.0),
                (0, 1, 1.0),
                (1, 0, 1.0),
                (1, 1, 2.0),
                (1, 2, 1.0),
                (2, 1, 1.0),
                (2, 2, 2.0),
            ],
        )
        .unwrap();
        let s = m.submatrix(&[0, 2]).unwrap();
        assert_eq!(s.nrows(), 2);
        assert_eq!(s.get(0, 0), 2.0);
        assert_eq!(s.get(0, 1), 0.0);
        assert_eq!(s.get(1, 1), 2.0);
    }

    #[test]
    fn malformed_csr_rejected() {
        assert!(SeqCsr::from_csr(2, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(SeqCsr::from_csr(1, 2, vec![0, 2], vec![1, 0], vec![1.0, 1.0]).is_err());
    }
}
