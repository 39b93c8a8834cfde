//! Row-partitioned sparse matrix.
//!
//! A matrix is in exactly one of two phases: *assembling* (structure
//! mutable, local inserts pending) or *assembled* (read-optimized compressed
//! storage, consistent across ranks). The assembled form splits each local
//! row into a diagonal block (columns this rank owns) and an off-diagonal
//! block whose columns are compacted through a ghost-column map; the matvec
//! fetches ghost values of the input vector through a communication pattern
//! built once per sparsity pattern and reused until the pattern changes.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use bitflags::bitflags;

use crate::core::traits::MatVec;
use crate::error::Error;
use crate::matrix::ordering::{self, OrderingType};
use crate::matrix::seq_csr::SeqCsr;
use crate::vector::dist::{DistVector, InsertMode};
use crate::vector::layout::Layout;

bitflags! {
    /// Behavioral options of a matrix.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MatOpts: u32 {
        /// Inserting a nonzero beyond the preallocated budget is an error
        /// instead of a (costly) dynamic reallocation.
        const NEW_NONZERO_ALLOCATION_ERR = 0b0001;
        /// Caller promises the matrix is structurally symmetric.
        const SYMMETRIC = 0b0010;
    }
}

/// Declared relationship between an operator and its previous incarnation,
/// steering how much preconditioner setup work can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatStructure {
    /// Values changed, sparsity pattern identical: numeric-only refresh.
    SameNonzeroPattern,
    /// Pattern may have changed: full symbolic re-setup.
    DifferentNonzeroPattern,
}

/// In-flight matrix assembly handle.
#[must_use = "assembly_end must consume the handle to finalize the matrix"]
pub struct MatAssembly {
    received: Vec<(usize, usize, f64)>,
    mode: Option<InsertMode>,
}

/// Cached ghost-exchange pattern for the matvec.
struct Scatter {
    /// Local column indices this rank sends, grouped by destination rank.
    send_local: Vec<Vec<usize>>,
    /// Ghost-array positions filled by each source rank, in send order.
    ghost_pos: Vec<Vec<usize>>,
}

struct AssembledBlocks {
    diag: SeqCsr,
    offdiag: SeqCsr,
    /// Sorted global column indices of the off-diagonal block.
    ghosts: Vec<usize>,
    scatter: OnceLock<Scatter>,
}

enum Phase {
    Assembling(Vec<BTreeMap<usize, f64>>),
    Assembled(AssembledBlocks),
}

pub struct DistMatrix {
    row_layout: Arc<Layout>,
    col_layout: Arc<Layout>,
    phase: Phase,
    stash: Vec<(usize, usize, f64)>,
    stash_mode: Option<InsertMode>,
    opts: MatOpts,
    /// (diagonal-block, off-diagonal-block) expected nonzeros per row.
    prealloc: Option<(usize, usize)>,
}

impl DistMatrix {
    /// Create an empty (assembling) matrix over explicit layouts. The row
    /// layout must match vectors used as matvec output, the column layout
    /// vectors used as input.
    pub fn from_layouts(row_layout: Arc<Layout>, col_layout: Arc<Layout>) -> Self {
        let n_local = row_layout.local_len();
        DistMatrix {
            row_layout,
            col_layout,
            phase: Phase::Assembling(vec![BTreeMap::new(); n_local]),
            stash: Vec::new(),
            stash_mode: None,
            opts: MatOpts::empty(),
            prealloc: None,
        }
    }

    /// Create with the vector sizing policy: each of the four sizes may be
    /// explicit or left to automatic partitioning (at least one of
    /// local/global per dimension).
    pub fn create(
        comm: Arc<dyn crate::parallel::Comm>,
        local_rows: Option<usize>,
        local_cols: Option<usize>,
        global_rows: Option<usize>,
        global_cols: Option<usize>,
    ) -> Result<Self, Error> {
        let rl = Layout::new(comm.clone(), local_rows, global_rows)?;
        let cl = Layout::new(comm, local_cols, global_cols)?;
        Ok(DistMatrix::from_layouts(rl, cl))
    }

    /// Single-process matrix from triplets, assembled. Test and demo helper.
    pub fn serial_from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, Error> {
        let mut m = DistMatrix::from_layouts(Layout::serial(nrows), Layout::serial(ncols));
        for &(r, c, v) in triplets {
            m.set_values(&[r], &[c], &[v], InsertMode::Add)?;
        }
        let h = m.assembly_begin()?;
        m.assembly_end(h)?;
        Ok(m)
    }

    pub fn row_layout(&self) -> &Arc<Layout> {
        &self.row_layout
    }
    pub fn col_layout(&self) -> &Arc<Layout> {
        &self.col_layout
    }
    pub fn global_rows(&self) -> usize {
        self.row_layout.global_len()
    }
    pub fn global_cols(&self) -> usize {
        self.col_layout.global_len()
    }
    pub fn is_assembled(&self) -> bool {
        matches!(self.phase, Phase::Assembled(_))
    }

    /// Expected nonzeros per row in the diagonal and off-diagonal blocks.
    /// A hint only, unless `NEW_NONZERO_ALLOCATION_ERR` makes it a budget.
    pub fn set_preallocation(&mut self, d_nz: usize, o_nz: usize) {
        self.prealloc = Some((d_nz, o_nz));
    }

    pub fn set_option(&mut self, opt: MatOpts, enable: bool) {
        self.opts.set(opt, enable);
    }

    /// Decompress back into the assembling phase for structural mutation.
    fn ensure_assembling(&mut self) {
        if let Phase::Assembled(blocks) = &self.phase {
            let (_, col_start) = {
                let (s, _) = self.col_layout.local_range();
                (0, s)
            };
            let n_local = self.row_layout.local_len();
            let mut rows = vec![BTreeMap::new(); n_local];
            for (i, row) in rows.iter_mut().enumerate() {
                let (cols, vals) = blocks.diag.row(i);
                for (&c, &v) in cols.iter().zip(vals) {
                    row.insert(col_start + c, v);
                }
                let (cols, vals) = blocks.offdiag.row(i);
                for (&c, &v) in cols.iter().zip(vals) {
                    row.insert(blocks.ghosts[c], v);
                }
            }
            self.phase = Phase::Assembling(rows);
        }
    }

    fn apply_local(
        rows: &mut [BTreeMap<usize, f64>],
        col_range: (usize, usize),
        prealloc: Option<(usize, usize)>,
        opts: MatOpts,
        local_row: usize,
        global_col: usize,
        v: f64,
        mode: InsertMode,
    ) -> Result<(), Error> {
        let row = &mut rows[local_row];
        if !row.contains_key(&global_col) {
            if let Some((d_nz, o_nz)) = prealloc {
                if opts.contains(MatOpts::NEW_NONZERO_ALLOCATION_ERR) {
                    let in_diag = global_col >= col_range.0 && global_col < col_range.1;
                    let (budget, used) = if in_diag {
                        (d_nz, row.range(col_range.0..col_range.1).count())
                    } else {
                        (o_nz, row.len() - row.range(col_range.0..col_range.1).count())
                    };
                    if used >= budget {
                        return Err(Error::AllocationError {
                            row: local_row,
                            col: global_col,
                        });
                    }
                }
            }
        }
        match mode {
            InsertMode::Insert => {
                row.insert(global_col, v);
            }
            InsertMode::Add => {
                *row.entry(global_col).or_insert(0.0) += v;
            }
        }
        Ok(())
    }

    /// Insert or accumulate the dense block `vals` (row-major,
    /// `rows.len() * cols.len()`) at the given global positions. Entries in
    /// rows owned by other ranks are cached and forwarded during assembly.
    pub fn set_values(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
        mode: InsertMode,
    ) -> Result<(), Error> {
        Error::check_lengths("set_values block", rows.len() * cols.len(), vals.len())?;
        match self.stash_mode {
            Some(m) if m != mode => {
                return Err(Error::InvalidState(
                    "cannot mix Insert and Add between assemblies",
                ));
            }
            _ => self.stash_mode = Some(mode),
        }
        self.ensure_assembling();
        let (row_start, row_end) = self.row_layout.local_range();
        let col_range = self.col_layout.local_range();
        let Phase::Assembling(local_rows) = &mut self.phase else {
            unreachable!()
        };
        for (ri, &r) in rows.iter().enumerate() {
            if r >= self.row_layout.global_len() {
                return Err(Error::SizeMismatch {
                    context: "set_values row vs global rows",
                    left: r,
                    right: self.row_layout.global_len(),
                });
            }
            for (ci, &c) in cols.iter().enumerate() {
                if c >= self.col_layout.global_len() {
                    return Err(Error::SizeMismatch {
                        context: "set_values col vs global cols",
                        left: c,
                        right: self.col_layout.global_len(),
                    });
                }
                let v = vals[ri * cols.len() + ci];
                if r >= row_start && r < row_end {
                    Self::apply_local(
                        local_rows,
                        col_range,
                        self.prealloc,
                        self.opts,
                        r - row_start,
                        c,
                        v,
                        mode,
                    )?;
                } else {
                    self.stash.push((r, c, v));
                }
            }
        }
        Ok(())
    }

    /// Start forwarding cached off-process entries to their owners. Local
    /// computation may overlap with message transit until `assembly_end`.
    pub fn assembly_begin(&mut self) -> Result<MatAssembly, Error> {
        let comm = self.row_layout.comm().clone();
        let size = comm.size();

        // Same symmetric mode agreement as the vector assembly: min and max
        // of the active ranks' modes travel in one reduction so disagreement
        // errors on every rank before any further collective.
        let local_mode = match self.stash_mode {
            None => -1.0,
            Some(InsertMode::Insert) => 0.0,
            Some(InsertMode::Add) => 1.0,
        };
        let mut buf = [
            local_mode,
            if local_mode >= 0.0 { -local_mode } else { -2.0 },
        ];
        comm.all_reduce_max(&mut buf);
        if buf[0] >= 0.0 && -buf[1] != buf[0] {
            return Err(Error::InvalidState(
                "ranks disagree on Insert vs Add during matrix assembly",
            ));
        }
        let mode = if buf[0] < 0.0 {
            None
        } else if buf[0] == 0.0 {
            Some(InsertMode::Insert)
        } else {
            Some(InsertMode::Add)
        };

        // Triplets travel as parallel (row, col) index and value lists.
        let mut idx_sends: Vec<Vec<usize>> = vec![Vec::new(); size];
        let mut val_sends: Vec<Vec<f64>> = vec![Vec::new(); size];
        for &(r, c, v) in &self.stash {
            let owner = self.row_layout.owner_of(r);
            idx_sends[owner].push(r);
            idx_sends[owner].push(c);
            val_sends[owner].push(v);
        }
        self.stash.clear();

        let idx_recv = comm.exchange_indices(&idx_sends);
        let val_recv = comm.exchange_scalars(&val_sends);
        let mut received = Vec::new();
        for (idxs, vals) in idx_recv.into_iter().zip(val_recv) {
            for (pair, v) in idxs.chunks_exact(2).zip(vals) {
                received.push((pair[0], pair[1], v));
            }
        }
        tracing::trace!(received = received.len(), "matrix assembly exchange");
        Ok(MatAssembly { received, mode })
    }

    /// Merge exchanged entries and compress to read-optimized storage.
    /// Collective: the matrix is matvec-ready only after every rank
    /// completes this call. Re-assembling with nothing pending is a no-op.
    pub fn assembly_end(&mut self, assembly: MatAssembly) -> Result<(), Error> {
        self.stash_mode = None;
        if assembly.received.is_empty() && matches!(self.phase, Phase::Assembled(_)) {
            return Ok(());
        }
        self.ensure_assembling();
        {
            let (row_start, _) = self.row_layout.local_range();
            let col_range = self.col_layout.local_range();
            let Phase::Assembling(local_rows) = &mut self.phase else {
                unreachable!()
            };
            let mode = assembly.mode.unwrap_or(InsertMode::Insert);
            for (r, c, v) in assembly.received {
                Self::apply_local(
                    local_rows,
                    col_range,
                    self.prealloc,
                    self.opts,
                    r - row_start,
                    c,
                    v,
                    mode,
                )?;
            }
        }
        self.compress()
    }

    fn compress(&mut self) -> Result<(), Error> {
        let Phase::Assembling(rows) = &self.phase else {
            return Ok(());
        };
        let (col_start, col_end) = self.col_layout.local_range();
        let n_local = rows.len();
        let n_local_cols = col_end - col_start;

        let mut ghosts: Vec<usize> = rows
            .iter()
            .flat_map(|r| r.keys().copied())
            .filter(|&c| c < col_start || c >= col_end)
            .collect();
        ghosts.sort_unstable();
        ghosts.dedup();
        let ghost_of: std::collections::HashMap<usize, usize> =
            ghosts.iter().enumerate().map(|(k, &g)| (g, k)).collect();

        let mut d_ptr = vec![0usize];
        let mut d_idx = Vec::new();
        let mut d_val = Vec::new();
        let mut o_ptr = vec![0usize];
        let mut o_idx = Vec::new();
        let mut o_val = Vec::new();
        for row in rows {
            for (&c, &v) in row {
                if c >= col_start && c < col_end {
                    d_idx.push(c - col_start);
                    d_val.push(v);
                } else {
                    o_idx.push(ghost_of[&c]);
                    o_val.push(v);
                }
            }
            d_ptr.push(d_idx.len());
            o_ptr.push(o_idx.len());
        }
        let diag = SeqCsr::from_csr(n_local, n_local_cols, d_ptr, d_idx, d_val)?;
        let offdiag = SeqCsr::from_csr(n_local, ghosts.len(), o_ptr, o_idx, o_val)?;
        tracing::debug!(
            rows = n_local,
            diag_nnz = diag.nnz(),
            offdiag_nnz = offdiag.nnz(),
            ghosts = ghosts.len(),
            "matrix compressed"
        );
        self.phase = Phase::Assembled(AssembledBlocks {
            diag,
            offdiag,
            ghosts,
            scatter: OnceLock::new(),
        });
        Ok(())
    }

    fn assembled(&self) -> Result<&AssembledBlocks, Error> {
        match &self.phase {
            Phase::Assembled(b) => Ok(b),
            Phase::Assembling(_) => Err(Error::InvalidState(
                "matrix must be assembled before this operation",
            )),
        }
    }

    /// The local diagonal block (owned rows x owned columns).
    pub fn local_diag_block(&self) -> Result<&SeqCsr, Error> {
        Ok(&self.assembled()?.diag)
    }

    /// Stored entries of an owned row as (global column, value) pairs,
    /// sorted by column.
    pub fn local_row(&self, global_row: usize) -> Result<Vec<(usize, f64)>, Error> {
        let blocks = self.assembled()?;
        let (row_start, row_end) = self.row_layout.local_range();
        if global_row < row_start || global_row >= row_end {
            return Err(Error::InvalidState("row is not owned by this rank"));
        }
        let (col_start, _) = self.col_layout.local_range();
        let i = global_row - row_start;
        let (dc, dv) = blocks.diag.row(i);
        let (oc, ov) = blocks.offdiag.row(i);
        let mut entries: Vec<(usize, f64)> = dc
            .iter()
            .zip(dv)
            .map(|(&c, &v)| (col_start + c, v))
            .chain(oc.iter().zip(ov).map(|(&c, &v)| (blocks.ghosts[c], v)))
            .collect();
        entries.sort_unstable_by_key(|&(c, _)| c);
        Ok(entries)
    }

    /// Stored value at a locally owned position, 0.0 outside the pattern.
    pub fn local_entry(&self, global_row: usize, global_col: usize) -> Result<f64, Error> {
        let blocks = self.assembled()?;
        let (row_start, row_end) = self.row_layout.local_range();
        if global_row < row_start || global_row >= row_end {
            return Err(Error::InvalidState("row is not owned by this rank"));
        }
        let (col_start, col_end) = self.col_layout.local_range();
        let i = global_row - row_start;
        if global_col >= col_start && global_col < col_end {
            Ok(blocks.diag.get(i, global_col - col_start))
        } else {
            match blocks.ghosts.binary_search(&global_col) {
                Ok(g) => Ok(blocks.offdiag.get(i, g)),
                Err(_) => Ok(0.0),
            }
        }
    }

    /// The global diagonal as a vector over the row layout. Requires
    /// matching row/column partitions.
    pub fn diagonal(&self) -> Result<DistVector, Error> {
        if !self.row_layout.compatible(&self.col_layout) {
            return Err(Error::Unsupported(
                "diagonal requires matching row and column layouts",
            ));
        }
        let blocks = self.assembled()?;
        let mut v = DistVector::new(self.row_layout.clone());
        let d = blocks.diag.diagonal();
        v.array_mut()?.copy_from_slice(&d);
        Ok(v)
    }

    /// Fill-reducing ordering of the local diagonal block's pattern.
    pub fn get_ordering(&self, ty: OrderingType) -> Result<Vec<usize>, Error> {
        ordering::get_ordering(&self.assembled()?.diag, ty)
    }

    fn build_scatter(&self, blocks: &AssembledBlocks) -> Scatter {
        let comm = self.col_layout.comm();
        let size = comm.size();
        // Group needed ghost columns by owning rank; ghosts are sorted, so
        // each rank's positions are ascending runs.
        let mut needs: Vec<Vec<usize>> = vec![Vec::new(); size];
        let mut ghost_pos: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (pos, &g) in blocks.ghosts.iter().enumerate() {
            let owner = self.col_layout.owner_of(g);
            needs[owner].push(g);
            ghost_pos[owner].push(pos);
        }
        let requested = comm.exchange_indices(&needs);
        let (col_start, _) = self.col_layout.local_range();
        let send_local = requested
            .into_iter()
            .map(|idxs| idxs.into_iter().map(|g| g - col_start).collect())
            .collect();
        tracing::debug!(ghosts = blocks.ghosts.len(), "matvec scatter pattern built");
        Scatter { send_local, ghost_pos }
    }

    /// y = A x. Requires an assembled matrix; reuses the cached scatter
    /// pattern for the ghost values of x.
    pub fn mult(&self, x: &DistVector, y: &mut DistVector) -> Result<(), Error> {
        let blocks = self.assembled()?;
        if x.layout().comm().size() != self.col_layout.comm().size() {
            return Err(Error::WrongCommSize {
                expected: self.col_layout.comm().size(),
                actual: x.layout().comm().size(),
            });
        }
        if !x.layout().compatible(self.col_layout()) {
            return Err(Error::SizeMismatch {
                context: "matvec input vs column layout",
                left: x.global_len(),
                right: self.global_cols(),
            });
        }
        if !y.layout().compatible(self.row_layout()) {
            return Err(Error::SizeMismatch {
                context: "matvec output vs row layout",
                left: y.global_len(),
                right: self.global_rows(),
            });
        }

        let x_local = x.array()?;
        // Local contribution first; ghost contribution after the exchange.
        {
            let y_local = y.array_mut()?;
            blocks.diag.spmv(x_local, y_local);
        }
        // Every rank drives the scatter collectives, ghosts or not; a rank
        // with nothing to receive still answers other ranks' requests.
        let scatter = blocks.scatter.get_or_init(|| self.build_scatter(blocks));
        let comm = self.col_layout.comm();
        let sends: Vec<Vec<f64>> = scatter
            .send_local
            .iter()
            .map(|idxs| idxs.iter().map(|&li| x_local[li]).collect())
            .collect();
        let recvd = comm.exchange_scalars(&sends);
        if !blocks.ghosts.is_empty() {
            let mut ghost_vals = vec![0.0; blocks.ghosts.len()];
            for (r, vals) in recvd.into_iter().enumerate() {
                for (&pos, v) in scatter.ghost_pos[r].iter().zip(vals) {
                    ghost_vals[pos] = v;
                }
            }
            blocks.offdiag.spmv_add(&ghost_vals, y.array_mut()?);
        }
        Ok(())
    }
}

impl MatVec<DistVector> for DistMatrix {
    fn matvec(&self, x: &DistVector, y: &mut DistVector) -> Result<(), Error> {
        self.mult(x, y)
    }
}

impl crate::core::traits::HasComm for DistMatrix {
    fn comm_of(&self) -> Option<&Arc<dyn crate::parallel::Comm>> {
        Some(self.row_layout.comm())
    }
}

impl std::fmt::Debug for DistMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistMatrix")
            .field("global_rows", &self.global_rows())
            .field("global_cols", &self.global_cols())
            .field("assembled", &self.is_assembled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::Comm;

    fn tridiag(n: usize) -> DistMatrix {
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
        DistMatrix::serial_from_triplets(n, n, &t).unwrap()
    }

    #[test]
    fn matvec_on_tridiagonal() {
        let a = tridiag(5);
        let x = DistVector::from_fn(a.col_layout().clone(), |_| 1.0);
        let mut y = DistVector::new(a.row_layout().clone());
        a.mult(&x, &mut y).unwrap();
        assert_eq!(y.array().unwrap(), &[1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn matvec_requires_assembly() {
        let m = DistMatrix::from_layouts(Layout::serial(3), Layout::serial(3));
        let x = DistVector::new(m.col_layout().clone());
        let mut y = DistVector::new(m.row_layout().clone());
        assert!(matches!(m.mult(&x, &mut y), Err(Error::InvalidState(_))));
    }

    #[test]
    fn insert_overwrites_add_accumulates() {
        let mut m = DistMatrix::from_layouts(Layout::serial(2), Layout::serial(2));
        m.set_values(&[0], &[0], &[1.5], InsertMode::Insert).unwrap();
        m.set_values(&[0], &[0], &[2.5], InsertMode::Insert).unwrap();
        let h = m.assembly_begin().unwrap();
        m.assembly_end(h).unwrap();
        assert_eq!(m.local_entry(0, 0).unwrap(), 2.5);

        m.set_values(&[0], &[0], &[1.0], InsertMode::Add).unwrap();
        let h = m.assembly_begin().unwrap();
        m.assembly_end(h).unwrap();
        assert_eq!(m.local_entry(0, 0).unwrap(), 3.5);
    }

    #[test]
    fn reassembly_without_inserts_is_idempotent() {
        let mut a = tridiag(4);
        let before: Vec<f64> = a.local_diag_block().unwrap().values().to_vec();
        let h = a.assembly_begin().unwrap();
        a.assembly_end(h).unwrap();
        let after: Vec<f64> = a.local_diag_block().unwrap().values().to_vec();
        assert_eq!(before, after);
    }

    #[test]
    fn allocation_budget_enforced() {
        let mut m = DistMatrix::from_layouts(Layout::serial(3), Layout::serial(3));
        m.set_preallocation(2, 0);
        m.set_option(MatOpts::NEW_NONZERO_ALLOCATION_ERR, true);
        m.set_values(&[0], &[0], &[1.0], InsertMode::Insert).unwrap();
        m.set_values(&[0], &[1], &[1.0], InsertMode::Insert).unwrap();
        // Third distinct column in row 0 exceeds the diagonal-block budget.
        let err = m.set_values(&[0], &[2], &[1.0], InsertMode::Insert).unwrap_err();
        assert!(matches!(err, Error::AllocationError { row: 0, col: 2 }));
        // Updating an existing position stays fine.
        m.set_values(&[0], &[1], &[4.0], InsertMode::Insert).unwrap();
    }

    #[test]
    fn diagonal_extraction() {
        let a = tridiag(4);
        let d = a.diagonal().unwrap();
        assert_eq!(d.array().unwrap(), &[2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn mult_completes_when_a_rank_has_no_ghosts() {
        // Rank 0's row reaches a column owned by rank 1; rank 1 is fully
        // local. Both ranks must still drive the ghost scatter together.
        let handles: Vec<_> = crate::parallel::local::ThreadComm::group(2)
            .into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let rank = comm.rank();
                    let comm: Arc<dyn crate::parallel::Comm> = comm;
                    let l = Layout::new(comm, Some(1), Some(2)).unwrap();
                    let mut a = DistMatrix::from_layouts(l.clone(), l.clone());
                    if rank == 0 {
                        a.set_values(&[0], &[0, 1], &[2.0, 1.0], InsertMode::Insert)
                            .unwrap();
                    } else {
                        a.set_values(&[1], &[1], &[3.0], InsertMode::Insert).unwrap();
                    }
                    let h = a.assembly_begin().unwrap();
                    a.assembly_end(h).unwrap();
                    let x = DistVector::from_fn(l.clone(), |i| (i + 1) as f64);
                    let mut y = DistVector::new(l);
                    a.mult(&x, &mut y).unwrap();
                    y.array().unwrap().to_vec()
                })
            })
            .collect();
        let results: Vec<Vec<f64>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0], vec![4.0]);
        assert_eq!(results[1], vec![6.0]);
    }

    #[test]
    fn dense_block_insert() {
        let mut m = DistMatrix::from_layouts(Layout::serial(3), Layout::serial(3));
        m.set_values(&[0, 2], &[0, 1], &[1.0, 2.0, 3.0, 4.0], InsertMode::Insert)
            .unwrap();
        let h = m.assembly_begin().unwrap();
        m.assembly_end(h).unwrap();
        assert_eq!(m.local_entry(0, 0).unwrap(), 1.0);
        assert_eq!(m.local_entry(0, 1).unwrap(), 2.0);
        assert_eq!(m.local_entry(2, 0).unwrap(), 3.0);
        assert_eq!(m.local_entry(2, 1).unwrap(), 4.0);
    }
}
