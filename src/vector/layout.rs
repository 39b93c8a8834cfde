//! Ownership layout of a distributed object.
//!
//! A layout records how a global index range [0, N) is partitioned into
//! contiguous, non-overlapping, rank-ordered local ranges. Vectors and the
//! row/column spaces of matrices share layouts so that partitions line up.

use std::sync::Arc;

use crate::error::Error;
use crate::parallel::Comm;

/// Split `n_global` as evenly as possible across `size` ranks, remainder to
/// the lowest-numbered ranks. Returns (start, local_len) for `rank`.
pub fn split_ownership(rank: usize, size: usize, n_global: usize) -> (usize, usize) {
    let base = n_global / size;
    let rem = n_global % size;
    let local = base + usize::from(rank < rem);
    let start = rank * base + rank.min(rem);
    (start, local)
}

/// Contiguous ownership ranges for one communicator.
pub struct Layout {
    comm: Arc<dyn Comm>,
    n_global: usize,
    /// `offsets[r]..offsets[r+1]` is the range owned by rank r; len = size+1.
    offsets: Vec<usize>,
}

impl Layout {
    /// Create a layout from an explicit local size, an explicit global size,
    /// or either one left to automatic partitioning. Giving both checks them
    /// for consistency and fails with `SizeMismatch` if they disagree.
    pub fn new(
        comm: Arc<dyn Comm>,
        local: Option<usize>,
        global: Option<usize>,
    ) -> Result<Arc<Layout>, Error> {
        let size = comm.size();
        let rank = comm.rank();
        let n_local = match (local, global) {
            (None, None) => {
                return Err(Error::InvalidState(
                    "layout needs at least one of local or global size",
                ));
            }
            (Some(l), _) => l,
            (None, Some(g)) => split_ownership(rank, size, g).1,
        };

        // Allgather the local sizes so every rank knows every range.
        let sends: Vec<Vec<usize>> = (0..size).map(|_| vec![n_local]).collect();
        let locals = comm.exchange_indices(&sends);
        let mut offsets = Vec::with_capacity(size + 1);
        offsets.push(0);
        for r in 0..size {
            offsets.push(offsets[r] + locals[r][0]);
        }
        let n_global = offsets[size];

        if let Some(g) = global {
            if g != n_global {
                return Err(Error::SizeMismatch {
                    context: "layout local sizes vs declared global size",
                    left: n_global,
                    right: g,
                });
            }
        }
        Ok(Arc::new(Layout { comm, n_global, offsets }))
    }

    /// Single-process layout of length `n`.
    pub fn serial(n: usize) -> Arc<Layout> {
        Layout::new(Arc::new(crate::parallel::SerialComm), Some(n), Some(n))
            .expect("serial layout cannot fail")
    }

    pub fn comm(&self) -> &Arc<dyn Comm> {
        &self.comm
    }

    pub fn global_len(&self) -> usize {
        self.n_global
    }

    pub fn local_len(&self) -> usize {
        let r = self.comm.rank();
        self.offsets[r + 1] - self.offsets[r]
    }

    /// Owned range [start, end) of the calling rank.
    pub fn local_range(&self) -> (usize, usize) {
        let r = self.comm.rank();
        (self.offsets[r], self.offsets[r + 1])
    }

    /// Owned range of an arbitrary rank.
    pub fn range_of(&self, rank: usize) -> (usize, usize) {
        (self.offsets[rank], self.offsets[rank + 1])
    }

    /// Which rank owns global index `i`.
    pub fn owner_of(&self, i: usize) -> usize {
        debug_assert!(i < self.n_global);
        match self.offsets.binary_search(&i) {
            Ok(r) if r < self.comm.size() => r,
            Ok(r) => r - 1,
            Err(r) => r - 1,
        }
    }

    pub fn owns(&self, i: usize) -> bool {
        let (s, e) = self.local_range();
        i >= s && i < e
    }

    /// True when two layouts describe the same partitioning.
    pub fn compatible(&self, other: &Layout) -> bool {
        self.n_global == other.n_global && self.offsets == other.offsets
    }
}

impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("n_global", &self.n_global)
            .field("offsets", &self.offsets)
            .finish()
    }
}
