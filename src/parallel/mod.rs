//! Process-level communication seam.
//!
//! One logical thread of control per process; parallelism is message passing
//! through this trait. `SerialComm` is always available; `MpiComm` is enabled
//! by the `mpi` feature. Every collective here must be called in identical
//! order on every rank of the communicator.

pub trait Comm: Send + Sync {
    /// Rank of this process within the communicator.
    fn rank(&self) -> usize;
    /// Number of processes in the communicator.
    fn size(&self) -> usize;
    /// Synchronize all ranks.
    fn barrier(&self);

    /// Element-wise global sum over `buf`, in place on every rank.
    ///
    /// Reducing a whole slice in one call is what lets the split-reduction
    /// engine batch several pending dot/norm requests into a single round of
    /// communication latency.
    fn all_reduce_sum(&self, buf: &mut [f64]);

    /// Element-wise global max over `buf`, in place on every rank.
    fn all_reduce_max(&self, buf: &mut [f64]);

    /// Logical OR across ranks. Used by solvers to agree on whether any rank
    /// recorded a local failure before deciding to abort a collective step.
    fn all_reduce_or(&self, flag: bool) -> bool {
        let mut buf = [if flag { 1.0 } else { 0.0 }];
        self.all_reduce_max(&mut buf);
        buf[0] > 0.5
    }

    /// All-to-all exchange of index lists. `sends[r]` is delivered to rank
    /// `r`; the result's entry `r` holds what rank `r` sent to this process.
    fn exchange_indices(&self, sends: &[Vec<usize>]) -> Vec<Vec<usize>>;

    /// All-to-all exchange of scalar lists, same framing as
    /// [`Comm::exchange_indices`].
    fn exchange_scalars(&self, sends: &[Vec<f64>]) -> Vec<Vec<f64>>;
}

/// Single-process communicator. Collectives degenerate to local copies.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn all_reduce_sum(&self, _buf: &mut [f64]) {}
    fn all_reduce_max(&self, _buf: &mut [f64]) {}
    fn exchange_indices(&self, sends: &[Vec<usize>]) -> Vec<Vec<usize>> {
        debug_assert_eq!(sends.len(), 1);
        sends.to_vec()
    }
    fn exchange_scalars(&self, sends: &[Vec<f64>]) -> Vec<Vec<f64>> {
        debug_assert_eq!(sends.len(), 1);
        sends.to_vec()
    }
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
