//! MPI-backed communicator.
//!
//! Wraps the world communicator from the `mpi` crate and implements the
//! collectives the substrate needs: in-place sum/max reductions over slices
//! and variable-count all-to-all exchanges (used by vector/matrix assembly
//! and the matvec scatter pattern).

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

use super::Comm;

/// MPI communicator wrapper for distributed runs.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    /// Initializes MPI and wraps the world communicator.
    ///
    /// # Panics
    /// Panics if MPI initialization fails or was already performed.
    pub fn new() -> Self {
        let universe = mpi::initialize().expect("MPI initialization failed");
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        // The universe guard is leaked intentionally: MPI stays up until
        // process exit, matching the runtime's init-once contract.
        std::mem::forget(universe);
        MpiComm { world, rank, size }
    }

    /// Variable-count all-to-all over a flat send buffer.
    fn all_to_all_v<T: Equivalence + Clone + Default>(
        &self,
        sends: &[Vec<T>],
    ) -> Vec<Vec<T>> {
        assert_eq!(sends.len(), self.size);
        let send_counts: Vec<Count> = sends.iter().map(|s| s.len() as Count).collect();
        let mut recv_counts: Vec<Count> = vec![0; self.size];
        self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

        let send_displs: Vec<Count> = send_counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();
        let recv_displs: Vec<Count> = recv_counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();

        let send_flat: Vec<T> = sends.iter().flatten().cloned().collect();
        let total_recv: usize = recv_counts.iter().map(|&c| c as usize).sum();
        let mut recv_flat: Vec<T> = vec![T::default(); total_recv];
        {
            let send_part = Partition::new(&send_flat[..], &send_counts[..], &send_displs[..]);
            let mut recv_part =
                PartitionMut::new(&mut recv_flat[..], &recv_counts[..], &recv_displs[..]);
            self.world.all_to_all_varcount_into(&send_part, &mut recv_part);
        }

        let mut out = Vec::with_capacity(self.size);
        let mut at = 0usize;
        for &c in &recv_counts {
            let c = c as usize;
            out.push(recv_flat[at..at + c].to_vec());
            at += c;
        }
        out
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) {
        self.world.barrier();
    }

    fn all_reduce_sum(&self, buf: &mut [f64]) {
        let local = buf.to_vec();
        self.world
            .all_reduce_into(&local[..], buf, &SystemOperation::sum());
    }

    fn all_reduce_max(&self, buf: &mut [f64]) {
        let local = buf.to_vec();
        self.world
            .all_reduce_into(&local[..], buf, &SystemOperation::max());
    }

    fn exchange_indices(&self, sends: &[Vec<usize>]) -> Vec<Vec<usize>> {
        let sends64: Vec<Vec<u64>> = sends
            .iter()
            .map(|s| s.iter().map(|&i| i as u64).collect())
            .collect();
        self.all_to_all_v(&sends64)
            .into_iter()
            .map(|r| r.into_iter().map(|i| i as usize).collect())
            .collect()
    }

    fn exchange_scalars(&self, sends: &[Vec<f64>]) -> Vec<Vec<f64>> {
        self.all_to_all_v(sends)
    }
}
