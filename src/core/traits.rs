//! Core linear-algebra traits.

use std::sync::Arc;

use crate::error::Error;
use crate::parallel::Comm;

/// Matrix–vector product: y ← A x.
pub trait MatVec<V> {
    /// Compute y = A · x. Fails if the operands are mis-sized or the
    /// operator is not in an applicable state (e.g. unassembled).
    fn matvec(&self, x: &V, y: &mut V) -> Result<(), Error>;
}

/// Access to the communicator an operator lives on. `None` means the
/// operator is purely local and collective decisions degenerate to local
/// ones.
pub trait HasComm {
    fn comm_of(&self) -> Option<&Arc<dyn Comm>> {
        None
    }
}

/// The vector operations a Krylov driver needs, implemented both by the
/// distributed vector (collective reductions) and by plain `Vec<f64>`
/// (block-local sub-solves inside block-Jacobi).
pub trait VecOps: Clone {
    /// Global length.
    fn global_len(&self) -> usize;
    /// A zero vector with the same layout as `self`.
    fn zeros_like(&self) -> Self;
    /// self ← other.
    fn copy_values_from(&mut self, other: &Self) -> Result<(), Error>;
    /// self ← v in every entry.
    fn fill(&mut self, v: f64);
    /// self ← a·self.
    fn scale_in_place(&mut self, a: f64);
    /// self ← self + a·x.
    fn axpy_in_place(&mut self, a: f64, x: &Self) -> Result<(), Error>;
    /// self ← x + a·self.
    fn aypx_in_place(&mut self, a: f64, x: &Self) -> Result<(), Error>;
    /// Global dot(self, other). Collective for distributed vectors.
    fn dot_all(&self, other: &Self) -> Result<f64, Error>;
    /// Global 2-norm. Collective for distributed vectors.
    fn norm2_all(&self) -> f64;
    /// Fused (dot(self, t), ‖t‖₂²) in a single combined reduction.
    ///
    /// One round of communication instead of two; this is the latency win
    /// the split-reduction engine exists for, surfaced as a vector op so
    /// solvers can use it without touching the engine directly.
    fn dot_norm2_all(&self, t: &Self) -> Result<(f64, f64), Error>;
}

impl VecOps for Vec<f64> {
    fn global_len(&self) -> usize {
        self.len()
    }
    fn zeros_like(&self) -> Self {
        vec![0.0; self.len()]
    }
    fn copy_values_from(&mut self, other: &Self) -> Result<(), Error> {
        Error::check_lengths("Vec copy", self.len(), other.len())?;
        self.copy_from_slice(other);
        Ok(())
    }
    fn fill(&mut self, v: f64) {
        for e in self.iter_mut() {
            *e = v;
        }
    }
    fn scale_in_place(&mut self, a: f64) {
        for e in self.iter_mut() {
            *e *= a;
        }
    }
    fn axpy_in_place(&mut self, a: f64, x: &Self) -> Result<(), Error> {
        Error::check_lengths("Vec axpy", self.len(), x.len())?;
        for (yi, xi) in self.iter_mut().zip(x) {
            *yi += a * xi;
        }
        Ok(())
    }
    fn aypx_in_place(&mut self, a: f64, x: &Self) -> Result<(), Error> {
        Error::check_lengths("Vec aypx", self.len(), x.len())?;
        for (yi, xi) in self.iter_mut().zip(x) {
            *yi = xi + a * *yi;
        }
        Ok(())
    }
    fn dot_all(&self, other: &Self) -> Result<f64, Error> {
        Error::check_lengths("Vec dot", self.len(), other.len())?;
        Ok(self.iter().zip(other).map(|(a, b)| a * b).sum())
    }
    fn norm2_all(&self) -> f64 {
        self.iter().map(|a| a * a).sum::<f64>().sqrt()
    }
    fn dot_norm2_all(&self, t: &Self) -> Result<(f64, f64), Error> {
        Error::check_lengths("Vec dot_norm2", self.len(), t.len())?;
        let mut dp = 0.0;
        let mut nm = 0.0;
        for (si, ti) in self.iter().zip(t) {
            dp += si * ti;
            nm += ti * ti;
        }
        Ok((dp, nm))
    }
}
