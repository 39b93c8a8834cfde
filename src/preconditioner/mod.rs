//! Preconditioners for the Krylov solvers.
//!
//! A preconditioner M approximates A so that M^-1 A is better conditioned.
//! Setup may fail numerically (e.g. a nonpositive pivot during an incomplete
//! factorization); such failures are recorded on the preconditioner rather
//! than raised, so that every rank reaches the same collective decision point
//! before the solve aborts.

use crate::error::{Error, FactorFailure};

/// A preconditioner M with action z = M^-1 r. `Send` so block-parallel
/// composites can farm sub-applications out to worker threads.
pub trait Preconditioner<M, V>: Send {
    /// Build (or rebuild) internal state from `a`. Numeric trouble during
    /// factorization is recorded and later visible through `failed`.
    fn setup(&mut self, a: &M) -> Result<(), Error>;

    /// z = M^-1 r.
    fn apply(&self, r: &V, z: &mut V) -> Result<(), Error>;

    /// Refresh values for an operator with the same sparsity pattern,
    /// reusing symbolic state. Falls back to a full setup.
    fn refresh_numeric(&mut self, a: &M) -> Result<(), Error> {
        self.setup(a)
    }

    /// Half application z = L^-1 r for symmetric preconditioners M = L L^T.
    fn apply_symmetric_left(&self, _r: &V, _z: &mut V) -> Result<(), Error> {
        Err(Error::Unsupported("symmetric half-application"))
    }

    /// Half application z = L^-T r for symmetric preconditioners M = L L^T.
    fn apply_symmetric_right(&self, _r: &V, _z: &mut V) -> Result<(), Error> {
        Err(Error::Unsupported("symmetric half-application"))
    }

    /// The recorded setup failure, if the last setup did not produce a
    /// usable preconditioner.
    fn failed(&self) -> Option<&FactorFailure> {
        None
    }

    /// Release everything built by `setup` (factors, patterns, sub-solvers)
    /// while keeping the configuration. Applying before the next setup is an
    /// error.
    fn reset(&mut self) {}
}

pub mod block_jacobi;
pub mod icc;
pub mod ilu;
pub mod jacobi;
pub mod lu;
pub mod shell;

pub use block_jacobi::BlockJacobi;
pub use icc::Icc;
pub use ilu::Ilu0;
pub use jacobi::Jacobi;
pub use lu::DenseLu;
pub use shell::Shell;

/// The identity: z = r. Placeholder for unpreconditioned solves.
#[derive(Debug, Default)]
pub struct Identity;

impl<M, V: crate::core::traits::VecOps> Preconditioner<M, V> for Identity {
    fn setup(&mut self, _a: &M) -> Result<(), Error> {
        Ok(())
    }

    fn apply(&self, r: &V, z: &mut V) -> Result<(), Error> {
        z.copy_values_from(r)
    }

    fn apply_symmetric_left(&self, r: &V, z: &mut V) -> Result<(), Error> {
        z.copy_values_from(r)
    }

    fn apply_symmetric_right(&self, r: &V, z: &mut V) -> Result<(), Error> {
        z.copy_values_from(r)
    }
}
