//! Krylov solver drivers.
//!
//! Every driver is generic over an operator implementing [`MatVec`] and a
//! vector implementing [`VecOps`], so the same code runs on the distributed
//! matrix (with collective reductions behind the vector ops) and on the
//! sequential blocks inside block-Jacobi.

use crate::error::Error;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::SolveStats;

/// Common interface for the iterative drivers. Solves A x = b starting from
/// the incoming content of `x`.
pub trait LinearSolver<M, V> {
    fn solve(
        &mut self,
        a: &M,
        pc: Option<&dyn Preconditioner<M, V>>,
        b: &V,
        x: &mut V,
    ) -> Result<SolveStats, Error>;
}

pub mod bicgstab;
pub mod cg;
pub mod gmres;
pub mod preonly;

pub use bicgstab::BiCgStabSolver;
pub use cg::CgSolver;
pub use gmres::GmresSolver;
pub use preonly::PreonlySolver;

pub(crate) fn apply_pc<M, V: crate::core::traits::VecOps>(
    pc: Option<&dyn Preconditioner<M, V>>,
    r: &V,
    z: &mut V,
) -> Result<(), Error> {
    match pc {
        Some(pc) => pc.apply(r, z),
        None => z.copy_values_from(r),
    }
}
