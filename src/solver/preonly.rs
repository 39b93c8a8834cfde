//! Single preconditioner application, no Krylov iteration. Pairs with an
//! exact preconditioner (dense LU, or block-Jacobi on a block-diagonal
//! operator) to make a direct solve fit the iterative interface.

use crate::core::traits::{MatVec, VecOps};
use crate::error::Error;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc};
use crate::utils::convergence::{ConvergedReason, SolveStats};

#[derive(Debug, Default)]
pub struct PreonlySolver;

impl PreonlySolver {
    pub fn new() -> Self {
        PreonlySolver
    }
}

impl<M, V> LinearSolver<M, V> for PreonlySolver
where
    M: MatVec<V>,
    V: VecOps,
{
    fn solve(
        &mut self,
        a: &M,
        pc: Option<&dyn Preconditioner<M, V>>,
        b: &V,
        x: &mut V,
    ) -> Result<SolveStats, Error> {
        apply_pc(pc, b, x)?;
        // True residual, for reporting only.
        let mut r = b.clone();
        let mut ax = x.zeros_like();
        a.matvec(x, &mut ax)?;
        r.axpy_in_place(-1.0, &ax)?;
        let rnorm = r.norm2_all();
        Ok(SolveStats {
            iterations: 1,
            final_residual: rnorm,
            reason: ConvergedReason::ConvergedIts,
            residual_history: vec![rnorm],
        })
    }
}
