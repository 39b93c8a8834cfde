//! Preconditioned Conjugate Gradient per Saad §9.2. Requires a symmetric
//! positive definite operator and (if given) a symmetric positive definite
//! preconditioner; violations surface as indefiniteness diagnoses.

use crate::core::traits::{MatVec, VecOps};
use crate::error::Error;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc};
use crate::utils::convergence::{Convergence, ConvergedReason, SolveStats};

pub struct CgSolver {
    pub conv: Convergence,
}

impl CgSolver {
    pub fn new(conv: Convergence) -> Self {
        CgSolver { conv }
    }
}

impl Default for CgSolver {
    fn default() -> Self {
        CgSolver::new(Convergence::default())
    }
}

impl<M, V> LinearSolver<M, V> for CgSolver
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
        // r = b - A x
        let mut r = b.clone();
        let mut w = x.zeros_like();
        a.matvec(x, &mut w)?;
        r.axpy_in_place(-1.0, &w)?;

        let mut z = x.zeros_like();
        apply_pc(pc, &r, &mut z)?;
        let mut p = z.clone();
        let mut rz = r.dot_all(&z)?;

        let r0 = r.norm2_all();
        let mut history = vec![r0];
        let mut rnorm = r0;
        tracing::debug!(r0, "cg start");

        if let Some(reason) = self.conv.check(0, rnorm, r0) {
            return Ok(SolveStats {
                iterations: 0,
                final_residual: rnorm,
                reason,
                residual_history: history,
            });
        }
        if pc.is_some() && rz <= 0.0 {
            return Ok(SolveStats {
                iterations: 0,
                final_residual: rnorm,
                reason: ConvergedReason::DivergedIndefinitePc,
                residual_history: history,
            });
        }

        let mut iter = 0;
        let reason = loop {
            iter += 1;
            a.matvec(&p, &mut w)?;
            let pw = p.dot_all(&w)?;
            if pw <= 0.0 {
                break ConvergedReason::DivergedIndefiniteMat;
            }
            let alpha = rz / pw;
            x.axpy_in_place(alpha, &p)?;
            r.axpy_in_place(-alpha, &w)?;

            rnorm = r.norm2_all();
            history.push(rnorm);
            if let Some(reason) = self.conv.check(iter, rnorm, r0) {
                break reason;
            }

            apply_pc(pc, &r, &mut z)?;
            let rz_next = r.dot_all(&z)?;
            if pc.is_some() && rz_next <= 0.0 {
                break ConvergedReason::DivergedIndefinitePc;
            }
            let beta = rz_next / rz;
            rz = rz_next;
            // p = z + beta p
            p.aypx_in_place(beta, &z)?;
        };
        tracing::debug!(iterations = iter, final_residual = rnorm, ?reason, "cg done");
        Ok(SolveStats {
            iterations: iter,
            final_residual: rnorm,
            reason,
            residual_history: history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::seq_csr::SeqCsr;

    fn laplace_1d(n: usize) -> SeqCsr {
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
        SeqCsr::from_triplets(n, n, &t).unwrap()
    }

    #[test]
    fn converges_on_spd_system() {
        let n = 32;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let mut cg = CgSolver::new(Convergence {
            rtol: 1e-10,
            ..Convergence::default()
        });
        let stats = cg.solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.reason.is_converged(), "{:?}", stats.reason);

        let mut ax = vec![0.0; n];
        a.spmv(&x, &mut ax);
        for (ai, bi) in ax.iter().zip(&b) {
            assert!((ai - bi).abs() < 1e-8);
        }
    }

    #[test]
    fn indefinite_operator_is_diagnosed() {
        let a = SeqCsr::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, -1.0)]).unwrap();
        let b = vec![1.0, 1.0];
        let mut x = vec![0.0; 2];
        let mut cg = CgSolver::default();
        let stats = cg.solve(&a, None, &b, &mut x).unwrap();
        assert_eq!(stats.reason, ConvergedReason::DivergedIndefiniteMat);
    }

    #[test]
    fn exact_cg_finishes_in_n_iterations() {
        let n = 10;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let mut cg = CgSolver::new(Convergence {
            rtol: 1e-12,
            max_iters: n + 1,
            ..Convergence::default()
        });
        let stats = cg.solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.reason.is_converged());
        assert!(stats.iterations <= n);
    }
}
