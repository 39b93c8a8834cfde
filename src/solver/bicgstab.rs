//! BiCGStab (Saad §7.4.2) with right preconditioning. The two inner
//! products of the stabilization step are fused into a single reduction
//! through [`VecOps::dot_norm2_all`], halving the synchronization count of
//! the second half-iteration.

use crate::core::traits::{MatVec, VecOps};
use crate::error::Error;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc};
use crate::utils::convergence::{Convergence, ConvergedReason, SolveStats};

pub struct BiCgStabSolver {
    pub conv: Convergence,
}

impl BiCgStabSolver {
    pub fn new(conv: Convergence) -> Self {
        BiCgStabSolver { conv }
    }
}

impl Default for BiCgStabSolver {
    fn default() -> Self {
        BiCgStabSolver::new(Convergence::default())
    }
}

impl<M, V> LinearSolver<M, V> for BiCgStabSolver
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
        let mut r = b.clone();
        let mut t = x.zeros_like();
        a.matvec(x, &mut t)?;
        r.axpy_in_place(-1.0, &t)?;
        let r_hat = r.clone();

        let r0 = r.norm2_all();
        let mut rnorm = r0;
        let mut history = vec![r0];
        tracing::debug!(r0, "bicgstab start");
        if let Some(reason) = self.conv.check(0, rnorm, r0) {
            return Ok(stats(0, rnorm, reason, history));
        }

        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut p = x.zeros_like();
        let mut v = x.zeros_like();
        let mut p_hat = x.zeros_like();
        let mut s_hat = x.zeros_like();

        let mut iter = 0;
        let reason = loop {
            iter += 1;
            let rho_next = r_hat.dot_all(&r)?;
            if rho_next == 0.0 {
                break ConvergedReason::DivergedBreakdown;
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;
            // p = r + beta (p - omega v)
            p.axpy_in_place(-omega, &v)?;
            p.aypx_in_place(beta, &r)?;

            apply_pc(pc, &p, &mut p_hat)?;
            a.matvec(&p_hat, &mut v)?;
            let rhv = r_hat.dot_all(&v)?;
            if rhv == 0.0 {
                break ConvergedReason::DivergedBreakdown;
            }
            alpha = rho / rhv;
            // s = r - alpha v, reusing r's storage.
            r.axpy_in_place(-alpha, &v)?;

            rnorm = r.norm2_all();
            if let Some(reason) = self.conv.check(iter, rnorm, r0) {
                // Half step was already enough.
                x.axpy_in_place(alpha, &p_hat)?;
                history.push(rnorm);
                break reason;
            }

            apply_pc(pc, &r, &mut s_hat)?;
            a.matvec(&s_hat, &mut t)?;
            let (ts, tt) = r.dot_norm2_all(&t)?;
            if tt == 0.0 {
                x.axpy_in_place(alpha, &p_hat)?;
                history.push(rnorm);
                break ConvergedReason::DivergedBreakdown;
            }
            omega = ts / tt;

            x.axpy_in_place(alpha, &p_hat)?;
            x.axpy_in_place(omega, &s_hat)?;
            // r = s - omega t
            r.axpy_in_place(-omega, &t)?;

            rnorm = r.norm2_all();
            history.push(rnorm);
            if let Some(reason) = self.conv.check(iter, rnorm, r0) {
                break reason;
            }
            if omega == 0.0 {
                break ConvergedReason::DivergedBreakdown;
            }
        };
        tracing::debug!(iterations = iter, final_residual = rnorm, ?reason, "bicgstab done");
        Ok(stats(iter, rnorm, reason, history))
    }
}

fn stats(
    iterations: usize,
    final_residual: f64,
    reason: ConvergedReason,
    residual_history: Vec<f64>,
) -> SolveStats {
    SolveStats {
        iterations,
        final_residual,
        reason,
        residual_history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::seq_csr::SeqCsr;

    fn nonsymmetric(n: usize) -> SeqCsr {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 4.0));
            if i > 0 {
                t.push((i, i - 1, -1.5));
            }
            if i + 1 < n {
                t.push((i, i + 1, -0.5));
            }
        }
        SeqCsr::from_triplets(n, n, &t).unwrap()
    }

    #[test]
    fn converges_on_nonsymmetric_system() {
        let n = 50;
        let a = nonsymmetric(n);
        let b: Vec<f64> = (0..n).map(|i| 1.0 + (i % 3) as f64).collect();
        let mut x = vec![0.0; n];
        let mut solver = BiCgStabSolver::new(Convergence {
            rtol: 1e-10,
            ..Convergence::default()
        });
        let stats = solver.solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.reason.is_converged(), "{:?}", stats.reason);
        let mut ax = vec![0.0; n];
        a.spmv(&x, &mut ax);
        for (ai, bi) in ax.iter().zip(&b) {
            assert!((ai - bi).abs() < 1e-7);
        }
    }

    #[test]
    fn zero_rhs_converges_immediately() {
        let a = nonsymmetric(8);
        let b = vec![0.0; 8];
        let mut x = vec![0.0; 8];
        let mut solver = BiCgStabSolver::default();
        let stats = solver.solve(&a, None, &b, &mut x).unwrap();
        assert_eq!(stats.iterations, 0);
        assert!(stats.reason.is_converged());
    }
}
