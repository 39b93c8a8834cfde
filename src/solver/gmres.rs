//! Restarted GMRES with left preconditioning, modified Gram-Schmidt
//! orthogonalization, and Givens-rotation updates of the Hessenberg least
//! squares problem (Saad §6.5). The tracked residual norm is that of the
//! preconditioned system.

use crate::core::traits::{MatVec, VecOps};
use crate::error::Error;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc};
use crate::utils::convergence::{Convergence, ConvergedReason, SolveStats};

const BREAKDOWN_TOL: f64 = 1e-30;

pub struct GmresSolver {
    pub conv: Convergence,
    pub restart: usize,
}

impl GmresSolver {
    pub fn new(conv: Convergence, restart: usize) -> Self {
        GmresSolver { conv, restart }
    }
}

impl Default for GmresSolver {
    fn default() -> Self {
        GmresSolver::new(Convergence::default(), 30)
    }
}

impl<M, V> LinearSolver<M, V> for GmresSolver
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
        let m = self.restart.max(1);
        let mut history = Vec::new();
        let mut iter = 0;
        let mut r0 = 0.0;
        let mut rnorm;

        let mut w = x.zeros_like();
        let mut z = x.zeros_like();

        loop {
            // Preconditioned residual z = M^-1 (b - A x).
            let mut r = b.clone();
            a.matvec(x, &mut w)?;
            r.axpy_in_place(-1.0, &w)?;
            apply_pc(pc, &r, &mut z)?;
            let beta = z.norm2_all();
            if iter == 0 {
                r0 = beta;
                history.push(beta);
                tracing::debug!(r0, restart = m, "gmres start");
            }
            rnorm = beta;
            if let Some(reason) = self.conv.check(iter, rnorm, r0) {
                return Ok(finish(iter, rnorm, reason, history));
            }
            if beta <= BREAKDOWN_TOL {
                return Ok(finish(iter, rnorm, ConvergedReason::ConvergedAtol, history));
            }

            let mut basis: Vec<V> = Vec::with_capacity(m + 1);
            let mut v0 = z.clone();
            v0.scale_in_place(1.0 / beta);
            basis.push(v0);

            // Column-major Hessenberg, plus the Givens coefficients that keep
            // it upper triangular.
            let mut h: Vec<Vec<f64>> = Vec::with_capacity(m);
            let mut cs: Vec<f64> = Vec::with_capacity(m);
            let mut sn: Vec<f64> = Vec::with_capacity(m);
            let mut g = vec![0.0; m + 1];
            g[0] = beta;

            let mut cols = 0;
            let mut stop = None;
            for j in 0..m {
                iter += 1;
                a.matvec(&basis[j], &mut w)?;
                apply_pc(pc, &w, &mut z)?;

                let mut col = vec![0.0; j + 2];
                for (i, vi) in basis.iter().enumerate() {
                    let hij = z.dot_all(vi)?;
                    col[i] = hij;
                    z.axpy_in_place(-hij, vi)?;
                }
                let hnext = z.norm2_all();
                col[j + 1] = hnext;

                // Previously accumulated rotations, then a fresh one to
                // annihilate the subdiagonal entry.
                for i in 0..j {
                    let t = cs[i] * col[i] + sn[i] * col[i + 1];
                    col[i + 1] = -sn[i] * col[i] + cs[i] * col[i + 1];
                    col[i] = t;
                }
                let denom = (col[j] * col[j] + col[j + 1] * col[j + 1]).sqrt();
                let (c, s) = if denom > 0.0 {
                    (col[j] / denom, col[j + 1] / denom)
                } else {
                    (1.0, 0.0)
                };
                cs.push(c);
                sn.push(s);
                col[j] = denom;
                col[j + 1] = 0.0;
                g[j + 1] = -s * g[j];
                g[j] *= c;
                h.push(col);
                cols = j + 1;

                rnorm = g[j + 1].abs();
                history.push(rnorm);
                if let Some(reason) = self.conv.check(iter, rnorm, r0) {
                    stop = Some(reason);
                    break;
                }
                if hnext <= BREAKDOWN_TOL {
                    // Lucky breakdown: the Krylov space is invariant.
                    stop = Some(ConvergedReason::ConvergedRtol);
                    break;
                }
                let mut vnext = z.clone();
                vnext.scale_in_place(1.0 / hnext);
                basis.push(vnext);
            }

            // Back substitution for y and the update x += V y.
            let mut y = vec![0.0; cols];
            for i in (0..cols).rev() {
                let mut gi = g[i];
                for (k, yk) in y.iter().enumerate().skip(i + 1) {
                    gi -= h[k][i] * yk;
                }
                y[i] = gi / h[i][i];
            }
            for (yi, vi) in y.iter().zip(&basis) {
                x.axpy_in_place(*yi, vi)?;
            }

            if let Some(reason) = stop {
                tracing::debug!(iterations = iter, final_residual = rnorm, ?reason, "gmres done");
                return Ok(finish(iter, rnorm, reason, history));
            }
            if iter >= self.conv.max_iters {
                return Ok(finish(iter, rnorm, ConvergedReason::DivergedMaxIts, history));
            }
        }
    }
}

fn finish(
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

    fn convection_diffusion(n: usize) -> SeqCsr {
        // Nonsymmetric tridiagonal: upwind convection on top of diffusion.
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 3.0));
            if i > 0 {
                t.push((i, i - 1, -2.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -0.5));
            }
        }
        SeqCsr::from_triplets(n, n, &t).unwrap()
    }

    #[test]
    fn converges_on_nonsymmetric_system() {
        let n = 40;
        let a = convection_diffusion(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let mut gmres = GmresSolver::new(
            Convergence {
                rtol: 1e-10,
                ..Convergence::default()
            },
            20,
        );
        let stats = gmres.solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.reason.is_converged(), "{:?}", stats.reason);
        let mut ax = vec![0.0; n];
        a.spmv(&x, &mut ax);
        for (ai, bi) in ax.iter().zip(&b) {
            assert!((ai - bi).abs() < 1e-7);
        }
    }

    #[test]
    fn restart_shorter_than_solve_still_converges() {
        let n = 25;
        let a = convection_diffusion(n);
        let b: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
        let mut x = vec![0.0; n];
        let mut gmres = GmresSolver::new(
            Convergence {
                rtol: 1e-8,
                max_iters: 500,
                ..Convergence::default()
            },
            5,
        );
        let stats = gmres.solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.reason.is_converged(), "{:?}", stats.reason);
    }

    #[test]
    fn residual_history_is_monotone_within_cycle() {
        let n = 30;
        let a = convection_diffusion(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let mut gmres = GmresSolver::new(Convergence::default(), 30);
        let stats = gmres.solve(&a, None, &b, &mut x).unwrap();
        for pair in stats.residual_history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }
}
