//! Convergence criteria and solve reporting shared by all Krylov drivers.

use std::fmt;
use std::sync::Arc;

/// A replacement convergence test: `(iter, rnorm, r0)` to a stop verdict.
pub type ConvergenceTest = dyn Fn(usize, f64, f64) -> Option<ConvergedReason> + Send + Sync;

/// Stopping tolerances for an iterative solve.
#[derive(Clone)]
pub struct Convergence {
    /// Relative decrease of the preconditioned residual norm.
    pub rtol: f64,
    /// Absolute residual norm floor.
    pub atol: f64,
    /// Divergence threshold: growth of the residual by this factor aborts.
    pub dtol: f64,
    pub max_iters: usize,
    /// Replacement for the default test, see [`Convergence::set_test`].
    pub custom: Option<Arc<ConvergenceTest>>,
}

impl Default for Convergence {
    fn default() -> Self {
        Convergence {
            rtol: 1e-5,
            atol: 1e-50,
            dtol: 1e5,
            max_iters: 10_000,
            custom: None,
        }
    }
}

impl fmt::Debug for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Convergence")
            .field("rtol", &self.rtol)
            .field("atol", &self.atol)
            .field("dtol", &self.dtol)
            .field("max_iters", &self.max_iters)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Why an iterative solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergedReason {
    ConvergedRtol,
    ConvergedAtol,
    /// Single application of the preconditioner, no iteration (preonly).
    ConvergedIts,
    DivergedDtol,
    DivergedMaxIts,
    /// A recurrence coefficient collapsed (e.g. rho or omega in BiCGStab).
    DivergedBreakdown,
    /// CG detected a direction of nonpositive curvature.
    DivergedIndefiniteMat,
    /// The preconditioner produced a nonpositive inner product in CG.
    DivergedIndefinitePc,
    /// Preconditioner setup failed (consult the preconditioner's record).
    DivergedPcFailed,
}

impl ConvergedReason {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            ConvergedReason::ConvergedRtol
                | ConvergedReason::ConvergedAtol
                | ConvergedReason::ConvergedIts
        )
    }
}

/// Outcome of a linear solve.
#[derive(Debug, Clone)]
pub struct SolveStats {
    pub iterations: usize,
    pub final_residual: f64,
    pub reason: ConvergedReason,
    /// Residual norm per iteration, index 0 is the initial residual.
    pub residual_history: Vec<f64>,
}

impl Convergence {
    /// Replace the default rtol/atol/dtol test with a caller-supplied one.
    /// The closure sees the iteration count, the current residual norm, and
    /// the reference norm fixed at iteration zero; returning `Some` stops
    /// the solve with that reason.
    pub fn set_test(
        &mut self,
        test: impl Fn(usize, f64, f64) -> Option<ConvergedReason> + Send + Sync + 'static,
    ) {
        self.custom = Some(Arc::new(test));
    }

    /// Test a residual norm against the criteria. `r0` is the reference
    /// norm fixed at iteration zero.
    pub fn check(&self, iter: usize, rnorm: f64, r0: f64) -> Option<ConvergedReason> {
        if let Some(test) = &self.custom {
            return test(iter, rnorm, r0);
        }
        if rnorm <= self.atol {
            return Some(ConvergedReason::ConvergedAtol);
        }
        if rnorm <= self.rtol * r0 {
            return Some(ConvergedReason::ConvergedRtol);
        }
        if rnorm > self.dtol * r0 || !rnorm.is_finite() {
            return Some(ConvergedReason::DivergedDtol);
        }
        if iter >= self.max_iters {
            return Some(ConvergedReason::DivergedMaxIts);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_absolute_tests() {
        let c = Convergence {
            rtol: 1e-6,
            atol: 1e-12,
            dtol: 1e5,
            max_iters: 100,
            ..Convergence::default()
        };
        assert_eq!(c.check(3, 0.5, 1.0), None);
        assert_eq!(c.check(3, 5e-7, 1.0), Some(ConvergedReason::ConvergedRtol));
        assert_eq!(c.check(3, 5e-13, 1.0), Some(ConvergedReason::ConvergedAtol));
        assert_eq!(c.check(3, 2e5, 1.0), Some(ConvergedReason::DivergedDtol));
        assert_eq!(c.check(100, 0.5, 1.0), Some(ConvergedReason::DivergedMaxIts));
    }

    #[test]
    fn nan_residual_diverges() {
        let c = Convergence::default();
        assert_eq!(c.check(1, f64::NAN, 1.0), Some(ConvergedReason::DivergedDtol));
    }

    #[test]
    fn custom_test_replaces_the_default() {
        let mut c = Convergence::default();
        c.set_test(|iter, _rnorm, _r0| {
            (iter >= 2).then_some(ConvergedReason::ConvergedIts)
        });
        // Values the default test would stop on are ignored.
        assert_eq!(c.check(0, 1e-60, 1.0), None);
        assert_eq!(c.check(2, 1.0, 1.0), Some(ConvergedReason::ConvergedIts));
    }
}
