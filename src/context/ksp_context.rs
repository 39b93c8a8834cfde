//! Krylov solver context: method selection, tolerances, preconditioner
//! lifecycle, and the collective pre-solve health check.

use crate::config::OptionsDb;
use crate::context::pc_context::{PcContext, PcRegistry, PcState};
use crate::core::traits::{HasComm, MatVec, VecOps};
use crate::error::Error;
use crate::matrix::dist::{DistMatrix, MatStructure};
use crate::solver::{BiCgStabSolver, CgSolver, GmresSolver, LinearSolver, PreonlySolver};
use crate::utils::convergence::{Convergence, ConvergedReason, SolveStats};
use crate::vector::dist::DistVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KspKind {
    Cg,
    Gmres,
    Bicgstab,
    Preonly,
}

impl KspKind {
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "cg" => Ok(KspKind::Cg),
            "gmres" => Ok(KspKind::Gmres),
            "bcgs" | "bicgstab" => Ok(KspKind::Bicgstab),
            "preonly" => Ok(KspKind::Preonly),
            other => Err(Error::NotFound(format!("krylov method '{other}'"))),
        }
    }
}

type Monitor = Box<dyn FnMut(usize, f64) + Send>;

pub struct KspContext<M, V> {
    pub kind: KspKind,
    pub conv: Convergence,
    /// Restart length, GMRES only.
    pub restart: usize,
    pc: PcContext<M, V>,
    monitor: Option<Monitor>,
}

impl<M, V> KspContext<M, V> {
    pub fn new(kind: KspKind) -> Self {
        KspContext {
            kind,
            conv: Convergence::default(),
            restart: 30,
            pc: PcContext::new(),
            monitor: None,
        }
    }

    pub fn pc(&self) -> &PcContext<M, V> {
        &self.pc
    }

    pub fn pc_mut(&mut self) -> &mut PcContext<M, V> {
        &mut self.pc
    }

    /// Called with (iteration, residual norm) for every recorded residual.
    pub fn set_monitor<F>(&mut self, f: F)
    where
        F: FnMut(usize, f64) + Send + 'static,
    {
        self.monitor = Some(Box::new(f));
    }
}

impl<M, V> KspContext<M, V>
where
    M: MatVec<V> + HasComm,
    V: VecOps,
{
    /// Prepare the preconditioner for this operator. Optional; `solve` sets
    /// up lazily when needed.
    pub fn setup(&mut self, a: &M) -> Result<(), Error> {
        if self.pc.state() != PcState::Unconfigured {
            self.pc.setup(a)?;
        }
        Ok(())
    }

    /// Tell the context the operator changed so the preconditioner can be
    /// refreshed at the appropriate depth.
    pub fn operator_changed(&mut self, a: &M, structure: MatStructure) -> Result<(), Error> {
        if self.pc.state() != PcState::Unconfigured {
            self.pc.refresh(a, structure)?;
        }
        Ok(())
    }

    /// Solve A x = b from the initial guess in `x`.
    ///
    /// Before iterating, the ranks agree collectively on preconditioner
    /// health: if setup failed anywhere, every rank returns
    /// `DivergedPcFailed` instead of some ranks iterating alone.
    pub fn solve(&mut self, a: &M, b: &V, x: &mut V) -> Result<SolveStats, Error> {
        if self.pc.state() == PcState::Configured {
            self.pc.setup(a)?;
        }
        let failed_here = self.pc.failed().is_some();
        let failed_anywhere = match a.comm_of() {
            Some(comm) => comm.all_reduce_or(failed_here),
            None => failed_here,
        };
        if failed_anywhere {
            tracing::warn!("aborting solve: preconditioner setup failed on some rank");
            return Ok(SolveStats {
                iterations: 0,
                final_residual: f64::NAN,
                reason: ConvergedReason::DivergedPcFailed,
                residual_history: Vec::new(),
            });
        }

        let pc = match self.pc.state() {
            PcState::SetUp => self.pc.inner(),
            _ => None,
        };
        let stats = match self.kind {
            KspKind::Cg => CgSolver::new(self.conv.clone()).solve(a, pc, b, x)?,
            KspKind::Gmres => {
                GmresSolver::new(self.conv.clone(), self.restart).solve(a, pc, b, x)?
            }
            KspKind::Bicgstab => BiCgStabSolver::new(self.conv.clone()).solve(a, pc, b, x)?,
            KspKind::Preonly => PreonlySolver::new().solve(a, pc, b, x)?,
        };
        if let Some(monitor) = &mut self.monitor {
            for (i, &rnorm) in stats.residual_history.iter().enumerate() {
                monitor(i, rnorm);
            }
        }
        Ok(stats)
    }
}

impl KspContext<DistMatrix, DistVector> {
    /// Configure method, tolerances, and preconditioner from the options
    /// database (`-ksp_type`, `-ksp_rtol`, `-pc_type`, ...).
    pub fn set_from_options(
        &mut self,
        db: &OptionsDb,
        registry: &PcRegistry<DistMatrix, DistVector>,
    ) -> Result<(), Error> {
        if let Some(name) = db.get_string("ksp_type") {
            self.kind = KspKind::from_name(name)?;
        }
        if let Some(rtol) = db.get_f64("ksp_rtol")? {
            self.conv.rtol = rtol;
        }
        if let Some(atol) = db.get_f64("ksp_atol")? {
            self.conv.atol = atol;
        }
        if let Some(dtol) = db.get_f64("ksp_divtol")? {
            self.conv.dtol = dtol;
        }
        if let Some(max_it) = db.get_usize("ksp_max_it")? {
            self.conv.max_iters = max_it;
        }
        if let Some(restart) = db.get_usize("ksp_gmres_restart")? {
            self.restart = restart;
        }
        if let Some(name) = db.get_string("pc_type") {
            self.pc.configure(name, registry, db)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laplace_1d(n: usize) -> DistMatrix {
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
        DistMatrix::serial_from_triplets(n, n, &t).unwrap()
    }

    #[test]
    fn options_select_method_and_tolerances() {
        let db = OptionsDb::from_args([
            "-ksp_type",
            "gmres",
            "-ksp_rtol",
            "1e-9",
            "-ksp_gmres_restart",
            "15",
            "-pc_type",
            "jacobi",
        ]);
        let reg = PcRegistry::with_builtins();
        let mut ksp = KspContext::new(KspKind::Cg);
        ksp.set_from_options(&db, &reg).unwrap();
        assert_eq!(ksp.kind, KspKind::Gmres);
        assert_eq!(ksp.conv.rtol, 1e-9);
        assert_eq!(ksp.restart, 15);
        assert_eq!(ksp.pc().type_name(), Some("jacobi"));
    }

    #[test]
    fn unknown_method_is_not_found() {
        assert!(matches!(
            KspKind::from_name("minres"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn preconditioned_cg_solve() {
        let n = 16;
        let a = laplace_1d(n);
        let db = OptionsDb::from_args(["-pc_type", "icc", "-ksp_rtol", "1e-10"]);
        let reg = PcRegistry::with_builtins();
        let mut ksp = KspContext::new(KspKind::Cg);
        ksp.set_from_options(&db, &reg).unwrap();

        let b = DistVector::from_fn(a.row_layout().clone(), |_| 1.0);
        let mut x = DistVector::new(a.row_layout().clone());
        let stats = ksp.solve(&a, &b, &mut x).unwrap();
        assert!(stats.reason.is_converged(), "{:?}", stats.reason);

        let mut ax = DistVector::new(a.row_layout().clone());
        a.mult(&x, &mut ax).unwrap();
        for (ai, bi) in ax.array().unwrap().iter().zip(b.array().unwrap()) {
            assert!((ai - bi).abs() < 1e-8);
        }
    }

    #[test]
    fn failed_pc_aborts_collectively() {
        // Indefinite operator, icc without the shift rescue.
        let a = DistMatrix::serial_from_triplets(
            2,
            2,
            &[(0, 0, 1.0), (0, 1, 3.0), (1, 0, 3.0), (1, 1, 1.0)],
        )
        .unwrap();
        let db = OptionsDb::from_args([
            "-pc_type",
            "icc",
            "-pc_factor_shift_positive_definite",
            "false",
        ]);
        let reg = PcRegistry::with_builtins();
        let mut ksp = KspContext::new(KspKind::Cg);
        ksp.set_from_options(&db, &reg).unwrap();

        let b = DistVector::from_fn(a.row_layout().clone(), |_| 1.0);
        let mut x = DistVector::new(a.row_layout().clone());
        let stats = ksp.solve(&a, &b, &mut x).unwrap();
        assert_eq!(stats.reason, ConvergedReason::DivergedPcFailed);
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn monitor_sees_every_residual() {
        use std::sync::{Arc, Mutex};
        let n = 12;
        let a = laplace_1d(n);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut ksp = KspContext::new(KspKind::Cg);
        ksp.set_monitor(move |i, r| sink.lock().unwrap().push((i, r)));
        let b = DistVector::from_fn(a.row_layout().clone(), |_| 1.0);
        let mut x = DistVector::new(a.row_layout().clone());
        let stats = ksp.solve(&a, &b, &mut x).unwrap();
        assert_eq!(seen.lock().unwrap().len(), stats.residual_history.len());
    }
}
