//! petrel: distributed sparse linear algebra with a PC/KSP solver interface
//!
//! Row-partitioned vectors and matrices with two-phase assembly, latency
//! hiding split reductions, incomplete-factorization and block-Jacobi
//! preconditioners, and Krylov drivers (CG, GMRES, BiCGStab), usable on a
//! single process or over MPI.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod matrix;
pub mod preconditioner;
pub mod runtime;
pub mod solver;
pub mod utils;
pub mod vector;
pub mod viewer;

// Re-exports for convenience
pub use config::OptionsDb;
pub use context::{KspContext, KspKind, PcContext, PcRegistry, PcState};
pub use core::{HasComm, MatVec, VecOps};
pub use error::{Error, FactorFailure};
pub use matrix::{DistMatrix, MatOpts, MatStructure, OrderingType, SeqCsr};
pub use preconditioner::Preconditioner;
pub use runtime::Runtime;
pub use solver::LinearSolver;
pub use utils::convergence::{Convergence, ConvergenceTest, ConvergedReason, SolveStats};
pub use vector::{DistVector, InsertMode, Layout, NormType, SplitReduction};
