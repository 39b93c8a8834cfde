pub mod coloring;
pub mod convergence;

pub use convergence::{Convergence, ConvergenceTest, ConvergedReason, SolveStats};
