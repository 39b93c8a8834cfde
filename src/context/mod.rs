//! Solver and preconditioner contexts: configuration, lifecycle, and
//! options-driven construction.

pub mod ksp_context;
pub mod pc_context;

pub use ksp_context::{KspContext, KspKind};
pub use pc_context::{PcContext, PcRegistry, PcState};
