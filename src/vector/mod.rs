//! Distributed vectors: ownership layouts, the partitioned vector itself,
//! and the split-reduction engine.

pub mod dist;
pub mod layout;
pub mod reduction;

pub use dist::{DistVector, InsertMode, NormType, VecAssembly};
pub use layout::{split_ownership, Layout};
pub use reduction::{Pending, SplitReduction};
