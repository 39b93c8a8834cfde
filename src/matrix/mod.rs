//! Sparse matrix storage, assembly, orderings, and incomplete factorizations.

pub mod dist;
pub mod factor;
pub mod ordering;
pub mod seq_csr;

pub use dist::{DistMatrix, MatAssembly, MatOpts, MatStructure};
pub use factor::{CholFactor, CholPattern, LuFactor};
pub use ordering::OrderingType;
pub use seq_csr::SeqCsr;
