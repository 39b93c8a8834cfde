pub mod traits;

pub use traits::{HasComm, MatVec, VecOps};
