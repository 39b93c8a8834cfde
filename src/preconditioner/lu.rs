//! Exact dense LU as a preconditioner. Densifies the operator, so only
//! sensible for small systems and for the sub-blocks of block-Jacobi, where
//! it makes the block solve exact.

use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, MatMut};

use crate::error::Error;
use crate::matrix::dist::DistMatrix;
use crate::matrix::seq_csr::SeqCsr;
use crate::preconditioner::Preconditioner;
use crate::vector::dist::DistVector;

#[derive(Default)]
pub struct DenseLu {
    factor: Option<FullPivLu<f64>>,
}

impl DenseLu {
    pub fn new() -> Self {
        DenseLu::default()
    }

    fn factor_csr(&mut self, a: &SeqCsr) -> Result<(), Error> {
        if a.nrows() != a.ncols() {
            return Err(Error::SizeMismatch {
                context: "dense lu requires a square matrix",
                left: a.nrows(),
                right: a.ncols(),
            });
        }
        self.factor = Some(FullPivLu::new(a.to_dense().as_ref()));
        Ok(())
    }

    fn solve_slice(&self, r: &[f64], z: &mut [f64]) -> Result<(), Error> {
        let factor = self
            .factor
            .as_ref()
            .ok_or(Error::InvalidState("dense lu applied before setup"))?;
        Error::check_lengths("dense lu apply", r.len(), z.len())?;
        z.copy_from_slice(r);
        let n = z.len();
        let z_mat = MatMut::from_column_major_slice_mut(z, n, 1);
        factor.solve_in_place_with_conj(Conj::No, z_mat);
        Ok(())
    }
}

impl Preconditioner<SeqCsr, Vec<f64>> for DenseLu {
    fn setup(&mut self, a: &SeqCsr) -> Result<(), Error> {
        self.factor_csr(a)
    }

    fn apply(&self, r: &Vec<f64>, z: &mut Vec<f64>) -> Result<(), Error> {
        self.solve_slice(r, z)
    }

    fn reset(&mut self) {
        self.factor = None;
    }
}

impl Preconditioner<DistMatrix, DistVector> for DenseLu {
    fn setup(&mut self, a: &DistMatrix) -> Result<(), Error> {
        if a.row_layout().comm().size() > 1 {
            return Err(Error::Unsupported("dense lu is a single-process preconditioner"));
        }
        self.factor_csr(a.local_diag_block()?)
    }

    fn apply(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.solve_slice(r.array()?, z.array_mut()?)
    }

    fn reset(&mut self) {
        self.factor = None;
    }
}
