//! ILU(0) preconditioner: incomplete LU restricted to the pattern of A.

use crate::error::{Error, FactorFailure};
use crate::matrix::dist::DistMatrix;
use crate::matrix::factor::{self, LuFactor};
use crate::preconditioner::Preconditioner;
use crate::vector::dist::DistVector;

#[derive(Default)]
pub struct Ilu0 {
    factor: Option<LuFactor>,
    failure: Option<FactorFailure>,
}

impl Ilu0 {
    pub fn new() -> Self {
        Ilu0::default()
    }

    fn usable(&self) -> Result<&LuFactor, Error> {
        if let Some(failure) = &self.failure {
            return Err(Error::FactorError(failure.clone()));
        }
        self.factor
            .as_ref()
            .ok_or(Error::InvalidState("ilu applied before setup"))
    }
}

impl Preconditioner<DistMatrix, DistVector> for Ilu0 {
    fn setup(&mut self, a: &DistMatrix) -> Result<(), Error> {
        if a.row_layout().comm().size() > 1 {
            return Err(Error::Unsupported(
                "ilu is a single-process preconditioner; use block-jacobi with ilu sub-blocks",
            ));
        }
        match factor::ilu0_numeric(a.local_diag_block()?) {
            Ok(f) => {
                self.factor = Some(f);
                self.failure = None;
            }
            Err(failure) => {
                tracing::warn!(?failure, "ilu factorization failed");
                self.factor = None;
                self.failure = Some(failure);
            }
        }
        Ok(())
    }

    fn apply(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.usable()?.solve(r.array()?, z.array_mut()?);
        Ok(())
    }

    fn failed(&self) -> Option<&FactorFailure> {
        self.failure.as_ref()
    }

    fn reset(&mut self) {
        self.factor = None;
        self.failure = None;
    }
}
