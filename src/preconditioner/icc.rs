//! Incomplete Cholesky preconditioner ICC(k) with level-of-fill control,
//! optional fill-reducing ordering, and a diagonal-shift retry loop for
//! matrices that are not quite positive definite on the retained pattern.

use crate::error::{Error, FactorFailure};
use crate::matrix::dist::DistMatrix;
use crate::matrix::factor::{self, CholFactor, CholPattern};
use crate::matrix::ordering::OrderingType;
use crate::matrix::seq_csr::SeqCsr;
use crate::preconditioner::Preconditioner;
use crate::vector::dist::DistVector;

pub struct Icc {
    levels: usize,
    ordering: OrderingType,
    /// Augment the diagonal and retry when a pivot goes nonpositive.
    shift_on_failure: bool,
    shift_used: f64,
    perm: Vec<usize>,
    pattern: Option<CholPattern>,
    factor: Option<CholFactor>,
    failure: Option<FactorFailure>,
}

impl Icc {
    pub fn new(levels: usize) -> Self {
        Icc {
            levels,
            ordering: OrderingType::Natural,
            shift_on_failure: true,
            shift_used: 0.0,
            perm: Vec::new(),
            pattern: None,
            factor: None,
            failure: None,
        }
    }

    pub fn with_ordering(mut self, ordering: OrderingType) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_shift(mut self, enable: bool) -> Self {
        self.shift_on_failure = enable;
        self
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// The shift that made the last factorization succeed (0.0 if none was
    /// needed).
    pub fn shift_used(&self) -> f64 {
        self.shift_used
    }

    /// z = L^-1 r, the forward half of M^-1 = L^-T L^-1.
    pub fn forward(&self, r: &[f64], z: &mut [f64]) -> Result<(), Error> {
        self.usable()?.forward_solve(r, z);
        Ok(())
    }

    /// z = L^-T r, the backward half.
    pub fn backward(&self, r: &[f64], z: &mut [f64]) -> Result<(), Error> {
        self.usable()?.backward_solve(r, z);
        Ok(())
    }

    fn usable(&self) -> Result<&CholFactor, Error> {
        if let Some(failure) = &self.failure {
            return Err(Error::FactorError(failure.clone()));
        }
        self.factor
            .as_ref()
            .ok_or(Error::InvalidState("icc applied before setup"))
    }

    fn factor_with_retries(&mut self, a: &SeqCsr) {
        let Some(pattern) = self.pattern.take() else {
            return;
        };
        // Doubling the shift until it passes the largest absolute row sum
        // makes the shifted matrix strictly diagonally dominant, which
        // bounds the number of retries and guarantees a usable factor.
        let row_sum_bound = (0..a.nrows())
            .map(|i| {
                let (_, vals) = a.row(i);
                vals.iter().map(|v| v.abs()).sum::<f64>()
            })
            .fold(0.0f64, f64::max)
            .max(f64::EPSILON);
        let mut shift = 0.0;
        let mut outcome = factor::icc_numeric(a, &pattern, &self.perm, shift);
        let mut attempt = 0;
        while outcome.is_err() && self.shift_on_failure && shift <= row_sum_bound {
            shift = if shift == 0.0 {
                1e-3 * row_sum_bound
            } else {
                2.0 * shift
            };
            attempt += 1;
            outcome = factor::icc_numeric(a, &pattern, &self.perm, shift);
        }
        self.pattern = Some(pattern);
        match outcome {
            Ok(f) => {
                if shift > 0.0 {
                    tracing::debug!(shift, attempt, "icc succeeded after diagonal shift");
                }
                self.shift_used = shift;
                self.factor = Some(f);
                self.failure = None;
            }
            Err(failure) => {
                tracing::warn!(?failure, "icc factorization failed");
                self.factor = None;
                self.failure = Some(failure);
            }
        }
    }
}

impl Preconditioner<DistMatrix, DistVector> for Icc {
    fn setup(&mut self, a: &DistMatrix) -> Result<(), Error> {
        if a.row_layout().comm().size() > 1 {
            return Err(Error::Unsupported(
                "icc is a single-process preconditioner; use block-jacobi with icc sub-blocks",
            ));
        }
        let local = a.local_diag_block()?;
        self.perm = a.get_ordering(self.ordering)?;
        self.pattern = Some(factor::icc_symbolic(local, self.levels, &self.perm)?);
        self.factor_with_retries(local);
        Ok(())
    }

    fn refresh_numeric(&mut self, a: &DistMatrix) -> Result<(), Error> {
        if self.pattern.is_none() {
            return self.setup(a);
        }
        self.factor_with_retries(a.local_diag_block()?);
        Ok(())
    }

    fn apply(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.usable()?.solve(r.array()?, z.array_mut()?);
        Ok(())
    }

    fn apply_symmetric_left(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.forward(r.array()?, z.array_mut()?)
    }

    fn apply_symmetric_right(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.backward(r.array()?, z.array_mut()?)
    }

    fn failed(&self) -> Option<&FactorFailure> {
        self.failure.as_ref()
    }

    fn reset(&mut self) {
        self.perm = Vec::new();
        self.pattern = None;
        self.factor = None;
        self.failure = None;
        self.shift_used = 0.0;
    }
}
