//! Point-Jacobi preconditioner: M^-1 = D^-1.

use crate::error::Error;
use crate::matrix::dist::DistMatrix;
use crate::preconditioner::Preconditioner;
use crate::vector::dist::DistVector;

/// Diagonal scaling. Fully parallel, no setup communication beyond the
/// diagonal extraction. Zero diagonal entries scale by zero, matching the
/// convention that a structurally missing diagonal contributes nothing.
#[derive(Debug, Default)]
pub struct Jacobi {
    inv_diag: Vec<f64>,
    inv_sqrt_diag: Vec<f64>,
}

impl Jacobi {
    pub fn new() -> Self {
        Jacobi::default()
    }

    fn scaled(&self, coeffs: &[f64], r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        let src = r.array()?;
        Error::check_lengths("jacobi apply", coeffs.len(), src.len())?;
        let dst = z.array_mut()?;
        for ((zi, ri), c) in dst.iter_mut().zip(src).zip(coeffs) {
            *zi = c * ri;
        }
        Ok(())
    }
}

impl Preconditioner<DistMatrix, DistVector> for Jacobi {
    fn setup(&mut self, a: &DistMatrix) -> Result<(), Error> {
        let d = a.diagonal()?;
        self.inv_diag = d
            .array()?
            .iter()
            .map(|&di| if di != 0.0 { 1.0 / di } else { 0.0 })
            .collect();
        self.inv_sqrt_diag = self
            .inv_diag
            .iter()
            .map(|&di| if di > 0.0 { di.sqrt() } else { 0.0 })
            .collect();
        Ok(())
    }

    fn apply(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.scaled(&self.inv_diag, r, z)
    }

    fn apply_symmetric_left(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.scaled(&self.inv_sqrt_diag, r, z)
    }

    fn apply_symmetric_right(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        self.scaled(&self.inv_sqrt_diag, r, z)
    }

    fn reset(&mut self) {
        self.inv_diag = Vec::new();
        self.inv_sqrt_diag = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::layout::Layout;

    #[test]
    fn inverts_the_diagonal() {
        let a = DistMatrix::serial_from_triplets(
            3,
            3,
            &[(0, 0, 2.0), (1, 1, 4.0), (2, 2, 0.5), (0, 1, 1.0)],
        )
        .unwrap();
        let mut pc = Jacobi::new();
        pc.setup(&a).unwrap();
        let r = DistVector::from_fn(Layout::serial(3), |_| 1.0);
        let mut z = DistVector::new(Layout::serial(3));
        pc.apply(&r, &mut z).unwrap();
        assert_eq!(z.array().unwrap(), &[0.5, 0.25, 2.0]);
    }

    #[test]
    fn symmetric_halves_compose_to_full() {
        let a =
            DistMatrix::serial_from_triplets(2, 2, &[(0, 0, 4.0), (1, 1, 9.0)]).unwrap();
        let mut pc = Jacobi::new();
        pc.setup(&a).unwrap();
        let r = DistVector::from_fn(Layout::serial(2), |_| 1.0);
        let mut half = DistVector::new(Layout::serial(2));
        let mut full = DistVector::new(Layout::serial(2));
        pc.apply_symmetric_left(&r, &mut half).unwrap();
        pc.apply_symmetric_right(&half, &mut full).unwrap();
        assert_eq!(full.array().unwrap(), &[0.25, 1.0 / 9.0]);
    }
}
