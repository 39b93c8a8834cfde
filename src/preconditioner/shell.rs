//! User-defined preconditioner assembled from closures, for problem-specific
//! actions that do not warrant a full trait implementation.

use crate::error::Error;
use crate::preconditioner::Preconditioner;

type ApplyFn<V> = dyn Fn(&V, &mut V) -> Result<(), Error> + Send + Sync;
type SetupFn<M> = dyn FnMut(&M) -> Result<(), Error> + Send + Sync;

pub struct Shell<M, V> {
    apply: Box<ApplyFn<V>>,
    setup: Option<Box<SetupFn<M>>>,
}

impl<M, V> Shell<M, V> {
    /// A shell whose whole action is the given closure.
    pub fn new<F>(apply: F) -> Self
    where
        F: Fn(&V, &mut V) -> Result<(), Error> + Send + Sync + 'static,
    {
        Shell {
            apply: Box::new(apply),
            setup: None,
        }
    }

    /// Attach a setup closure, invoked whenever the operator changes.
    pub fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: FnMut(&M) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }
}

impl<M, V> Preconditioner<M, V> for Shell<M, V> {
    fn setup(&mut self, a: &M) -> Result<(), Error> {
        if let Some(setup) = &mut self.setup {
            setup(a)?;
        }
        Ok(())
    }

    fn apply(&self, r: &V, z: &mut V) -> Result<(), Error> {
        (self.apply)(r, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::seq_csr::SeqCsr;

    #[test]
    fn closure_is_the_action() {
        // Diagonal scaling by hand.
        let pc: Shell<SeqCsr, Vec<f64>> = Shell::new(|r: &Vec<f64>, z: &mut Vec<f64>| {
            for (zi, ri) in z.iter_mut().zip(r) {
                *zi = 0.5 * ri;
            }
            Ok(())
        });
        let r = vec![2.0, 4.0];
        let mut z = vec![0.0; 2];
        pc.apply(&r, &mut z).unwrap();
        assert_eq!(z, vec![1.0, 2.0]);
    }

    #[test]
    fn setup_closure_runs() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let seen = Arc::new(AtomicUsize::new(0));
        let recorder = seen.clone();
        let mut pc: Shell<SeqCsr, Vec<f64>> = Shell::new(|r: &Vec<f64>, z: &mut Vec<f64>| {
            z.copy_from_slice(r);
            Ok(())
        })
        .with_setup(move |a: &SeqCsr| {
            recorder.store(a.nrows(), Ordering::Relaxed);
            Ok(())
        });
        let a = SeqCsr::from_triplets(3, 3, &[(0, 0, 1.0)]).unwrap();
        pc.setup(&a).unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }
}
