//! Block-Jacobi preconditioner.
//!
//! The local diagonal block is partitioned into sub-blocks, each solved by
//! its own nested Krylov context over a single-process operator. Sub-solver
//! method and preconditioner are configurable per options database
//! (`-sub_ksp_type`, `-sub_pc_type`), defaulting to one exact-ish
//! application: preonly with ILU(0).

use std::sync::Mutex;

use crate::config::OptionsDb;
use crate::context::ksp_context::{KspContext, KspKind};
use crate::context::pc_context::PcRegistry;
use crate::error::{Error, FactorFailure};
use crate::matrix::dist::DistMatrix;
use crate::matrix::seq_csr::SeqCsr;
use crate::preconditioner::Preconditioner;
use crate::vector::dist::DistVector;

struct SubBlock {
    /// Local row indices (into the owning rank's diagonal block).
    indices: Vec<usize>,
    matrix: DistMatrix,
    // Sub-solves mutate iteration state; the lock keeps `apply` shared.
    ksp: Mutex<KspContext<DistMatrix, DistVector>>,
}

pub struct BlockJacobi {
    n_blocks: usize,
    explicit_blocks: Option<Vec<Vec<usize>>>,
    sub_db: OptionsDb,
    sub: Vec<SubBlock>,
    failure: Option<FactorFailure>,
}

impl BlockJacobi {
    /// Split the local rows into `n_blocks` contiguous blocks.
    pub fn new(n_blocks: usize) -> Self {
        BlockJacobi {
            n_blocks: n_blocks.max(1),
            explicit_blocks: None,
            sub_db: OptionsDb::new(),
            sub: Vec::new(),
            failure: None,
        }
    }

    /// Explicit block index sets (local indices).
    pub fn with_blocks(blocks: Vec<Vec<usize>>) -> Self {
        BlockJacobi {
            n_blocks: blocks.len().max(1),
            explicit_blocks: Some(blocks),
            sub_db: OptionsDb::new(),
            sub: Vec::new(),
            failure: None,
        }
    }

    /// Blocks from a color assignment, one block per color.
    pub fn from_colors(colors: &[usize]) -> Self {
        BlockJacobi::with_blocks(crate::utils::coloring::build_blocks_from_colors(colors))
    }

    /// Options consulted when the sub-solvers are created during setup.
    pub fn set_sub_options(&mut self, db: &OptionsDb) {
        self.sub_db = db.clone();
    }

    /// The nested solver contexts, for per-block tuning after setup.
    pub fn sub_solvers_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut KspContext<DistMatrix, DistVector>> {
        self.sub.iter_mut().map(|s| {
            s.ksp
                .get_mut()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        })
    }

    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    fn partition(&self, n_local: usize) -> Vec<Vec<usize>> {
        if let Some(blocks) = &self.explicit_blocks {
            return blocks.clone();
        }
        let b = self.n_blocks.min(n_local.max(1));
        let base = n_local / b;
        let rem = n_local % b;
        let mut blocks = Vec::with_capacity(b);
        let mut start = 0;
        for k in 0..b {
            let len = base + usize::from(k < rem);
            blocks.push((start..start + len).collect());
            start += len;
        }
        blocks
    }

    fn serial_operator(local: &SeqCsr, indices: &[usize]) -> Result<DistMatrix, Error> {
        let sub = local.submatrix(indices)?;
        let mut triplets = Vec::with_capacity(sub.nnz());
        for i in 0..sub.nrows() {
            let (cols, vals) = sub.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                triplets.push((i, c, v));
            }
        }
        DistMatrix::serial_from_triplets(sub.nrows(), sub.ncols(), &triplets)
    }

    fn solve_block(sub: &SubBlock, rhs: &[f64]) -> Result<Vec<f64>, Error> {
        let layout = sub.matrix.row_layout().clone();
        let mut rb = DistVector::new(layout.clone());
        rb.array_mut()?.copy_from_slice(rhs);
        let mut xb = DistVector::new(layout);
        let mut ksp = sub
            .ksp
            .lock()
            .map_err(|_| Error::InvalidState("block sub-solver lock poisoned"))?;
        ksp.solve(&sub.matrix, &rb, &mut xb)?;
        Ok(xb.array()?.to_vec())
    }
}

impl Preconditioner<DistMatrix, DistVector> for BlockJacobi {
    fn setup(&mut self, a: &DistMatrix) -> Result<(), Error> {
        let local = a.local_diag_block()?;
        let blocks = self.partition(local.nrows());
        tracing::debug!(blocks = blocks.len(), rows = local.nrows(), "block jacobi setup");

        let registry = PcRegistry::with_builtins();
        let sub_kind = match self.sub_db.get_string("sub_ksp_type") {
            Some(name) => KspKind::from_name(name)?,
            None => KspKind::Preonly,
        };
        let sub_pc = self.sub_db.get_string("sub_pc_type").unwrap_or("ilu");

        self.sub.clear();
        self.failure = None;
        for indices in blocks {
            let matrix = Self::serial_operator(local, &indices)?;
            let mut ksp = KspContext::new(sub_kind);
            if let Some(rtol) = self.sub_db.get_f64("sub_ksp_rtol")? {
                ksp.conv.rtol = rtol;
            }
            ksp.pc_mut().configure(sub_pc, &registry, &self.sub_db)?;
            ksp.setup(&matrix)?;
            if self.failure.is_none() {
                self.failure = ksp.pc().failed().cloned();
            }
            self.sub.push(SubBlock {
                indices,
                matrix,
                ksp: Mutex::new(ksp),
            });
        }
        Ok(())
    }

    fn apply(&self, r: &DistVector, z: &mut DistVector) -> Result<(), Error> {
        if self.sub.is_empty() {
            return Err(Error::InvalidState("block jacobi applied before setup"));
        }
        let r_local = r.array()?.to_vec();

        #[cfg(feature = "rayon")]
        let results: Vec<Result<Vec<f64>, Error>> = {
            use rayon::prelude::*;
            self.sub
                .par_iter()
                .map(|sub| {
                    let rhs: Vec<f64> = sub.indices.iter().map(|&i| r_local[i]).collect();
                    Self::solve_block(sub, &rhs)
                })
                .collect()
        };
        #[cfg(not(feature = "rayon"))]
        let results: Vec<Result<Vec<f64>, Error>> = self
            .sub
            .iter()
            .map(|sub| {
                let rhs: Vec<f64> = sub.indices.iter().map(|&i| r_local[i]).collect();
                Self::solve_block(sub, &rhs)
            })
            .collect();

        let z_local = z.array_mut()?;
        for (sub, result) in self.sub.iter().zip(results) {
            let xb = result?;
            for (&i, xi) in sub.indices.iter().zip(xb) {
                z_local[i] = xi;
            }
        }
        Ok(())
    }

    fn failed(&self) -> Option<&FactorFailure> {
        self.failure.as_ref()
    }

    fn reset(&mut self) {
        self.sub.clear();
        self.failure = None;
    }
}
