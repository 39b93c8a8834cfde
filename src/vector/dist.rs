//! Row-partitioned vector with two-phase assembly.
//!
//! Local entries live in an owned array; entries targeting other ranks are
//! cached in a stash and exchanged during `assembly_begin`/`assembly_end`.
//! Scoped access to the local array goes through `array`/`array_mut`, where
//! the borrow checker supplies the single-writer discipline.

use std::sync::Arc;

use crate::core::traits::VecOps;
use crate::error::Error;
use crate::vector::layout::Layout;

/// How `set_values` combines with an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Overwrite the target entry.
    Insert,
    /// Accumulate into the target entry.
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormType {
    One,
    Two,
    Infinity,
}

/// In-flight vector assembly: holds the entries received from other ranks
/// between `assembly_begin` and `assembly_end`.
#[must_use = "assembly_end must consume the handle to apply exchanged entries"]
pub struct VecAssembly {
    received: Vec<(usize, f64)>,
    mode: Option<InsertMode>,
}

#[derive(Clone)]
pub struct DistVector {
    layout: Arc<Layout>,
    values: Vec<f64>,
    stash: Vec<(usize, f64)>,
    stash_mode: Option<InsertMode>,
}

impl DistVector {
    /// A zero vector over `layout`.
    pub fn new(layout: Arc<Layout>) -> Self {
        let n = layout.local_len();
        DistVector {
            layout,
            values: vec![0.0; n],
            stash: Vec::new(),
            stash_mode: None,
        }
    }

    /// Fill from a function of the global index (local entries only, no
    /// communication).
    pub fn from_fn(layout: Arc<Layout>, f: impl Fn(usize) -> f64) -> Self {
        let (start, end) = layout.local_range();
        let values = (start..end).map(f).collect();
        DistVector {
            layout,
            values,
            stash: Vec::new(),
            stash_mode: None,
        }
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    pub fn local_len(&self) -> usize {
        self.values.len()
    }

    pub fn global_len(&self) -> usize {
        self.layout.global_len()
    }

    fn check_compatible(&self, other: &DistVector, context: &'static str) -> Result<(), Error> {
        if !self.layout.compatible(&other.layout) {
            return Err(Error::SizeMismatch {
                context,
                left: self.global_len(),
                right: other.global_len(),
            });
        }
        Ok(())
    }

    fn check_no_pending(&self, context: &'static str) -> Result<(), Error> {
        if !self.stash.is_empty() {
            let _ = context;
            return Err(Error::InvalidState(
                "off-process contributions pending; call assembly_begin/assembly_end first",
            ));
        }
        Ok(())
    }

    /// Scoped read access to the local array.
    pub fn array(&self) -> Result<&[f64], Error> {
        self.check_no_pending("array")?;
        Ok(&self.values)
    }

    /// Scoped exclusive access to the local array.
    pub fn array_mut(&mut self) -> Result<&mut [f64], Error> {
        self.check_no_pending("array_mut")?;
        Ok(&mut self.values)
    }

    /// Set every local entry to `v`. No communication.
    pub fn set_all(&mut self, v: f64) {
        for e in &mut self.values {
            *e = v;
        }
    }

    /// self ← a·self.
    pub fn scale(&mut self, a: f64) {
        for e in &mut self.values {
            *e *= a;
        }
    }

    /// self ← self + a·x.
    pub fn axpy(&mut self, a: f64, x: &DistVector) -> Result<(), Error> {
        self.check_compatible(x, "axpy")?;
        for (yi, xi) in self.values.iter_mut().zip(&x.values) {
            *yi += a * xi;
        }
        Ok(())
    }

    /// self ← x + a·self.
    pub fn aypx(&mut self, a: f64, x: &DistVector) -> Result<(), Error> {
        self.check_compatible(x, "aypx")?;
        for (yi, xi) in self.values.iter_mut().zip(&x.values) {
            *yi = xi + a * *yi;
        }
        Ok(())
    }

    /// self ← a·x + y.
    pub fn waxpy(&mut self, a: f64, x: &DistVector, y: &DistVector) -> Result<(), Error> {
        self.check_compatible(x, "waxpy")?;
        self.check_compatible(y, "waxpy")?;
        for ((wi, xi), yi) in self.values.iter_mut().zip(&x.values).zip(&y.values) {
            *wi = a * xi + yi;
        }
        Ok(())
    }

    /// self ← x ⊙ y elementwise.
    pub fn pointwise_mult(&mut self, x: &DistVector, y: &DistVector) -> Result<(), Error> {
        self.check_compatible(x, "pointwise_mult")?;
        self.check_compatible(y, "pointwise_mult")?;
        for ((wi, xi), yi) in self.values.iter_mut().zip(&x.values).zip(&y.values) {
            *wi = xi * yi;
        }
        Ok(())
    }

    /// Set or accumulate entries by global index. Off-process targets are
    /// stashed until the next assembly. Mixing Insert and Add between
    /// assemblies is rejected.
    pub fn set_values(
        &mut self,
        indices: &[usize],
        vals: &[f64],
        mode: InsertMode,
    ) -> Result<(), Error> {
        Error::check_lengths("set_values indices vs values", indices.len(), vals.len())?;
        match self.stash_mode {
            Some(m) if m != mode => {
                return Err(Error::InvalidState(
                    "cannot mix Insert and Add between assemblies",
                ));
            }
            _ => self.stash_mode = Some(mode),
        }
        let (start, end) = self.layout.local_range();
        for (&i, &v) in indices.iter().zip(vals) {
            if i >= self.global_len() {
                return Err(Error::SizeMismatch {
                    context: "set_values index vs global length",
                    left: i,
                    right: self.global_len(),
                });
            }
            if i >= start && i < end {
                match mode {
                    InsertMode::Insert => self.values[i - start] = v,
                    InsertMode::Add => self.values[i - start] += v,
                }
            } else {
                self.stash.push((i, v));
            }
        }
        Ok(())
    }

    /// Start the exchange of stashed off-process entries. Local work may be
    /// overlapped with message transit before `assembly_end`.
    pub fn assembly_begin(&mut self) -> Result<VecAssembly, Error> {
        let comm = self.layout.comm().clone();
        let size = comm.size();

        // All ranks must agree on the pending insert mode. Reducing the max
        // mode and the max negated mode together yields the min and max over
        // the ranks that stashed anything, so every rank reaches the same
        // verdict and none proceeds into the exchange alone.
        let local_mode = match self.stash_mode {
            None => -1.0,
            Some(InsertMode::Insert) => 0.0,
            Some(InsertMode::Add) => 1.0,
        };
        let mut buf = [
            local_mode,
            if local_mode >= 0.0 { -local_mode } else { -2.0 },
        ];
        comm.all_reduce_max(&mut buf);
        if buf[0] >= 0.0 && -buf[1] != buf[0] {
            return Err(Error::InvalidState(
                "ranks disagree on Insert vs Add during vector assembly",
            ));
        }
        let mode = if buf[0] < 0.0 {
            None
        } else if buf[0] == 0.0 {
            Some(InsertMode::Insert)
        } else {
            Some(InsertMode::Add)
        };

        let mut idx_sends: Vec<Vec<usize>> = vec![Vec::new(); size];
        let mut val_sends: Vec<Vec<f64>> = vec![Vec::new(); size];
        for &(i, v) in &self.stash {
            let owner = self.layout.owner_of(i);
            idx_sends[owner].push(i);
            val_sends[owner].push(v);
        }
        self.stash.clear();
        self.stash_mode = None;

        let idx_recv = comm.exchange_indices(&idx_sends);
        let val_recv = comm.exchange_scalars(&val_sends);
        let mut received = Vec::new();
        for (idxs, vals) in idx_recv.into_iter().zip(val_recv) {
            received.extend(idxs.into_iter().zip(vals));
        }
        tracing::trace!(received = received.len(), "vector assembly exchange");
        Ok(VecAssembly { received, mode })
    }

    /// Apply the exchanged entries. Synchronization point of the assembly.
    pub fn assembly_end(&mut self, assembly: VecAssembly) -> Result<(), Error> {
        let (start, _) = self.layout.local_range();
        for (i, v) in assembly.received {
            let li = i - start;
            match assembly.mode {
                Some(InsertMode::Add) => self.values[li] += v,
                // A lone received entry with no mode cannot happen: the mode
                // reduction yields one whenever any rank stashed.
                _ => self.values[li] = v,
            }
        }
        Ok(())
    }

    /// Blocking global dot product (single combined reduction).
    pub fn dot(&self, other: &DistVector) -> Result<f64, Error> {
        self.check_compatible(other, "dot")?;
        let mut buf = [self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum::<f64>()];
        self.layout.comm().all_reduce_sum(&mut buf);
        Ok(buf[0])
    }

    /// Blocking global norm.
    pub fn norm(&self, ty: NormType) -> f64 {
        let comm = self.layout.comm();
        match ty {
            NormType::Two => {
                let mut buf = [self.values.iter().map(|a| a * a).sum::<f64>()];
                comm.all_reduce_sum(&mut buf);
                buf[0].sqrt()
            }
            NormType::One => {
                let mut buf = [self.values.iter().map(|a| a.abs()).sum::<f64>()];
                comm.all_reduce_sum(&mut buf);
                buf[0]
            }
            NormType::Infinity => {
                let mut buf = [self.values.iter().fold(0.0f64, |m, &a| m.max(a.abs()))];
                comm.all_reduce_max(&mut buf);
                buf[0]
            }
        }
    }

    /// Fused (dot(self, t), ‖t‖₂²) sharing one reduction.
    pub fn dot_norm2(&self, t: &DistVector) -> Result<(f64, f64), Error> {
        self.check_compatible(t, "dot_norm2")?;
        let mut buf = [0.0; 2];
        for (si, ti) in self.values.iter().zip(&t.values) {
            buf[0] += si * ti;
            buf[1] += ti * ti;
        }
        self.layout.comm().all_reduce_sum(&mut buf);
        Ok((buf[0], buf[1]))
    }

    /// Local partial of a dot product, used by the split-reduction engine.
    pub(crate) fn local_dot(&self, other: &DistVector) -> f64 {
        self.values.iter().zip(&other.values).map(|(a, b)| a * b).sum()
    }

    /// Local partial of a norm, used by the split-reduction engine.
    pub(crate) fn local_norm_partial(&self, ty: NormType) -> f64 {
        match ty {
            NormType::Two => self.values.iter().map(|a| a * a).sum(),
            NormType::One => self.values.iter().map(|a| a.abs()).sum(),
            NormType::Infinity => self.values.iter().fold(0.0f64, |m, &a| m.max(a.abs())),
        }
    }
}

impl std::fmt::Debug for DistVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistVector")
            .field("global_len", &self.global_len())
            .field("local_len", &self.local_len())
            .field("pending", &self.stash.len())
            .finish()
    }
}

impl VecOps for DistVector {
    fn global_len(&self) -> usize {
        DistVector::global_len(self)
    }
    fn zeros_like(&self) -> Self {
        DistVector::new(self.layout.clone())
    }
    fn copy_values_from(&mut self, other: &Self) -> Result<(), Error> {
        self.check_compatible(other, "copy")?;
        self.values.copy_from_slice(&other.values);
        Ok(())
    }
    fn fill(&mut self, v: f64) {
        self.set_all(v)
    }
    fn scale_in_place(&mut self, a: f64) {
        self.scale(a)
    }
    fn axpy_in_place(&mut self, a: f64, x: &Self) -> Result<(), Error> {
        self.axpy(a, x)
    }
    fn aypx_in_place(&mut self, a: f64, x: &Self) -> Result<(), Error> {
        self.aypx(a, x)
    }
    fn dot_all(&self, other: &Self) -> Result<f64, Error> {
        self.dot(other)
    }
    fn norm2_all(&self) -> f64 {
        self.norm(NormType::Two)
    }
    fn dot_norm2_all(&self, t: &Self) -> Result<(f64, f64), Error> {
        self.dot_norm2(t)
    }
}
