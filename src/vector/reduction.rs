//! Split (latency-hiding) reduction engine.
//!
//! A `*_begin` call computes the local partial contribution of a dot product
//! or norm and enqueues it without blocking. `flush` completes every queued
//! request with one combined collective per reduction operator, so several
//! independent reductions inside one solver iteration share a single round
//! of communication latency. `end` consumes the handle returned by the
//! matching begin and yields the completed result, flushing lazily if the
//! collective has not run yet.
//!
//! Contract: every rank of the communicator must issue the same sequence of
//! begin/end calls, and handles must be ended in begin order. The second
//! half of that contract is checked here; the cross-rank half cannot be.

use std::sync::Arc;

use crate::error::Error;
use crate::parallel::Comm;
use crate::vector::dist::{DistVector, NormType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReduceOp {
    Sum,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Post {
    None,
    Sqrt,
}

struct Request {
    op: ReduceOp,
    post: Post,
    value: f64,
}

/// A pending reduction. Consumable only by [`SplitReduction::end`], which
/// enforces begin/end pairing through the type system.
#[must_use = "a begun reduction must be completed with end()"]
#[derive(Debug)]
pub struct Pending {
    seq: usize,
}

/// Per-communicator queue of pending reductions.
pub struct SplitReduction {
    comm: Arc<dyn Comm>,
    queue: Vec<Request>,
    next_end: usize,
    flushed: bool,
}

impl SplitReduction {
    pub fn new(comm: Arc<dyn Comm>) -> Self {
        SplitReduction {
            comm,
            queue: Vec::new(),
            next_end: 0,
            flushed: false,
        }
    }

    fn push(&mut self, op: ReduceOp, post: Post, value: f64) -> Result<Pending, Error> {
        if self.flushed {
            return Err(Error::InvalidState(
                "cannot begin a reduction while completed results are still pending",
            ));
        }
        let seq = self.queue.len();
        self.queue.push(Request { op, post, value });
        Ok(Pending { seq })
    }

    /// Enqueue dot(x, y). Computes the local partial; never communicates.
    pub fn dot_begin(&mut self, x: &DistVector, y: &DistVector) -> Result<Pending, Error> {
        Error::check_lengths("dot_begin", x.global_len(), y.global_len())?;
        self.push(ReduceOp::Sum, Post::None, x.local_dot(y))
    }

    /// Enqueue a norm of `x`. Computes the local partial; never communicates.
    pub fn norm_begin(&mut self, x: &DistVector, ty: NormType) -> Result<Pending, Error> {
        let (op, post) = match ty {
            NormType::Two => (ReduceOp::Sum, Post::Sqrt),
            NormType::One => (ReduceOp::Sum, Post::None),
            NormType::Infinity => (ReduceOp::Max, Post::None),
        };
        self.push(op, post, x.local_norm_partial(ty))
    }

    /// Complete every queued request with one combined collective per
    /// reduction operator. The explicit barrier point of the engine; `end`
    /// calls it lazily when needed.
    pub fn flush(&mut self) {
        if self.flushed || self.queue.is_empty() {
            self.flushed = true;
            return;
        }
        let mut sums: Vec<f64> = Vec::new();
        let mut maxs: Vec<f64> = Vec::new();
        for r in &self.queue {
            match r.op {
                ReduceOp::Sum => sums.push(r.value),
                ReduceOp::Max => maxs.push(r.value),
            }
        }
        tracing::trace!(sums = sums.len(), maxs = maxs.len(), "split reduction flush");
        if !sums.is_empty() {
            self.comm.all_reduce_sum(&mut sums);
        }
        if !maxs.is_empty() {
            self.comm.all_reduce_max(&mut maxs);
        }
        let (mut si, mut mi) = (0, 0);
        for r in &mut self.queue {
            r.value = match r.op {
                ReduceOp::Sum => {
                    si += 1;
                    sums[si - 1]
                }
                ReduceOp::Max => {
                    mi += 1;
                    maxs[mi - 1]
                }
            };
        }
        self.flushed = true;
    }

    /// Retrieve the completed result for `pending`. Blocks (inside the
    /// collective) only if the queue has not been flushed yet. Handles must
    /// arrive in begin order; anything else is a protocol error.
    pub fn end(&mut self, pending: Pending) -> Result<f64, Error> {
        if pending.seq != self.next_end {
            return Err(Error::InvalidState(
                "split reduction completed out of begin order",
            ));
        }
        self.flush();
        let r = &self.queue[pending.seq];
        let out = match r.post {
            Post::None => r.value,
            Post::Sqrt => r.value.sqrt(),
        };
        self.next_end += 1;
        if self.next_end == self.queue.len() {
            // Generation complete; recycle the queue.
            self.queue.clear();
            self.next_end = 0;
            self.flushed = false;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::layout::Layout;

    fn vecs() -> (DistVector, DistVector) {
        let l = Layout::serial(6);
        let x = DistVector::from_fn(l.clone(), |i| i as f64 + 1.0);
        let y = DistVector::from_fn(l, |i| 2.0 - i as f64);
        (x, y)
    }

    #[test]
    fn split_dots_match_synchronous() {
        let (x, y) = vecs();
        let mut sr = SplitReduction::new(Arc::new(crate::parallel::SerialComm));
        let d1 = sr.dot_begin(&x, &y).unwrap();
        let n1 = sr.norm_begin(&x, NormType::Two).unwrap();
        let m1 = sr.norm_begin(&y, NormType::Infinity).unwrap();
        sr.flush();
        assert_eq!(sr.end(d1).unwrap(), x.dot(&y).unwrap());
        assert_eq!(sr.end(n1).unwrap(), x.norm(NormType::Two));
        assert_eq!(sr.end(m1).unwrap(), y.norm(NormType::Infinity));
    }

    #[test]
    fn queue_recycles_after_generation() {
        let (x, y) = vecs();
        let mut sr = SplitReduction::new(Arc::new(crate::parallel::SerialComm));
        for _ in 0..3 {
            let d = sr.dot_begin(&x, &y).unwrap();
            assert_eq!(sr.end(d).unwrap(), x.dot(&y).unwrap());
        }
    }

    #[test]
    fn out_of_order_end_is_protocol_error() {
        let (x, y) = vecs();
        let mut sr = SplitReduction::new(Arc::new(crate::parallel::SerialComm));
        let _d1 = sr.dot_begin(&x, &y).unwrap();
        let d2 = sr.dot_begin(&y, &x).unwrap();
        let err = sr.end(d2).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn begin_after_flush_with_pending_results_rejected() {
        let (x, y) = vecs();
        let mut sr = SplitReduction::new(Arc::new(crate::parallel::SerialComm));
        let d1 = sr.dot_begin(&x, &y).unwrap();
        let _d2 = sr.dot_begin(&x, &x).unwrap();
        let _ = sr.end(d1).unwrap();
        let err = sr.dot_begin(&x, &y).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
