//! Solve a 2D Laplace problem with CG, configured from the command line.
//!
//! Try:
//!   cargo run --example laplace_cg -- -ksp_type cg -pc_type icc -ksp_rtol 1e-8
//!   cargo run --example laplace_cg -- -pc_type bjacobi -pc_bjacobi_blocks 4 -sub_pc_type lu

use petrel::context::{KspContext, KspKind, PcRegistry};
use petrel::matrix::DistMatrix;
use petrel::vector::{DistVector, InsertMode, Layout};
use petrel::{Error, Runtime};

fn main() -> Result<(), Error> {
    let rt = Runtime::init(std::env::args().skip(1))?;
    let m = rt.options().get_usize("grid")?.unwrap_or(32);
    let n = m * m;

    let layout = Layout::new(rt.world(), None, Some(n))?;
    let mut a = DistMatrix::from_layouts(layout.clone(), layout.clone());
    a.set_preallocation(5, 2);

    // Five-point stencil over the locally owned rows.
    let (start, end) = layout.local_range();
    for i in start..end {
        let (row, col) = (i / m, i % m);
        a.set_values(&[i], &[i], &[4.0], InsertMode::Insert)?;
        if col > 0 {
            a.set_values(&[i], &[i - 1], &[-1.0], InsertMode::Insert)?;
        }
        if col + 1 < m {
            a.set_values(&[i], &[i + 1], &[-1.0], InsertMode::Insert)?;
        }
        if row > 0 {
            a.set_values(&[i], &[i - m], &[-1.0], InsertMode::Insert)?;
        }
        if row + 1 < m {
            a.set_values(&[i], &[i + m], &[-1.0], InsertMode::Insert)?;
        }
    }
    let h = a.assembly_begin()?;
    a.assembly_end(h)?;

    let b = DistVector::from_fn(layout.clone(), |_| 1.0);
    let mut x = DistVector::new(layout);

    let registry = PcRegistry::with_builtins();
    let mut ksp = KspContext::new(KspKind::Cg);
    ksp.set_from_options(rt.options(), &registry)?;
    if rt.rank() == 0 && rt.options().get_bool("monitor")?.unwrap_or(false) {
        ksp.set_monitor(|it, rnorm| println!("{it:4}  {rnorm:.6e}"));
    }

    let stats = ksp.solve(&a, &b, &mut x)?;
    if rt.rank() == 0 {
        println!(
            "{n} unknowns: {:?} in {} iterations, residual {:.3e}",
            stats.reason, stats.iterations, stats.final_residual
        );
    }
    Ok(())
}
