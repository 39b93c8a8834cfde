//! End-to-end solves: Krylov drivers against preconditioners on structured
//! and random systems, checked against a direct dense solve where feasible.

use approx::assert_abs_diff_eq;
use petrel::context::{KspContext, KspKind, PcRegistry};
use petrel::matrix::DistMatrix;
use petrel::preconditioner::{BlockJacobi, Jacobi, Preconditioner};
use petrel::solver::{BiCgStabSolver, CgSolver, GmresSolver, LinearSolver, PreonlySolver};
use petrel::utils::convergence::{Convergence, ConvergedReason};
use petrel::vector::{DistVector, Layout};
use petrel::{OptionsDb, SeqCsr};
use rand::Rng;

/// Five-point Laplacian on an m x m grid.
fn laplace_2d(m: usize) -> DistMatrix {
    let n = m * m;
    let mut t = Vec::new();
    for row in 0..m {
        for col in 0..m {
            let i = row * m + col;
            t.push((i, i, 4.0));
            if col > 0 {
                t.push((i, i - 1, -1.0));
            }
            if col + 1 < m {
                t.push((i, i + 1, -1.0));
            }
            if row > 0 {
                t.push((i, i - m, -1.0));
            }
            if row + 1 < m {
                t.push((i, i + m, -1.0));
            }
        }
    }
    DistMatrix::serial_from_triplets(n, n, &t).unwrap()
}

fn residual_norm(a: &DistMatrix, x: &DistVector, b: &DistVector) -> f64 {
    let mut ax = DistVector::new(a.row_layout().clone());
    a.mult(x, &mut ax).unwrap();
    ax.array()
        .unwrap()
        .iter()
        .zip(b.array().unwrap())
        .map(|(ai, bi)| (ai - bi) * (ai - bi))
        .sum::<f64>()
        .sqrt()
}

#[test]
fn cg_with_icc_on_laplacian() {
    // 64 unknowns, tight tolerance, and the preconditioner should keep the
    // iteration count well below the unpreconditioned worst case.
    let a = laplace_2d(8);
    let n = 64;
    let db = OptionsDb::from_args(["-pc_type", "icc", "-ksp_rtol", "1e-7"]);
    let reg = PcRegistry::with_builtins();
    let mut ksp = KspContext::new(KspKind::Cg);
    ksp.set_from_options(&db, &reg).unwrap();

    let b = DistVector::from_fn(Layout::serial(n), |i| ((i % 5) as f64) - 2.0);
    let mut x = DistVector::new(Layout::serial(n));
    let stats = ksp.solve(&a, &b, &mut x).unwrap();
    assert!(stats.reason.is_converged(), "{:?}", stats.reason);
    assert!(stats.iterations < 100, "took {} iterations", stats.iterations);
    assert!(residual_norm(&a, &x, &b) <= 1e-7 * stats.residual_history[0] * 10.0);
}

#[test]
fn jacobi_reduces_cg_iterations_vs_reported_history() {
    let a = laplace_2d(6);
    let n = 36;
    let b = DistVector::from_fn(Layout::serial(n), |_| 1.0);
    let conv = Convergence {
        rtol: 1e-9,
        ..Convergence::default()
    };

    let mut x_plain = DistVector::new(Layout::serial(n));
    let plain = CgSolver::new(conv.clone()).solve(&a, None, &b, &mut x_plain).unwrap();

    let mut pc = Jacobi::new();
    pc.setup(&a).unwrap();
    let mut x_pc = DistVector::new(Layout::serial(n));
    let with_pc = CgSolver::new(conv).solve(&a, Some(&pc), &b, &mut x_pc).unwrap();

    assert!(plain.reason.is_converged());
    assert!(with_pc.reason.is_converged());
    // Same answer either way.
    for (p, q) in x_plain.array().unwrap().iter().zip(x_pc.array().unwrap()) {
        assert_abs_diff_eq!(p, q, epsilon = 1e-6);
    }
}

#[test]
fn cg_matches_direct_dense_solve() {
    // Random SPD system, cross-checked against a dense direct solve.
    use faer::Mat;
    use faer::linalg::solvers::{FullPivLu, SolveCore};

    let n = 12;
    let mut rng = rand::thread_rng();
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    let m = Mat::from_fn(n, n, |i, j| data[j * n + i]);
    let shift = Mat::<f64>::from_fn(n, n, |i, j| if i == j { 2.0 } else { 0.0 });
    let spd = m.transpose() * &m + shift;

    let mut triplets = Vec::new();
    for i in 0..n {
        for j in 0..n {
            triplets.push((i, j, spd[(i, j)]));
        }
    }
    let a = DistMatrix::serial_from_triplets(n, n, &triplets).unwrap();
    let rhs: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();

    let b = DistVector::from_fn(Layout::serial(n), |i| rhs[i]);
    let mut x = DistVector::new(Layout::serial(n));
    let stats = CgSolver::new(Convergence {
        rtol: 1e-12,
        ..Convergence::default()
    })
    .solve(&a, None, &b, &mut x)
    .unwrap();
    assert!(stats.reason.is_converged());

    let mut x_direct = rhs.clone();
    let lu = FullPivLu::new(spd.as_ref());
    let x_mat = faer::MatMut::from_column_major_slice_mut(&mut x_direct, n, 1);
    lu.solve_in_place_with_conj(faer::Conj::No, x_mat);
    for (xi, di) in x.array().unwrap().iter().zip(&x_direct) {
        assert_abs_diff_eq!(xi, di, epsilon = 1e-7);
    }
}

#[test]
fn gmres_with_ilu_on_nonsymmetric_system() {
    let n = 30;
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, 4.0));
        if i > 0 {
            t.push((i, i - 1, -2.0));
        }
        if i + 1 < n {
            t.push((i, i + 1, -0.5));
        }
    }
    let a = DistMatrix::serial_from_triplets(n, n, &t).unwrap();
    let db = OptionsDb::from_args(["-pc_type", "ilu", "-ksp_rtol", "1e-9"]);
    let reg = PcRegistry::with_builtins();
    let mut ksp = KspContext::new(KspKind::Gmres);
    ksp.set_from_options(&db, &reg).unwrap();

    let b = DistVector::from_fn(Layout::serial(n), |i| (i as f64 * 0.3).cos());
    let mut x = DistVector::new(Layout::serial(n));
    let stats = ksp.solve(&a, &b, &mut x).unwrap();
    assert!(stats.reason.is_converged(), "{:?}", stats.reason);
    // ILU(0) on a tridiagonal pattern is exact, so one or two iterations.
    assert!(stats.iterations <= 3, "took {} iterations", stats.iterations);
}

#[test]
fn bicgstab_with_jacobi() {
    let n = 40;
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, 3.0 + (i % 4) as f64));
        if i > 0 {
            t.push((i, i - 1, -1.2));
        }
        if i + 1 < n {
            t.push((i, i + 1, -0.8));
        }
    }
    let a = DistMatrix::serial_from_triplets(n, n, &t).unwrap();
    let mut pc = Jacobi::new();
    pc.setup(&a).unwrap();

    let b = DistVector::from_fn(Layout::serial(n), |i| 1.0 + (i % 7) as f64);
    let mut x = DistVector::new(Layout::serial(n));
    let stats = BiCgStabSolver::new(Convergence {
        rtol: 1e-9,
        ..Convergence::default()
    })
    .solve(&a, Some(&pc), &b, &mut x)
    .unwrap();
    assert!(stats.reason.is_converged(), "{:?}", stats.reason);
    assert!(residual_norm(&a, &x, &b) < 1e-6);
}

#[test]
fn preonly_block_jacobi_is_direct_on_block_diagonal() {
    // Operator decouples into two 3x3 blocks; block-Jacobi with an exact
    // sub-solver makes preonly a direct method.
    let mut t = Vec::new();
    for blk in 0..2 {
        let off = blk * 3;
        for i in 0..3 {
            for j in 0..3 {
                let v = if i == j { 5.0 } else { 1.0 };
                t.push((off + i, off + j, v));
            }
        }
    }
    let a = DistMatrix::serial_from_triplets(6, 6, &t).unwrap();
    let mut pc = BlockJacobi::new(2);
    pc.set_sub_options(&OptionsDb::from_args(["-sub_pc_type", "lu"]));
    pc.setup(&a).unwrap();

    let b = DistVector::from_fn(Layout::serial(6), |i| (i + 1) as f64);
    let mut x = DistVector::new(Layout::serial(6));
    let stats = PreonlySolver::new().solve(&a, Some(&pc), &b, &mut x).unwrap();
    assert_eq!(stats.reason, ConvergedReason::ConvergedIts);
    assert!(stats.final_residual < 1e-10);
}

#[test]
fn bjacobi_through_the_registry() {
    let a = laplace_2d(5);
    let db = OptionsDb::from_args([
        "-pc_type",
        "bjacobi",
        "-pc_bjacobi_blocks",
        "5",
        "-sub_pc_type",
        "lu",
        "-ksp_rtol",
        "1e-8",
    ]);
    let reg = PcRegistry::with_builtins();
    let mut ksp = KspContext::new(KspKind::Cg);
    ksp.set_from_options(&db, &reg).unwrap();

    let b = DistVector::from_fn(Layout::serial(25), |_| 1.0);
    let mut x = DistVector::new(Layout::serial(25));
    let stats = ksp.solve(&a, &b, &mut x).unwrap();
    assert!(stats.reason.is_converged(), "{:?}", stats.reason);
    assert!(residual_norm(&a, &x, &b) < 1e-5);
}

#[test]
fn numeric_refresh_after_value_change() {
    use petrel::matrix::MatStructure;
    use petrel::vector::InsertMode;

    let mut a = laplace_2d(4);
    let db = OptionsDb::from_args(["-pc_type", "icc", "-ksp_rtol", "1e-9"]);
    let reg = PcRegistry::with_builtins();
    let mut ksp = KspContext::new(KspKind::Cg);
    ksp.set_from_options(&db, &reg).unwrap();

    let b = DistVector::from_fn(Layout::serial(16), |_| 1.0);
    let mut x = DistVector::new(Layout::serial(16));
    let first = ksp.solve(&a, &b, &mut x).unwrap();
    assert!(first.reason.is_converged());

    // Scale the diagonal in place: same pattern, new values.
    for i in 0..16 {
        a.set_values(&[i], &[i], &[6.0], InsertMode::Insert).unwrap();
    }
    let h = a.assembly_begin().unwrap();
    a.assembly_end(h).unwrap();
    ksp.operator_changed(&a, MatStructure::SameNonzeroPattern).unwrap();

    let mut x2 = DistVector::new(Layout::serial(16));
    let second = ksp.solve(&a, &b, &mut x2).unwrap();
    assert!(second.reason.is_converged());
    assert!(residual_norm(&a, &x2, &b) < 1e-6);
}

#[test]
fn seq_solvers_run_on_plain_vectors() {
    // The same drivers operate on SeqCsr and Vec<f64> directly.
    let n = 20;
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, 2.0));
        if i > 0 {
            t.push((i, i - 1, -1.0));
        }
        if i + 1 < n {
            t.push((i, i + 1, -1.0));
        }
    }
    let a = SeqCsr::from_triplets(n, n, &t).unwrap();
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];
    let stats = GmresSolver::new(
        Convergence {
            rtol: 1e-10,
            ..Convergence::default()
        },
        10,
    )
    .solve(&a, None, &b, &mut x)
    .unwrap();
    assert!(stats.reason.is_converged());
}
