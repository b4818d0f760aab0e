//! Component Table Benchmarks
//!
//! Measures the symbolic work behind tensor fields:
//!
//! ### 1. Symmetrization (`benchmark_symmetrize`)
//! Symmetrizes and antisymmetrizes generic rank-3 components over all three slots,
//! for several dimensions.
//!
//! ### 2. Contraction (`benchmark_contract`)
//! Contracts a generic (1, 1) tensor with a vector, and a symmetric (0, 2) tensor
//! with two vectors.
//!
//! ### 3. Change of Frame (`benchmark_change_of_frame`)
//! Derives the components of a vector field in a rotated frame, once through a
//! registered change of frame and once through a composed two-hop path.
//!
//! ## Usage
//!
//! Run with: `cargo bench --bench components`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sym_manifolds::prelude::*;

/// Components whose entries are distinct symbols `a_i_j_k`.
fn generic(manifold: &Manifold, frame: FrameId, variances: &[Variance]) -> Components {
    let slots = variances
        .iter()
        .map(|variance| match variance {
            Variance::Contra => Slot::contra(frame, 0, manifold.dim()),
            Variance::Co => Slot::co(frame, 0, manifold.dim()),
        })
        .collect();
    let mut components = Components::new(slots, Symmetry::none()).unwrap();
    for index in components.indices() {
        let name = index.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("_");
        components.set(&index, Expr::var(format!("a_{name}"))).unwrap();
    }
    components
}

fn cartesian(dim: usize) -> (Manifold, FrameId) {
    let mut manifold = Manifold::new(dim, "E");
    let root = manifold.root();
    let coordinates = (0..dim).map(|i| format!("x{i}")).collect::<Vec<_>>().join(" ");
    let chart = manifold.chart(root, "X", &coordinates).unwrap();
    let frame = manifold.coordinate_frame(chart).unwrap();
    (manifold, frame)
}

fn benchmark_symmetrize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Symmetrization");
    for dim in [2, 3, 4] {
        let (manifold, frame) = cartesian(dim);
        let components = generic(&manifold, frame, &[Variance::Co; 3]);
        group.bench_with_input(BenchmarkId::new("symmetrize", dim), &components, |b, comps| {
            b.iter(|| black_box(comps.symmetrize(&[0, 1, 2]).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("antisymmetrize", dim), &components, |b, comps| {
            b.iter(|| black_box(comps.antisymmetrize(&[0, 1, 2]).unwrap()))
        });
    }
    group.finish();
}

fn benchmark_contract(c: &mut Criterion) {
    let mut group = c.benchmark_group("Contraction");
    for dim in [2, 3, 4] {
        let (manifold, frame) = cartesian(dim);
        let endomorphism = generic(&manifold, frame, &[Variance::Contra, Variance::Co]);
        let vector = generic(&manifold, frame, &[Variance::Contra]);
        let metric = generic(&manifold, frame, &[Variance::Co, Variance::Co])
            .symmetrize(&[0, 1])
            .unwrap();
        group.bench_with_input(BenchmarkId::new("apply", dim), &dim, |b, _| {
            b.iter(|| black_box(endomorphism.contract(1, &vector, 0).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("norm", dim), &dim, |b, _| {
            b.iter(|| {
                let partial = metric.contract(0, &vector, 0).unwrap();
                black_box(partial.contract(0, &vector, 0).unwrap())
            })
        });
    }
    group.finish();
}

fn benchmark_change_of_frame(c: &mut Criterion) {
    let (mut manifold, cartesian_frame) = cartesian(2);
    let root = manifold.root();
    let rotated = manifold.vector_frame(root, "e").unwrap();
    let twice = manifold.vector_frame(root, "f").unwrap();
    let rotation = SymMatrix::parse_rows(&[&["0", "-1"], &["1", "0"]]).unwrap();
    manifold
        .add_frame_change(cartesian_frame, rotated, rotation.clone())
        .unwrap();
    manifold.add_frame_change(rotated, twice, rotation).unwrap();

    let mut v = manifold.vector_field(root, Some("v")).unwrap();
    {
        let comps = v.set_comp(&manifold, cartesian_frame).unwrap();
        comps.set(&[0], Expr::var("x0")).unwrap();
        comps.set(&[1], Expr::var("x1")).unwrap();
    }

    let mut group = c.benchmark_group("Change of Frame");
    group.bench_function("registered", |b| {
        b.iter(|| black_box(v.derive_comp(&manifold, rotated).unwrap()))
    });
    group.bench_function("composed", |b| {
        b.iter(|| black_box(v.derive_comp(&manifold, twice).unwrap()))
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_symmetrize,
    benchmark_contract,
    benchmark_change_of_frame
);
criterion_main!(benches);
