use criterion::{black_box, criterion_group, criterion_main, Criterion};
use plan_core::Matrix;
use plan_econ::{neumann, NeumannSolver};

fn uniform_matrix(n: usize, total: f64) -> Matrix {
    let cell = total / n as f64;
    Matrix::from_rows(vec![vec![cell; n]; n]).unwrap()
}

fn bench_neumann(c: &mut Criterion) {
    let a = uniform_matrix(12, 0.5);
    let d = vec![100.0; 12];
    c.bench_function("neumann_raw_12x12_k50", |b| {
        b.iter(|| neumann(black_box(&a), black_box(&d), 50))
    });

    let solver = NeumannSolver::new(uniform_matrix(60, 0.6)).unwrap();
    let d = vec![1.0; 60];
    c.bench_function("neumann_solve_60x60_k50", |b| {
        b.iter(|| solver.solve(black_box(&d), 50).unwrap())
    });
}

criterion_group!(benches, bench_neumann);
criterion_main!(benches);
