use criterion::{criterion_group, criterion_main, Criterion};
use plan_core::{Economy, FinalDemandTable, IoTables, Matrix, PlanConfig};
use plan_runtime::Simulation;

fn economy(n: usize) -> Economy {
    let cell = 0.4 / n as f64;
    let technical = Matrix::from_rows(vec![vec![cell; n]; n]).unwrap();
    let tables = IoTables {
        technical,
        value_added: vec![0.6; n],
        demand: FinalDemandTable {
            consumption: vec![100.0; n],
            investment: vec![10.0; n],
            government: vec![20.0; n],
            total_output: vec![220.0; n],
        },
    };
    Economy::new(
        tables,
        Matrix::from_diagonal(&vec![3.0; n]),
        vec![0.01; n],
        vec![0.0; n],
    )
    .unwrap()
}

fn bench_run(c: &mut Criterion) {
    let sim = Simulation::new(economy(12), PlanConfig::default()).unwrap();
    c.bench_function("sim_run_72_periods", |b| {
        b.iter(|| sim.run().unwrap())
    });

    let first = sim.initial().unwrap();
    c.bench_function("sim_step", |b| b.iter(|| sim.step(&first.state).unwrap()));
}

criterion_group!(benches, bench_run);
criterion_main!(benches);
