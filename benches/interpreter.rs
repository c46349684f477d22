mod common;

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use minima::interpreter::{DEFAULT_MAX_STEPS, Execution};

fn bench_interpreter(c: &mut Criterion) {
    for (label, source) in common::workloads() {
        let program = common::load_tac(&source);

        c.bench_function(&format!("interpreter_run_{label}"), |b| {
            b.iter(|| {
                let mut execution = Execution::new(Arc::clone(&program), DEFAULT_MAX_STEPS);
                let output = execution
                    .run_to_end(|prompt| panic!("bench workload asked for input: {prompt}"))
                    .expect("run");
                black_box(output);
            })
        });
    }
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
