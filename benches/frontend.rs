mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use minima::{lexer, parser, semantic, tac};

fn bench_frontend(c: &mut Criterion) {
    for (label, source) in common::workloads() {
        let lexed = lexer::tokenize(&source);
        let program = common::load_program(&source);

        c.bench_function(&format!("frontend_tokenize_{label}"), |b| {
            b.iter(|| {
                let out = lexer::tokenize(black_box(&source));
                black_box(out.tokens.len());
            })
        });

        c.bench_function(&format!("frontend_parse_only_{label}"), |b| {
            b.iter(|| {
                let out = parser::parse_lexed(black_box(&lexed));
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_analyze_{label}"), |b| {
            b.iter(|| {
                let out = semantic::analyze(black_box(&program));
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_tac_{label}"), |b| {
            b.iter(|| {
                let out = tac::generate(black_box(&program));
                black_box(out);
            })
        });
    }
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
