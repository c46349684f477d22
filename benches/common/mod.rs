#![allow(dead_code)]
use std::path::Path;
use std::sync::Arc;

use minima::ast::Program;
use minima::tac::TacProgram;
use minima::{lexer, parser, service};
use test_support::{CaseClass, load_cases};

/// Bench-enabled fixture programs as `(label, source)` pairs.
pub fn workloads() -> Vec<(String, String)> {
    let cases = load_cases(Path::new("tests/programs")).unwrap_or_else(|err| panic!("{err:#}"));
    cases
        .into_iter()
        .filter(|case| case.spec.bench.enabled && case.spec.class == CaseClass::RuntimeSuccess)
        .map(|case| {
            let source = case
                .read_source()
                .unwrap_or_else(|err| panic!("{err:#}"));
            (case.name, source)
        })
        .collect()
}

pub fn load_program(source: &str) -> Program {
    let lexed = lexer::tokenize(source);
    assert!(lexed.errors.is_empty(), "lexical errors in bench workload");
    let parsed = parser::parse_lexed(&lexed);
    assert!(parsed.errors.is_empty(), "syntax errors in bench workload");
    parsed.program
}

pub fn load_tac(source: &str) -> Arc<TacProgram> {
    let program = service::compile(source).unwrap_or_else(|rejected| panic!("{rejected}"));
    Arc::new(program)
}
