use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, ensure};

use minima::interpreter::{DEFAULT_MAX_STEPS, Execution};
use minima::service;
use test_support::{Case, CaseClass, load_cases, normalize_output};

fn run_case(case: &Case) -> Result<Result<String>> {
    let source = case.read_source()?;
    let program = service::compile(&source)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Compiling {}", case.name))?;
    let mut inputs = case.inputs()?.into_iter();
    let mut execution = Execution::new(Arc::new(program), DEFAULT_MAX_STEPS);
    Ok(execution.run_to_end(|_| inputs.next()))
}

fn check_runtime_success(case: &Case) -> Result<()> {
    let output = run_case(case)?.with_context(|| format!("Running {}", case.name))?;
    assert_eq!(
        normalize_output(&output),
        case.expected_stdout()?,
        "Output mismatch for {}",
        case.name
    );
    Ok(())
}

fn check_frontend_error(case: &Case) -> Result<()> {
    let expected = case.expected_error()?;
    let source = case.read_source()?;
    let rejected = match service::compile(&source) {
        Ok(_) => anyhow::bail!("Expected frontend error in {}, but it compiled", case.name),
        Err(rejected) => rejected,
    };
    let messages = rejected
        .diagnostics
        .iter()
        .map(|diagnostic| diagnostic.message.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    ensure!(
        messages.contains(&expected),
        "Expected frontend error containing '{expected}' in {}, got '{messages}'",
        case.name
    );
    Ok(())
}

fn check_runtime_error(case: &Case) -> Result<()> {
    let expected = case.expected_error()?;
    let result = run_case(case)?;
    let Err(error) = result else {
        anyhow::bail!("Expected runtime error in {}, but it finished", case.name);
    };
    let actual = format!("{error:#}");
    ensure!(
        actual.contains(&expected),
        "Expected runtime error containing '{expected}' in {}, got '{actual}'",
        case.name
    );
    Ok(())
}

#[test]
fn runs_fixture_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for case in &cases {
        if case.spec.bench.enabled {
            ensure!(
                !case.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                case.name
            );
        }
        match case.spec.class {
            CaseClass::RuntimeSuccess => check_runtime_success(case)?,
            CaseClass::FrontendError => check_frontend_error(case)?,
            CaseClass::RuntimeError => check_runtime_error(case)?,
        }
    }
    Ok(())
}
