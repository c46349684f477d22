use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use crate::tac::TacProgram;

mod builtins;
pub mod error;
mod input;
mod machine;
pub mod value;

pub use error::{RuntimeError, RuntimeErrorKind};
pub use input::DEFAULT_PROMPT;
pub use machine::{Frame, MAX_CALL_DEPTH, Outcome, PendingInput, Snapshot};
pub use value::Value;

/// Instructions one run may execute, counted across resumptions.
pub const DEFAULT_MAX_STEPS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Created,
    Running,
    WaitingForInput,
    Finished,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// What one `start` or `resume` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Lines printed since the previous call.
    pub output: Vec<String>,
    /// Set while the run waits for input.
    pub prompt: Option<String>,
}

impl Progress {
    pub fn is_waiting(&self) -> bool {
        self.prompt.is_some()
    }
}

/// A TAC program paired with the resumable state of one run.
#[derive(Debug, Clone)]
pub struct Execution {
    program: Arc<TacProgram>,
    snapshot: Snapshot,
    status: ExecutionStatus,
    max_steps: usize,
    /// Output lines already handed out.
    delivered: usize,
    /// Output interleaved with prompts and echoed answers.
    transcript: Vec<String>,
}

impl Execution {
    pub fn new(program: Arc<TacProgram>, max_steps: usize) -> Self {
        Self {
            program,
            snapshot: Snapshot::default(),
            status: ExecutionStatus::Created,
            max_steps,
            delivered: 0,
            transcript: Vec::new(),
        }
    }

    /// Continues from a previously captured snapshot.
    pub fn from_snapshot(program: Arc<TacProgram>, snapshot: Snapshot, max_steps: usize) -> Self {
        let status = match snapshot.pending_input {
            Some(_) => ExecutionStatus::WaitingForInput,
            None => ExecutionStatus::Created,
        };
        let delivered = snapshot.output.len();
        let transcript = snapshot.output.clone();
        Self {
            program,
            snapshot,
            status,
            max_steps,
            delivered,
            transcript,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn program(&self) -> &TacProgram {
        &self.program
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Every line printed so far.
    pub fn output(&self) -> &[String] {
        &self.snapshot.output
    }

    pub fn start(&mut self) -> Result<Progress, RuntimeError> {
        if self.status != ExecutionStatus::Created {
            return Err(RuntimeError::new(
                RuntimeErrorKind::AlreadyStarted,
                Default::default(),
            ));
        }
        self.advance()
    }

    /// Answers the pending `get()` and runs to the next suspension point.
    pub fn resume(&mut self, answer: &str) -> Result<Progress, RuntimeError> {
        if self.status != ExecutionStatus::WaitingForInput {
            return Err(RuntimeError::new(
                RuntimeErrorKind::NotWaiting,
                Default::default(),
            ));
        }
        let prompt = self
            .snapshot
            .pending_input
            .as_ref()
            .map(|pending| pending.prompt.clone())
            .unwrap_or_default();
        self.transcript.push(format!("{prompt} {answer}"));
        let span = self
            .snapshot
            .ip
            .checked_sub(1)
            .and_then(|index| self.program.instructions.get(index))
            .map(|instruction| instruction.span)
            .unwrap_or_default();
        if let Err(kind) = self.snapshot.provide_input(answer) {
            self.status = ExecutionStatus::Failed;
            return Err(RuntimeError::new(kind, span));
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<Progress, RuntimeError> {
        self.status = ExecutionStatus::Running;
        let outcome = self.snapshot.run(&self.program, self.max_steps);
        let output = self.snapshot.output[self.delivered..].to_vec();
        self.delivered = self.snapshot.output.len();
        self.transcript.extend(output.iter().cloned());

        match outcome {
            Ok(Outcome::Suspended { prompt }) => {
                self.status = ExecutionStatus::WaitingForInput;
                debug!(steps = self.snapshot.steps, %prompt, "execution suspended");
                Ok(Progress {
                    output,
                    prompt: Some(prompt),
                })
            }
            Ok(Outcome::Finished) => {
                self.status = ExecutionStatus::Finished;
                debug!(steps = self.snapshot.steps, "execution finished");
                Ok(Progress {
                    output,
                    prompt: None,
                })
            }
            Err(error) => {
                self.status = ExecutionStatus::Failed;
                debug!(%error, "execution failed");
                Err(error)
            }
        }
    }

    /// Drives the run to completion, asking `answer` for every `get()`. Returns all output.
    pub fn run_to_end(&mut self, mut answer: impl FnMut(&str) -> Option<String>) -> Result<String> {
        let mut progress = self.start()?;
        while let Some(prompt) = progress.prompt {
            let Some(input) = answer(&prompt) else {
                bail!("no input available for prompt '{prompt}'");
            };
            progress = self
                .resume(&input)
                .with_context(|| format!("while answering '{prompt}'"))?;
        }
        Ok(self.snapshot.output.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser, tac};
    use indoc::indoc;

    fn execution(source: &str) -> Execution {
        execution_with_limit(source, DEFAULT_MAX_STEPS)
    }

    fn execution_with_limit(source: &str, max_steps: usize) -> Execution {
        let parsed = parser::parse_lexed(&lexer::tokenize(source));
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        Execution::new(Arc::new(tac::generate(&parsed.program)), max_steps)
    }

    fn run(source: &str) -> std::result::Result<String, String> {
        let mut execution = execution(source);
        match execution.start() {
            Ok(progress) => {
                assert!(!progress.is_waiting());
                Ok(progress.output.join("\n"))
            }
            Err(error) => Err(error.to_string()),
        }
    }

    #[test]
    fn suspends_for_input_and_resumes() {
        let mut execution = execution(r#"var x = get(); show("Hello " + x);"#);
        let progress = execution.start().unwrap();
        assert_eq!(progress.prompt.as_deref(), Some(DEFAULT_PROMPT));
        assert!(progress.output.is_empty());
        assert_eq!(execution.status(), ExecutionStatus::WaitingForInput);

        let progress = execution.resume("World").unwrap();
        assert_eq!(progress.output, vec!["Hello World".to_string()]);
        assert_eq!(progress.prompt, None);
        assert_eq!(execution.status(), ExecutionStatus::Finished);
    }

    #[test]
    fn keeps_output_order_across_inputs() {
        let mut execution = execution(indoc! {r#"
            show("first");
            var a = get("A?");
            show("got " + a);
            var b = get("B?");
            show("got " + b);
        "#});
        let first = execution.start().unwrap();
        assert_eq!(first.output, vec!["first"]);
        assert_eq!(first.prompt.as_deref(), Some("A?"));

        let second = execution.resume("1").unwrap();
        assert_eq!(second.output, vec!["got 1"]);
        assert_eq!(second.prompt.as_deref(), Some("B?"));

        let third = execution.resume("two").unwrap();
        assert_eq!(third.output, vec!["got two"]);
        assert!(!third.is_waiting());
        assert_eq!(
            execution.transcript(),
            ["first", "A? 1", "got 1", "B? two", "got two"]
        );
    }

    #[test]
    fn input_inside_a_function_lands_in_its_frame() {
        let mut execution = execution(indoc! {r#"
            func ask(label) {
                var answer = integer(get(label));
                throw answer * 2;
            }
            show(ask("n?") + 1);
        "#});
        assert_eq!(execution.start().unwrap().prompt.as_deref(), Some("n?"));
        assert_eq!(execution.resume("20").unwrap().output, vec!["41"]);
    }

    #[test]
    fn typed_input_is_validated() {
        let mut execution = execution("var n = integer(get()); show(n);");
        execution.start().unwrap();
        let error = execution.resume("abc").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Runtime Error at line 1, column 17: Input 'abc' is not a valid integer"
        );
        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert!(execution.resume("1").is_err());
    }

    #[test]
    fn runs_recursion_and_loops() {
        let output = run(indoc! {r#"
            func fact(n) {
                checkif (n <= 1) {
                    throw 1;
                }
                throw n * fact(n - 1);
            }
            var total = 0;
            each (var i = 1; i <= 5; i++) {
                checkif (i == 4) {
                    next;
                }
                total += fact(i);
            }
            show(total);
            var items = [3, 1, 2];
            items[0] = 9;
            show(sorted(items));
            group pos { "x": 1, "y": 2 }
            pos{"x"} += 10;
            show(pos);
        "#})
        .unwrap();
        assert_eq!(output, indoc! {r#"
            129
            [1, 2, 9]
            {"x": 11, "y": 2}"#});
    }

    #[test]
    fn reports_runtime_errors_with_position() {
        let error = run(indoc! {r#"
            var zero = 0;
            show(10 / zero);
        "#})
        .unwrap_err();
        assert_eq!(error, "Runtime Error at line 2, column 6: Division by zero");

        let error = run("var items = [1]; show(items[3]);").unwrap_err();
        assert_eq!(
            error,
            "Runtime Error at line 1, column 23: Index 3 is out of bounds for length 1"
        );
    }

    #[test]
    fn limits_value_nesting() {
        let error = run(indoc! {"
            var nest = [];
            repeat (YES) {
                nest = [nest];
            }
        "})
        .unwrap_err();
        assert!(error.starts_with("Runtime Error at line 3"));
        assert!(error.ends_with("Lists and groups cannot be nested more than 100 levels deep"));

        let concatenated = run("var inner = [[1]]; var outer = [] + inner; show(outer);");
        assert_eq!(concatenated.as_deref(), Ok("[[1]]"));
    }

    #[test]
    fn stops_runaway_loops() {
        let mut execution = execution_with_limit("repeat (YES) { }", 50);
        let error = execution.start().unwrap_err();
        assert_eq!(error.to_string(), "Execution stopped: Max steps (50) reached");
        assert_eq!(execution.status(), ExecutionStatus::Failed);
    }

    #[test]
    fn resumes_from_a_serialized_snapshot() {
        let mut execution = execution(r#"show("a"); var x = get(); show(x + 1);"#);
        execution.start().unwrap();
        let saved = serde_json::to_string(execution.snapshot()).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&saved).unwrap();

        let mut restored =
            Execution::from_snapshot(Arc::clone(&execution.program), snapshot, DEFAULT_MAX_STEPS);
        assert_eq!(restored.status(), ExecutionStatus::WaitingForInput);
        assert_eq!(restored.resume("41").unwrap().output, vec!["42"]);
        assert_eq!(restored.output(), ["a", "42"]);
    }

    #[test]
    fn run_to_end_answers_every_prompt() {
        let mut answers = vec!["3".to_string(), "4".to_string()].into_iter();
        let output = execution("var a = get(); var b = get(); show(a * b);")
            .run_to_end(|_| answers.next())
            .unwrap();
        assert_eq!(output, "12");

        let error = execution("var a = get();").run_to_end(|_| None).unwrap_err();
        assert!(error.to_string().contains("no input available"));
    }
}
