use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::ast::tree::TreeNode;
use crate::builtins::{self, BuiltinFunction};
use crate::diagnostic::{self, Diagnostic};
use crate::interpreter::{DEFAULT_MAX_STEPS, Execution, Progress, RuntimeError};
use crate::lexer::{self, Lexed};
use crate::parser::{self, Parsed};
use crate::registry::{ExecutionRegistry, RegistryError};
use crate::semantic::{self, Analysis, Symbol, SymbolKind};
use crate::tac::{self, TacProgram};
use crate::token::TokenView;

/// Knobs of the service layer, filled in from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub max_steps: usize,
    pub execution_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            execution_ttl: Duration::from_secs(300),
        }
    }
}

/// Outcome of the front-end stages for one source text.
pub struct Frontend<'a> {
    pub lexed: Lexed<'a>,
    pub parsed: Parsed,
    /// Only present when lexing and parsing found nothing.
    pub analysis: Option<Analysis>,
}

impl Frontend<'_> {
    pub fn lexical_errors(&self) -> Vec<Diagnostic> {
        diagnostic::collect(&self.lexed.errors)
    }

    pub fn syntax_errors(&self) -> Vec<Diagnostic> {
        diagnostic::collect(&self.parsed.errors)
    }

    pub fn semantic_errors(&self) -> Vec<Diagnostic> {
        self.analysis
            .as_ref()
            .map(|analysis| diagnostic::collect(&analysis.errors))
            .unwrap_or_default()
    }

    fn counts(&self) -> (usize, usize, usize) {
        (
            self.lexed.errors.len(),
            self.parsed.errors.len(),
            self.analysis.as_ref().map_or(0, |analysis| analysis.errors.len()),
        )
    }
}

/// Runs lexer and parser, then the analyzer if both succeeded.
pub fn run_frontend(code: &str) -> Frontend<'_> {
    let lexed = info_span!("lex").in_scope(|| lexer::tokenize(code));
    let parsed = info_span!("parse").in_scope(|| parser::parse_lexed(&lexed));
    let analysis = (lexed.errors.is_empty() && parsed.errors.is_empty())
        .then(|| info_span!("analyze").in_scope(|| semantic::analyze(&parsed.program)));
    Frontend {
        lexed,
        parsed,
        analysis,
    }
}

/// A program that may not run because the front-end reported problems.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "Cannot execute: {lexical} lexical, {syntax} syntax and {semantic} semantic error(s) found. Fix them before running the program."
)]
pub struct Rejected {
    pub lexical: usize,
    pub syntax: usize,
    pub semantic: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Checks a program and lowers it to three-address code.
pub fn compile(code: &str) -> Result<TacProgram, Rejected> {
    let frontend = run_frontend(code);
    let (lexical, syntax, semantic) = frontend.counts();
    if lexical + syntax + semantic > 0 {
        let mut diagnostics = frontend.lexical_errors();
        diagnostics.extend(frontend.syntax_errors());
        diagnostics.extend(frontend.semantic_errors());
        return Err(Rejected {
            lexical,
            syntax,
            semantic,
            diagnostics,
        });
    }
    Ok(info_span!("generate").in_scope(|| tac::generate(&frontend.parsed.program)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub tokens: Vec<TokenView>,
    pub lexical_errors: Vec<Diagnostic>,
    pub syntax_errors: Vec<Diagnostic>,
    pub semantic_errors: Vec<Diagnostic>,
    pub terminal_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(rename = "formattedTAC", skip_serializing_if = "Option::is_none")]
    pub formatted_tac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_for_input: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AstResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<TreeNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolTableResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<Symbol>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request handling independent of the transport. Holds the only shared mutable state,
/// the execution registry.
pub struct Service {
    config: ServiceConfig,
    registry: ExecutionRegistry,
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            registry: ExecutionRegistry::new(config.execution_ttl),
        }
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    pub fn analyze(&self, code: &str) -> AnalyzeResponse {
        let _span = info_span!("analyze_full").entered();
        let frontend = run_frontend(code);
        let (lexical, syntax, semantic) = frontend.counts();

        let mut log = Vec::new();
        if let Some(analysis) = &frontend.analysis {
            log.extend(analysis.symbols().iter().map(describe_symbol));
        }
        let verdict = if lexical + syntax + semantic == 0 {
            "Analysis completed successfully"
        } else {
            "Analysis found problems"
        };
        log.push(format!(
            "{verdict}: {lexical} lexical, {syntax} syntax and {semantic} semantic error(s)"
        ));
        info!(lexical, syntax, semantic, "analyzed source");

        AnalyzeResponse {
            tokens: frontend.lexed.views(),
            lexical_errors: frontend.lexical_errors(),
            syntax_errors: frontend.syntax_errors(),
            semantic_errors: frontend.semantic_errors(),
            terminal_output: log.join("\n"),
        }
    }

    /// Starts a fresh run. Runs that stop at a `get()` are parked in the registry.
    pub fn execute(&self, code: &str) -> ExecuteResponse {
        let _span = info_span!("execute").entered();
        let program = match compile(code) {
            Ok(program) => program,
            Err(rejected) => {
                info!(
                    lexical = rejected.lexical,
                    syntax = rejected.syntax,
                    semantic = rejected.semantic,
                    "refused to execute"
                );
                return ExecuteResponse::failure(rejected.to_string());
            }
        };
        let formatted = program.format();
        let log = vec![format!(
            "Generated {} TAC instruction(s)",
            program.instructions.len()
        )];
        let mut execution = Execution::new(Arc::new(program), self.config.max_steps);
        let result = execution.start();
        let id = match &result {
            Ok(progress) if progress.is_waiting() => Some(self.registry.create(execution)),
            _ => None,
        };
        respond(result, formatted, id, log)
    }

    /// Answers the pending `get()` of a parked run.
    pub fn resume(&self, id: &str, input: &str) -> Result<ExecuteResponse, RegistryError> {
        let _span = info_span!("resume", execution_id = %id).entered();
        self.registry
            .with_execution(id, |execution| {
                let log = vec![format!("Input received: {input}")];
                let result = execution.resume(input);
                let formatted = execution.program().format();
                let id = match &result {
                    Ok(progress) if progress.is_waiting() => Some(id.to_string()),
                    _ => None,
                };
                respond(result, formatted, id, log)
            })
            .inspect_err(|error| warn!(%error, "resume rejected"))
    }

    pub fn ast(&self, code: &str) -> AstResponse {
        let _span = info_span!("get_ast").entered();
        let lexed = lexer::tokenize(code);
        let parsed = parser::parse_lexed(&lexed);
        if !lexed.errors.is_empty() || !parsed.errors.is_empty() {
            return AstResponse {
                success: false,
                ast: None,
                error: Some(format!(
                    "Cannot build the syntax tree: {} lexical and {} syntax error(s) found",
                    lexed.errors.len(),
                    parsed.errors.len()
                )),
            };
        }
        AstResponse {
            success: true,
            ast: Some(parsed.program.to_tree()),
            error: None,
        }
    }

    pub fn symbol_table(&self, code: &str, include_builtins: bool) -> SymbolTableResponse {
        let _span = info_span!("get_symbol_table").entered();
        let frontend = run_frontend(code);
        let Some(analysis) = &frontend.analysis else {
            let (lexical, syntax, _) = frontend.counts();
            return SymbolTableResponse {
                success: false,
                symbols: None,
                error: Some(format!(
                    "Cannot build the symbol table: {lexical} lexical and {syntax} syntax error(s) found"
                )),
            };
        };
        let mut symbols = analysis.symbols();
        if include_builtins {
            symbols.extend(BuiltinFunction::ALL.into_iter().map(Symbol::builtin));
        }
        SymbolTableResponse {
            success: true,
            symbols: Some(symbols),
            error: None,
        }
    }

    pub fn builtin_functions(&self) -> Vec<&'static str> {
        builtins::names()
    }
}

fn respond(
    result: Result<Progress, RuntimeError>,
    formatted: String,
    execution_id: Option<String>,
    mut log: Vec<String>,
) -> ExecuteResponse {
    match result {
        Ok(progress) => {
            log.extend(progress.output.iter().cloned());
            match &progress.prompt {
                Some(prompt) => log.push(format!("Waiting for input: {prompt}")),
                None => log.push("Execution finished".to_string()),
            }
            ExecuteResponse {
                success: true,
                output: Some(progress.output.join("\n")),
                formatted_tac: Some(formatted),
                waiting_for_input: Some(progress.is_waiting()),
                input_prompt: progress.prompt,
                execution_id,
                terminal_output: Some(log.join("\n")),
                error: None,
            }
        }
        Err(error) => {
            log.push(format!("Error: {error}"));
            ExecuteResponse {
                formatted_tac: Some(formatted),
                terminal_output: Some(log.join("\n")),
                ..ExecuteResponse::failure(error.to_string())
            }
        }
    }
}

fn describe_symbol(symbol: &Symbol) -> String {
    match symbol.kind {
        SymbolKind::Function => format!(
            "Function '{}' defined at line {}",
            symbol.name, symbol.line
        ),
        SymbolKind::Parameter => format!(
            "Declared parameter '{}' in scope {} at line {}",
            symbol.name, symbol.scope, symbol.line
        ),
        SymbolKind::Variable if symbol.scope == "global" => format!(
            "Declared global variable '{}' at line {}",
            symbol.name, symbol.line
        ),
        SymbolKind::Variable => format!(
            "Declared variable '{}' in scope {} at line {}",
            symbol.name, symbol.scope, symbol.line
        ),
    }
}
