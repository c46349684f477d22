use thiserror::Error;

use crate::token::Span;

/// Failures raised while executing three-address code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    #[error("Cannot apply '{operator}' to {left} and {right}")]
    OperandTypes {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Cannot apply '{operator}' to {operand}")]
    OperandType {
        operator: &'static str,
        operand: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Modulo by zero")]
    ModuloByZero,
    #[error("Integer out of range: {value}")]
    IntegerOutOfRange { value: String },
    #[error("Point out of range: {value}")]
    PointOutOfRange { value: String },
    #[error("Cannot convert {value} to {target}")]
    InvalidCast { value: String, target: &'static str },
    #[error("Input '{input}' is not a valid {expected}")]
    InvalidInput {
        input: String,
        expected: &'static str,
    },
    #[error("Index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("List index must be integer, not {found}")]
    IndexType { found: &'static str },
    #[error("Cannot index into {found}")]
    NotIndexable { found: &'static str },
    #[error("Cannot access a key of {found}")]
    NotAGroup { found: &'static str },
    #[error("Key {key} not found in group")]
    MissingKey { key: String },
    #[error("Group keys must be integer, point, text or state, not {found}")]
    InvalidKey { found: &'static str },
    #[error("Variable '{name}' used before it has a value")]
    UndefinedVariable { name: String },
    #[error("Function '{name}' is not defined")]
    UndefinedFunction { name: String },
    #[error("Function '{name}' expects {expected} argument(s) but got {found}")]
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("{function}(): {message}")]
    BuiltinArgument {
        function: &'static str,
        message: String,
    },
    #[error("Lists and groups cannot be nested more than {limit} levels deep")]
    NestingTooDeep { limit: usize },
    #[error("Maximum call depth of {depth} exceeded")]
    CallDepth { depth: usize },
    #[error("Execution stopped: Max steps ({max}) reached")]
    StepLimit { max: usize },
    #[error("Jump to unknown label '{label}'")]
    UnknownLabel { label: String },
    #[error("Malformed {op} instruction")]
    MalformedInstruction { op: &'static str },
    #[error("'throw' executed outside of a function")]
    ReturnOutsideFunction,
    #[error("Execution is not waiting for input")]
    NotWaiting,
    #[error("Execution has already started")]
    AlreadyStarted,
}

/// A runtime failure with the source position of the instruction that raised it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", render(.kind, .span))]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Span,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

fn render(kind: &RuntimeErrorKind, span: &Span) -> String {
    match kind {
        RuntimeErrorKind::StepLimit { .. }
        | RuntimeErrorKind::NotWaiting
        | RuntimeErrorKind::AlreadyStarted => kind.to_string(),
        _ => format!(
            "Runtime Error at line {}, column {}: {kind}",
            span.line, span.column
        ),
    }
}
