use thiserror::Error;

use crate::token::Span;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticErrorKind {
    #[error("Undeclared identifier '{name}'")]
    UndeclaredIdentifier { name: String },
    #[error("Variable '{name}' is already declared in the current scope")]
    AlreadyDeclared { name: String },
    #[error("Identifier '{name}' is already defined as a function")]
    DefinedAsFunction { name: String },
    #[error("Identifier '{name}' is already defined as a variable")]
    DefinedAsVariable { name: String },
    #[error("Function '{name}' is already defined")]
    FunctionRedefined { name: String },
    #[error("Function '{name}' is not defined")]
    UndefinedFunction { name: String },
    #[error("Function '{name}' expects {expected} argument(s) but got {found}")]
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("'{name}' is not a function")]
    NotAFunction { name: String },
    #[error("Cannot use function '{name}' as a value without calling it")]
    FunctionAsValue { name: String },
    #[error("Cannot reassign fixed variable '{name}'")]
    FixedReassignment { name: String },
    #[error("Duplicate parameter name '{name}'")]
    DuplicateParameter { name: String },
    #[error("Duplicate key {key} in group literal")]
    DuplicateGroupKey { key: String },
    #[error("Group keys must be integer, point, text or state, not {found}")]
    GroupKeyType { found: &'static str },
    #[error("'exit' used outside of a loop")]
    ExitOutsideLoop,
    #[error("'next' used outside of a loop")]
    NextOutsideLoop,
    #[error("'throw' used outside of a function")]
    ThrowOutsideFunction,
    #[error("Functions can only be defined at the top level")]
    NestedFunction,
    #[error("Condition of '{construct}' must be state, not {found}")]
    ConditionType {
        construct: &'static str,
        found: &'static str,
    },
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
    #[error("Cannot index into {found}")]
    IndexTarget { found: &'static str },
    #[error("List index must be integer, not {found}")]
    IndexType { found: &'static str },
    #[error("Cannot access a key of {found}")]
    KeyTarget { found: &'static str },
    #[error("Argument {position} of '{function}' must be {expected}, not {found}")]
    ArgumentType {
        function: &'static str,
        position: usize,
        expected: String,
        found: &'static str,
    },
    #[error("Cannot cast {found} to {target}")]
    InvalidCast {
        target: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub span: Span,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}
