use thiserror::Error;

use crate::token::Span;

pub const MAX_IDENTIFIER_LENGTH: usize = 20;
pub const MAX_NUMBER_DIGITS: usize = 9;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("Identifier '{identifier}' exceeds maximum length of 20 characters")]
    IdentifierTooLong { identifier: String },
    #[error("Invalid identifier '{identifier}': identifiers must start with a lowercase letter")]
    InvalidIdentifierStart { identifier: String },
    #[error("Invalid symbol: '{symbol}'")]
    InvalidSymbol { symbol: char },
    #[error("Integer literal '{literal}' exceeds max of 9 digits")]
    IntegerTooLong { literal: String },
    #[error(
        "Point literal '{literal}' exceeds max of 9 digits before or after the decimal point"
    )]
    PointTooLong { literal: String },
    #[error("Incomplete point literal '{literal}'")]
    IncompletePoint { literal: String },
    #[error("Unterminated string literal: {literal}")]
    UnterminatedString { literal: String },
    #[error("Invalid escape sequence '\\{escape}' in string literal")]
    InvalidEscape { escape: char },
}

impl LexErrorKind {
    pub fn category(&self) -> &'static str {
        match self {
            Self::IdentifierTooLong { .. } | Self::InvalidIdentifierStart { .. } => {
                "Invalid Identifier"
            }
            Self::InvalidSymbol { .. } => "Invalid Symbol",
            Self::IntegerTooLong { .. } => "Invalid Integer Literal",
            Self::PointTooLong { .. } | Self::IncompletePoint { .. } => "Invalid Point Literal",
            Self::UnterminatedString { .. } | Self::InvalidEscape { .. } => "Invalid String Literal",
        }
    }
}

/// A lexical error together with where it was found.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    pub fn new(kind: LexErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}
