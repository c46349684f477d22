use thiserror::Error;

use crate::builtins::BuiltinFunction;
use crate::token::{Span, Token, TokenCategory, TokenKind};

/// A parse failure at one token, with every token kind that would have been accepted there.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    /// Text of the offending token, or `end of input`.
    pub unexpected: String,
    pub expected: Vec<TokenKind>,
    pub span: Span,
    pub end_of_input: bool,
    /// Raised by the nesting limit rather than by an unexpected token.
    pub too_deep: bool,
}

impl SyntaxError {
    /// Builds the diagnostic for `found`. `open_delimiter` is the innermost unclosed bracket.
    pub(super) fn at(
        found: &Token<'_>,
        expected: impl IntoIterator<Item = TokenKind>,
        open_delimiter: Option<TokenKind>,
    ) -> Self {
        let innermost_closer = open_delimiter.and_then(closer_for);
        let expected = expected
            .into_iter()
            .filter(|kind| !is_closer(*kind) || Some(*kind) == innermost_closer)
            .collect::<Vec<_>>();

        let end_of_input = found.kind == TokenKind::EOF;
        let unexpected = if end_of_input {
            "end of input".to_string()
        } else {
            found.lexeme.to_string()
        };

        let missing = innermost_closer.filter(|closer| {
            expected.contains(closer) && (end_of_input || (is_closer(found.kind) && found.kind != *closer))
        });
        let problem = match missing {
            Some(closer) => format!("missing '{}'", closer.describe()),
            None if end_of_input => "unexpected end of input".to_string(),
            None => format!("unexpected '{unexpected}'"),
        };

        Self {
            message: format!(
                "Syntax error at line {}, column {}: {problem}",
                found.span.line, found.span.column
            ),
            unexpected,
            expected,
            span: found.span,
            end_of_input,
            too_deep: false,
        }
    }

    /// Nesting beyond `limit` levels, reported at `found`.
    pub(super) fn too_deep(found: &Token<'_>, limit: usize) -> Self {
        let end_of_input = found.kind == TokenKind::EOF;
        Self {
            message: format!(
                "Syntax error at line {}, column {}: nesting exceeds {limit} levels",
                found.span.line, found.span.column
            ),
            unexpected: if end_of_input {
                "end of input".to_string()
            } else {
                found.lexeme.to_string()
            },
            expected: Vec::new(),
            span: found.span,
            end_of_input,
            too_deep: true,
        }
    }

    /// Expected tokens grouped for display.
    pub fn categories(&self) -> ExpectedCategories {
        let mut categories = ExpectedCategories::default();
        for kind in &self.expected {
            match kind.category() {
                TokenCategory::Literal => categories.literals.push(kind.describe().to_string()),
                TokenCategory::Keyword if *kind == TokenKind::Builtin => categories
                    .keywords
                    .extend(BuiltinFunction::ALL.iter().map(|f| f.name().to_string())),
                TokenCategory::Keyword => categories.keywords.push(kind.describe().to_string()),
                TokenCategory::Symbol => categories.symbols.push(kind.describe().to_string()),
                TokenCategory::Other => categories.others.push(kind.describe().to_string()),
            }
        }
        categories
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedCategories {
    pub literals: Vec<String>,
    pub keywords: Vec<String>,
    pub symbols: Vec<String>,
    pub others: Vec<String>,
}

fn is_closer(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
    )
}

fn closer_for(open: TokenKind) -> Option<TokenKind> {
    match open {
        TokenKind::LParen => Some(TokenKind::RParen),
        TokenKind::LBracket => Some(TokenKind::RBracket),
        TokenKind::LBrace => Some(TokenKind::RBrace),
        _ => None,
    }
}

pub type ParseResult<T> = Result<T, SyntaxError>;
