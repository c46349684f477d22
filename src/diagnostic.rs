use serde::Serialize;

use crate::lexer::LexError;
use crate::parser::SyntaxError;
use crate::semantic::SemanticError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Lexical,
    Syntax,
    Semantic,
}

/// A problem reported to clients, whatever stage found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
    #[serde(flatten)]
    pub expected: Option<ExpectedTokens>,
}

/// Continuations a syntax error could have accepted, grouped for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedTokens {
    pub unexpected: String,
    pub expected: Vec<String>,
    pub literals: Vec<String>,
    pub keywords: Vec<String>,
    pub symbols: Vec<String>,
    pub others: Vec<String>,
    pub is_end_of_input: bool,
}

impl From<&LexError> for Diagnostic {
    fn from(error: &LexError) -> Self {
        Self {
            kind: DiagnosticKind::Lexical,
            message: error.to_string(),
            line: error.span.line,
            column: error.span.column,
            category: Some(error.kind.category()),
            expected: None,
        }
    }
}

impl From<&SyntaxError> for Diagnostic {
    fn from(error: &SyntaxError) -> Self {
        let categories = error.categories();
        Self {
            kind: DiagnosticKind::Syntax,
            message: error.to_string(),
            line: error.span.line,
            column: error.span.column,
            category: None,
            expected: Some(ExpectedTokens {
                unexpected: error.unexpected.clone(),
                expected: error
                    .expected
                    .iter()
                    .map(|kind| kind.describe().to_string())
                    .collect(),
                literals: categories.literals,
                keywords: categories.keywords,
                symbols: categories.symbols,
                others: categories.others,
                is_end_of_input: error.end_of_input,
            }),
        }
    }
}

impl From<&SemanticError> for Diagnostic {
    fn from(error: &SemanticError) -> Self {
        Self {
            kind: DiagnosticKind::Semantic,
            message: error.to_string(),
            line: error.span.line,
            column: error.span.column,
            category: None,
            expected: None,
        }
    }
}

pub fn collect<'a, E: 'a>(errors: impl IntoIterator<Item = &'a E>) -> Vec<Diagnostic>
where
    Diagnostic: From<&'a E>,
{
    errors.into_iter().map(Diagnostic::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};

    #[test]
    fn syntax_diagnostics_carry_expected_categories() {
        let lexed = lexer::tokenize("show(1;");
        let parsed = parser::parse_lexed(&lexed);
        let diagnostics = collect(&parsed.errors);
        let json = serde_json::to_value(&diagnostics[0]).unwrap();
        assert_eq!(json["type"], "syntax");
        assert_eq!(json["line"], 1);
        assert_eq!(json["column"], 7);
        assert_eq!(json["unexpected"], ";");
        assert_eq!(json["isEndOfInput"], false);
        assert!(json["symbols"].as_array().unwrap().contains(&")".into()));
        assert!(json.get("category").is_none());
    }

    #[test]
    fn lexical_diagnostics_carry_a_category() {
        let lexed = lexer::tokenize("var x = 1 @ 2;");
        let json = serde_json::to_value(collect(&lexed.errors)).unwrap();
        assert_eq!(json[0]["type"], "lexical");
        assert_eq!(json[0]["category"], "Invalid Symbol");
        assert_eq!(json[0]["message"], "Invalid symbol: '@'");
        assert!(json[0].get("literals").is_none());
    }
}
