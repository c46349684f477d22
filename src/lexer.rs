use std::{iter::Peekable, str::CharIndices};

use tracing::debug;

use crate::builtins::BuiltinFunction;
use crate::token::{Span, Token, TokenKind, TokenView};

pub mod error;

pub use error::{LexError, LexErrorKind};
use error::{MAX_IDENTIFIER_LENGTH, MAX_NUMBER_DIGITS};

/// Everything the lexer produced for one source text. Tokens include trivia and a final EOF.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexed<'a> {
    pub tokens: Vec<Token<'a>>,
    pub errors: Vec<LexError>,
}

impl<'a> Lexed<'a> {
    /// Tokens the parser consumes: trivia removed, EOF kept.
    pub fn significant(&self) -> Vec<Token<'a>> {
        self.tokens
            .iter()
            .filter(|token| !token.kind.is_trivia())
            .cloned()
            .collect()
    }

    /// Token stream as shown to clients, without the EOF marker.
    pub fn views(&self) -> Vec<TokenView> {
        self.tokens
            .iter()
            .filter(|token| token.kind != TokenKind::EOF)
            .map(TokenView::from)
            .collect()
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
            errors: Vec::new(),
        }
    }

    /// Scans the whole input. Malformed input is reported in `errors`, never by failing.
    pub fn tokenize(mut self) -> Lexed<'a> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        let end = self.input.len();
        tokens.push(Token::new(
            TokenKind::EOF,
            "",
            Span {
                start: end,
                end,
                line: self.line,
                column: self.column,
            },
        ));
        debug!(
            tokens = tokens.len(),
            errors = self.errors.len(),
            "tokenized source"
        );
        Lexed {
            tokens,
            errors: self.errors,
        }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            let (start, ch) = *self.chars.peek()?;
            let line = self.line;
            let column = self.column;

            let kind = match ch {
                '\n' => {
                    self.advance_char();
                    TokenKind::Newline
                }
                c if c.is_whitespace() => {
                    self.advance_while(|c| c != '\n' && c.is_whitespace());
                    TokenKind::Whitespace
                }
                '#' => {
                    self.advance_while(|c| c != '\n');
                    TokenKind::Comment
                }
                '"' | '\'' => self.read_text(ch, start, line, column),
                c if c.is_ascii_alphabetic() || c == '_' => self.read_word(start, line, column),
                c if c.is_ascii_digit() => self.read_number(start, line, column),
                _ => match self.read_symbol(ch) {
                    Some(kind) => kind,
                    None => {
                        self.advance_char();
                        self.errors.push(LexError::new(
                            LexErrorKind::InvalidSymbol { symbol: ch },
                            Span {
                                start,
                                end: start + ch.len_utf8(),
                                line,
                                column,
                            },
                        ));
                        continue;
                    }
                },
            };

            let end = self.current_index();
            let input = self.input;
            return Some(Token::new(
                kind,
                &input[start..end],
                Span {
                    start,
                    end,
                    line,
                    column,
                },
            ));
        }
    }

    fn read_word(&mut self, start: usize, line: usize, column: usize) -> TokenKind {
        self.advance_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let end = self.current_index();
        let input = self.input;
        let word = &input[start..end];
        let span = Span {
            start,
            end,
            line,
            column,
        };

        if word == "YES" || word == "NO" {
            return TokenKind::StateLiteral;
        }
        if let Some(keyword) = TokenKind::keyword(word) {
            return keyword;
        }
        if BuiltinFunction::from_name(word).is_some() {
            return TokenKind::Builtin;
        }

        if !word.starts_with(|c: char| c.is_ascii_lowercase()) {
            self.errors.push(LexError::new(
                LexErrorKind::InvalidIdentifierStart {
                    identifier: word.to_string(),
                },
                span,
            ));
        } else if word.chars().count() > MAX_IDENTIFIER_LENGTH {
            self.errors.push(LexError::new(
                LexErrorKind::IdentifierTooLong {
                    identifier: word.to_string(),
                },
                span,
            ));
        }
        TokenKind::Identifier
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> TokenKind {
        self.advance_while(|c| c.is_ascii_digit());
        let whole_end = self.current_index();
        let whole_digits = significant_digits(&self.input[start..whole_end]);

        let is_point = matches!(self.chars.peek(), Some(&(_, '.')));
        if !is_point {
            if whole_digits > MAX_NUMBER_DIGITS {
                let span = self.span_from(start, line, column);
                self.errors.push(LexError::new(
                    LexErrorKind::IntegerTooLong {
                        literal: self.input[start..whole_end].to_string(),
                    },
                    span,
                ));
            }
            return TokenKind::IntegerLiteral;
        }

        self.advance_char();
        let fraction_start = self.current_index();
        self.advance_while(|c| c.is_ascii_digit());
        let end = self.current_index();
        let literal = self.input[start..end].to_string();
        let fraction_digits = end - fraction_start;

        let span = self.span_from(start, line, column);
        if fraction_digits == 0 {
            self.errors
                .push(LexError::new(LexErrorKind::IncompletePoint { literal }, span));
        } else if whole_digits > MAX_NUMBER_DIGITS || fraction_digits > MAX_NUMBER_DIGITS {
            self.errors
                .push(LexError::new(LexErrorKind::PointTooLong { literal }, span));
        }
        TokenKind::PointLiteral
    }

    fn read_text(&mut self, quote: char, start: usize, line: usize, column: usize) -> TokenKind {
        self.advance_char();
        loop {
            match self.chars.peek().copied() {
                Some((_, c)) if c == quote => {
                    self.advance_char();
                    return TokenKind::TextLiteral;
                }
                Some((escape_index, '\\')) => {
                    self.advance_char();
                    match self.chars.peek().copied() {
                        Some((_, 'n' | 't' | 'r' | '\\' | '"' | '\'')) => {
                            self.advance_char();
                        }
                        Some((_, '\n')) | None => {}
                        Some((_, other)) => {
                            self.advance_char();
                            self.errors.push(LexError::new(
                                LexErrorKind::InvalidEscape { escape: other },
                                Span {
                                    start: escape_index,
                                    end: escape_index + 1 + other.len_utf8(),
                                    line: self.line,
                                    column: self.column - 2,
                                },
                            ));
                        }
                    }
                }
                Some((_, '\n')) | None => {
                    // Resynchronize at the line break; the newline is lexed normally.
                    let span = self.span_from(start, line, column);
                    let literal = self.input[start..span.end].to_string();
                    self.errors
                        .push(LexError::new(LexErrorKind::UnterminatedString { literal }, span));
                    return TokenKind::TextLiteral;
                }
                Some(_) => {
                    self.advance_char();
                }
            }
        }
    }

    fn read_symbol(&mut self, ch: char) -> Option<TokenKind> {
        let single = match ch {
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ':' => Some(TokenKind::Colon),
            ',' => Some(TokenKind::Comma),
            ';' => Some(TokenKind::Semicolon),
            '~' => Some(TokenKind::Tilde),
            _ => None,
        };
        if single.is_some() {
            self.advance_char();
            return single;
        }

        let (alone, pairs): (Option<TokenKind>, &[(char, TokenKind)]) = match ch {
            '+' => (
                Some(TokenKind::Plus),
                &[('+', TokenKind::PlusPlus), ('=', TokenKind::PlusEqual)],
            ),
            '-' => (
                Some(TokenKind::Minus),
                &[('-', TokenKind::MinusMinus), ('=', TokenKind::MinusEqual)],
            ),
            '*' => (Some(TokenKind::Star), &[('=', TokenKind::StarEqual)]),
            '/' => (Some(TokenKind::Slash), &[('=', TokenKind::SlashEqual)]),
            '%' => (Some(TokenKind::Percent), &[('=', TokenKind::PercentEqual)]),
            '=' => (Some(TokenKind::Assign), &[('=', TokenKind::EqualEqual)]),
            '!' => (Some(TokenKind::Bang), &[('=', TokenKind::BangEqual)]),
            '>' => (Some(TokenKind::Greater), &[('=', TokenKind::GreaterEqual)]),
            '<' => (Some(TokenKind::Less), &[('=', TokenKind::LessEqual)]),
            '&' => (None, &[('&', TokenKind::AndAnd)]),
            '|' => (None, &[('|', TokenKind::OrOr)]),
            _ => return None,
        };

        let mut lookahead = self.chars.clone();
        lookahead.next();
        let second = lookahead.peek().map(|&(_, c)| c);
        if let Some(&(_, kind)) = pairs.iter().find(|(c, _)| Some(*c) == second) {
            self.advance_char();
            self.advance_char();
            return Some(kind);
        }
        if alone.is_some() {
            self.advance_char();
        }
        alone
    }

    fn span_from(&mut self, start: usize, line: usize, column: usize) -> Span {
        Span {
            start,
            end: self.current_index(),
            line,
            column,
        }
    }

    fn advance_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(&(_, c)) = self.chars.peek() {
            if !predicate(c) {
                break;
            }
            self.advance_char();
        }
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, ch)) = next {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

fn significant_digits(digits: &str) -> usize {
    let trimmed = digits.trim_start_matches('0');
    trimmed.len().max(1)
}

pub fn tokenize(input: &str) -> Lexed<'_> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .significant()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_declaration_with_input() {
        assert_eq!(
            kinds("var x = get(\"Name: \");"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Get,
                TokenKind::LParen,
                TokenKind::TextLiteral,
                TokenKind::RParen,
                TokenKind::Semicolon,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn prefers_longest_operator() {
        assert_eq!(
            kinds("a++ b += 1 c == d != e <= f && g || h"),
            vec![
                TokenKind::Identifier,
                TokenKind::PlusPlus,
                TokenKind::Identifier,
                TokenKind::PlusEqual,
                TokenKind::IntegerLiteral,
                TokenKind::Identifier,
                TokenKind::EqualEqual,
                TokenKind::Identifier,
                TokenKind::BangEqual,
                TokenKind::Identifier,
                TokenKind::LessEqual,
                TokenKind::Identifier,
                TokenKind::AndAnd,
                TokenKind::Identifier,
                TokenKind::OrOr,
                TokenKind::Identifier,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn tracks_lines_and_columns() {
        let input = indoc! {"
            var a = 1;
              show(a); # done
        "};
        let lexed = tokenize(input);
        let show = lexed
            .tokens
            .iter()
            .find(|token| token.kind == TokenKind::Show)
            .expect("show token");
        assert_eq!((show.span.line, show.span.column), (2, 3));
        let comment = lexed
            .tokens
            .iter()
            .find(|token| token.kind == TokenKind::Comment)
            .expect("comment token");
        assert_eq!(comment.lexeme, "# done");
    }

    #[test]
    fn classifies_literals_keywords_and_builtins() {
        let lexed = tokenize("YES NO 3.25 007 length toList empty");
        let views = lexed
            .views()
            .into_iter()
            .filter(|view| view.kind != "WHITESPACE")
            .map(|view| view.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            views,
            vec![
                "STATELITERAL",
                "STATELITERAL",
                "POINTLITERAL",
                "INTEGERLITERAL",
                "LENGTH",
                "TOLIST",
                "EMPTY"
            ]
        );
        assert!(lexed.errors.is_empty());
    }

    #[test]
    fn collects_every_error_without_stopping() {
        let input = indoc! {r#"
            var a = 1 & 2;
            var b = 1234567890;
            var c = "open
            var thisIdentifierIsWayTooLong = 3.;
            var d = 5 $ 2;
        "#};
        let lexed = tokenize(input);
        let messages = lexed
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(
            messages,
            vec![
                "Invalid symbol: '&'",
                "Integer literal '1234567890' exceeds max of 9 digits",
                "Unterminated string literal: \"open",
                "Identifier 'thisIdentifierIsWayTooLong' exceeds maximum length of 20 characters",
                "Incomplete point literal '3.'",
                "Invalid symbol: '$'",
            ]
        );
        assert_eq!(lexed.errors[2].span.line, 3);
        assert_eq!(lexed.errors[2].kind.category(), "Invalid String Literal");
    }

    #[test]
    fn reports_bad_escape_and_uppercase_identifier() {
        let lexed = tokenize(r#"show("a\qb"); var Total = 1;"#);
        assert_eq!(lexed.errors.len(), 2);
        assert_eq!(
            lexed.errors[0].to_string(),
            "Invalid escape sequence '\\q' in string literal"
        );
        assert_eq!(lexed.errors[1].kind.category(), "Invalid Identifier");
        assert!(
            lexed
                .significant()
                .iter()
                .any(|token| token.kind == TokenKind::TextLiteral && token.lexeme == r#""a\qb""#)
        );
    }

    #[test]
    fn leading_zeros_do_not_count_towards_digit_limit() {
        assert!(tokenize("0000000001").errors.is_empty());
        assert!(tokenize("123456789.123456789").errors.is_empty());
        assert_eq!(tokenize("1.1234567890").errors.len(), 1);
    }
}
