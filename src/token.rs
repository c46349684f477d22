use serde::Serialize;

/// Source location of a token or AST node. `line` and `column` are 1-based, `start`/`end`
/// are byte offsets into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    /// Span covering both `self` and `other`, keeping the position of `self`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    Identifier,
    IntegerLiteral,
    PointLiteral,
    TextLiteral,
    StateLiteral,
    /// Built-in function name; the lexeme tells which one.
    Builtin,

    // Keywords
    Var,
    Fixed,
    Group,
    Func,
    Throw,
    Show,
    Get,
    Checkif,
    Recheck,
    Otherwise,
    Match,
    Case,
    Default,
    Exit,
    Next,
    Each,
    Repeat,
    Do,
    Integer,
    Point,
    State,
    Text,
    Empty,

    // Operators
    Plus,         // +
    PlusPlus,     // ++
    PlusEqual,    // +=
    Minus,        // -
    MinusMinus,   // --
    MinusEqual,   // -=
    Star,         // *
    StarEqual,    // *=
    Slash,        // /
    SlashEqual,   // /=
    Percent,      // %
    PercentEqual, // %=
    Assign,       // =
    EqualEqual,   // ==
    Bang,         // !
    BangEqual,    // !=
    Greater,      // >
    GreaterEqual, // >=
    Less,         // <
    LessEqual,    // <=
    AndAnd,       // &&
    OrOr,         // ||
    Tilde,        // ~

    // Delimiters
    LBrace,    // {
    RBrace,    // }
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    Colon,     // :
    Comma,     // ,
    Semicolon, // ;

    // Trivia, kept for the token view and dropped before parsing
    Whitespace,
    Newline,
    Comment,

    EOF,
}

/// Buckets used to group expected tokens in syntax diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    Literal,
    Keyword,
    Symbol,
    Other,
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "var" => Self::Var,
            "fixed" => Self::Fixed,
            "group" => Self::Group,
            "func" => Self::Func,
            "throw" => Self::Throw,
            "show" => Self::Show,
            "get" => Self::Get,
            "checkif" => Self::Checkif,
            "recheck" => Self::Recheck,
            "otherwise" => Self::Otherwise,
            "match" => Self::Match,
            "case" => Self::Case,
            "default" => Self::Default,
            "exit" => Self::Exit,
            "next" => Self::Next,
            "each" => Self::Each,
            "repeat" => Self::Repeat,
            "do" => Self::Do,
            "integer" => Self::Integer,
            "point" => Self::Point,
            "state" => Self::State,
            "text" => Self::Text,
            "empty" => Self::Empty,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace | Self::Newline | Self::Comment)
    }

    pub fn category(self) -> TokenCategory {
        match self {
            Self::IntegerLiteral | Self::PointLiteral | Self::TextLiteral | Self::StateLiteral => {
                TokenCategory::Literal
            }
            Self::Builtin
            | Self::Var
            | Self::Fixed
            | Self::Group
            | Self::Func
            | Self::Throw
            | Self::Show
            | Self::Get
            | Self::Checkif
            | Self::Recheck
            | Self::Otherwise
            | Self::Match
            | Self::Case
            | Self::Default
            | Self::Exit
            | Self::Next
            | Self::Each
            | Self::Repeat
            | Self::Do
            | Self::Integer
            | Self::Point
            | Self::State
            | Self::Text
            | Self::Empty => TokenCategory::Keyword,
            Self::Identifier
            | Self::Whitespace
            | Self::Newline
            | Self::Comment
            | Self::EOF => TokenCategory::Other,
            _ => TokenCategory::Symbol,
        }
    }

    /// Token type name reported in the token stream. Built-ins are named after their lexeme,
    /// see [`Token::type_name`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Identifier => "IDENTIFIER",
            Self::IntegerLiteral => "INTEGERLITERAL",
            Self::PointLiteral => "POINTLITERAL",
            Self::TextLiteral => "TEXTLITERAL",
            Self::StateLiteral => "STATELITERAL",
            Self::Builtin => "BUILTIN",
            Self::Var => "VAR",
            Self::Fixed => "FIXED",
            Self::Group => "GROUP",
            Self::Func => "FUNC",
            Self::Throw => "THROW",
            Self::Show => "SHOW",
            Self::Get => "GET",
            Self::Checkif => "CHECKIF",
            Self::Recheck => "RECHECK",
            Self::Otherwise => "OTHERWISE",
            Self::Match => "MATCH",
            Self::Case => "CASE",
            Self::Default => "DEFAULT",
            Self::Exit => "EXIT",
            Self::Next => "NEXT",
            Self::Each => "EACH",
            Self::Repeat => "REPEAT",
            Self::Do => "DO",
            Self::Integer => "INTEGER",
            Self::Point => "POINT",
            Self::State => "STATE",
            Self::Text => "TEXT",
            Self::Empty => "EMPTY",
            Self::Plus => "PLUS",
            Self::PlusPlus => "INCREMENT",
            Self::PlusEqual => "PLUS_ASSIGN",
            Self::Minus => "MINUS",
            Self::MinusMinus => "DECREMENT",
            Self::MinusEqual => "MINUS_ASSIGN",
            Self::Star => "MULTIPLY",
            Self::StarEqual => "MULTIPLY_ASSIGN",
            Self::Slash => "DIVIDE",
            Self::SlashEqual => "DIVIDE_ASSIGN",
            Self::Percent => "MODULO",
            Self::PercentEqual => "MODULO_ASSIGN",
            Self::Assign => "ASSIGN",
            Self::EqualEqual => "EQUAL",
            Self::Bang => "NOT",
            Self::BangEqual => "NOT_EQUAL",
            Self::Greater => "GREATER_THAN",
            Self::GreaterEqual => "GREATER_EQUAL",
            Self::Less => "LESS_THAN",
            Self::LessEqual => "LESS_EQUAL",
            Self::AndAnd => "AND",
            Self::OrOr => "OR",
            Self::Tilde => "NEGATE",
            Self::LBrace => "LBRACE",
            Self::RBrace => "RBRACE",
            Self::LParen => "LPAREN",
            Self::RParen => "RPAREN",
            Self::LBracket => "LBRACKET",
            Self::RBracket => "RBRACKET",
            Self::Colon => "COLON",
            Self::Comma => "COMMA",
            Self::Semicolon => "SEMICOLON",
            Self::Whitespace => "WHITESPACE",
            Self::Newline => "NEWLINE",
            Self::Comment => "COMMENT",
            Self::EOF => "EOF",
        }
    }

    /// Human-readable form used in "expected ..." lists.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::IntegerLiteral => "integer literal",
            Self::PointLiteral => "point literal",
            Self::TextLiteral => "text literal",
            Self::StateLiteral => "state literal",
            Self::Builtin => "built-in function",
            Self::Var => "var",
            Self::Fixed => "fixed",
            Self::Group => "group",
            Self::Func => "func",
            Self::Throw => "throw",
            Self::Show => "show",
            Self::Get => "get",
            Self::Checkif => "checkif",
            Self::Recheck => "recheck",
            Self::Otherwise => "otherwise",
            Self::Match => "match",
            Self::Case => "case",
            Self::Default => "default",
            Self::Exit => "exit",
            Self::Next => "next",
            Self::Each => "each",
            Self::Repeat => "repeat",
            Self::Do => "do",
            Self::Integer => "integer",
            Self::Point => "point",
            Self::State => "state",
            Self::Text => "text",
            Self::Empty => "empty",
            Self::Plus => "+",
            Self::PlusPlus => "++",
            Self::PlusEqual => "+=",
            Self::Minus => "-",
            Self::MinusMinus => "--",
            Self::MinusEqual => "-=",
            Self::Star => "*",
            Self::StarEqual => "*=",
            Self::Slash => "/",
            Self::SlashEqual => "/=",
            Self::Percent => "%",
            Self::PercentEqual => "%=",
            Self::Assign => "=",
            Self::EqualEqual => "==",
            Self::Bang => "!",
            Self::BangEqual => "!=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Tilde => "~",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Whitespace => "whitespace",
            Self::Newline => "newline",
            Self::Comment => "comment",
            Self::EOF => "end of input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn type_name(&self) -> String {
        match self.kind {
            TokenKind::Builtin => self.lexeme.to_uppercase(),
            kind => kind.name().to_string(),
        }
    }
}

/// Token as reported to clients of the token view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenView {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl From<&Token<'_>> for TokenView {
    fn from(token: &Token<'_>) -> Self {
        Self {
            kind: token.type_name(),
            value: token.lexeme.to_string(),
            line: token.span.line,
            column: token.span.column,
        }
    }
}
