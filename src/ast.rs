use crate::builtins::BuiltinFunction;
use crate::token::Span;

pub mod tree;

pub use tree::TreeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Negate => "-",
        }
    }
}

/// Target type of `integer(...)`, `point(...)`, `state(...)` and `text(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastType {
    Integer,
    Point,
    State,
    Text,
}

impl CastType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Point => "point",
            Self::State => "state",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
    height: usize,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        let height = kind.child_height() + 1;
        Self { kind, span, height }
    }

    /// Nodes on the longest path from this expression down to a leaf.
    pub fn height(&self) -> usize {
        self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Integer(i64),
    Point(f64),
    Text(String),
    State(bool),
    Empty,
    Identifier(String),
    List(Vec<Expression>),
    Group(Vec<GroupMember>),
    /// `items[index]`
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
    },
    /// `record{key}`
    Member {
        target: Box<Expression>,
        key: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    Call {
        name: String,
        name_span: Span,
        args: Vec<Expression>,
    },
    BuiltinCall {
        function: BuiltinFunction,
        args: Vec<Expression>,
    },
    Cast {
        target: CastType,
        value: Box<Expression>,
    },
    /// `get(prompt?)`
    Input { prompt: Option<Box<Expression>> },
}

impl ExpressionKind {
    fn child_height(&self) -> usize {
        match self {
            Self::Integer(_)
            | Self::Point(_)
            | Self::Text(_)
            | Self::State(_)
            | Self::Empty
            | Self::Identifier(_) => 0,
            Self::List(items)
            | Self::Call { args: items, .. }
            | Self::BuiltinCall { args: items, .. } => tallest(items),
            Self::Group(members) => members
                .iter()
                .map(|member| member.key.height().max(member.value.height()))
                .max()
                .unwrap_or(0),
            Self::Index { target, index: inner } | Self::Member { target, key: inner } => {
                target.height().max(inner.height())
            }
            Self::Binary { left, right, .. } => left.height().max(right.height()),
            Self::Unary { operand: inner, .. } | Self::Cast { value: inner, .. } => inner.height(),
            Self::Input { prompt } => prompt.as_ref().map_or(0, |prompt| prompt.height()),
        }
    }
}

fn tallest(items: &[Expression]) -> usize {
    items.iter().map(Expression::height).max().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub key: Expression,
    pub value: Expression,
}

/// Accessor applied to a variable on the left of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Index(Expression),
    Key(Expression),
}

/// Assignable location: a variable, optionally with one element accessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub span: Span,
    pub accessor: Option<Accessor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Set => "=",
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::Div => "/=",
            Self::Mod => "%=",
        }
    }

    /// Arithmetic applied before storing, `None` for plain `=`.
    pub fn binary(self) -> Option<BinaryOperator> {
        match self {
            Self::Set => None,
            Self::Add => Some(BinaryOperator::Add),
            Self::Sub => Some(BinaryOperator::Sub),
            Self::Mul => Some(BinaryOperator::Mul),
            Self::Div => Some(BinaryOperator::Div),
            Self::Mod => Some(BinaryOperator::Mod),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub span: Span,
    pub value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub condition: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub value: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Var(Vec<Declarator>),
    Fixed(Vec<Declarator>),
    Group {
        name: String,
        name_span: Span,
        members: Vec<GroupMember>,
    },
    Function {
        name: String,
        name_span: Span,
        params: Vec<Parameter>,
        body: Vec<Statement>,
    },
    Assign {
        target: Place,
        op: AssignOperator,
        value: Expression,
    },
    Update {
        target: Place,
        op: UpdateOperator,
    },
    Show(Expression),
    Throw(Option<Expression>),
    Exit,
    Next,
    Checkif {
        branches: Vec<ConditionalBranch>,
        otherwise: Option<Vec<Statement>>,
    },
    Match {
        subject: Expression,
        cases: Vec<MatchCase>,
        default: Option<Vec<Statement>>,
    },
    Each {
        init: Box<Statement>,
        condition: Expression,
        update: Box<Statement>,
        body: Vec<Statement>,
    },
    Repeat {
        condition: Expression,
        body: Vec<Statement>,
    },
    DoRepeat {
        body: Vec<Statement>,
        condition: Expression,
    },
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}
