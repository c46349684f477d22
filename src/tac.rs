use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::ast::CastType;
use crate::builtins::BuiltinFunction;
use crate::interpreter::value::format_point;
use crate::token::Span;

mod generator;

pub use generator::generate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Goto,
    IfFalse,
    IfTrue,
    Label,
    Print,
    Input,
    Typecast,
    Param,
    Call,
    Return,
    FunctionBegin,
    FunctionEnd,
    ListCreate,
    ListAppend,
    ListAccess,
    ListSet,
    GroupCreate,
    GroupAccess,
    GroupSet,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Self::Assign => "ASSIGN",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Neg => "NEG",
            Self::Not => "NOT",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Eq => "EQ",
            Self::Neq => "NEQ",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Goto => "GOTO",
            Self::IfFalse => "IFFALSE",
            Self::IfTrue => "IFTRUE",
            Self::Label => "LABEL",
            Self::Print => "PRINT",
            Self::Input => "INPUT",
            Self::Typecast => "TYPECAST",
            Self::Param => "PARAM",
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::FunctionBegin => "FUNCTION_BEGIN",
            Self::FunctionEnd => "FUNCTION_END",
            Self::ListCreate => "LIST_CREATE",
            Self::ListAppend => "LIST_APPEND",
            Self::ListAccess => "LIST_ACCESS",
            Self::ListSet => "LIST_SET",
            Self::GroupCreate => "GROUP_CREATE",
            Self::GroupAccess => "GROUP_ACCESS",
            Self::GroupSet => "GROUP_SET",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Temp(u32),
    Var(String),
    Integer(i64),
    Point(f64),
    Text(String),
    State(bool),
    Empty,
    Label(String),
    Function(String),
    Builtin(BuiltinFunction),
    Count(usize),
    Type(CastType),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(id) => write!(f, "t{id}"),
            Self::Var(name) | Self::Label(name) | Self::Function(name) => f.write_str(name),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Point(value) => f.write_str(&format_point(*value)),
            Self::Text(value) => write!(f, "\"{}\"", escape_text(value)),
            Self::State(value) => f.write_str(if *value { "YES" } else { "NO" }),
            Self::Empty => f.write_str("empty"),
            Self::Builtin(function) => f.write_str(function.name()),
            Self::Count(count) => write!(f, "{count}"),
            Self::Type(target) => f.write_str(target.name()),
        }
    }
}

pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// One quadruple. `span` points at the source construct it was lowered from.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub arg1: Option<Operand>,
    pub arg2: Option<Operand>,
    pub result: Option<Operand>,
    pub span: Span,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.name())?;
        let operands = [&self.arg1, &self.arg2, &self.result]
            .into_iter()
            .flatten()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if !operands.is_empty() {
            write!(f, " {}", operands.join(", "))?;
        }
        Ok(())
    }
}

/// Layout of a user function inside the instruction list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionInfo {
    /// Index of the function's entry label.
    pub entry: usize,
    pub params: Vec<String>,
    /// Every variable name owned by the function's frame, parameters included.
    pub locals: FxHashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TacProgram {
    pub instructions: Vec<Instruction>,
    pub functions: FxHashMap<String, FunctionInfo>,
    pub labels: FxHashMap<String, usize>,
}

impl TacProgram {
    /// Display listing, one `index: OP operands` line per instruction.
    pub fn format(&self) -> String {
        self.instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| format!("{index}: {instruction}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_operands_in_order_skipping_absent_ones() {
        let instruction = Instruction {
            op: Op::Param,
            arg1: Some(Operand::Text("a\"b\n".to_string())),
            arg2: None,
            result: Some(Operand::Count(0)),
            span: Span::default(),
        };
        assert_eq!(instruction.to_string(), r#"PARAM "a\"b\n", 0"#);

        let label = Instruction {
            op: Op::FunctionEnd,
            arg1: Some(Operand::Function("area".to_string())),
            arg2: None,
            result: None,
            span: Span::default(),
        };
        assert_eq!(label.to_string(), "FUNCTION_END area");
        assert_eq!(Operand::Point(2.50).to_string(), "2.5");
        assert_eq!(Operand::State(false).to_string(), "NO");
    }
}
