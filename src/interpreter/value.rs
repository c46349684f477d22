use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::CastType;

use super::error::RuntimeErrorKind;

/// Largest magnitude a number may reach.
pub const NUMBER_LIMIT: i64 = 999_999_999;

/// Deepest list/group nesting a value may reach.
pub const MAX_VALUE_DEPTH: usize = 100;

type ValueResult<T> = std::result::Result<T, RuntimeErrorKind>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Point(f64),
    Text(String),
    State(bool),
    List(Vec<Value>),
    /// Key/value pairs in insertion order.
    Group(Vec<(Value, Value)>),
    Empty,
}

impl Value {
    pub fn integer(value: i64) -> ValueResult<Self> {
        if value.unsigned_abs() > NUMBER_LIMIT as u64 {
            return Err(RuntimeErrorKind::IntegerOutOfRange {
                value: value.to_string(),
            });
        }
        Ok(Self::Integer(value))
    }

    pub fn point(value: f64) -> ValueResult<Self> {
        if !value.is_finite() || value.abs() > NUMBER_LIMIT as f64 {
            return Err(RuntimeErrorKind::PointOutOfRange {
                value: format_point(value),
            });
        }
        Ok(Self::Point(value))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Point(_) => "point",
            Self::Text(_) => "text",
            Self::State(_) => "state",
            Self::List(_) => "list",
            Self::Group(_) => "group",
            Self::Empty => "empty",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Integer(value) => *value != 0,
            Self::Point(value) => *value != 0.0,
            Self::Text(value) => !value.is_empty(),
            Self::State(value) => *value,
            Self::List(items) => !items.is_empty(),
            Self::Group(members) => !members.is_empty(),
            Self::Empty => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Point(value) => Some(*value),
            _ => None,
        }
    }

    /// Number used by arithmetic; `state` counts as 1 or 0.
    fn as_operand(&self) -> Option<f64> {
        match self {
            Self::State(value) => Some(f64::from(u8::from(*value))),
            other => other.as_number(),
        }
    }

    /// Integer used by arithmetic when both sides are whole.
    fn as_whole(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::State(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Lists and groups enclosing the innermost element; 0 for scalars.
    pub fn depth(&self) -> usize {
        match self {
            Self::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Self::Group(members) => {
                1 + members
                    .iter()
                    .map(|(_, value)| value.depth())
                    .max()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Checks that `self` can be stored inside another list or group.
    pub fn check_element(&self) -> ValueResult<()> {
        if self.depth() >= MAX_VALUE_DEPTH {
            return Err(RuntimeErrorKind::NestingTooDeep {
                limit: MAX_VALUE_DEPTH,
            });
        }
        Ok(())
    }

    /// Form used when the value is nested inside a list or group.
    fn nested(&self) -> String {
        match self {
            Self::Text(text) => format!("\"{text}\""),
            other => other.to_string(),
        }
    }

    /// Equality used by `==`, `match`, `contains` and friends. Numbers compare by value and
    /// `empty` equals the empty text.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Empty, Self::Text(text)) | (Self::Text(text), Self::Empty) => text.is_empty(),
            (Self::List(left), Self::List(right)) => {
                left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.equals(r))
            }
            (Self::Group(left), Self::Group(right)) => {
                left.len() == right.len()
                    && left.iter().all(|(key, value)| {
                        right
                            .iter()
                            .any(|(other_key, other_value)| {
                                key.equals(other_key) && value.equals(other_value)
                            })
                    })
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(left), Some(right)) => left == right,
                _ => self == other,
            },
        }
    }

    /// Ordering for `<`-style comparisons: numbers with numbers, texts with texts.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(left), Self::Text(right)) => Some(left.cmp(right)),
            _ => {
                let (left, right) = (self.as_operand()?, other.as_operand()?);
                left.partial_cmp(&right)
            }
        }
    }

    pub fn add(&self, other: &Value) -> ValueResult<Value> {
        match (self, other) {
            (Self::Text(_), _) | (_, Self::Text(_)) => Ok(Self::Text(format!("{self}{other}"))),
            (Self::List(left), Self::List(right)) => {
                Ok(Self::List(left.iter().chain(right).cloned().collect()))
            }
            (Self::List(_), _) | (_, Self::List(_)) => Err(self.operand_types("+", other)),
            _ => match (self.as_whole(), other.as_whole()) {
                (Some(left), Some(right)) => Self::integer(left + right),
                _ => self.arithmetic(other, "+", |left, right| left + right),
            },
        }
    }

    pub fn sub(&self, other: &Value) -> ValueResult<Value> {
        match (self.as_whole(), other.as_whole()) {
            (Some(left), Some(right)) => Self::integer(left - right),
            _ => self.arithmetic(other, "-", |left, right| left - right),
        }
    }

    pub fn mul(&self, other: &Value) -> ValueResult<Value> {
        match (self.as_whole(), other.as_whole()) {
            (Some(left), Some(right)) => match left.checked_mul(right) {
                Some(product) => Self::integer(product),
                None => Err(RuntimeErrorKind::IntegerOutOfRange {
                    value: format!("{left} * {right}"),
                }),
            },
            _ => self.arithmetic(other, "*", |left, right| left * right),
        }
    }

    pub fn div(&self, other: &Value) -> ValueResult<Value> {
        if other.as_operand() == Some(0.0) && self.as_operand().is_some() {
            return Err(RuntimeErrorKind::DivisionByZero);
        }
        self.arithmetic(other, "/", |left, right| left / right)
    }

    pub fn rem(&self, other: &Value) -> ValueResult<Value> {
        if other.as_operand() == Some(0.0) && self.as_operand().is_some() {
            return Err(RuntimeErrorKind::ModuloByZero);
        }
        match (self.as_whole(), other.as_whole()) {
            (Some(left), Some(right)) => Self::integer(left % right),
            _ => self.arithmetic(other, "%", |left, right| left % right),
        }
    }

    fn operand_types(&self, operator: &'static str, other: &Value) -> RuntimeErrorKind {
        RuntimeErrorKind::OperandTypes {
            operator,
            left: self.type_name(),
            right: other.type_name(),
        }
    }

    /// Point arithmetic on two numbers.
    fn arithmetic(
        &self,
        other: &Value,
        operator: &'static str,
        apply: impl Fn(f64, f64) -> f64,
    ) -> ValueResult<Value> {
        match (self.as_operand(), other.as_operand()) {
            (Some(left), Some(right)) => Self::point(apply(left, right)),
            _ => Err(self.operand_types(operator, other)),
        }
    }

    pub fn negate(&self) -> ValueResult<Value> {
        match self {
            Self::Integer(value) => Self::integer(-value),
            Self::Point(value) => Self::point(-value),
            Self::State(value) => Ok(Self::Integer(-i64::from(*value))),
            other => Err(RuntimeErrorKind::OperandType {
                operator: "-",
                operand: other.type_name(),
            }),
        }
    }

    pub fn cast(&self, target: CastType) -> ValueResult<Value> {
        let invalid = || RuntimeErrorKind::InvalidCast {
            value: self.nested(),
            target: target.name(),
        };
        match target {
            CastType::Text => Ok(Self::Text(self.to_string())),
            CastType::State => Ok(Self::State(self.cast_state())),
            CastType::Integer => match self {
                Self::Integer(value) => Ok(Self::Integer(*value)),
                Self::Point(value) => Self::integer(value.trunc() as i64),
                Self::State(value) => Ok(Self::Integer(i64::from(*value))),
                Self::Text(text) => {
                    let value = text.trim().parse::<i64>().map_err(|_| invalid())?;
                    Self::integer(value)
                }
                _ => Err(invalid()),
            },
            CastType::Point => match self {
                Self::Integer(value) => Self::point(*value as f64),
                Self::Point(value) => Ok(Self::Point(*value)),
                Self::State(value) => Ok(Self::Point(if *value { 1.0 } else { 0.0 })),
                Self::Text(text) => {
                    let value = text.trim().parse::<f64>().map_err(|_| invalid())?;
                    Self::point(value)
                }
                _ => Err(invalid()),
            },
        }
    }

    fn cast_state(&self) -> bool {
        match self {
            Self::Text(text) => {
                let normalized = text.trim().to_uppercase();
                !matches!(normalized.as_str(), "" | "0" | "NO" | "FALSE" | "EMPTY")
            }
            other => other.is_truthy(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Point(value) => f.write_str(&format_point(*value)),
            Self::Text(text) => f.write_str(text),
            Self::State(value) => f.write_str(if *value { "YES" } else { "NO" }),
            Self::List(items) => {
                let rendered = items.iter().map(Value::nested).collect::<Vec<_>>();
                write!(f, "[{}]", rendered.join(", "))
            }
            Self::Group(members) => {
                let rendered = members
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.nested(), value.nested()))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Self::Empty => f.write_str("empty"),
        }
    }
}

/// Points print with up to nine decimals, trailing zeros trimmed.
pub fn format_point(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        let whole = value as i64;
        return whole.to_string();
    }
    let text = format!("{value:.9}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_values_the_way_programs_print_them() {
        assert_eq!(Value::Point(2.5).to_string(), "2.5");
        assert_eq!(Value::Point(4.0).to_string(), "4");
        assert_eq!(Value::Point(1.0 / 3.0).to_string(), "0.333333333");
        assert_eq!(Value::State(true).to_string(), "YES");
        let list = Value::List(vec![
            Value::Integer(1),
            Value::Text("a".to_string()),
            Value::Empty,
        ]);
        assert_eq!(list.to_string(), r#"[1, "a", empty]"#);
        let group = Value::Group(vec![(Value::Text("k".to_string()), Value::Integer(2))]);
        assert_eq!(group.to_string(), r#"{"k": 2}"#);
    }

    #[test]
    fn arithmetic_promotes_and_checks_range() {
        let two = Value::Integer(2);
        assert_eq!(two.add(&Value::Integer(3)), Ok(Value::Integer(5)));
        assert_eq!(two.add(&Value::Point(0.5)), Ok(Value::Point(2.5)));
        assert_eq!(two.div(&Value::Integer(4)), Ok(Value::Point(0.5)));
        assert_eq!(
            Value::Text("n=".to_string()).add(&two),
            Ok(Value::Text("n=2".to_string()))
        );
        assert_eq!(two.div(&Value::Integer(0)), Err(RuntimeErrorKind::DivisionByZero));
        assert!(matches!(
            Value::Integer(999_999_999).add(&Value::Integer(1)),
            Err(RuntimeErrorKind::IntegerOutOfRange { .. })
        ));
        assert!(matches!(
            Value::Text("a".to_string()).sub(&two),
            Err(RuntimeErrorKind::OperandTypes { .. })
        ));
    }

    #[test]
    fn states_count_as_one_or_zero() {
        let yes = Value::State(true);
        let no = Value::State(false);
        assert_eq!(yes.add(&Value::Integer(1)), Ok(Value::Integer(2)));
        assert_eq!(no.mul(&Value::Integer(3)), Ok(Value::Integer(0)));
        assert_eq!(yes.sub(&Value::Point(0.5)), Ok(Value::Point(0.5)));
        assert_eq!(yes.negate(), Ok(Value::Integer(-1)));
        assert_eq!(Value::Integer(4).div(&no), Err(RuntimeErrorKind::DivisionByZero));
        assert_eq!(yes.compare(&Value::Integer(0)), Some(Ordering::Greater));
        assert_eq!(
            yes.add(&Value::Text("!".to_string())),
            Ok(Value::Text("YES!".to_string()))
        );
    }

    #[test]
    fn lists_only_add_to_lists() {
        let list = Value::List(vec![Value::Integer(1)]);
        assert_eq!(
            list.add(&Value::List(vec![Value::Integer(2)])),
            Ok(Value::List(vec![Value::Integer(1), Value::Integer(2)]))
        );
        assert_eq!(
            list.add(&Value::Integer(2)),
            Err(RuntimeErrorKind::OperandTypes {
                operator: "+",
                left: "list",
                right: "integer",
            })
        );
        assert!(Value::State(true).add(&list).is_err());
        assert_eq!(
            Value::Text("xs=".to_string()).add(&list),
            Ok(Value::Text("xs=[1]".to_string()))
        );
    }

    #[test]
    fn casts_follow_conversion_rules() {
        assert_eq!(Value::Point(3.9).cast(CastType::Integer), Ok(Value::Integer(3)));
        assert_eq!(
            Value::Text(" 42 ".to_string()).cast(CastType::Integer),
            Ok(Value::Integer(42))
        );
        assert_eq!(
            Value::Text("false".to_string()).cast(CastType::State),
            Ok(Value::State(false))
        );
        assert_eq!(Value::Integer(0).cast(CastType::State), Ok(Value::State(false)));
        assert!(Value::List(Vec::new()).cast(CastType::Point).is_err());
    }

    #[test]
    fn equality_treats_empty_text_as_empty() {
        assert!(Value::Empty.equals(&Value::Text(String::new())));
        assert!(Value::Integer(2).equals(&Value::Point(2.0)));
        assert!(!Value::Text("2".to_string()).equals(&Value::Integer(2)));
    }
}
