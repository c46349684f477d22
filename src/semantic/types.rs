use crate::ast::{BinaryOperator, CastType, UnaryOperator};

/// Type of an expression as far as it can be known before running the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticType {
    Integer,
    Point,
    Text,
    State,
    List,
    Group,
    Empty,
    Unknown,
}

impl StaticType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Point => "point",
            Self::Text => "text",
            Self::State => "state",
            Self::List => "list",
            Self::Group => "group",
            Self::Empty => "empty",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Point)
    }

    /// Numeric, or not known to be anything else.
    pub fn may_be_numeric(self) -> bool {
        self.is_numeric() || self == Self::Unknown
    }

    /// Usable in arithmetic; `state` counts as 1 or 0.
    pub fn is_arithmetic(self) -> bool {
        matches!(self, Self::Integer | Self::Point | Self::State)
    }

    /// Arithmetic, or not known to be anything else.
    pub fn may_be_arithmetic(self) -> bool {
        self.is_arithmetic() || self == Self::Unknown
    }

    /// Integer-valued in arithmetic.
    fn is_whole(self) -> bool {
        matches!(self, Self::Integer | Self::State)
    }

    pub fn from_cast(target: CastType) -> Self {
        match target {
            CastType::Integer => Self::Integer,
            CastType::Point => Self::Point,
            CastType::State => Self::State,
            CastType::Text => Self::Text,
        }
    }

    /// Combines two types flowing into the same variable.
    pub fn merge(self, other: StaticType) -> StaticType {
        if self == other { self } else { Self::Unknown }
    }
}

/// Result type of `left op right`, or `None` when the operands can never be combined.
pub fn binary_result(op: BinaryOperator, left: StaticType, right: StaticType) -> Option<StaticType> {
    use StaticType::*;
    match op {
        BinaryOperator::Equal | BinaryOperator::NotEqual => Some(State),
        BinaryOperator::And | BinaryOperator::Or => {
            (matches!(left, State | Unknown) && matches!(right, State | Unknown)).then_some(State)
        }
        BinaryOperator::Add => match (left, right) {
            (Text, _) | (_, Text) => Some(Text),
            (List, List) => Some(List),
            (List, Unknown) | (Unknown, List) => Some(Unknown),
            (List, _) | (_, List) => None,
            _ => arithmetic_result(left, right),
        },
        BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Mod => {
            arithmetic_result(left, right)
        }
        BinaryOperator::Div => {
            (left.may_be_arithmetic() && right.may_be_arithmetic()).then_some(Point)
        }
        BinaryOperator::Less
        | BinaryOperator::LessEqual
        | BinaryOperator::Greater
        | BinaryOperator::GreaterEqual => {
            let comparable = (left.is_arithmetic() && right.is_arithmetic())
                || (left == Text && right == Text)
                || left == Unknown
                || right == Unknown;
            comparable.then_some(State)
        }
    }
}

fn arithmetic_result(left: StaticType, right: StaticType) -> Option<StaticType> {
    use StaticType::*;
    match (left, right) {
        (l, r) if l.is_whole() && r.is_whole() => Some(Integer),
        (l, r) if l.is_arithmetic() && r.is_arithmetic() => Some(Point),
        (l, r) if l.may_be_arithmetic() && r.may_be_arithmetic() => Some(Unknown),
        _ => None,
    }
}

pub fn unary_result(op: UnaryOperator, operand: StaticType) -> Option<StaticType> {
    use StaticType::*;
    match (op, operand) {
        (UnaryOperator::Not, State | Unknown) => Some(State),
        (UnaryOperator::Negate, Integer | State) => Some(Integer),
        (UnaryOperator::Negate, Point | Unknown) => Some(operand),
        _ => None,
    }
}

/// Whether a cast of `value` to `target` can ever succeed.
pub fn cast_allowed(target: CastType, value: StaticType) -> bool {
    match target {
        CastType::Integer | CastType::Point => {
            !matches!(value, StaticType::List | StaticType::Group | StaticType::Empty)
        }
        CastType::State | CastType::Text => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_follows_the_value_model() {
        use StaticType::*;
        assert_eq!(binary_result(BinaryOperator::Add, Integer, Integer), Some(Integer));
        assert_eq!(binary_result(BinaryOperator::Add, Integer, Point), Some(Point));
        assert_eq!(binary_result(BinaryOperator::Add, State, Text), Some(Text));
        assert_eq!(binary_result(BinaryOperator::Add, List, List), Some(List));
        assert_eq!(binary_result(BinaryOperator::Add, List, Integer), None);
        assert_eq!(binary_result(BinaryOperator::Add, Text, List), Some(Text));
        assert_eq!(binary_result(BinaryOperator::Add, Unknown, Integer), Some(Unknown));
    }

    #[test]
    fn arithmetic_rejects_text() {
        use StaticType::*;
        assert_eq!(binary_result(BinaryOperator::Sub, Text, Integer), None);
        assert_eq!(binary_result(BinaryOperator::Div, Integer, Integer), Some(Point));
        assert_eq!(binary_result(BinaryOperator::Less, Text, Text), Some(State));
        assert_eq!(binary_result(BinaryOperator::Less, Text, Integer), None);
        assert_eq!(unary_result(UnaryOperator::Negate, Text), None);
    }

    #[test]
    fn state_counts_as_a_number_in_arithmetic() {
        use StaticType::*;
        assert_eq!(binary_result(BinaryOperator::Add, State, Integer), Some(Integer));
        assert_eq!(binary_result(BinaryOperator::Mul, State, State), Some(Integer));
        assert_eq!(binary_result(BinaryOperator::Sub, Point, State), Some(Point));
        assert_eq!(binary_result(BinaryOperator::Div, State, Integer), Some(Point));
        assert_eq!(binary_result(BinaryOperator::Less, State, Integer), Some(State));
        assert_eq!(unary_result(UnaryOperator::Negate, State), Some(Integer));
    }

    #[test]
    fn logical_operators_require_state() {
        use StaticType::*;
        assert_eq!(binary_result(BinaryOperator::And, State, Unknown), Some(State));
        assert_eq!(binary_result(BinaryOperator::Or, Integer, State), None);
        assert_eq!(unary_result(UnaryOperator::Not, Text), None);
        assert_eq!(unary_result(UnaryOperator::Not, State), Some(State));
    }
}
