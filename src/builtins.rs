use crate::semantic::StaticType;

/// Functions provided by the language runtime. The table is immutable and shared by the
/// lexer (reserved names), the analyzer (signatures) and the interpreter (implementations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Length,
    Uppercase,
    Lowercase,
    Max,
    Min,
    Sorted,
    Reverse,
    Abs,
    Sum,
    Contains,
    IndexOf,
    Join,
    Slice,
    Unique,
    Type,
    Isqrt,
    Pow,
    Factorial,
    Ceil,
    Floor,
    Round,
    ToString,
    ToList,
}

/// Accepted static types for one parameter. An empty list accepts anything.
pub type ParamTypes = &'static [StaticType];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub params: &'static [ParamTypes],
    /// Number of leading parameters that must be supplied.
    pub required: usize,
    pub returns: StaticType,
}

impl Signature {
    pub fn accepts_arity(&self, count: usize) -> bool {
        count >= self.required && count <= self.params.len()
    }

    /// Arity phrase used in diagnostics, e.g. `1` or `1 to 2`.
    pub fn arity_label(&self) -> String {
        if self.required == self.params.len() {
            self.required.to_string()
        } else {
            format!("{} to {}", self.required, self.params.len())
        }
    }
}

const ANY: ParamTypes = &[];
const SEQUENCE: ParamTypes = &[StaticType::List, StaticType::Text];
const TEXT: ParamTypes = &[StaticType::Text];
const LIST: ParamTypes = &[StaticType::List];
const NUMBER: ParamTypes = &[StaticType::Integer, StaticType::Point];
const INTEGER: ParamTypes = &[StaticType::Integer];

impl BuiltinFunction {
    pub const ALL: [BuiltinFunction; 23] = [
        Self::Length,
        Self::Uppercase,
        Self::Lowercase,
        Self::Max,
        Self::Min,
        Self::Sorted,
        Self::Reverse,
        Self::Abs,
        Self::Sum,
        Self::Contains,
        Self::IndexOf,
        Self::Join,
        Self::Slice,
        Self::Unique,
        Self::Type,
        Self::Isqrt,
        Self::Pow,
        Self::Factorial,
        Self::Ceil,
        Self::Floor,
        Self::Round,
        Self::ToString,
        Self::ToList,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sorted => "sorted",
            Self::Reverse => "reverse",
            Self::Abs => "abs",
            Self::Sum => "sum",
            Self::Contains => "contains",
            Self::IndexOf => "indexOf",
            Self::Join => "join",
            Self::Slice => "slice",
            Self::Unique => "unique",
            Self::Type => "type",
            Self::Isqrt => "isqrt",
            Self::Pow => "pow",
            Self::Factorial => "factorial",
            Self::Ceil => "ceil",
            Self::Floor => "floor",
            Self::Round => "round",
            Self::ToString => "toString",
            Self::ToList => "toList",
        }
    }

    pub fn signature(self) -> Signature {
        let (params, required, returns): (&'static [ParamTypes], usize, StaticType) = match self {
            Self::Length => (&[SEQUENCE], 1, StaticType::Integer),
            Self::Uppercase | Self::Lowercase => (&[TEXT], 1, StaticType::Text),
            Self::Max | Self::Min => (&[SEQUENCE], 1, StaticType::Unknown),
            Self::Sorted | Self::Unique => (&[SEQUENCE], 1, StaticType::List),
            Self::Reverse => (&[SEQUENCE], 1, StaticType::Unknown),
            Self::Abs => (&[NUMBER], 1, StaticType::Unknown),
            Self::Sum => (&[LIST], 1, StaticType::Unknown),
            Self::Contains => (&[SEQUENCE, ANY], 2, StaticType::State),
            Self::IndexOf => (&[SEQUENCE, ANY], 2, StaticType::Integer),
            Self::Join => (&[TEXT, LIST], 2, StaticType::Text),
            Self::Slice => (&[SEQUENCE, INTEGER, INTEGER], 3, StaticType::Unknown),
            Self::Type | Self::ToString => (&[ANY], 1, StaticType::Text),
            Self::Isqrt | Self::Ceil | Self::Floor => (&[NUMBER], 1, StaticType::Integer),
            Self::Pow => (&[NUMBER, NUMBER], 2, StaticType::Unknown),
            Self::Factorial => (&[INTEGER], 1, StaticType::Integer),
            Self::Round => (&[NUMBER, INTEGER], 1, StaticType::Unknown),
            Self::ToList => (&[TEXT], 1, StaticType::List),
        };
        Signature {
            params,
            required,
            returns,
        }
    }
}

/// Names of every built-in, in registry order.
pub fn names() -> Vec<&'static str> {
    BuiltinFunction::ALL.iter().map(|builtin| builtin.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_lookup() {
        for builtin in BuiltinFunction::ALL {
            assert_eq!(BuiltinFunction::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(BuiltinFunction::from_name("print"), None);
    }

    #[test]
    fn optional_parameters_widen_the_arity() {
        let round = BuiltinFunction::Round.signature();
        assert!(round.accepts_arity(1));
        assert!(round.accepts_arity(2));
        assert!(!round.accepts_arity(3));
        assert_eq!(round.arity_label(), "1 to 2");
        assert_eq!(BuiltinFunction::Join.signature().arity_label(), "2");
    }
}
