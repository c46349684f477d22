use crate::ast::CastType;

use super::error::RuntimeErrorKind;
use super::value::Value;

pub const DEFAULT_PROMPT: &str = "Enter input:";

/// Converts raw user input into a value. With a target type the text must parse as that
/// type; without one, numbers and `YES`/`NO` are recognised and anything else stays text.
pub fn coerce(raw: &str, target: Option<CastType>) -> Result<Value, RuntimeErrorKind> {
    let trimmed = raw.trim();
    let invalid = |expected| RuntimeErrorKind::InvalidInput {
        input: raw.to_string(),
        expected,
    };
    match target {
        Some(CastType::Text) => Ok(Value::Text(raw.to_string())),
        Some(CastType::Integer) => {
            let value = trimmed.parse::<i64>().map_err(|_| invalid("integer"))?;
            Value::integer(value)
        }
        Some(CastType::Point) => {
            let value = trimmed.parse::<f64>().map_err(|_| invalid("point"))?;
            Value::point(value)
        }
        Some(CastType::State) => match trimmed.to_uppercase().as_str() {
            "YES" | "TRUE" | "1" => Ok(Value::State(true)),
            "NO" | "FALSE" | "0" => Ok(Value::State(false)),
            _ => Err(invalid("state")),
        },
        None => Ok(detect(raw)),
    }
}

fn detect(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "YES" => return Value::State(true),
        "NO" => return Value::State(false),
        _ => {}
    }
    let looks_numeric = !trimmed.is_empty()
        && trimmed
            .trim_start_matches(['-', '+'])
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.');
    if looks_numeric {
        if let Ok(value) = trimmed.parse::<i64>()
            && let Ok(value) = Value::integer(value)
        {
            return value;
        }
        if let Ok(value) = trimmed.parse::<f64>()
            && let Ok(value) = Value::point(value)
        {
            return value;
        }
    }
    Value::Text(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_numbers_and_states() {
        assert_eq!(coerce("42", None), Ok(Value::Integer(42)));
        assert_eq!(coerce(" -3.5 ", None), Ok(Value::Point(-3.5)));
        assert_eq!(coerce("YES", None), Ok(Value::State(true)));
        assert_eq!(coerce("World", None), Ok(Value::Text("World".to_string())));
        assert_eq!(coerce("1.2.3", None), Ok(Value::Text("1.2.3".to_string())));
    }

    #[test]
    fn validates_typed_input() {
        assert_eq!(
            coerce("abc", Some(CastType::Integer))
                .unwrap_err()
                .to_string(),
            "Input 'abc' is not a valid integer"
        );
        assert_eq!(coerce("7", Some(CastType::Point)), Ok(Value::Point(7.0)));
        assert_eq!(coerce("no", Some(CastType::State)), Ok(Value::State(false)));
        assert_eq!(
            coerce("12", Some(CastType::Text)),
            Ok(Value::Text("12".to_string()))
        );
    }
}
