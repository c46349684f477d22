use std::cmp::Ordering;

use crate::builtins::BuiltinFunction;

use super::error::RuntimeErrorKind;
use super::value::Value;

type BuiltinResult = Result<Value, RuntimeErrorKind>;

/// Runs a built-in on already evaluated arguments.
pub fn call(function: BuiltinFunction, args: Vec<Value>) -> BuiltinResult {
    let signature = function.signature();
    if !signature.accepts_arity(args.len()) {
        return Err(RuntimeErrorKind::ArityMismatch {
            name: function.name().to_string(),
            expected: signature.arity_label(),
            found: args.len(),
        });
    }
    let fail = |message: String| RuntimeErrorKind::BuiltinArgument {
        function: function.name(),
        message,
    };
    let wrong_type = |position: usize, expected: &str, value: &Value| {
        fail(format!(
            "argument {position} must be {expected}, not {}",
            value.type_name()
        ))
    };

    let mut args = args.into_iter();
    let first = args.next().unwrap_or(Value::Empty);
    let second = args.next();
    let third = args.next();

    match function {
        BuiltinFunction::Length => match &first {
            Value::List(items) => Value::integer(items.len() as i64),
            Value::Text(text) => Value::integer(text.chars().count() as i64),
            other => Err(wrong_type(1, "list or text", other)),
        },
        BuiltinFunction::Uppercase => match first {
            Value::Text(text) => Ok(Value::Text(text.to_uppercase())),
            other => Err(wrong_type(1, "text", &other)),
        },
        BuiltinFunction::Lowercase => match first {
            Value::Text(text) => Ok(Value::Text(text.to_lowercase())),
            other => Err(wrong_type(1, "text", &other)),
        },
        BuiltinFunction::Max | BuiltinFunction::Min => {
            let items = elements(&first).ok_or_else(|| wrong_type(1, "list or text", &first))?;
            let wanted = if function == BuiltinFunction::Max {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best: Option<Value> = None;
            for item in items {
                best = match best {
                    None => Some(item),
                    Some(current) => match item.compare(&current) {
                        Some(ordering) if ordering == wanted => Some(item),
                        Some(_) => Some(current),
                        None => {
                            return Err(fail(format!(
                                "cannot compare {} with {}",
                                item.type_name(),
                                current.type_name()
                            )));
                        }
                    },
                };
            }
            best.ok_or_else(|| fail("argument is empty".to_string()))
        }
        BuiltinFunction::Sorted => {
            let mut items =
                elements(&first).ok_or_else(|| wrong_type(1, "list or text", &first))?;
            let mut incomparable = None;
            items.sort_by(|left, right| {
                left.compare(right).unwrap_or_else(|| {
                    incomparable.get_or_insert((left.type_name(), right.type_name()));
                    Ordering::Equal
                })
            });
            match incomparable {
                Some((left, right)) => Err(fail(format!("cannot compare {left} with {right}"))),
                None => Ok(Value::List(items)),
            }
        }
        BuiltinFunction::Reverse => match first {
            Value::List(mut items) => {
                items.reverse();
                Ok(Value::List(items))
            }
            Value::Text(text) => Ok(Value::Text(text.chars().rev().collect())),
            other => Err(wrong_type(1, "list or text", &other)),
        },
        BuiltinFunction::Abs => match first {
            Value::Integer(value) => Value::integer(value.abs()),
            Value::Point(value) => Value::point(value.abs()),
            other => Err(wrong_type(1, "integer or point", &other)),
        },
        BuiltinFunction::Sum => match &first {
            Value::List(items) => items
                .iter()
                .try_fold(Value::Integer(0), |total, item| match item {
                    Value::Integer(_) | Value::Point(_) => total.add(item),
                    other => Err(fail(format!(
                        "list items must be numbers, found {}",
                        other.type_name()
                    ))),
                }),
            other => Err(wrong_type(1, "list", other)),
        },
        BuiltinFunction::Contains => {
            let needle = second.unwrap_or(Value::Empty);
            match (&first, &needle) {
                (Value::List(items), needle) => {
                    Ok(Value::State(items.iter().any(|item| item.equals(needle))))
                }
                (Value::Text(text), Value::Text(part)) => Ok(Value::State(text.contains(part.as_str()))),
                (Value::Text(text), other) => Ok(Value::State(text.contains(&other.to_string()))),
                (other, _) => Err(wrong_type(1, "list or text", other)),
            }
        }
        BuiltinFunction::IndexOf => {
            let needle = second.unwrap_or(Value::Empty);
            let position = match (&first, &needle) {
                (Value::List(items), needle) => items.iter().position(|item| item.equals(needle)),
                (Value::Text(text), needle) => {
                    let needle = needle.to_string();
                    text.find(&needle)
                        .map(|byte_index| text[..byte_index].chars().count())
                }
                (other, _) => return Err(wrong_type(1, "list or text", other)),
            };
            Ok(Value::Integer(position.map_or(-1, |index| index as i64)))
        }
        BuiltinFunction::Join => {
            let separator = match &first {
                Value::Text(text) => text.clone(),
                other => return Err(wrong_type(1, "text", other)),
            };
            match second.unwrap_or(Value::Empty) {
                Value::List(items) => Ok(Value::Text(
                    items
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(&separator),
                )),
                other => Err(wrong_type(2, "list", &other)),
            }
        }
        BuiltinFunction::Slice => {
            let start = integer_argument(second.as_ref(), 2).map_err(fail)?;
            let end = integer_argument(third.as_ref(), 3).map_err(fail)?;
            match first {
                Value::List(items) => {
                    let (from, to) = clamp_range(start, end, items.len());
                    Ok(Value::List(items[from..to].to_vec()))
                }
                Value::Text(text) => {
                    let chars = text.chars().collect::<Vec<_>>();
                    let (from, to) = clamp_range(start, end, chars.len());
                    Ok(Value::Text(chars[from..to].iter().collect()))
                }
                other => Err(wrong_type(1, "list or text", &other)),
            }
        }
        BuiltinFunction::Unique => {
            let items = elements(&first).ok_or_else(|| wrong_type(1, "list or text", &first))?;
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.iter().any(|seen| seen.equals(&item)) {
                    unique.push(item);
                }
            }
            Ok(Value::List(unique))
        }
        BuiltinFunction::Type => Ok(Value::Text(first.type_name().to_string())),
        BuiltinFunction::Isqrt => {
            let value = first
                .as_number()
                .ok_or_else(|| wrong_type(1, "integer or point", &first))?;
            if value < 0.0 {
                return Err(fail("argument must not be negative".to_string()));
            }
            Value::integer(value.sqrt().floor() as i64)
        }
        BuiltinFunction::Pow => {
            let exponent = second.unwrap_or(Value::Empty);
            match (&first, &exponent) {
                (Value::Integer(base), Value::Integer(power)) if *power >= 0 => {
                    let power = u32::try_from(*power).map_err(|_| {
                        RuntimeErrorKind::IntegerOutOfRange {
                            value: format!("{base} ^ {power}"),
                        }
                    })?;
                    match base.checked_pow(power) {
                        Some(result) => Value::integer(result),
                        None => Err(RuntimeErrorKind::IntegerOutOfRange {
                            value: format!("{base} ^ {power}"),
                        }),
                    }
                }
                _ => {
                    let base = first
                        .as_number()
                        .ok_or_else(|| wrong_type(1, "integer or point", &first))?;
                    let power = exponent
                        .as_number()
                        .ok_or_else(|| wrong_type(2, "integer or point", &exponent))?;
                    Value::point(base.powf(power))
                }
            }
        }
        BuiltinFunction::Factorial => match first {
            Value::Integer(value) if (0..=20).contains(&value) => {
                Value::integer((1..=value).product())
            }
            Value::Integer(_) => Err(fail("argument must be between 0 and 20".to_string())),
            other => Err(wrong_type(1, "integer", &other)),
        },
        BuiltinFunction::Ceil | BuiltinFunction::Floor => {
            let value = first
                .as_number()
                .ok_or_else(|| wrong_type(1, "integer or point", &first))?;
            let rounded = if function == BuiltinFunction::Ceil {
                value.ceil()
            } else {
                value.floor()
            };
            Value::integer(rounded as i64)
        }
        BuiltinFunction::Round => {
            let value = first
                .as_number()
                .ok_or_else(|| wrong_type(1, "integer or point", &first))?;
            match second {
                None => Value::integer(value.round() as i64),
                Some(places) => {
                    let places = places
                        .as_integer()
                        .filter(|places| (0..=9).contains(places))
                        .ok_or_else(|| fail("places must be an integer from 0 to 9".to_string()))?;
                    let factor = 10f64.powi(places as i32);
                    Value::point((value * factor).round() / factor)
                }
            }
        }
        BuiltinFunction::ToString => Ok(Value::Text(first.to_string())),
        BuiltinFunction::ToList => match first {
            Value::Text(text) => Ok(Value::List(
                text.chars().map(|ch| Value::Text(ch.to_string())).collect(),
            )),
            other => Err(wrong_type(1, "text", &other)),
        },
    }
}

/// Items of a list, or the characters of a text as one-character texts.
fn elements(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) => Some(items.clone()),
        Value::Text(text) => Some(text.chars().map(|ch| Value::Text(ch.to_string())).collect()),
        _ => None,
    }
}

fn integer_argument(value: Option<&Value>, position: usize) -> Result<i64, String> {
    match value {
        Some(Value::Integer(value)) => Ok(*value),
        Some(other) => Err(format!(
            "argument {position} must be integer, not {}",
            other.type_name()
        )),
        None => Err(format!("argument {position} is missing")),
    }
}

/// Resolves `start..end` against `len`; negative bounds count from the end.
fn clamp_range(start: i64, end: i64, len: usize) -> (usize, usize) {
    let len = len as i64;
    let resolve = |bound: i64| {
        let bound = if bound < 0 { len + bound } else { bound };
        bound.clamp(0, len) as usize
    };
    let from = resolve(start);
    let to = resolve(end).max(from);
    (from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    fn list(items: &[i64]) -> Value {
        Value::List(items.iter().map(|item| Value::Integer(*item)).collect())
    }

    #[test]
    fn sequence_helpers() {
        assert_eq!(call(BuiltinFunction::Length, vec![text("héllo")]), Ok(Value::Integer(5)));
        assert_eq!(call(BuiltinFunction::Sorted, vec![list(&[3, 1, 2])]), Ok(list(&[1, 2, 3])));
        assert_eq!(call(BuiltinFunction::Reverse, vec![text("abc")]), Ok(text("cba")));
        assert_eq!(call(BuiltinFunction::Unique, vec![list(&[1, 1, 2])]), Ok(list(&[1, 2])));
        assert_eq!(
            call(BuiltinFunction::Slice, vec![list(&[1, 2, 3, 4]), Value::Integer(1), Value::Integer(-1)]),
            Ok(list(&[2, 3]))
        );
        assert_eq!(
            call(BuiltinFunction::IndexOf, vec![list(&[5, 6]), Value::Integer(9)]),
            Ok(Value::Integer(-1))
        );
        assert_eq!(
            call(BuiltinFunction::Join, vec![text("-"), list(&[1, 2])]),
            Ok(text("1-2"))
        );
        assert_eq!(
            call(BuiltinFunction::ToList, vec![text("ab")]),
            Ok(Value::List(vec![text("a"), text("b")]))
        );
    }

    #[test]
    fn numeric_helpers() {
        assert_eq!(call(BuiltinFunction::Pow, vec![Value::Integer(2), Value::Integer(10)]), Ok(Value::Integer(1024)));
        assert_eq!(call(BuiltinFunction::Pow, vec![Value::Integer(2), Value::Integer(-1)]), Ok(Value::Point(0.5)));
        assert_eq!(call(BuiltinFunction::Isqrt, vec![Value::Integer(17)]), Ok(Value::Integer(4)));
        assert_eq!(call(BuiltinFunction::Round, vec![Value::Point(2.5)]), Ok(Value::Integer(3)));
        assert_eq!(
            call(BuiltinFunction::Round, vec![Value::Point(3.14159), Value::Integer(2)]),
            Ok(Value::Point(3.14))
        );
        assert_eq!(call(BuiltinFunction::Sum, vec![list(&[1, 2, 3])]), Ok(Value::Integer(6)));
        assert_eq!(call(BuiltinFunction::Factorial, vec![Value::Integer(5)]), Ok(Value::Integer(120)));
        assert!(matches!(
            call(BuiltinFunction::Factorial, vec![Value::Integer(15)]),
            Err(RuntimeErrorKind::IntegerOutOfRange { .. })
        ));
    }

    #[test]
    fn reports_bad_arguments() {
        assert_eq!(
            call(BuiltinFunction::Max, vec![list(&[])]).unwrap_err().to_string(),
            "max(): argument is empty"
        );
        assert_eq!(
            call(BuiltinFunction::Uppercase, vec![Value::Integer(1)])
                .unwrap_err()
                .to_string(),
            "uppercase(): argument 1 must be text, not integer"
        );
    }
}
