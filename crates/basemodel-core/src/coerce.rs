//! Lax type coercion of raw values into declared field types.
//!
//! Coercion never stops at the first bad item: container elements are all
//! visited and every failure is reported with its own location.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use regex::Regex;

use crate::config::Config;
use crate::error::{ConfigError, ErrorCause, ErrorWrapper, Loc, LocItem};
use crate::types::{FieldType, NumberBounds, StrConstraints};
use crate::value::{Value, ValueMap};

/// A coerced value, or every error found while coercing it.
pub type Coerced = Result<Value, Vec<ErrorWrapper>>;

/// Compiled constraint patterns, shared for the life of the program.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Whether `value` matches `pattern` at its start. Invalid patterns never
/// match (they are rejected when the field is prepared).
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.find(value).is_some_and(|m| m.start() == 0),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in constraint, treating as non-match"
            );
            false
        }
    }
}

/// Error message for an invalid pattern, `None` if it compiles.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match regex_cache().get_or_compile(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

/// Coerce `value` into `ty`, reporting failures at `loc`.
///
/// A `ConfigError` means the type itself is unusable (an unresolved
/// forward reference) and is never a data error.
pub fn coerce(ty: &FieldType, value: Value, loc: &Loc, config: &Config) -> Result<Coerced, ConfigError> {
    let fail = |cause: ErrorCause| -> Result<Coerced, ConfigError> {
        Ok(Err(vec![ErrorWrapper::new(cause, loc.clone()).with_config(config)]))
    };

    match ty {
        FieldType::ForwardRef(text) => Err(ConfigError::new(format!(
            "type {text:?} is still a forward reference"
        ))),
        FieldType::Any => Ok(Ok(value)),
        FieldType::Optional(inner) => {
            if value.is_null() {
                Ok(Ok(Value::Null))
            } else {
                coerce(inner, value, loc, config)
            }
        }
        _ if value.is_null() => fail(ErrorCause::NoneNotAllowed),
        FieldType::Bool => match to_bool(&value) {
            Some(b) => Ok(Ok(Value::Bool(b))),
            None => fail(ErrorCause::WrongType { expected: "bool" }),
        },
        FieldType::Int => match to_int(&value) {
            Some(i) => Ok(Ok(Value::Int(i))),
            None => fail(ErrorCause::WrongType { expected: "integer" }),
        },
        FieldType::Float => match to_float(&value) {
            Some(x) => Ok(Ok(Value::Float(x))),
            None => fail(ErrorCause::WrongType { expected: "float" }),
        },
        FieldType::ConInt(bounds) => match to_int(&value) {
            Some(i) => match check_bounds(i as f64, bounds) {
                None => Ok(Ok(Value::Int(i))),
                Some(cause) => fail(cause),
            },
            None => fail(ErrorCause::WrongType { expected: "integer" }),
        },
        FieldType::ConFloat(bounds) => match to_float(&value) {
            Some(x) => match check_bounds(x, bounds) {
                None => Ok(Ok(Value::Float(x))),
                Some(cause) => fail(cause),
            },
            None => fail(ErrorCause::WrongType { expected: "float" }),
        },
        FieldType::Str => coerce_str(&value, &StrConstraints::default(), config)
            .map_or_else(fail, |s| Ok(Ok(Value::Str(s)))),
        FieldType::ConStr(constraints) => coerce_str(&value, constraints, config)
            .map_or_else(fail, |s| Ok(Ok(Value::Str(s)))),
        FieldType::Bytes => match value {
            Value::Bytes(b) => Ok(Ok(Value::Bytes(b))),
            Value::Str(s) => Ok(Ok(Value::Bytes(s.into_bytes()))),
            Value::Int(_) | Value::Float(_) => Ok(Ok(Value::Bytes(value.to_string().into_bytes()))),
            _ => fail(ErrorCause::WrongType { expected: "bytes" }),
        },
        FieldType::List(inner) => match into_items(value) {
            Some(items) => Ok(coerce_items(inner, items, loc, config)?.map(Value::List)),
            None => fail(ErrorCause::WrongType { expected: "list" }),
        },
        FieldType::Set(inner) => match into_items(value) {
            Some(items) => Ok(coerce_items(inner, items, loc, config)?.map(Value::set)),
            None => fail(ErrorCause::WrongType { expected: "set" }),
        },
        FieldType::TupleVariadic(inner) => match into_items(value) {
            Some(items) => Ok(coerce_items(inner, items, loc, config)?.map(Value::Tuple)),
            None => fail(ErrorCause::WrongType { expected: "tuple" }),
        },
        FieldType::Tuple(types) => match into_items(value) {
            Some(items) if items.len() == types.len() => {
                let mut out = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for (i, (item, item_ty)) in items.into_iter().zip(types).enumerate() {
                    match coerce(item_ty, item, &loc.child(i), config)? {
                        Ok(v) => out.push(v),
                        Err(errs) => errors.extend(errs),
                    }
                }
                Ok(if errors.is_empty() { Ok(Value::Tuple(out)) } else { Err(errors) })
            }
            Some(items) => fail(ErrorCause::TupleLength {
                expected: types.len(),
                actual: items.len(),
            }),
            None => fail(ErrorCause::WrongType { expected: "tuple" }),
        },
        FieldType::Map(inner) => {
            let map = match value {
                Value::Map(map) => map,
                Value::Model(instance) => instance.into_values(),
                _ => return fail(ErrorCause::WrongType { expected: "dict" }),
            };
            let mut out = ValueMap::with_capacity(map.len());
            let mut errors = Vec::new();
            for (key, item) in map {
                match coerce(inner, item, &loc.child(LocItem::Key(key.clone())), config)? {
                    Ok(v) => {
                        out.insert(key, v);
                    }
                    Err(errs) => errors.extend(errs),
                }
            }
            Ok(if errors.is_empty() { Ok(Value::Map(out)) } else { Err(errors) })
        }
        FieldType::Model(model) => match model.validate_value(value)? {
            Ok(instance) => Ok(Ok(Value::Model(instance))),
            Err(nested) => fail(ErrorCause::Nested(nested)),
        },
        FieldType::Arbitrary(expected) => {
            let is_instance = matches!(
                &value,
                Value::Custom(custom) if custom.custom_type_name() == expected.as_str()
            );
            if is_instance {
                Ok(Ok(value))
            } else {
                fail(ErrorCause::ArbitraryType {
                    expected: expected.clone(),
                })
            }
        }
    }
}

fn coerce_items(
    item_ty: &FieldType,
    items: Vec<Value>,
    loc: &Loc,
    config: &Config,
) -> Result<Result<Vec<Value>, Vec<ErrorWrapper>>, ConfigError> {
    let mut out = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        match coerce(item_ty, item, &loc.child(i), config)? {
            Ok(v) => out.push(v),
            Err(errs) => errors.extend(errs),
        }
    }
    Ok(if errors.is_empty() { Ok(out) } else { Err(errors) })
}

fn into_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Some(items),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::Float(x) if *x == 0.0 => Some(false),
        Value::Float(x) if *x == 1.0 => Some(true),
        Value::Str(s) => str_to_bool(s),
        Value::Bytes(b) => std::str::from_utf8(b).ok().and_then(str_to_bool),
        _ => None,
    }
}

fn str_to_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "0" | "off" | "f" | "false" | "n" | "no" => Some(false),
        "1" | "on" | "t" | "true" | "y" | "yes" => Some(true),
        _ => None,
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(x) if x.is_finite() && x.abs() < 9.2e18 => Some(x.trunc() as i64),
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(x) => Some(*x),
        Value::Int(i) => Some(*i as f64),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_str(value: &Value, constraints: &StrConstraints, config: &Config) -> Result<String, ErrorCause> {
    let s = match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(x) => format!("{x:?}"),
        Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|_| ErrorCause::WrongType { expected: "str" })?,
        _ => return Err(ErrorCause::WrongType { expected: "str" }),
    };

    let s = if constraints.strip_whitespace || config.anystr_strip_whitespace() {
        s.trim().to_string()
    } else {
        s
    };

    let len = s.chars().count();
    if let Some(limit) = constraints.min_length.or(config.min_anystr_length()) {
        if len < limit {
            return Err(ErrorCause::StrMinLength { limit });
        }
    }
    if let Some(limit) = constraints.max_length.or(config.max_anystr_length()) {
        if len > limit {
            return Err(ErrorCause::StrMaxLength { limit });
        }
    }
    if let Some(pattern) = &constraints.regex {
        if !matches_pattern(&s, pattern) {
            return Err(ErrorCause::StrRegex {
                pattern: pattern.clone(),
            });
        }
    }
    Ok(s)
}

fn check_bounds(n: f64, bounds: &NumberBounds) -> Option<ErrorCause> {
    if let Some(limit) = bounds.gt.filter(|limit| n <= *limit) {
        return Some(ErrorCause::NumberNotGt { limit });
    }
    if let Some(limit) = bounds.ge.filter(|limit| n < *limit) {
        return Some(ErrorCause::NumberNotGe { limit });
    }
    if let Some(limit) = bounds.lt.filter(|limit| n >= *limit) {
        return Some(ErrorCause::NumberNotLt { limit });
    }
    if let Some(limit) = bounds.le.filter(|limit| n > *limit) {
        return Some(ErrorCause::NumberNotLe { limit });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, inherit_config};
    use std::sync::Arc;

    fn run(ty: &FieldType, value: impl Into<Value>) -> Coerced {
        coerce(ty, value.into(), &Loc::from("f"), &Config::default()).unwrap()
    }

    fn codes(result: Coerced) -> Vec<(String, String)> {
        result
            .unwrap_err()
            .iter()
            .map(|e| (e.loc().to_string(), e.cause().code().into_owned()))
            .collect()
    }

    #[test]
    fn test_scalars_are_lax() {
        assert_eq!(run(&FieldType::Int, "42"), Ok(Value::Int(42)));
        assert_eq!(run(&FieldType::Int, 3.9), Ok(Value::Int(3)));
        assert_eq!(run(&FieldType::Float, 2), Ok(Value::Float(2.0)));
        assert_eq!(run(&FieldType::Bool, "yes"), Ok(Value::Bool(true)));
        assert_eq!(run(&FieldType::Str, 12), Ok(Value::Str("12".into())));
        assert_eq!(
            codes(run(&FieldType::Int, "abc")),
            vec![("f".to_string(), "type_error.integer".to_string())]
        );
    }

    #[test]
    fn test_null_rejected_unless_optional() {
        assert_eq!(
            codes(run(&FieldType::Int, Value::Null)),
            vec![("f".to_string(), "type_error.none.not_allowed".to_string())]
        );
        assert_eq!(
            run(&FieldType::optional(FieldType::Int), Value::Null),
            Ok(Value::Null)
        );
        assert_eq!(run(&FieldType::Any, Value::Null), Ok(Value::Null));
    }

    #[test]
    fn test_container_errors_are_located_per_item() {
        let ty = FieldType::list(FieldType::Int);
        let input = Value::List(vec![Value::Int(1), "x".into(), Value::Int(3), "y".into()]);
        assert_eq!(
            codes(run(&ty, input)),
            vec![
                ("f -> 1".to_string(), "type_error.integer".to_string()),
                ("f -> 3".to_string(), "type_error.integer".to_string()),
            ]
        );

        let ty = FieldType::map(FieldType::Float);
        let input = crate::value_map! { "a" => 1, "b" => "nope" };
        assert_eq!(
            codes(run(&ty, input)),
            vec![("f -> b".to_string(), "type_error.float".to_string())]
        );
    }

    #[test]
    fn test_containers_convert_between_kinds() {
        let ty = FieldType::set(FieldType::Int);
        let out = run(&ty, Value::List(vec!["1".into(), Value::Int(1), Value::Int(2)])).unwrap();
        assert_eq!(out, Value::set(vec![Value::Int(1), Value::Int(2)]));

        let ty = FieldType::Tuple(vec![FieldType::Int, FieldType::Str]);
        assert_eq!(
            run(&ty, Value::List(vec![Value::Int(1), Value::Int(2)])),
            Ok(Value::Tuple(vec![Value::Int(1), Value::Str("2".into())]))
        );
        assert_eq!(
            codes(run(&ty, Value::List(vec![Value::Int(1)]))),
            vec![("f".to_string(), "value_error.tuple.length".to_string())]
        );
    }

    #[test]
    fn test_string_constraints() {
        let ty = FieldType::ConStr(
            StrConstraints::new()
                .min_length(2)
                .max_length(5)
                .regex("^[a-z]+$")
                .strip_whitespace(true),
        );
        assert_eq!(run(&ty, "  abc "), Ok(Value::Str("abc".into())));
        assert_eq!(
            codes(run(&ty, "a")),
            vec![("f".to_string(), "value_error.any_str.min_length".to_string())]
        );
        assert_eq!(
            codes(run(&ty, "abcdefg")),
            vec![("f".to_string(), "value_error.any_str.max_length".to_string())]
        );
        assert_eq!(
            codes(run(&ty, "ab1")),
            vec![("f".to_string(), "value_error.str.regex".to_string())]
        );
    }

    #[test]
    fn test_config_string_limits() {
        let config = inherit_config(
            Some(
                &ConfigOverrides::new()
                    .anystr_strip_whitespace(true)
                    .max_anystr_length(3),
            ),
            &Arc::new(Config::default()),
        );
        let loc = Loc::from("f");
        assert_eq!(
            coerce(&FieldType::Str, " ab ".into(), &loc, &config).unwrap(),
            Ok(Value::Str("ab".into()))
        );
        assert!(coerce(&FieldType::Str, "abcd".into(), &loc, &config).unwrap().is_err());
    }

    #[test]
    fn test_number_bounds() {
        let ty = FieldType::ConInt(NumberBounds::new().gt(0.0).le(150.0));
        assert_eq!(run(&ty, 150), Ok(Value::Int(150)));
        assert_eq!(
            codes(run(&ty, 0)),
            vec![("f".to_string(), "value_error.number.not_gt".to_string())]
        );
        assert_eq!(
            codes(run(&ty, 151)),
            vec![("f".to_string(), "value_error.number.not_le".to_string())]
        );
    }

    #[test]
    fn test_arbitrary_matches_type_name() {
        #[derive(Debug, Clone, PartialEq)]
        struct Color(u8);

        let ty = FieldType::arbitrary::<Color>();
        assert!(run(&ty, Value::custom(Color(1))).is_ok());
        assert_eq!(
            codes(run(&ty, "red")),
            vec![("f".to_string(), "type_error.arbitrary_type".to_string())]
        );
    }

    #[test]
    fn test_forward_ref_is_config_error() {
        let ty = FieldType::list(FieldType::ForwardRef("Node".into()));
        let err = coerce(
            &ty,
            Value::List(vec![Value::Int(1)]),
            &Loc::from("f"),
            &Config::default(),
        )
        .unwrap_err();
        assert!(err.message().contains("Node"));
    }

    #[test]
    fn test_regex_cache() {
        assert!(matches_pattern("abc123", "[a-z]+"));
        assert!(!matches_pattern("123abc", "[a-z]+"));
        assert!(!matches_pattern("abc", "(unclosed"));
        assert!(validate_pattern("^ok$").is_none());
        assert!(validate_pattern("(unclosed").is_some());
    }
}
