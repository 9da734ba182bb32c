//! The validation engine.
//!
//! One pass over a model's field table resolves every field from raw input
//! (alias lookup, defaulting, required-ness, coercion) and then applies the
//! extra-field policy. Data errors are collected, never short-circuited;
//! configuration errors abort the pass immediately.

use std::collections::HashSet;

use crate::config::Extra;
use crate::error::{ConfigError, ErrorCause, ErrorWrapper, Loc, Result, ValidationError};
use crate::field::FieldSpec;
use crate::model::ModelType;
use crate::value::{Value, ValueMap};

/// Validate `input` against `model`.
///
/// Returns the validated values together with the aggregated error, if
/// any. With `raise_on_error` set, a non-empty aggregate is returned as
/// `Err(Error::Validation)` instead.
pub fn validate_model(
    model: &ModelType,
    input: &ValueMap,
    raise_on_error: bool,
) -> Result<(ValueMap, Option<ValidationError>)> {
    let (values, errors) = run(model, input)?;
    match ValidationError::aggregate(errors) {
        Some(err) if raise_on_error => Err(err.into()),
        aggregate => Ok((values, aggregate)),
    }
}

pub(crate) fn run(
    model: &ModelType,
    input: &ValueMap,
) -> Result<(ValueMap, Vec<ErrorWrapper>), ConfigError> {
    let config = model.config();
    let fields = model.fields();
    let check_extra = config.extra() != Extra::Ignore;

    let mut values = ValueMap::with_capacity(fields.len());
    let mut errors = Vec::new();
    let mut consumed: HashSet<&str> = HashSet::new();

    for (name, field) in fields.iter() {
        if field.type_().contains_forward_ref() {
            return Err(ConfigError::new(format!(
                "field \"{name}\" not yet prepared so type is still a ForwardRef, \
                 you might need to call {}.update_forward_refs()",
                model.name()
            )));
        }

        let mut key = field.alias();
        let mut found = input.get(key);
        if found.is_none() && config.allow_population_by_alias() && field.has_alias() {
            key = name.as_str();
            found = input.get(key);
        }

        let value = match found {
            Some(value) => {
                if check_extra {
                    consumed.insert(key);
                }
                value.clone()
            }
            None if field.required() => {
                errors.push(ErrorWrapper::new(ErrorCause::Missing, field.alias()).with_config(config));
                continue;
            }
            None if config.validate_all() || field.validate_always() => field.default_value(),
            None => {
                values.insert(name.clone(), field.default_value());
                continue;
            }
        };

        match field.validate(value, &values, &Loc::from(field.alias()), model)? {
            Ok(value) => {
                values.insert(name.clone(), value);
            }
            Err(field_errors) => errors.extend(field_errors),
        }
    }

    if check_extra {
        let mut extra: Vec<&String> = input
            .keys()
            .filter(|key| !consumed.contains(key.as_str()))
            .collect();
        match config.extra() {
            Extra::Allow => {
                for key in extra {
                    values
                        .entry(key.clone())
                        .or_insert_with(|| input[key.as_str()].clone());
                }
            }
            Extra::Forbid => {
                extra.sort();
                for key in extra {
                    errors.push(ErrorWrapper::new(ErrorCause::Extra, key.as_str()).with_config(config));
                }
            }
            Extra::Ignore => {}
        }
    }

    tracing::trace!(
        model = model.name(),
        fields = fields.len(),
        errors = errors.len(),
        "validated input"
    );
    Ok((values, errors))
}

/// Re-validate one field for assignment, with the rest of the instance
/// state as context. Errors are located at the field name.
pub fn validate_assignment(
    model: &ModelType,
    field: &FieldSpec,
    value: Value,
    context: &ValueMap,
) -> Result<Value> {
    let loc = Loc::from(field.name());
    match field.validate(value, context, &loc, model)? {
        Ok(value) => Ok(value),
        Err(errors) => Err(ValidationError::new(errors).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::field::FieldInfo;
    use crate::model::ModelDef;
    use crate::types::FieldType;
    use crate::validators::Validator;
    use crate::value_map;

    fn person(extra: Extra) -> ModelType {
        ModelDef::new("Person")
            .annotate("name", FieldType::Str)
            .field("age", 0)
            .config(ConfigOverrides::new().extra(extra))
            .build()
            .unwrap()
    }

    fn error_locs(err: &ValidationError) -> Vec<(String, String)> {
        err.errors()
            .into_iter()
            .map(|e| (e.loc.to_string(), e.kind))
            .collect()
    }

    #[test]
    fn test_defaults_fill_missing_optional_fields() {
        let (values, err) =
            validate_model(&person(Extra::Forbid), &value_map! { "name" => "Ann" }, false).unwrap();
        assert!(err.is_none());
        assert_eq!(values, value_map! { "name" => "Ann", "age" => 0 });
    }

    #[test]
    fn test_missing_and_extra_errors_are_aggregated() {
        let input = value_map! { "zeta" => 1, "age" => "x", "alpha" => 2 };
        let (_, err) = validate_model(&person(Extra::Forbid), &input, false).unwrap();
        assert_eq!(
            error_locs(&err.unwrap()),
            vec![
                ("name".to_string(), "value_error.missing".to_string()),
                ("age".to_string(), "type_error.integer".to_string()),
                ("alpha".to_string(), "value_error.extra".to_string()),
                ("zeta".to_string(), "value_error.extra".to_string()),
            ]
        );
    }

    #[test]
    fn test_raise_on_error() {
        let err = validate_model(&person(Extra::Ignore), &ValueMap::new(), true).unwrap_err();
        assert_eq!(err.as_validation().map(|e| e.errors().len()), Some(1));
    }

    #[test]
    fn test_extra_policies() {
        let input = value_map! { "name" => "Ann", "nick" => 5 };

        let (values, _) = validate_model(&person(Extra::Ignore), &input, false).unwrap();
        assert!(!values.contains_key("nick"));

        let (values, err) = validate_model(&person(Extra::Allow), &input, false).unwrap();
        assert!(err.is_none());
        assert_eq!(values["nick"], Value::Int(5));
    }

    #[test]
    fn test_alias_and_population_by_name() {
        let by_alias_only = ModelDef::new("M")
            .field("name", FieldInfo::new("").alias("fullName"))
            .build()
            .unwrap();
        let (values, _) =
            validate_model(&by_alias_only, &value_map! { "fullName" => "Ann" }, false).unwrap();
        assert_eq!(values["name"], Value::Str("Ann".into()));
        let (values, _) = validate_model(&by_alias_only, &value_map! { "name" => "Bo" }, false).unwrap();
        assert_eq!(values["name"], Value::Str(String::new()));

        let populate = ModelDef::new("M")
            .field("name", FieldInfo::new("").alias("fullName"))
            .config(
                ConfigOverrides::new()
                    .allow_population_by_alias(true)
                    .extra(Extra::Forbid),
            )
            .build()
            .unwrap();
        let (values, err) = validate_model(&populate, &value_map! { "name" => "Bo" }, false).unwrap();
        assert!(err.is_none());
        assert_eq!(values["name"], Value::Str("Bo".into()));
    }

    #[test]
    fn test_validators_see_only_earlier_fields() {
        let model = ModelDef::new("M")
            .field("a", 1)
            .field("b", 2)
            .field("c", 3)
            .validator(
                ["b"],
                Validator::new("seen", |_, args| {
                    Ok(Value::List(
                        args.values.keys().map(|k| Value::Str(k.clone())).collect(),
                    ))
                }),
            )
            .build()
            .unwrap();
        let (values, _) =
            validate_model(&model, &value_map! { "a" => 1, "b" => 2, "c" => 3 }, false).unwrap();
        assert_eq!(values["b"], Value::List(vec![Value::Str("a".into())]));
    }

    #[test]
    fn test_validate_all_runs_on_defaults() {
        let model = ModelDef::new("M")
            .typed_field("n", FieldType::Int, FieldInfo::new("7"))
            .config(ConfigOverrides::new().validate_all(true))
            .build()
            .unwrap();
        let (values, _) = validate_model(&model, &ValueMap::new(), false).unwrap();
        assert_eq!(values["n"], Value::Int(7));

        let lax = ModelDef::new("M")
            .typed_field("n", FieldType::Int, FieldInfo::new("7"))
            .build()
            .unwrap();
        let (values, _) = validate_model(&lax, &ValueMap::new(), false).unwrap();
        assert_eq!(values["n"], Value::Str("7".into()));
    }

    #[test]
    fn test_always_validator_runs_on_default() {
        let model = ModelDef::new("M")
            .field("stamp", "")
            .validator(
                ["stamp"],
                Validator::new("fill", |_, _| Ok(Value::Str("filled".into()))).always(),
            )
            .build()
            .unwrap();
        let (values, _) = validate_model(&model, &ValueMap::new(), false).unwrap();
        assert_eq!(values["stamp"], Value::Str("filled".into()));
    }

    #[test]
    fn test_forward_ref_is_config_error() {
        let model = ModelDef::new("M")
            .annotate("child", "Later")
            .build()
            .unwrap();
        let err = validate_model(&model, &value_map! { "child" => 1 }, false).unwrap_err();
        assert!(err.is_config());
    }
}
