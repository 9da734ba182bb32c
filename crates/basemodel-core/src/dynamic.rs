//! Runtime model definitions.
//!
//! [`create_model`] builds a model type from a list of field definitions
//! instead of a hand-written [`ModelDef`].

use crate::config::ConfigOverrides;
use crate::error::ConfigError;
use crate::field::{FieldDefault, FieldInfo};
use crate::model::{ModelDef, ModelType};
use crate::types::TypeExpr;
use crate::value::{Value, ValueMap};

/// One field of a dynamically created model.
#[derive(Debug, Clone)]
pub enum FieldDefinition {
    /// A bare default; the type is inferred from it.
    Default(Value),
    /// An explicit type with a default, or no default at all.
    Typed(TypeExpr, FieldDefault),
}

impl FieldDefinition {
    pub fn value(default: impl Into<Value>) -> Self {
        FieldDefinition::Default(default.into())
    }

    pub fn typed(ty: impl Into<TypeExpr>, default: impl Into<Value>) -> Self {
        FieldDefinition::Typed(ty.into(), FieldDefault::Value(default.into()))
    }

    pub fn required(ty: impl Into<TypeExpr>) -> Self {
        FieldDefinition::Typed(ty.into(), FieldDefault::Required)
    }
}

/// A `(annotation, default)` tuple is a typed definition; any other tuple
/// shape is rejected; everything else is a bare default.
impl TryFrom<Value> for FieldDefinition {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Tuple(mut items) if items.len() == 2 => {
                let default = items.pop().unwrap_or(Value::Null);
                match items.pop() {
                    Some(Value::Str(annotation)) => Ok(FieldDefinition::typed(annotation, default)),
                    _ => Err(ConfigError::new(
                        "field definitions should either be a tuple of (<type>, <default>) or just a \
                         default value, the type must be a type annotation string",
                    )),
                }
            }
            Value::Tuple(_) => Err(ConfigError::new(
                "field definitions should either be a tuple of (<type>, <default>) or just a \
                 default value, unfortunately this means tuples as default values are not allowed",
            )),
            other => Ok(FieldDefinition::Default(other)),
        }
    }
}

/// Build a model type at runtime.
///
/// `base` and `config` are mutually exclusive: the base already carries a
/// resolved config. Names starting with `_` are skipped with a warning.
pub fn create_model<I, S>(
    name: &str,
    base: Option<&ModelType>,
    config: Option<ConfigOverrides>,
    definitions: I,
) -> Result<ModelType, ConfigError>
where
    I: IntoIterator<Item = (S, FieldDefinition)>,
    S: Into<String>,
{
    let mut def = ModelDef::new(name);
    match (base, config) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::new(
                "to avoid confusion __config__ and __base__ cannot be used together",
            ));
        }
        (Some(base), None) => def = def.base(base),
        (None, Some(config)) => def = def.config(config),
        (None, None) => {}
    }

    for (field_name, definition) in definitions {
        let field_name = field_name.into();
        if field_name.starts_with('_') {
            tracing::warn!(
                model = name,
                field = %field_name,
                "fields may not start with an underscore, ignoring \"{field_name}\""
            );
            continue;
        }
        def = match definition {
            FieldDefinition::Default(value) => def.field(field_name, FieldInfo::new(value)),
            FieldDefinition::Typed(ty, FieldDefault::Required) => def.annotate(field_name, ty),
            FieldDefinition::Typed(ty, FieldDefault::Value(value)) => {
                def.typed_field(field_name, ty, FieldInfo::new(value))
            }
        };
    }

    def.build()
}

/// [`create_model`] over a value mapping, each entry converted with
/// [`FieldDefinition::try_from`].
pub fn create_model_from_values(
    name: &str,
    base: Option<&ModelType>,
    config: Option<ConfigOverrides>,
    definitions: ValueMap,
) -> Result<ModelType, ConfigError> {
    let definitions = definitions
        .into_iter()
        .map(|(field_name, value)| Ok((field_name, FieldDefinition::try_from(value)?)))
        .collect::<Result<Vec<_>, ConfigError>>()?;
    create_model(name, base, config, definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Extra;
    use crate::instance::Instance;
    use crate::types::FieldType;
    use crate::value_map;

    #[test]
    fn test_create_model_fields_in_order() {
        let model = create_model(
            "Dyn",
            None,
            None,
            [
                ("count", FieldDefinition::value(1)),
                ("name", FieldDefinition::required(FieldType::Str)),
                ("tags", FieldDefinition::typed("List[str]", Value::List(Vec::new()))),
            ],
        )
        .unwrap();
        let names: Vec<String> = model.fields().keys().cloned().collect();
        assert_eq!(names, vec!["name", "count", "tags"]);
        assert!(model.fields()["name"].required());

        let m = Instance::new(&model, value_map! { "name" => "n", "count" => "3" }).unwrap();
        assert_eq!(m.get("count").unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_base_and_config_conflict() {
        let base = create_model("Base", None, None, [("a", FieldDefinition::value(1))]).unwrap();
        let err = create_model(
            "Child",
            Some(&base),
            Some(ConfigOverrides::new().extra(Extra::Forbid)),
            Vec::<(String, FieldDefinition)>::new(),
        )
        .unwrap_err();
        assert_eq!(
            err.message(),
            "to avoid confusion __config__ and __base__ cannot be used together"
        );

        let child = create_model("Child", Some(&base), None, [("b", FieldDefinition::value(2))])
            .unwrap();
        assert!(child.is_subclass_of(&base));
        assert_eq!(child.fields().len(), 2);
    }

    #[test]
    fn test_private_names_are_skipped() {
        let model = create_model(
            "Dyn",
            None,
            None,
            [("_secret", FieldDefinition::value(1)), ("shown", FieldDefinition::value(2))],
        )
        .unwrap();
        assert!(model.field("_secret").is_none());
        assert!(model.class_var("_secret").is_none());
        assert!(model.field("shown").is_some());
    }

    #[test]
    fn test_definitions_from_values() {
        let model = create_model_from_values(
            "Dyn",
            None,
            None,
            value_map! {
                "plain" => 5,
                "typed" => Value::Tuple(vec!["float".into(), 1.into()]),
            },
        )
        .unwrap();
        assert_eq!(model.fields()["typed"].type_(), &FieldType::Float);

        let err = create_model_from_values(
            "Dyn",
            None,
            None,
            value_map! { "bad" => Value::Tuple(vec![1.into(), 2.into(), 3.into()]) },
        )
        .unwrap_err();
        assert!(err.message().starts_with("field definitions should either be a tuple"));
    }
}
