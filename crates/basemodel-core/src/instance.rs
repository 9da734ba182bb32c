//! Model instances.
//!
//! An [`Instance`] is one validated value mapping plus a handle on its
//! model type. All mutation goes through [`Instance::set`], which enforces
//! the model's mutation and assignment-validation policy.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::config::Extra;
use crate::error::{Error, Result};
use crate::json::{self, Encoder};
use crate::model::{FieldTable, ModelType};
use crate::validate::{validate_assignment, validate_model};
use crate::value::{Value, ValueMap};

const MAX_REPR_LEN: usize = 80;

fn name_set<I, S>(names: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

/// Key selection shared by projection and copy. `exclude` always wins; an
/// empty or absent `include` selects every key.
fn selected(key: &str, include: Option<&HashSet<String>>, exclude: Option<&HashSet<String>>) -> bool {
    let included = include.is_none_or(|include| include.is_empty() || include.contains(key));
    included && !exclude.is_some_and(|exclude| exclude.contains(key))
}

/// Options for [`Instance::to_mapping`].
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    pub include: Option<HashSet<String>>,
    pub exclude: Option<HashSet<String>>,
    /// Emit field aliases instead of field names.
    pub by_alias: bool,
}

impl DumpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(name_set(names));
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(name_set(names));
        self
    }

    pub fn by_alias(mut self, by_alias: bool) -> Self {
        self.by_alias = by_alias;
        self
    }
}

/// Options for [`Instance::to_json`].
#[derive(Clone, Default)]
pub struct JsonOptions {
    pub dump: DumpOptions,
    /// Replaces the model's encoder for this call.
    pub encoder: Option<Encoder>,
    pub pretty: bool,
}

impl JsonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dump(mut self, dump: DumpOptions) -> Self {
        self.dump = dump;
        self
    }

    pub fn encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl fmt::Debug for JsonOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonOptions")
            .field("dump", &self.dump)
            .field("encoder", &self.encoder.as_ref().map(|_| "<encoder>"))
            .field("pretty", &self.pretty)
            .finish()
    }
}

/// Options for [`Instance::copy`].
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub include: Option<HashSet<String>>,
    pub exclude: Option<HashSet<String>>,
    /// Values laid over the copy without validation.
    pub update: ValueMap,
    /// Deep-clone the copied values, custom payloads included.
    pub deep: bool,
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(name_set(names));
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(name_set(names));
        self
    }

    pub fn update(mut self, update: ValueMap) -> Self {
        self.update = update;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }
}

/// A validated model instance.
#[derive(Clone)]
pub struct Instance {
    model: ModelType,
    values: ValueMap,
}

impl Instance {
    /// Validate `data` and build an instance; fails with every error found.
    pub fn new(model: &ModelType, data: ValueMap) -> Result<Self> {
        let (values, _) = validate_model(model, &data, true)?;
        Ok(Self {
            model: model.clone(),
            values,
        })
    }

    /// Build an instance from values the caller vouches for.
    pub fn construct_trusted(model: &ModelType, values: ValueMap) -> Self {
        Self {
            model: model.clone(),
            values,
        }
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn fields(&self) -> Arc<FieldTable> {
        self.model.fields()
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.values.get(name).ok_or_else(|| Error::UnknownField {
            model: self.model.name().to_string(),
            name: name.to_string(),
        })
    }

    /// Assign one value, subject to the model's mutation policy.
    ///
    /// With `validate_assignment` the value is validated as the field, with
    /// the rest of the instance as context; on failure the stored value is
    /// left untouched.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let config = self.model.config();
        let fields = self.model.fields();
        let field = fields.get(name);

        if field.is_none() && config.extra() != Extra::Allow {
            return Err(Error::NoSuchField {
                model: self.model.name().to_string(),
                name: name.to_string(),
            });
        }
        if !config.allow_mutation() {
            return Err(Error::Immutable {
                model: self.model.name().to_string(),
            });
        }

        let value = match field {
            Some(field) if config.validate_assignment() => {
                let context: ValueMap = self
                    .values
                    .iter()
                    .filter(|(key, _)| key.as_str() != name)
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                validate_assignment(&self.model, field, value, &context)?
            }
            _ => value,
        };
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    pub fn into_values(self) -> ValueMap {
        self.values
    }

    /// Project the state to a plain mapping, unwrapping nested instances.
    pub fn to_mapping(&self, options: &DumpOptions) -> ValueMap {
        let fields = self.model.fields();
        self.values
            .iter()
            .filter(|(key, _)| selected(key, options.include.as_ref(), options.exclude.as_ref()))
            .map(|(key, value)| {
                let key = match fields.get(key) {
                    Some(field) if options.by_alias => field.alias().to_string(),
                    _ => key.clone(),
                };
                (key, unwrap_value(value, options.by_alias))
            })
            .collect()
    }

    /// `(field name, unwrapped value)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), unwrap_value(value, false)))
    }

    /// Serialize [`to_mapping`](Self::to_mapping) as JSON.
    pub fn to_json(&self, options: &JsonOptions) -> Result<String> {
        let mapping = Value::Map(self.to_mapping(&options.dump));
        let encoder = options.encoder.as_ref().unwrap_or(self.model.encoder());
        let json = json::to_json_value(&mapping, encoder)?;
        Ok(if options.pretty {
            format!("{json:#}")
        } else {
            json.to_string()
        })
    }

    /// A new instance from this one's state, without validation.
    pub fn copy(&self, options: CopyOptions) -> Self {
        let CopyOptions {
            include,
            exclude,
            update,
            deep,
        } = options;
        let mut values: ValueMap = self
            .values
            .iter()
            .filter(|(key, _)| selected(key, include.as_ref(), exclude.as_ref()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        values.extend(update);
        if deep {
            values = values
                .iter()
                .map(|(key, value)| (key.clone(), value.deep_clone()))
                .collect();
        }
        Self::construct_trusted(&self.model, values)
    }

    /// Copy with every nested value deep-cloned.
    pub fn deep_clone(&self) -> Self {
        self.copy(CopyOptions::new().deep(true))
    }

    /// One `name=value` per line.
    pub fn to_string_pretty(&self) -> String {
        self.render("\n  ")
    }

    fn render(&self, divider: &str) -> String {
        let mut out = self.model.name().to_string();
        for (key, value) in &self.values {
            out.push_str(divider);
            out.push_str(key);
            out.push('=');
            out.push_str(&truncate(&value.to_string()));
        }
        out
    }
}

fn truncate(repr: &str) -> String {
    if repr.chars().count() <= MAX_REPR_LEN {
        repr.to_string()
    } else {
        let mut out: String = repr.chars().take(MAX_REPR_LEN - 1).collect();
        out.push('…');
        out
    }
}

fn unwrap_value(value: &Value, by_alias: bool) -> Value {
    let unwrap_all =
        |items: &[Value]| -> Vec<Value> { items.iter().map(|v| unwrap_value(v, by_alias)).collect() };
    match value {
        Value::Model(instance) => {
            Value::Map(instance.to_mapping(&DumpOptions::new().by_alias(by_alias)))
        }
        Value::List(items) => Value::List(unwrap_all(items)),
        Value::Tuple(items) => Value::Tuple(unwrap_all(items)),
        Value::Set(items) => Value::Set(unwrap_all(items)),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), unwrap_value(v, by_alias)))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        let options = DumpOptions::default();
        self.to_mapping(&options) == other.to_mapping(&options)
    }
}

impl PartialEq<ValueMap> for Instance {
    fn eq(&self, other: &ValueMap) -> bool {
        self.to_mapping(&DumpOptions::default()) == *other
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(" "))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{self}>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::field::FieldInfo;
    use crate::model::ModelDef;
    use crate::types::{FieldType, NumberBounds};
    use crate::value_map;

    fn user(config: ConfigOverrides) -> ModelType {
        ModelDef::new("User")
            .annotate("id", FieldType::Int)
            .field("name", FieldInfo::new("Jane").alias("userName"))
            .typed_field(
                "age",
                FieldType::ConInt(NumberBounds::new().ge(0.0).le(150.0)),
                FieldInfo::new(30),
            )
            .config(config)
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_unknown_field() {
        let m = Instance::new(&user(ConfigOverrides::new()), value_map! { "id" => 1 }).unwrap();
        assert_eq!(m.get("id").unwrap(), &Value::Int(1));
        let err = m.get("nope").unwrap_err();
        assert_eq!(err.to_string(), "'User' object has no attribute 'nope'");
    }

    #[test]
    fn test_set_policies() {
        let mut m = Instance::new(&user(ConfigOverrides::new()), value_map! { "id" => 1 }).unwrap();
        m.set("age", "not checked").unwrap();
        assert_eq!(m.get("age").unwrap(), &Value::Str("not checked".into()));
        assert!(matches!(m.set("nope", 1), Err(Error::NoSuchField { .. })));

        let mut frozen = Instance::new(
            &user(ConfigOverrides::new().allow_mutation(false)),
            value_map! { "id" => 1 },
        )
        .unwrap();
        assert!(matches!(frozen.set("id", 2), Err(Error::Immutable { .. })));

        let mut open = Instance::new(
            &user(ConfigOverrides::new().extra(Extra::Allow)),
            value_map! { "id" => 1 },
        )
        .unwrap();
        open.set("nickname", "jj").unwrap();
        assert_eq!(open.get("nickname").unwrap(), &Value::Str("jj".into()));
    }

    #[test]
    fn test_validate_assignment_keeps_old_value_on_error() {
        let mut m = Instance::new(
            &user(ConfigOverrides::new().validate_assignment(true)),
            value_map! { "id" => 1 },
        )
        .unwrap();
        m.set("age", "42").unwrap();
        assert_eq!(m.get("age").unwrap(), &Value::Int(42));

        let err = m.set("age", 200).unwrap_err();
        let errors = err.as_validation().unwrap().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].loc.to_string(), "age");
        assert_eq!(errors[0].kind, "value_error.number.not_le");
        assert_eq!(m.get("age").unwrap(), &Value::Int(42));
    }

    #[test]
    fn test_to_mapping_include_exclude_alias() {
        let m = Instance::new(&user(ConfigOverrides::new()), value_map! { "id" => 1 }).unwrap();
        assert_eq!(
            m.to_mapping(&DumpOptions::new()),
            value_map! { "id" => 1, "name" => "Jane", "age" => 30 }
        );
        assert_eq!(
            m.to_mapping(&DumpOptions::new().include(["id", "age"]).exclude(["age"])),
            value_map! { "id" => 1 }
        );
        let keys: Vec<String> = m
            .to_mapping(&DumpOptions::new().by_alias(true))
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["id", "userName", "age"]);
    }

    #[test]
    fn test_copy_is_independent() {
        let m = Instance::new(&user(ConfigOverrides::new()), value_map! { "id" => 1 }).unwrap();
        let mut c = m.copy(CopyOptions::new());
        assert_eq!(c, m);
        c.set("name", "Changed").unwrap();
        assert_eq!(m.get("name").unwrap(), &Value::Str("Jane".into()));

        let partial = m.copy(
            CopyOptions::new()
                .exclude(["age"])
                .update(value_map! { "id" => "unchecked" }),
        );
        assert_eq!(partial, value_map! { "id" => "unchecked", "name" => "Jane" });
    }

    #[test]
    fn test_display_and_debug() {
        let m = Instance::new(&user(ConfigOverrides::new()), value_map! { "id" => 1 }).unwrap();
        assert_eq!(m.to_string(), "User id=1 name=\"Jane\" age=30");
        assert_eq!(format!("{m:?}"), "<User id=1 name=\"Jane\" age=30>");
        assert_eq!(m.to_string_pretty(), "User\n  id=1\n  name=\"Jane\"\n  age=30");

        let long = Instance::construct_trusted(m.model(), value_map! { "id" => "x".repeat(200) });
        let shown = long.to_string();
        assert!(shown.ends_with('…'));
        assert_eq!(shown.chars().count(), "User id=".len() + MAX_REPR_LEN);
    }

    #[test]
    fn test_to_json() {
        let m = Instance::new(&user(ConfigOverrides::new()), value_map! { "id" => 1 }).unwrap();
        assert_eq!(
            m.to_json(&JsonOptions::new().dump(DumpOptions::new().by_alias(true)))
                .unwrap(),
            r#"{"id":1,"userName":"Jane","age":30}"#
        );
    }
}
