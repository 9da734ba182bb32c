//! JSON-Schema-like documents describing a model type.
//!
//! Nested models are emitted once under `definitions` and referenced with
//! `$ref`. Documents are cached per model type and alias mode.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError};

use serde_json::{Map, Value as JsonValue, json};

use crate::error::{ConfigError, Result};
use crate::field::FieldSpec;
use crate::json::to_json_value;
use crate::model::ModelType;
use crate::types::{FieldType, NumberBounds};

const REF_PREFIX: &str = "#/definitions/";

/// `first_name` -> `First Name`.
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn put_bounds(out: &mut Map<String, JsonValue>, bounds: &NumberBounds) {
    let pairs = [
        ("exclusiveMinimum", bounds.gt),
        ("minimum", bounds.ge),
        ("exclusiveMaximum", bounds.lt),
        ("maximum", bounds.le),
    ];
    for (key, limit) in pairs {
        if let Some(limit) = limit {
            out.insert(key.to_string(), json!(limit));
        }
    }
}

struct SchemaBuilder {
    by_alias: bool,
    root: String,
    /// Set once any `$ref` points back at the root model.
    root_referenced: bool,
    definitions: Map<String, JsonValue>,
    in_progress: HashSet<String>,
}

impl SchemaBuilder {
    fn new(root: &ModelType, by_alias: bool) -> Self {
        Self {
            by_alias,
            root: root.name().to_string(),
            root_referenced: false,
            definitions: Map::new(),
            in_progress: HashSet::new(),
        }
    }

    fn model_body(&mut self, model: &ModelType) -> Result<Map<String, JsonValue>, ConfigError> {
        self.in_progress.insert(model.name().to_string());

        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in model.fields().values() {
            let key = if self.by_alias { field.alias() } else { field.name() };
            properties.insert(key.to_string(), JsonValue::Object(self.field_schema(model, field)?));
            if field.required() {
                required.push(JsonValue::String(key.to_string()));
            }
        }

        let mut body = Map::new();
        let title = model.config().title().unwrap_or(model.name());
        body.insert("title".into(), json!(title));
        body.insert("type".into(), json!("object"));
        body.insert("properties".into(), JsonValue::Object(properties));
        if !required.is_empty() {
            body.insert("required".into(), JsonValue::Array(required));
        }

        self.in_progress.remove(model.name());
        Ok(body)
    }

    fn field_schema(
        &mut self,
        model: &ModelType,
        field: &FieldSpec,
    ) -> Result<Map<String, JsonValue>, ConfigError> {
        let mut out = Map::new();
        let title = field
            .title()
            .map_or_else(|| title_case(field.name()), str::to_string);
        out.insert("title".into(), json!(title));
        if let Some(description) = field.description() {
            out.insert("description".into(), json!(description));
        }

        let type_schema = self.type_schema(field.name(), field.type_())?;
        out.extend(type_schema);

        if !field.required() && !field.default().is_null() {
            // Defaults the encoder cannot represent are left out.
            if let Ok(encoded) = to_json_value(field.default(), model.encoder()) {
                out.insert("default".into(), encoded);
            }
        }
        Ok(out)
    }

    fn type_schema(
        &mut self,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<Map<String, JsonValue>, ConfigError> {
        let mut out = Map::new();
        match ty {
            FieldType::Any | FieldType::Arbitrary(_) => {}
            FieldType::Bool => {
                out.insert("type".into(), json!("boolean"));
            }
            FieldType::Int => {
                out.insert("type".into(), json!("integer"));
            }
            FieldType::Float => {
                out.insert("type".into(), json!("number"));
            }
            FieldType::Str => {
                out.insert("type".into(), json!("string"));
            }
            FieldType::Bytes => {
                out.insert("type".into(), json!("string"));
                out.insert("format".into(), json!("binary"));
            }
            FieldType::List(item) | FieldType::TupleVariadic(item) => {
                out.insert("type".into(), json!("array"));
                out.insert("items".into(), self.nested(field_name, item)?);
            }
            FieldType::Set(item) => {
                out.insert("type".into(), json!("array"));
                out.insert("items".into(), self.nested(field_name, item)?);
                out.insert("uniqueItems".into(), json!(true));
            }
            FieldType::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|item| self.nested(field_name, item))
                    .collect::<Result<Vec<_>, _>>()?;
                out.insert("type".into(), json!("array"));
                out.insert("items".into(), JsonValue::Array(items));
            }
            FieldType::Map(value) => {
                out.insert("type".into(), json!("object"));
                if !matches!(**value, FieldType::Any) {
                    out.insert("additionalProperties".into(), self.nested(field_name, value)?);
                }
            }
            FieldType::Optional(inner) => out = self.type_schema(field_name, inner)?,
            FieldType::Model(nested) => {
                self.define(nested)?;
                out.insert(
                    "$ref".into(),
                    json!(format!("{REF_PREFIX}{}", nested.name())),
                );
            }
            FieldType::ConStr(constraints) => {
                out.insert("type".into(), json!("string"));
                if let Some(min) = constraints.min_length {
                    out.insert("minLength".into(), json!(min));
                }
                if let Some(max) = constraints.max_length {
                    out.insert("maxLength".into(), json!(max));
                }
                if let Some(pattern) = &constraints.regex {
                    out.insert("pattern".into(), json!(pattern));
                }
            }
            FieldType::ConInt(bounds) => {
                out.insert("type".into(), json!("integer"));
                put_bounds(&mut out, bounds);
            }
            FieldType::ConFloat(bounds) => {
                out.insert("type".into(), json!("number"));
                put_bounds(&mut out, bounds);
            }
            FieldType::ForwardRef(expr) => {
                return Err(ConfigError::new(format!(
                    "field \"{field_name}\" has unresolved type {expr}, \
                     you might need to call update_forward_refs()"
                )));
            }
        }
        Ok(out)
    }

    fn nested(&mut self, field_name: &str, ty: &FieldType) -> Result<JsonValue, ConfigError> {
        Ok(JsonValue::Object(self.type_schema(field_name, ty)?))
    }

    fn define(&mut self, model: &ModelType) -> Result<(), ConfigError> {
        if self.in_progress.contains(model.name()) {
            if model.name() == self.root {
                self.root_referenced = true;
            }
            return Ok(());
        }
        if self.definitions.contains_key(model.name()) {
            return Ok(());
        }
        let body = self.model_body(model)?;
        self.definitions
            .insert(model.name().to_string(), JsonValue::Object(body));
        Ok(())
    }
}

/// Build the document for `model`.
pub fn model_schema(model: &ModelType, by_alias: bool) -> Result<JsonValue, ConfigError> {
    let mut builder = SchemaBuilder::new(model, by_alias);
    let mut body = builder.model_body(model)?;

    // Recursive models point at their own definition, directly or through
    // another model's.
    if builder.root_referenced {
        builder
            .definitions
            .insert(model.name().to_string(), JsonValue::Object(body.clone()));
    }

    if !builder.definitions.is_empty() {
        body.insert("definitions".into(), JsonValue::Object(builder.definitions));
    }
    Ok(JsonValue::Object(body))
}

impl ModelType {
    /// The cached schema document for one alias mode.
    pub fn schema_document(&self, by_alias: bool) -> Result<Arc<JsonValue>> {
        if let Some(cached) = self
            .schema_cache()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&by_alias)
        {
            return Ok(Arc::clone(cached));
        }

        let document = Arc::new(model_schema(self, by_alias)?);
        tracing::trace!(model = self.name(), by_alias, "cached schema document");
        let mut cache = self
            .schema_cache()
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(by_alias).or_insert(document)))
    }

    /// Alias-keyed document.
    pub fn schema(&self) -> Result<Arc<JsonValue>> {
        self.schema_document(true)
    }

    pub fn schema_json(&self, by_alias: bool) -> Result<String> {
        let document = self.schema_document(by_alias)?;
        Ok(document.to_string())
    }
}
