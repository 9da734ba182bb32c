//! Model definitions and the schema builder.
//!
//! A [`ModelDef`] collects what a class declares (bases, annotations,
//! valued entries, config, validators). [`ModelDef::build`] runs once per
//! model type and produces a [`ModelType`]: the ordered field table, the
//! resolved config, the validator registry and the encoder, plus a lazily
//! filled schema-document cache.
//!
//! Field order is load-bearing for cross-field validators:
//!
//! 1. inherited fields, merging bases last-to-first;
//! 2. this class's annotation-only fields, in annotation order;
//! 3. this class's valued fields, in declaration order.
//!
//! A name seen again in a later group replaces the earlier spec in place.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::config::{Config, ConfigOverrides, finalize_extra_policy, inherit_config};
use crate::error::{ConfigError, Error, ErrorCause, ErrorWrapper, Loc, Result, ValidationError};
use crate::field::{FieldDefault, FieldInfo, FieldSpec};
use crate::instance::Instance;
use crate::json::{self, Encoder};
use crate::types::{FieldType, TypeExpr, TypeNamespace};
use crate::validate;
use crate::validators::{
    Validator, ValidatorEntries, ValidatorGroup, extract_validators, inherit_validators,
};
use crate::value::{Value, ValueMap};

/// Names every model already defines; fields may not shadow them.
pub const RESERVED_NAMES: &[&str] = &[
    "dict",
    "json",
    "copy",
    "schema",
    "schema_json",
    "construct",
    "parse_obj",
    "parse_raw",
    "parse_file",
    "fields",
    "validate",
    "update_forward_refs",
    "to_string",
    "config",
];

/// Kinds of class attributes that never become fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Function,
    Property,
    Type,
    ClassMethod,
    StaticMethod,
}

#[derive(Debug, Clone)]
enum NamespaceEntry {
    Value(FieldInfo),
    ClassVar(Value),
    Attribute(AttributeKind),
}

/// Ordered field name to field spec.
pub type FieldTable = IndexMap<String, FieldSpec>;

/// Declaration of one model type, consumed by [`ModelDef::build`].
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    bases: Vec<ModelType>,
    annotations: IndexMap<String, TypeExpr>,
    namespace: IndexMap<String, NamespaceEntry>,
    config: Option<ConfigOverrides>,
    validators: Vec<(Vec<String>, Validator)>,
    types: TypeNamespace,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            annotations: IndexMap::new(),
            namespace: IndexMap::new(),
            config: None,
            validators: Vec::new(),
            types: TypeNamespace::new(),
        }
    }

    /// Inherit from `base`; earlier bases take precedence over later ones.
    pub fn base(mut self, base: &ModelType) -> Self {
        self.bases.push(base.clone());
        self
    }

    /// Declare a field type. Without a valued entry the field is required.
    pub fn annotate(mut self, name: impl Into<String>, ty: impl Into<TypeExpr>) -> Self {
        self.annotations.insert(name.into(), ty.into());
        self
    }

    /// Declare a valued entry: a field default, or field metadata.
    pub fn field(mut self, name: impl Into<String>, info: impl Into<FieldInfo>) -> Self {
        self.namespace
            .insert(name.into(), NamespaceEntry::Value(info.into()));
        self
    }

    /// Shorthand for [`annotate`](Self::annotate) plus [`field`](Self::field).
    pub fn typed_field(
        self,
        name: impl Into<String>,
        ty: impl Into<TypeExpr>,
        info: impl Into<FieldInfo>,
    ) -> Self {
        let name = name.into();
        self.annotate(name.clone(), ty).field(name, info)
    }

    /// Declare a class-level constant, never a field.
    pub fn class_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.namespace
            .insert(name.into(), NamespaceEntry::ClassVar(value.into()));
        self
    }

    /// Declare a method or other non-field attribute.
    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.namespace
            .insert(name.into(), NamespaceEntry::Attribute(kind));
        self
    }

    pub fn config(mut self, config: ConfigOverrides) -> Self {
        self.config = Some(config);
        self
    }

    /// Register a validator for the given field names (`"*"` for all).
    pub fn validator<I, S>(mut self, fields: I, validator: Validator) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validators
            .push((fields.into_iter().map(Into::into).collect(), validator));
        self
    }

    /// Model types that textual annotations may name.
    pub fn types(mut self, types: &TypeNamespace) -> Self {
        self.types = types.clone();
        self
    }

    /// Build the schema. Fails on name collisions, invalid config values,
    /// misdirected validators and malformed field declarations.
    #[tracing::instrument(level = "debug", skip(self), fields(model = %self.name))]
    pub fn build(self) -> Result<ModelType, ConfigError> {
        let ModelDef {
            name,
            bases,
            annotations,
            namespace,
            config: own_config,
            validators: declarations,
            types,
        } = self;

        let mut fields = FieldTable::new();
        let mut config = Arc::new(Config::default());
        let mut validators = ValidatorEntries::new();
        for base in bases.iter().rev() {
            for (field_name, field) in base.fields().iter() {
                fields.insert(field_name.clone(), field.clone());
            }
            config = inherit_config(Some(base.config().declared()), &config);
            validators = inherit_validators(base.validator_entries(), validators);
        }

        let config = inherit_config(own_config.as_ref(), &config);
        let config = finalize_extra_policy(&config, &name)?;
        let validators = inherit_validators(&extract_validators(&declarations)?, validators);
        let mut group = ValidatorGroup::new(validators);
        let own_validators: HashSet<&str> = declarations.iter().map(|(_, v)| v.name()).collect();
        let inherited: HashSet<String> = fields.keys().cloned().collect();

        for field in fields.values_mut() {
            field.set_config(Arc::clone(&config));
            let extra = group.get_validators(field.name());
            if !extra.is_empty() {
                tracing::trace!(
                    field = field.name(),
                    validators = extra.len(),
                    "attaching validators to inherited field"
                );
                field.add_validators(extra);
            }
            field.prepare()?;
        }

        let mut class_var_names: HashSet<String> = HashSet::new();
        let mut resolved: IndexMap<String, FieldType> = IndexMap::new();
        for (ann_name, expr) in &annotations {
            if expr.is_class_var() {
                class_var_names.insert(ann_name.clone());
            } else {
                resolved.insert(ann_name.clone(), expr.resolve(&types)?);
            }
        }
        for (var_name, entry) in &namespace {
            if matches!(entry, NamespaceEntry::ClassVar(_)) {
                class_var_names.insert(var_name.clone());
            }
        }

        for (ann_name, ty) in &resolved {
            if ann_name.starts_with('_') || namespace.contains_key(ann_name) {
                continue;
            }
            check_field_name(&bases, ann_name)?;
            let field = FieldSpec::infer(
                ann_name.clone(),
                FieldInfo::required(),
                Some(ty.clone()),
                declared_validators(&mut group, ann_name, &inherited, &own_validators),
                Arc::clone(&config),
            )?;
            fields.insert(ann_name.clone(), field);
        }

        let mut attributes = IndexMap::new();
        let mut class_vars = ValueMap::new();
        for (var_name, entry) in namespace {
            match entry {
                NamespaceEntry::Attribute(kind) => {
                    attributes.insert(var_name, kind);
                }
                NamespaceEntry::ClassVar(value) => {
                    class_vars.insert(var_name, value);
                }
                NamespaceEntry::Value(info)
                    if var_name.starts_with('_') || class_var_names.contains(&var_name) =>
                {
                    let value = match info.default {
                        FieldDefault::Value(value) => value,
                        FieldDefault::Required => Value::Null,
                    };
                    class_vars.insert(var_name, value);
                }
                NamespaceEntry::Value(info) => {
                    check_field_name(&bases, &var_name)?;
                    let field = FieldSpec::infer(
                        var_name.clone(),
                        info,
                        resolved.get(&var_name).cloned(),
                        declared_validators(&mut group, &var_name, &inherited, &own_validators),
                        Arc::clone(&config),
                    )?;
                    fields.insert(var_name, field);
                }
            }
        }

        group.check_unused()?;

        let encoder = match config.json_encoders() {
            Some(encoders) => {
                tracing::trace!(encoders = encoders.len(), "using custom json encoders");
                json::custom_encoder(encoders.clone())
            }
            None => json::default_encoder(),
        };

        tracing::debug!(
            fields = fields.len(),
            extra = %config.extra(),
            "built model schema"
        );

        Ok(ModelType(Arc::new(ModelInner {
            name,
            bases,
            fields: RwLock::new(Arc::new(fields)),
            config,
            validators: group.into_entries(),
            encoder,
            attributes,
            class_vars,
            schema_cache: RwLock::new(HashMap::new()),
        })))
    }
}

/// Validators for a field declared by the class being built. A field that
/// redeclares an inherited one only keeps validators this class registers.
fn declared_validators(
    group: &mut ValidatorGroup,
    name: &str,
    inherited: &HashSet<String>,
    own_validators: &HashSet<&str>,
) -> IndexMap<String, Validator> {
    let mut validators = group.get_validators(name);
    if inherited.contains(name) {
        validators.retain(|validator_name, _| own_validators.contains(validator_name.as_str()));
    }
    validators
}

fn check_field_name(bases: &[ModelType], name: &str) -> Result<(), ConfigError> {
    if RESERVED_NAMES.contains(&name) || bases.iter().any(|base| base.has_attribute(name)) {
        return Err(ConfigError::new(format!(
            "Field name \"{name}\" shadows a BaseModel attribute; \
             use a different field name with \"alias='{name}'\"."
        )));
    }
    Ok(())
}

struct ModelInner {
    name: String,
    bases: Vec<ModelType>,
    fields: RwLock<Arc<FieldTable>>,
    config: Arc<Config>,
    validators: ValidatorEntries,
    encoder: Encoder,
    attributes: IndexMap<String, AttributeKind>,
    class_vars: ValueMap,
    schema_cache: RwLock<HashMap<bool, Arc<serde_json::Value>>>,
}

/// A built model type. Cheap to clone; clones share the same schema.
#[derive(Clone)]
pub struct ModelType(Arc<ModelInner>);

impl ModelType {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn bases(&self) -> &[ModelType] {
        &self.0.bases
    }

    /// Snapshot of the field table.
    pub fn fields(&self) -> Arc<FieldTable> {
        Arc::clone(&self.0.fields.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn field(&self, name: &str) -> Option<FieldSpec> {
        self.fields().get(name).cloned()
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.0.config
    }

    pub fn encoder(&self) -> &Encoder {
        &self.0.encoder
    }

    /// Merged validator registry, as inherited by subclasses.
    pub fn validator_entries(&self) -> &ValidatorEntries {
        &self.0.validators
    }

    /// A class-level constant, looked up through the bases.
    pub fn class_var(&self, name: &str) -> Option<&Value> {
        self.0
            .class_vars
            .get(name)
            .or_else(|| self.0.bases.iter().find_map(|base| base.class_var(name)))
    }

    /// Whether `name` is a non-field attribute of this model or a base.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.attributes.contains_key(name)
            || self.0.class_vars.contains_key(name)
            || self.0.bases.iter().any(|base| base.has_attribute(name))
    }

    /// Whether this model is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &ModelType) -> bool {
        self == other || self.0.bases.iter().any(|base| base.is_subclass_of(other))
    }

    /// Create an instance without validation; the caller vouches for
    /// `values`.
    pub fn construct(&self, values: ValueMap) -> Instance {
        Instance::construct_trusted(self, values)
    }

    /// Validate a value as this model. Mappings and instances of any model
    /// are validated afresh; the result is always an instance of `self`.
    pub fn validate(&self, value: Value) -> Result<Instance> {
        self.validate_value(value)?.map_err(Error::from)
    }

    pub(crate) fn validate_value(
        &self,
        value: Value,
    ) -> Result<Result<Instance, ValidationError>, ConfigError> {
        let input = match value {
            Value::Model(instance) => instance.into_values(),
            Value::Map(map) => map,
            _ => {
                let error = ErrorWrapper::new(ErrorCause::WrongType { expected: "dict" }, Loc::new())
                    .with_config(&self.0.config);
                return Ok(Err(ValidationError::new(vec![error])));
            }
        };
        let (values, errors) = validate::run(self, &input)?;
        Ok(match ValidationError::aggregate(errors) {
            None => Ok(Instance::construct_trusted(self, values)),
            Some(err) => Err(err),
        })
    }

    /// Resolve fields whose types were forward references, using `types`
    /// plus this model itself, and re-prepare them.
    pub fn update_forward_refs(&self, types: &TypeNamespace) -> Result<(), ConfigError> {
        let mut types = types.clone();
        if !types.contains(self.name()) {
            types.insert(self);
        }

        let mut table = (*self.fields()).clone();
        let mut resolved = 0_usize;
        for field in table.values_mut() {
            if field.type_().contains_forward_ref() {
                let ty = field.type_().resolve_forward_refs(&types)?;
                field.set_type(ty);
                field.prepare()?;
                resolved += 1;
            }
        }

        *self.0.fields.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
        self.clear_schema_cache();
        tracing::debug!(model = self.name(), resolved, "updated forward references");
        Ok(())
    }

    pub(crate) fn schema_cache(&self) -> &RwLock<HashMap<bool, Arc<serde_json::Value>>> {
        &self.0.schema_cache
    }

    fn clear_schema_cache(&self) {
        self.0
            .schema_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ModelType {}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.0.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Extra;

    fn names(model: &ModelType) -> Vec<String> {
        model.fields().keys().cloned().collect()
    }

    #[test]
    fn test_field_order_groups() {
        let model = ModelDef::new("M")
            .field("valued", 1)
            .annotate("b", FieldType::Int)
            .annotate("a", FieldType::Str)
            .annotate("valued", FieldType::Int)
            .build()
            .unwrap();
        assert_eq!(names(&model), vec!["b", "a", "valued"]);
        assert!(model.fields()["a"].required());
        assert!(!model.fields()["valued"].required());
    }

    #[test]
    fn test_multiple_bases_merge_last_to_first() {
        let a = ModelDef::new("A")
            .field("a", 1)
            .field("shared", "from a")
            .build()
            .unwrap();
        let b = ModelDef::new("B")
            .field("b", 2)
            .field("shared", 0)
            .build()
            .unwrap();
        let c = ModelDef::new("C").base(&a).base(&b).build().unwrap();

        assert_eq!(names(&c), vec!["b", "shared", "a"]);
        assert_eq!(c.fields()["shared"].type_(), &FieldType::Str);
        assert!(c.is_subclass_of(&a));
        assert!(!a.is_subclass_of(&c));
    }

    #[test]
    fn test_subclass_redeclaration_replaces_in_place() {
        let parent = ModelDef::new("Parent")
            .field("x", 1)
            .field("y", 2)
            .build()
            .unwrap();
        let child = ModelDef::new("Child")
            .base(&parent)
            .typed_field("x", FieldType::Str, FieldInfo::new("s").alias("ex"))
            .build()
            .unwrap();

        assert_eq!(names(&child), vec!["x", "y"]);
        let fields = child.fields();
        let x = &fields["x"];
        assert_eq!(x.type_(), &FieldType::Str);
        assert_eq!(x.alias(), "ex");
        assert_eq!(parent.fields()["x"].type_(), &FieldType::Int);
    }

    #[test]
    fn test_class_vars_private_names_and_attributes_are_not_fields() {
        let model = ModelDef::new("M")
            .annotate("counter", "ClassVar[int]")
            .field("counter", 3)
            .class_var("LIMIT", 10)
            .field("_private", 1)
            .annotate("_hidden", FieldType::Int)
            .attribute("describe", AttributeKind::Function)
            .field("real", 1)
            .build()
            .unwrap();

        assert_eq!(names(&model), vec!["real"]);
        assert_eq!(model.class_var("counter"), Some(&Value::Int(3)));
        assert_eq!(model.class_var("LIMIT"), Some(&Value::Int(10)));
        assert!(model.has_attribute("describe"));
    }

    #[test]
    fn test_reserved_and_ancestor_names_collide() {
        let err = ModelDef::new("M").field("json", 1).build().unwrap_err();
        assert!(err.message().starts_with("Field name \"json\" shadows a BaseModel attribute"));

        let parent = ModelDef::new("P")
            .attribute("describe", AttributeKind::Function)
            .build()
            .unwrap();
        let err = ModelDef::new("C")
            .base(&parent)
            .annotate("describe", FieldType::Str)
            .build()
            .unwrap_err();
        assert!(err.message().contains("\"describe\""));
    }

    #[test]
    fn test_unused_validator_fails_build() {
        let err = ModelDef::new("M")
            .field("a", 1)
            .validator(["b"], Validator::new("check_b", |v, _| Ok(v)))
            .build()
            .unwrap_err();
        assert!(err.message().contains("check_b"));

        assert!(
            ModelDef::new("M")
                .field("a", 1)
                .validator(
                    ["b"],
                    Validator::new("check_b", |v, _| Ok(v)).check_fields(false)
                )
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_subclass_validator_attaches_to_inherited_field() {
        let parent = ModelDef::new("P").field("a", 1).build().unwrap();
        let child = ModelDef::new("C")
            .base(&parent)
            .validator(["a"], Validator::new("double", |v, _| Ok(v)))
            .build()
            .unwrap();
        assert!(child.fields()["a"].class_validators().contains_key("double"));
        assert!(parent.fields()["a"].class_validators().is_empty());
    }

    #[test]
    fn test_config_inheritance_and_extra() {
        let parent = ModelDef::new("P")
            .config(ConfigOverrides::new().extra("forbid").title("Parent"))
            .build()
            .unwrap();
        let child = ModelDef::new("C")
            .base(&parent)
            .config(ConfigOverrides::new().title("Child"))
            .build()
            .unwrap();
        assert_eq!(child.config().extra(), Extra::Forbid);
        assert_eq!(child.config().title(), Some("Child"));

        let err = ModelDef::new("Bad")
            .config(ConfigOverrides::new().extra("maybe"))
            .build()
            .unwrap_err();
        assert_eq!(err.message(), "\"Bad\": maybe is not a valid value for \"extra\"");
    }

    #[test]
    fn test_validate_rebuilds_instances() {
        let parent = ModelDef::new("P")
            .annotate("n", FieldType::Int)
            .build()
            .unwrap();
        let child = ModelDef::new("C")
            .base(&parent)
            .field("tag", "x")
            .build()
            .unwrap();

        let trusted = child.construct(crate::value_map! { "n" => "7", "tag" => "y" });
        let rebuilt = parent.validate(Value::Model(trusted)).unwrap();
        assert_eq!(rebuilt.model(), &parent);
        assert_eq!(rebuilt.get("n").unwrap(), &Value::Int(7));
        assert!(rebuilt.get("tag").is_err());

        let unchecked = parent.construct(crate::value_map! { "n" => "seven" });
        let err = parent.validate(Value::Model(unchecked)).unwrap_err();
        assert_eq!(
            err.as_validation().map(|e| e.errors()[0].kind.clone()),
            Some("type_error.integer".to_string())
        );
    }

    #[test]
    fn test_forward_refs_resolve_later() {
        let node = ModelDef::new("Node")
            .field("value", 0)
            .typed_field("next", "Optional[Node]", FieldInfo::new(Value::Null))
            .build()
            .unwrap();
        assert!(node.fields()["next"].type_().contains_forward_ref());

        node.update_forward_refs(&TypeNamespace::new()).unwrap();
        let fields = node.fields();
        let next = &fields["next"];
        assert_eq!(
            next.type_(),
            &FieldType::optional(FieldType::Model(node.clone()))
        );
        assert!(next.allow_none());
    }
}
