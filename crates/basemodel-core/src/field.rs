//! Field declarations and resolved field specs.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::coerce::{self, Coerced, validate_pattern};
use crate::config::Config;
use crate::error::{ConfigError, ErrorCause, ErrorWrapper, Loc};
use crate::model::ModelType;
use crate::types::FieldType;
use crate::validators::{Validator, ValidatorArgs};
use crate::value::{Value, ValueMap};

/// Default of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// No default; input must supply the field.
    Required,
    Value(Value),
}

/// What a class declares for one field besides its type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub default: FieldDefault,
    /// External input key, if different from the field name.
    pub alias: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl FieldInfo {
    /// A field with a default value.
    pub fn new(default: impl Into<Value>) -> Self {
        Self {
            default: FieldDefault::Value(default.into()),
            alias: None,
            title: None,
            description: None,
        }
    }

    /// A field without a default.
    pub fn required() -> Self {
        Self {
            default: FieldDefault::Required,
            alias: None,
            title: None,
            description: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<Value> for FieldInfo {
    fn from(default: Value) -> Self {
        FieldInfo::new(default)
    }
}

impl From<&str> for FieldInfo {
    fn from(default: &str) -> Self {
        FieldInfo::new(default)
    }
}

impl From<String> for FieldInfo {
    fn from(default: String) -> Self {
        FieldInfo::new(default)
    }
}

impl From<bool> for FieldInfo {
    fn from(default: bool) -> Self {
        FieldInfo::new(default)
    }
}

impl From<i64> for FieldInfo {
    fn from(default: i64) -> Self {
        FieldInfo::new(default)
    }
}

impl From<i32> for FieldInfo {
    fn from(default: i32) -> Self {
        FieldInfo::new(default)
    }
}

impl From<f64> for FieldInfo {
    fn from(default: f64) -> Self {
        FieldInfo::new(default)
    }
}

/// Result of validating one field value: the coerced value, or every error
/// found for it.
pub type FieldOutcome = Coerced;

/// A resolved field in a model's field table.
#[derive(Clone)]
pub struct FieldSpec {
    name: String,
    alias: String,
    type_: FieldType,
    default: Value,
    required: bool,
    allow_none: bool,
    validate_always: bool,
    class_validators: IndexMap<String, Validator>,
    pre_validators: Vec<Validator>,
    post_validators: Vec<Validator>,
    config: Arc<Config>,
    title: Option<String>,
    description: Option<String>,
}

impl FieldSpec {
    /// Build a field from its declaration.
    ///
    /// The alias comes from the declaration, then from the config's
    /// per-field overrides, then defaults to the name. Without an annotation
    /// the type is inferred from the default.
    pub fn infer(
        name: impl Into<String>,
        info: FieldInfo,
        annotation: Option<FieldType>,
        class_validators: IndexMap<String, Validator>,
        config: Arc<Config>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let (default, required) = match info.default {
            FieldDefault::Required => (Value::Null, true),
            FieldDefault::Value(value) => (value, false),
        };

        let type_ = match annotation.or_else(|| FieldType::infer_from_value(&default)) {
            Some(ty) => ty,
            None => {
                return Err(ConfigError::new(format!(
                    "unable to infer type for attribute \"{name}\""
                )));
            }
        };

        let override_ = config.field_override(&name);
        let alias = info
            .alias
            .or_else(|| override_.and_then(|o| o.alias.clone()))
            .unwrap_or_else(|| name.clone());
        let title = info.title.or_else(|| override_.and_then(|o| o.title.clone()));
        let description = info
            .description
            .or_else(|| override_.and_then(|o| o.description.clone()));

        let mut field = Self {
            name,
            alias,
            type_,
            default,
            required,
            allow_none: false,
            validate_always: false,
            class_validators,
            pre_validators: Vec::new(),
            post_validators: Vec::new(),
            config,
            title,
            description,
        };
        field.prepare()?;
        Ok(field)
    }

    /// Derive the run-time flags from the type, default and validators.
    ///
    /// Skipped while the type is still a forward reference; it runs again
    /// once the reference is resolved.
    pub fn prepare(&mut self) -> Result<(), ConfigError> {
        if self.type_.contains_forward_ref() {
            return Ok(());
        }

        self.validate_always = self.class_validators.values().any(Validator::is_always);
        if self.type_.is_optional() {
            self.required = false;
        }
        self.allow_none = self.type_.is_optional() || (!self.required && self.default.is_null());

        if !self.config.arbitrary_types_allowed() {
            if let Some(name) = find_arbitrary(&self.type_) {
                return Err(ConfigError::new(format!(
                    "no validator found for {name}, see `arbitrary_types_allowed` in Config"
                )));
            }
        }

        if let Some(message) = find_constraint_patterns(&self.type_)
            .into_iter()
            .find_map(validate_pattern)
        {
            return Err(ConfigError::new(format!(
                "field \"{}\": {message}",
                self.name
            )));
        }

        let (pre, post): (Vec<Validator>, Vec<Validator>) = self
            .class_validators
            .values()
            .cloned()
            .partition(Validator::is_pre);
        self.pre_validators = pre;
        self.post_validators = post;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn has_alias(&self) -> bool {
        self.alias != self.name
    }

    pub fn type_(&self) -> &FieldType {
        &self.type_
    }

    /// The declared default (`null` for required fields).
    pub fn default(&self) -> &Value {
        &self.default
    }

    /// An independent copy of the default, for storing on an instance.
    pub fn default_value(&self) -> Value {
        self.default.deep_clone()
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn allow_none(&self) -> bool {
        self.allow_none
    }

    pub fn validate_always(&self) -> bool {
        self.validate_always
    }

    pub fn class_validators(&self) -> &IndexMap<String, Validator> {
        &self.class_validators
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub(crate) fn set_config(&mut self, config: Arc<Config>) {
        self.config = config;
    }

    /// Attach validators, replacing same-named ones in place.
    pub(crate) fn add_validators(&mut self, validators: IndexMap<String, Validator>) {
        self.class_validators.extend(validators);
    }

    pub(crate) fn set_type(&mut self, type_: FieldType) {
        self.type_ = type_;
    }

    /// Validate one raw value: pre validators, type coercion, then post
    /// validators. `values` holds the fields validated before this one.
    pub fn validate(
        &self,
        value: Value,
        values: &ValueMap,
        loc: &Loc,
        model: &ModelType,
    ) -> Result<FieldOutcome, ConfigError> {
        let args = ValidatorArgs {
            values,
            field: self,
            config: &self.config,
            model,
        };

        let value = match self.apply_validators(&self.pre_validators, value, &args, loc) {
            Ok(value) => value,
            Err(errors) => return Ok(Err(errors)),
        };

        if value.is_null() {
            if !self.allow_none {
                return Ok(Err(vec![self.wrap(ErrorCause::NoneNotAllowed, loc)]));
            }
            return Ok(self.apply_validators(&self.post_validators, value, &args, loc));
        }

        match coerce::coerce(&self.type_, value, loc, &self.config)? {
            Ok(value) => Ok(self.apply_validators(&self.post_validators, value, &args, loc)),
            Err(errors) => Ok(Err(errors)),
        }
    }

    fn apply_validators(
        &self,
        validators: &[Validator],
        mut value: Value,
        args: &ValidatorArgs<'_>,
        loc: &Loc,
    ) -> FieldOutcome {
        for validator in validators {
            value = validator
                .call(value, args)
                .map_err(|cause| vec![self.wrap(cause, loc)])?;
        }
        Ok(value)
    }

    fn wrap(&self, cause: ErrorCause, loc: &Loc) -> ErrorWrapper {
        ErrorWrapper::new(cause, loc.clone()).with_config(&self.config)
    }
}

fn find_arbitrary(ty: &FieldType) -> Option<&str> {
    match ty {
        FieldType::Arbitrary(name) => Some(name),
        FieldType::List(inner)
        | FieldType::Set(inner)
        | FieldType::TupleVariadic(inner)
        | FieldType::Map(inner)
        | FieldType::Optional(inner) => find_arbitrary(inner),
        FieldType::Tuple(items) => items.iter().find_map(find_arbitrary),
        _ => None,
    }
}

fn find_constraint_patterns(ty: &FieldType) -> Vec<&str> {
    match ty {
        FieldType::ConStr(constraints) => constraints.regex.as_deref().into_iter().collect(),
        FieldType::List(inner)
        | FieldType::Set(inner)
        | FieldType::TupleVariadic(inner)
        | FieldType::Map(inner)
        | FieldType::Optional(inner) => find_constraint_patterns(inner),
        FieldType::Tuple(items) => items.iter().flat_map(find_constraint_patterns).collect(),
        _ => Vec::new(),
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("type", &self.type_)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("allow_none", &self.allow_none)
            .field("validate_always", &self.validate_always)
            .field(
                "validators",
                &self.class_validators.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name='{}' type={}", self.name, self.type_)?;
        if self.required {
            f.write_str(" required")?;
        } else {
            write!(f, " default={}", self.default)?;
        }
        if self.has_alias() {
            write!(f, " alias='{}'", self.alias)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, inherit_config};
    use crate::types::StrConstraints;

    fn config(overrides: ConfigOverrides) -> Arc<Config> {
        inherit_config(Some(&overrides), &Arc::new(Config::default()))
    }

    fn field(name: &str, info: FieldInfo, ty: Option<FieldType>) -> Result<FieldSpec, ConfigError> {
        FieldSpec::infer(name, info, ty, IndexMap::new(), Arc::new(Config::default()))
    }

    #[test]
    fn test_required_and_inferred() {
        let f = field("a", FieldInfo::required(), Some(FieldType::Int)).unwrap();
        assert!(f.required());
        assert!(!f.allow_none());

        let f = field("b", FieldInfo::new(1.5), None).unwrap();
        assert_eq!(f.type_(), &FieldType::Float);
        assert!(!f.required());
    }

    #[test]
    fn test_null_default_needs_annotation() {
        let err = field("a", FieldInfo::new(Value::Null), None).unwrap_err();
        assert_eq!(err.message(), "unable to infer type for attribute \"a\"");

        let f = field("a", FieldInfo::new(Value::Null), Some(FieldType::Int)).unwrap();
        assert!(f.allow_none());
    }

    #[test]
    fn test_optional_is_not_required() {
        let f = field(
            "a",
            FieldInfo::required(),
            Some(FieldType::optional(FieldType::Str)),
        )
        .unwrap();
        assert!(!f.required());
        assert!(f.allow_none());
        assert!(f.default().is_null());
    }

    #[test]
    fn test_alias_precedence() {
        let cfg = config(ConfigOverrides::new().field("a", "from_config"));
        let f = FieldSpec::infer(
            "a",
            FieldInfo::new(1).alias("explicit"),
            None,
            IndexMap::new(),
            Arc::clone(&cfg),
        )
        .unwrap();
        assert_eq!(f.alias(), "explicit");

        let f = FieldSpec::infer("a", FieldInfo::new(1), None, IndexMap::new(), cfg).unwrap();
        assert_eq!(f.alias(), "from_config");
        assert!(f.has_alias());
    }

    #[test]
    fn test_arbitrary_types_need_config() {
        #[derive(Debug, Clone, PartialEq)]
        struct Token;

        let ty = FieldType::list(FieldType::arbitrary::<Token>());
        let err = field("t", FieldInfo::required(), Some(ty.clone())).unwrap_err();
        assert!(err.message().contains("arbitrary_types_allowed"));

        let cfg = config(ConfigOverrides::new().arbitrary_types_allowed(true));
        assert!(FieldSpec::infer("t", FieldInfo::required(), Some(ty), IndexMap::new(), cfg).is_ok());
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let ty = FieldType::ConStr(StrConstraints::new().regex("(unclosed"));
        let err = field("s", FieldInfo::required(), Some(ty)).unwrap_err();
        assert!(err.message().starts_with("field \"s\": invalid regex pattern"));
    }

    #[test]
    fn test_always_validator_sets_flag() {
        let mut validators = IndexMap::new();
        validators.insert(
            "v".to_string(),
            Validator::new("v", |value, _| Ok(value)).always(),
        );
        let f = FieldSpec::infer(
            "a",
            FieldInfo::new(1),
            None,
            validators,
            Arc::new(Config::default()),
        )
        .unwrap();
        assert!(f.validate_always());
    }

    #[test]
    fn test_forward_ref_skips_preparation() {
        let f = field(
            "a",
            FieldInfo::required(),
            Some(FieldType::ForwardRef("Node".into())),
        )
        .unwrap();
        assert!(f.required());
        assert!(f.type_().contains_forward_ref());
    }
}
