//! Model configuration and its inheritance rules.
//!
//! A model declares a [`ConfigOverrides`] (every attribute optional). At
//! schema build time the declarations of the model and all its ancestors are
//! layered into one resolved [`Config`]: attribute lookup consults the
//! nearest declaration first and falls back to the defaults below.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::ConfigError;
use crate::json::Encoder;
use crate::value::CustomValue;

/// Policy for input keys that match no field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extra {
    /// Keep unknown keys verbatim in the value mapping.
    Allow,
    /// Drop unknown keys silently.
    #[default]
    Ignore,
    /// Report one error per unknown key.
    Forbid,
}

impl Extra {
    pub const fn as_str(self) -> &'static str {
        match self {
            Extra::Allow => "allow",
            Extra::Ignore => "ignore",
            Extra::Forbid => "forbid",
        }
    }

    /// Parse a policy name; `None` for anything unrecognised.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Extra::Allow),
            "ignore" => Some(Extra::Ignore),
            "forbid" => Some(Extra::Forbid),
            _ => None,
        }
    }
}

impl fmt::Display for Extra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared `extra` value, possibly not yet checked against [`Extra`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraSetting {
    Policy(Extra),
    Raw(String),
}

impl From<Extra> for ExtraSetting {
    fn from(extra: Extra) -> Self {
        ExtraSetting::Policy(extra)
    }
}

impl From<&str> for ExtraSetting {
    fn from(raw: &str) -> Self {
        ExtraSetting::Raw(raw.to_string())
    }
}

impl From<String> for ExtraSetting {
    fn from(raw: String) -> Self {
        ExtraSetting::Raw(raw)
    }
}

/// Per-field settings declared on the config rather than on the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOverride {
    pub alias: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl FieldOverride {
    pub fn alias(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..Self::default()
        }
    }
}

impl From<&str> for FieldOverride {
    fn from(alias: &str) -> Self {
        FieldOverride::alias(alias)
    }
}

/// Configuration as declared by one model; unset attributes inherit.
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    pub title: Option<String>,
    pub anystr_strip_whitespace: Option<bool>,
    pub min_anystr_length: Option<usize>,
    pub max_anystr_length: Option<usize>,
    pub validate_all: Option<bool>,
    pub extra: Option<ExtraSetting>,
    pub allow_mutation: Option<bool>,
    pub allow_population_by_alias: Option<bool>,
    pub fields: Option<IndexMap<String, FieldOverride>>,
    pub validate_assignment: Option<bool>,
    pub error_msg_templates: Option<IndexMap<String, String>>,
    pub arbitrary_types_allowed: Option<bool>,
    pub json_encoders: Option<IndexMap<String, Encoder>>,
    /// Deprecated: use `extra`.
    pub ignore_extra: Option<bool>,
    /// Deprecated: use `extra`.
    pub allow_extra: Option<bool>,
}

macro_rules! layered {
    ($own:expr, $parent:expr; $($field:ident),+ $(,)?) => {
        ConfigOverrides {
            $($field: $own.$field.clone().or_else(|| $parent.$field.clone()),)+
        }
    };
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn anystr_strip_whitespace(mut self, value: bool) -> Self {
        self.anystr_strip_whitespace = Some(value);
        self
    }

    pub fn min_anystr_length(mut self, value: usize) -> Self {
        self.min_anystr_length = Some(value);
        self
    }

    pub fn max_anystr_length(mut self, value: usize) -> Self {
        self.max_anystr_length = Some(value);
        self
    }

    pub fn validate_all(mut self, value: bool) -> Self {
        self.validate_all = Some(value);
        self
    }

    /// Set the extra-field policy; strings are checked at build time.
    pub fn extra(mut self, extra: impl Into<ExtraSetting>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn allow_mutation(mut self, value: bool) -> Self {
        self.allow_mutation = Some(value);
        self
    }

    pub fn allow_population_by_alias(mut self, value: bool) -> Self {
        self.allow_population_by_alias = Some(value);
        self
    }

    /// Declare per-field settings, typically an alias.
    pub fn field(mut self, name: impl Into<String>, field: impl Into<FieldOverride>) -> Self {
        self.fields
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), field.into());
        self
    }

    pub fn validate_assignment(mut self, value: bool) -> Self {
        self.validate_assignment = Some(value);
        self
    }

    /// Override the message for one error code, with `{placeholder}` support.
    pub fn error_msg_template(
        mut self,
        code: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.error_msg_templates
            .get_or_insert_with(IndexMap::new)
            .insert(code.into(), template.into());
        self
    }

    pub fn arbitrary_types_allowed(mut self, value: bool) -> Self {
        self.arbitrary_types_allowed = Some(value);
        self
    }

    /// Register a serializer fallback for custom values of type `T`.
    pub fn json_encoder<T: CustomValue>(self, encoder: Encoder) -> Self {
        self.json_encoder_named(std::any::type_name::<T>(), encoder)
    }

    /// Register a serializer fallback by value type name (`"bytes"`, `"set"`,
    /// or a custom type name).
    pub fn json_encoder_named(mut self, type_name: impl Into<String>, encoder: Encoder) -> Self {
        self.json_encoders
            .get_or_insert_with(IndexMap::new)
            .insert(type_name.into(), encoder);
        self
    }

    pub fn ignore_extra(mut self, value: bool) -> Self {
        self.ignore_extra = Some(value);
        self
    }

    pub fn allow_extra(mut self, value: bool) -> Self {
        self.allow_extra = Some(value);
        self
    }

    /// True when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.anystr_strip_whitespace.is_none()
            && self.min_anystr_length.is_none()
            && self.max_anystr_length.is_none()
            && self.validate_all.is_none()
            && self.extra.is_none()
            && self.allow_mutation.is_none()
            && self.allow_population_by_alias.is_none()
            && self.fields.is_none()
            && self.validate_assignment.is_none()
            && self.error_msg_templates.is_none()
            && self.arbitrary_types_allowed.is_none()
            && self.json_encoders.is_none()
            && self.ignore_extra.is_none()
            && self.allow_extra.is_none()
    }

    /// Attribute-wise layering: `self` wins, `parent` fills the gaps.
    pub fn layered_over(&self, parent: &ConfigOverrides) -> ConfigOverrides {
        layered!(self, parent;
            title,
            anystr_strip_whitespace,
            min_anystr_length,
            max_anystr_length,
            validate_all,
            extra,
            allow_mutation,
            allow_population_by_alias,
            fields,
            validate_assignment,
            error_msg_templates,
            arbitrary_types_allowed,
            json_encoders,
            ignore_extra,
            allow_extra,
        )
    }
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("title", &self.title)
            .field("anystr_strip_whitespace", &self.anystr_strip_whitespace)
            .field("min_anystr_length", &self.min_anystr_length)
            .field("max_anystr_length", &self.max_anystr_length)
            .field("validate_all", &self.validate_all)
            .field("extra", &self.extra)
            .field("allow_mutation", &self.allow_mutation)
            .field("allow_population_by_alias", &self.allow_population_by_alias)
            .field("fields", &self.fields)
            .field("validate_assignment", &self.validate_assignment)
            .field("error_msg_templates", &self.error_msg_templates)
            .field("arbitrary_types_allowed", &self.arbitrary_types_allowed)
            .field(
                "json_encoders",
                &self
                    .json_encoders
                    .as_ref()
                    .map(|encoders| encoders.keys().collect::<Vec<_>>()),
            )
            .field("ignore_extra", &self.ignore_extra)
            .field("allow_extra", &self.allow_extra)
            .finish()
    }
}

/// Resolved configuration of one model type.
#[derive(Clone, Default)]
pub struct Config {
    declared: ConfigOverrides,
    extra: Extra,
}

impl Config {
    /// The layered declarations this config was resolved from.
    pub fn declared(&self) -> &ConfigOverrides {
        &self.declared
    }

    pub fn title(&self) -> Option<&str> {
        self.declared.title.as_deref()
    }

    pub fn anystr_strip_whitespace(&self) -> bool {
        self.declared.anystr_strip_whitespace.unwrap_or(false)
    }

    pub fn min_anystr_length(&self) -> Option<usize> {
        self.declared.min_anystr_length
    }

    pub fn max_anystr_length(&self) -> Option<usize> {
        self.declared.max_anystr_length
    }

    pub fn validate_all(&self) -> bool {
        self.declared.validate_all.unwrap_or(false)
    }

    /// Extra-field policy, as finalized at build time.
    pub fn extra(&self) -> Extra {
        self.extra
    }

    pub fn allow_mutation(&self) -> bool {
        self.declared.allow_mutation.unwrap_or(true)
    }

    pub fn allow_population_by_alias(&self) -> bool {
        self.declared.allow_population_by_alias.unwrap_or(false)
    }

    pub fn validate_assignment(&self) -> bool {
        self.declared.validate_assignment.unwrap_or(false)
    }

    pub fn arbitrary_types_allowed(&self) -> bool {
        self.declared.arbitrary_types_allowed.unwrap_or(false)
    }

    /// Config-level settings for one field, if any.
    pub fn field_override(&self, name: &str) -> Option<&FieldOverride> {
        self.declared.fields.as_ref()?.get(name)
    }

    pub fn error_msg_template(&self, code: &str) -> Option<&str> {
        self.declared
            .error_msg_templates
            .as_ref()?
            .get(code)
            .map(String::as_str)
    }

    /// Declared type-specific encoders; `None` when there are none.
    pub fn json_encoders(&self) -> Option<&IndexMap<String, Encoder>> {
        self.declared
            .json_encoders
            .as_ref()
            .filter(|encoders| !encoders.is_empty())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("extra", &self.extra)
            .field("declared", &self.declared)
            .finish()
    }
}

/// Merge a model's own declarations over its parent's resolved config.
///
/// With nothing declared the parent config is returned unchanged (same
/// `Arc`); otherwise a new config whose lookups consult `own` first.
pub fn inherit_config(own: Option<&ConfigOverrides>, parent: &Arc<Config>) -> Arc<Config> {
    match own {
        Some(own) if !own.is_empty() => Arc::new(Config {
            declared: own.layered_over(&parent.declared),
            extra: parent.extra,
        }),
        _ => Arc::clone(parent),
    }
}

/// Resolve the `extra` policy, honouring the deprecated boolean flags.
///
/// When `ignore_extra`/`allow_extra` are present they decide the policy
/// (`allow` > `ignore` (default) > `forbid`) and each flag used logs one
/// deprecation warning. Otherwise the declared `extra` must name a policy.
pub fn finalize_extra_policy(
    config: &Arc<Config>,
    model_name: &str,
) -> Result<Arc<Config>, ConfigError> {
    let declared = &config.declared;
    let extra = if declared.ignore_extra.is_some() || declared.allow_extra.is_some() {
        for (flag, present) in [
            ("ignore_extra", declared.ignore_extra.is_some()),
            ("allow_extra", declared.allow_extra.is_some()),
        ] {
            if present {
                tracing::warn!(
                    model = model_name,
                    flag = flag,
                    "\"{}\" is deprecated and replaced by \"extra\"",
                    flag
                );
            }
        }
        if declared.allow_extra.unwrap_or(false) {
            Extra::Allow
        } else if declared.ignore_extra.unwrap_or(true) {
            Extra::Ignore
        } else {
            Extra::Forbid
        }
    } else {
        match &declared.extra {
            None => Extra::default(),
            Some(ExtraSetting::Policy(extra)) => *extra,
            Some(ExtraSetting::Raw(raw)) => Extra::from_str(raw).ok_or_else(|| {
                ConfigError::new(format!(
                    "\"{model_name}\": {raw} is not a valid value for \"extra\""
                ))
            })?,
        }
    };

    if extra == config.extra {
        Ok(Arc::clone(config))
    } else {
        Ok(Arc::new(Config {
            declared: config.declared.clone(),
            extra,
        }))
    }
}
