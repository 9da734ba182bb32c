//! Class validators and the per-model validator registry.
//!
//! A model declares named validators targeting field names (or `"*"` for
//! every field). Declarations are merged across the inheritance chain and
//! attached to fields while the schema is built; a declaration that never
//! attaches to a real field is a configuration error.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::Config;
use crate::error::{ConfigError, ErrorCause};
use crate::field::FieldSpec;
use crate::model::ModelType;
use crate::value::{Value, ValueMap};

/// Target matching every field.
pub const WILDCARD: &str = "*";

/// Signature of a validator callable.
pub type ValidatorFn =
    Arc<dyn Fn(Value, &ValidatorArgs<'_>) -> Result<Value, ErrorCause> + Send + Sync>;

/// Context handed to a validator alongside the value.
pub struct ValidatorArgs<'a> {
    /// Fields validated earlier in this pass, by field name.
    pub values: &'a ValueMap,
    pub field: &'a FieldSpec,
    pub config: &'a Config,
    pub model: &'a ModelType,
}

/// A named validator callable plus its flags.
#[derive(Clone)]
pub struct Validator {
    name: String,
    func: ValidatorFn,
    pre: bool,
    always: bool,
    check_fields: bool,
}

impl Validator {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, &ValidatorArgs<'_>) -> Result<Value, ErrorCause> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            pre: false,
            always: false,
            check_fields: true,
        }
    }

    /// Run before type coercion, on the raw value.
    pub fn pre(mut self) -> Self {
        self.pre = true;
        self
    }

    /// Run even when the field falls back to its default.
    pub fn always(mut self) -> Self {
        self.always = true;
        self
    }

    /// Whether targeting a field the model does not have is an error.
    pub fn check_fields(mut self, check: bool) -> Self {
        self.check_fields = check;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_pre(&self) -> bool {
        self.pre
    }

    pub fn is_always(&self) -> bool {
        self.always
    }

    pub fn checks_fields(&self) -> bool {
        self.check_fields
    }

    pub fn call(&self, value: Value, args: &ValidatorArgs<'_>) -> Result<Value, ErrorCause> {
        (self.func)(value, args)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name)
            .field("pre", &self.pre)
            .field("always", &self.always)
            .field("check_fields", &self.check_fields)
            .finish_non_exhaustive()
    }
}

/// Field name (or [`WILDCARD`]) to validators, in registration order.
pub type ValidatorEntries = IndexMap<String, Vec<Validator>>;

/// Collect one class's validator declarations.
///
/// Each declaration names its target fields; two declarations sharing a
/// validator name are rejected.
pub fn extract_validators(
    declarations: &[(Vec<String>, Validator)],
) -> Result<ValidatorEntries, ConfigError> {
    let mut seen = HashSet::new();
    let mut entries = ValidatorEntries::new();
    for (targets, validator) in declarations {
        if !seen.insert(validator.name()) {
            return Err(ConfigError::new(format!(
                "duplicate validator function \"{}\"",
                validator.name()
            )));
        }
        for target in targets {
            entries
                .entry(target.clone())
                .or_default()
                .push(validator.clone());
        }
    }
    Ok(entries)
}

/// Append `base`'s validators after those already in `validators`.
pub fn inherit_validators(base: &ValidatorEntries, mut validators: ValidatorEntries) -> ValidatorEntries {
    for (field, base_validators) in base {
        validators
            .entry(field.clone())
            .or_default()
            .extend(base_validators.iter().cloned());
    }
    validators
}

/// The merged registry while a schema is being built.
#[derive(Debug)]
pub struct ValidatorGroup {
    validators: ValidatorEntries,
    used: HashSet<String>,
}

impl ValidatorGroup {
    pub fn new(validators: ValidatorEntries) -> Self {
        Self {
            validators,
            used: HashSet::new(),
        }
    }

    /// Validators for one field, specific targets first, then wildcards,
    /// keyed by validator name (a later registration replaces an earlier one
    /// of the same name). Marks the field name as matched.
    pub fn get_validators(&mut self, name: &str) -> IndexMap<String, Validator> {
        self.used.insert(name.to_string());
        let specific = self.validators.get(name).into_iter().flatten();
        let wildcard = self.validators.get(WILDCARD).into_iter().flatten();
        let mut out = IndexMap::new();
        for validator in specific.chain(wildcard) {
            out.insert(validator.name().to_string(), validator.clone());
        }
        out
    }

    /// Fail if a checked validator targets a name no field matched.
    pub fn check_unused(&self) -> Result<(), ConfigError> {
        let mut unused: Vec<&str> = Vec::new();
        for (target, validators) in &self.validators {
            if target == WILDCARD || self.used.contains(target) {
                continue;
            }
            for validator in validators.iter().filter(|v| v.checks_fields()) {
                if !unused.contains(&validator.name()) {
                    unused.push(validator.name());
                }
            }
        }
        if unused.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(format!(
                "Validators defined with incorrect fields: {} \
                 (use check_fields=false if you're inheriting from the model and intended this)",
                unused.join(", ")
            )))
        }
    }

    pub fn entries(&self) -> &ValidatorEntries {
        &self.validators
    }

    pub fn into_entries(self) -> ValidatorEntries {
        self.validators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough(name: &str) -> Validator {
        Validator::new(name, |value, _| Ok(value))
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_extract_groups_by_target() {
        let entries = extract_validators(&[
            (targets(&["a", "b"]), passthrough("check_ab")),
            (targets(&["a"]), passthrough("check_a")),
        ])
        .unwrap();
        let names: Vec<_> = entries["a"].iter().map(Validator::name).collect();
        assert_eq!(names, vec!["check_ab", "check_a"]);
        assert_eq!(entries["b"].len(), 1);
    }

    #[test]
    fn test_extract_rejects_duplicate_names() {
        let err = extract_validators(&[
            (targets(&["a"]), passthrough("check")),
            (targets(&["b"]), passthrough("check")),
        ])
        .unwrap_err();
        assert_eq!(err.message(), "duplicate validator function \"check\"");
    }

    #[test]
    fn test_later_same_name_wins_in_place() {
        let base = extract_validators(&[(targets(&["a"]), passthrough("check").pre())]).unwrap();
        let local = extract_validators(&[(targets(&["a"]), passthrough("check"))]).unwrap();
        let merged = inherit_validators(&local, inherit_validators(&base, ValidatorEntries::new()));

        let mut group = ValidatorGroup::new(merged);
        let attached = group.get_validators("a");
        assert_eq!(attached.len(), 1);
        assert!(!attached["check"].is_pre());
    }

    #[test]
    fn test_wildcard_applies_to_every_field() {
        let entries = extract_validators(&[
            (targets(&["*"]), passthrough("all")),
            (targets(&["a"]), passthrough("only_a")),
        ])
        .unwrap();
        let mut group = ValidatorGroup::new(entries);
        let keys: Vec<_> = group.get_validators("a").keys().cloned().collect();
        assert_eq!(keys, vec!["only_a", "all"]);
        assert_eq!(group.get_validators("b").len(), 1);
        assert!(group.check_unused().is_ok());
    }

    #[test]
    fn test_check_unused() {
        let entries = extract_validators(&[
            (targets(&["missing"]), passthrough("bad")),
            (targets(&["other"]), passthrough("lenient").check_fields(false)),
        ])
        .unwrap();
        let group = ValidatorGroup::new(entries);
        let err = group.check_unused().unwrap_err();
        assert!(err.message().starts_with("Validators defined with incorrect fields: bad"));
    }
}
