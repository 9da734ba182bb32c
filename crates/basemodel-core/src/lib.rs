//! Core engine for BaseModel Rust.
//!
//! `basemodel-core` holds everything a declarative data model needs at run
//! time. The `basemodel` facade re-exports it; depend on this crate directly
//! only when building tooling on top of the engine.
//!
//! # Role In The Architecture
//!
//! - **Schema builder**: [`ModelDef`] collects a model declaration (bases,
//!   annotations, defaults, config, validators) and [`ModelDef::build`]
//!   turns it into an immutable [`ModelType`] with an ordered field table.
//! - **Validation engine**: [`validate_model`] resolves every field from raw
//!   input in one pass, aggregating all data errors into a single
//!   [`ValidationError`]. Definition defects are [`ConfigError`]s and are
//!   never mixed into that aggregate.
//! - **Instances**: [`Instance`] stores a validated [`ValueMap`] and
//!   provides guarded mutation, projection, copying and serialization.
//! - **Collaborators**: per-field coercion ([`FieldType`]), decoding
//!   ([`ModelType::parse_raw`]), JSON encoding ([`Encoder`]) and schema
//!   documents ([`ModelType::schema_document`]).
//!
//! # Example
//!
//! ```
//! use basemodel_core::{ConfigOverrides, Extra, FieldType, Instance, ModelDef, value_map};
//!
//! let user = ModelDef::new("User")
//!     .annotate("name", FieldType::Str)
//!     .field("age", 0)
//!     .config(ConfigOverrides::new().extra(Extra::Forbid))
//!     .build()?;
//!
//! let ann = Instance::new(&user, value_map! { "name" => "Ann" })?;
//! assert_eq!(ann, value_map! { "name" => "Ann", "age" => 0 });
//!
//! let err = Instance::new(&user, value_map! { "extra" => 1 }).unwrap_err();
//! assert_eq!(err.as_validation().map(|e| e.errors().len()), Some(2));
//! # Ok::<(), basemodel_core::Error>(())
//! ```

pub mod coerce;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod field;
pub mod instance;
pub mod json;
pub mod model;
pub mod parse;
pub mod schema;
pub mod types;
pub mod validate;
pub mod validators;
pub mod value;

pub use coerce::{Coerced, coerce};
pub use config::{
    Config, ConfigOverrides, Extra, ExtraSetting, FieldOverride, finalize_extra_policy,
    inherit_config,
};
pub use dynamic::{FieldDefinition, create_model, create_model_from_values};
pub use error::{
    ConfigError, EncodeError, Error, ErrorCause, ErrorDetail, ErrorWrapper, Loc, LocItem, Result,
    ValidationError,
};
pub use field::{FieldDefault, FieldInfo, FieldSpec};
pub use instance::{CopyOptions, DumpOptions, Instance, JsonOptions};
pub use json::{Encoder, custom_encoder, default_encoder, encode_default, to_json_value};
pub use model::{AttributeKind, FieldTable, ModelDef, ModelType, RESERVED_NAMES};
pub use parse::{DecodeError, ParseOptions, Protocol, ROOT_KEY, load_file, load_str_bytes};
pub use schema::model_schema;
pub use types::{FieldType, NumberBounds, StrConstraints, TypeExpr, TypeNamespace};
pub use validate::{validate_assignment, validate_model};
pub use validators::{Validator, ValidatorArgs, ValidatorFn, WILDCARD};
pub use value::{CustomValue, Value, ValueMap};
