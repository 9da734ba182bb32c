//! BaseModel Rust: schema-driven data validation.
//!
//! Declare a model once with [`ModelDef`], then validate untrusted input
//! into [`Instance`]s. Every data error found in a validation pass is
//! reported together in one [`ValidationError`].
//!
//! ```
//! use basemodel::prelude::*;
//!
//! let point = ModelDef::new("Point")
//!     .annotate("x", FieldType::Int)
//!     .annotate("y", FieldType::Int)
//!     .build()?;
//!
//! let p = point.parse_raw(r#"{"x": 1, "y": "2"}"#, &ParseOptions::new())?;
//! assert_eq!(p.to_json(&JsonOptions::new())?, r#"{"x":1,"y":2}"#);
//! # Ok::<(), basemodel::Error>(())
//! ```
//!
//! Most users only need the [`prelude`]; the individual modules of
//! `basemodel-core` are re-exported for tooling.

pub use basemodel_core::*;

/// The types needed to declare, validate and serialize models.
pub mod prelude {
    pub use basemodel_core::{
        AttributeKind, ConfigError, ConfigOverrides, CopyOptions, DumpOptions, Error, ErrorCause,
        Extra, FieldDefinition, FieldInfo, FieldType, Instance, JsonOptions, ModelDef, ModelType,
        NumberBounds, ParseOptions, Result, StrConstraints, TypeNamespace, ValidationError,
        Validator, Value, ValueMap, create_model, value_map,
    };
}
