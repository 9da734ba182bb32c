//! Decoding raw input into model instances.
//!
//! Decode failures never escape as raw errors: they are wrapped into a
//! one-entry [`ValidationError`] located at [`ROOT_KEY`]. Only I/O failures
//! while reading a file surface as [`Error::Io`].

use std::fmt;
use std::path::Path;

use crate::error::{Error, ErrorCause, ErrorWrapper, Result, ValidationError};
use crate::instance::Instance;
use crate::model::ModelType;
use crate::value::Value;

/// Location of errors about the input as a whole.
pub const ROOT_KEY: &str = "__obj__";

/// Wire protocol of raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Json,
    Pickle,
}

/// Hints for [`ModelType::parse_raw`] and [`ModelType::parse_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub content_type: Option<String>,
    pub encoding: String,
    pub proto: Option<Protocol>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            encoding: "utf8".to_string(),
            proto: None,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn proto(mut self, proto: Protocol) -> Self {
        self.proto = Some(proto);
        self
    }
}

/// Raw input that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DecodeError {}

fn protocol_for(options: &ParseOptions) -> std::result::Result<Protocol, DecodeError> {
    if let Some(proto) = options.proto {
        return Ok(proto);
    }
    let Some(content_type) = options.content_type.as_deref() else {
        return Ok(Protocol::Json);
    };
    // Parameters such as "; charset=utf-8" do not affect the protocol.
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if media_type.ends_with("json") || media_type.ends_with("javascript") {
        Ok(Protocol::Json)
    } else if media_type.ends_with("pickle") {
        Ok(Protocol::Pickle)
    } else {
        Err(DecodeError::new(format!("Unknown content-type: {content_type}")))
    }
}

fn decode_text(bytes: &[u8], encoding: &str) -> std::result::Result<String, DecodeError> {
    match encoding.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "utf8" => String::from_utf8(bytes.to_vec())
            .map_err(|e| DecodeError::new(format!("'utf-8' codec can't decode input: {e}"))),
        "latin1" | "iso88591" => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        "ascii" => match bytes.iter().position(|b| !b.is_ascii()) {
            Some(pos) => Err(DecodeError::new(format!(
                "'ascii' codec can't decode byte 0x{:02x} in position {pos}",
                bytes[pos]
            ))),
            None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        },
        _ => Err(DecodeError::new(format!("unknown encoding: {encoding}"))),
    }
}

/// Decode raw bytes into a value tree.
pub fn load_str_bytes(
    bytes: &[u8],
    options: &ParseOptions,
) -> std::result::Result<Value, DecodeError> {
    match protocol_for(options)? {
        Protocol::Json => {
            let text = decode_text(bytes, &options.encoding)?;
            let json: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| DecodeError::new(e.to_string()))?;
            Ok(Value::from(json))
        }
        Protocol::Pickle => Err(DecodeError::new("pickle protocol is not supported")),
    }
}

/// Read and decode a file. A `.json`/`.js` suffix selects JSON unless a
/// protocol is given.
pub fn load_file(path: &Path, options: &ParseOptions) -> Result<std::result::Result<Value, DecodeError>> {
    let bytes = std::fs::read(path)?;
    let mut options = options.clone();
    if options.proto.is_none() {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json" | "js") => options.proto = Some(Protocol::Json),
            Some("pkl") => options.proto = Some(Protocol::Pickle),
            _ => {}
        }
    }
    Ok(load_str_bytes(&bytes, &options))
}

impl ModelType {
    fn root_error(&self, cause: ErrorCause) -> Error {
        let wrapper = ErrorWrapper::new(cause, ROOT_KEY).with_config(self.config());
        ValidationError::new(vec![wrapper]).into()
    }

    /// Validate an already decoded value, which must be a mapping.
    pub fn parse_obj(&self, value: Value) -> Result<Instance> {
        match value {
            Value::Map(map) => Instance::new(self, map),
            other => Err(self.root_error(ErrorCause::NotAMapping {
                model: self.name().to_string(),
                found: other.type_name().to_string(),
            })),
        }
    }

    /// Decode raw bytes or text and validate the result.
    pub fn parse_raw(&self, raw: impl AsRef<[u8]>, options: &ParseOptions) -> Result<Instance> {
        match load_str_bytes(raw.as_ref(), options) {
            Ok(value) => self.parse_obj(value),
            Err(err) => Err(self.decode_failure(err)),
        }
    }

    /// Read, decode and validate a file.
    pub fn parse_file(&self, path: impl AsRef<Path>, options: &ParseOptions) -> Result<Instance> {
        match load_file(path.as_ref(), options)? {
            Ok(value) => self.parse_obj(value),
            Err(err) => Err(self.decode_failure(err)),
        }
    }

    fn decode_failure(&self, err: DecodeError) -> Error {
        tracing::debug!(model = self.name(), error = %err, "failed to decode raw input");
        self.root_error(ErrorCause::Decode {
            message: err.message,
        })
    }
}
