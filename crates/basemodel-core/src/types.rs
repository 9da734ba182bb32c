//! Field types and textual type annotations.
//!
//! A field's declared type is a [`FieldType`]. Types may also be declared as
//! text (`"List[int]"`, `"Optional[User]"`) through [`TypeExpr`]; the text
//! is parsed and resolved against a [`TypeNamespace`] of model types. A name
//! that cannot be resolved yet becomes [`FieldType::ForwardRef`], the
//! unresolved marker that validation refuses to run against.

use std::collections::HashMap;
use std::fmt;

use crate::error::ConfigError;
use crate::model::ModelType;
use crate::value::{CustomValue, Value};

/// Length, pattern and whitespace constraints for a string field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub regex: Option<String>,
    pub strip_whitespace: bool,
}

impl StrConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    pub fn strip_whitespace(mut self, value: bool) -> Self {
        self.strip_whitespace = value;
        self
    }
}

/// Exclusive (`gt`, `lt`) and inclusive (`ge`, `le`) numeric bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumberBounds {
    pub gt: Option<f64>,
    pub ge: Option<f64>,
    pub lt: Option<f64>,
    pub le: Option<f64>,
}

impl NumberBounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gt(mut self, limit: f64) -> Self {
        self.gt = Some(limit);
        self
    }

    pub fn ge(mut self, limit: f64) -> Self {
        self.ge = Some(limit);
        self
    }

    pub fn lt(mut self, limit: f64) -> Self {
        self.lt = Some(limit);
        self
    }

    pub fn le(mut self, limit: f64) -> Self {
        self.le = Some(limit);
        self
    }
}

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Accepts anything unchanged, including `null`.
    Any,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List(Box<FieldType>),
    Set(Box<FieldType>),
    /// Fixed-length tuple with one type per position.
    Tuple(Vec<FieldType>),
    /// Tuple of any length with a single item type.
    TupleVariadic(Box<FieldType>),
    /// String-keyed mapping with the given value type.
    Map(Box<FieldType>),
    /// The inner type or `null`.
    Optional(Box<FieldType>),
    /// A nested model.
    Model(ModelType),
    ConStr(StrConstraints),
    ConInt(NumberBounds),
    ConFloat(NumberBounds),
    /// A custom value type, matched by its Rust type name.
    Arbitrary(String),
    /// An annotation naming a type that did not exist yet.
    ForwardRef(String),
}

impl FieldType {
    pub fn list(item: FieldType) -> Self {
        FieldType::List(Box::new(item))
    }

    pub fn set(item: FieldType) -> Self {
        FieldType::Set(Box::new(item))
    }

    pub fn map(value: FieldType) -> Self {
        FieldType::Map(Box::new(value))
    }

    pub fn tuple_of(item: FieldType) -> Self {
        FieldType::TupleVariadic(Box::new(item))
    }

    pub fn optional(inner: FieldType) -> Self {
        match inner {
            already @ FieldType::Optional(_) => already,
            inner => FieldType::Optional(Box::new(inner)),
        }
    }

    /// Arbitrary type accepting `Value::Custom` payloads of type `T`.
    pub fn arbitrary<T: CustomValue>() -> Self {
        FieldType::Arbitrary(std::any::type_name::<T>().to_string())
    }

    pub const fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// True if this type or any type nested in it is still unresolved.
    pub fn contains_forward_ref(&self) -> bool {
        self.any(&|ty| matches!(ty, FieldType::ForwardRef(_)))
    }

    /// Replace every forward reference in this type by its resolution in
    /// `types`, failing on names that are still undefined.
    pub fn resolve_forward_refs(&self, types: &TypeNamespace) -> Result<FieldType, ConfigError> {
        let boxed = |inner: &FieldType| inner.resolve_forward_refs(types).map(Box::new);
        Ok(match self {
            FieldType::ForwardRef(text) => TypeExpr::Annotation(text.clone()).resolve_strict(types)?,
            FieldType::List(inner) => FieldType::List(boxed(inner)?),
            FieldType::Set(inner) => FieldType::Set(boxed(inner)?),
            FieldType::TupleVariadic(inner) => FieldType::TupleVariadic(boxed(inner)?),
            FieldType::Map(inner) => FieldType::Map(boxed(inner)?),
            FieldType::Optional(inner) => FieldType::Optional(boxed(inner)?),
            FieldType::Tuple(items) => FieldType::Tuple(
                items
                    .iter()
                    .map(|item| item.resolve_forward_refs(types))
                    .collect::<Result<_, _>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Pre-order search over this type and its parameters.
    pub(crate) fn any(&self, pred: &dyn Fn(&FieldType) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            FieldType::List(inner)
            | FieldType::Set(inner)
            | FieldType::TupleVariadic(inner)
            | FieldType::Map(inner)
            | FieldType::Optional(inner) => inner.any(pred),
            FieldType::Tuple(items) => items.iter().any(|item| item.any(pred)),
            _ => false,
        }
    }

    /// Infer a type from a default value; `None` for `null`.
    pub fn infer_from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => return None,
            Value::Bool(_) => FieldType::Bool,
            Value::Int(_) => FieldType::Int,
            Value::Float(_) => FieldType::Float,
            Value::Str(_) => FieldType::Str,
            Value::Bytes(_) => FieldType::Bytes,
            Value::List(_) => FieldType::list(FieldType::Any),
            Value::Tuple(_) => FieldType::tuple_of(FieldType::Any),
            Value::Set(_) => FieldType::set(FieldType::Any),
            Value::Map(_) => FieldType::map(FieldType::Any),
            Value::Model(instance) => FieldType::Model(instance.model().clone()),
            Value::Custom(custom) => FieldType::Arbitrary(custom.custom_type_name().to_string()),
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => f.write_str("Any"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::Str => f.write_str("str"),
            FieldType::Bytes => f.write_str("bytes"),
            FieldType::List(inner) => write!(f, "List[{inner}]"),
            FieldType::Set(inner) => write!(f, "Set[{inner}]"),
            FieldType::Tuple(items) => {
                f.write_str("Tuple[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            FieldType::TupleVariadic(inner) => write!(f, "Tuple[{inner}, ...]"),
            FieldType::Map(inner) => write!(f, "Dict[str, {inner}]"),
            FieldType::Optional(inner) => write!(f, "Optional[{inner}]"),
            FieldType::Model(model) => f.write_str(model.name()),
            FieldType::ConStr(_) => f.write_str("ConstrainedStr"),
            FieldType::ConInt(_) => f.write_str("ConstrainedInt"),
            FieldType::ConFloat(_) => f.write_str("ConstrainedFloat"),
            FieldType::Arbitrary(name) => f.write_str(name),
            FieldType::ForwardRef(text) => write!(f, "ForwardRef('{text}')"),
        }
    }
}

/// Named model types available to textual annotations.
#[derive(Debug, Clone, Default)]
pub struct TypeNamespace {
    models: HashMap<String, ModelType>,
}

impl TypeNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: &ModelType) -> Self {
        self.insert(model);
        self
    }

    pub fn insert(&mut self, model: &ModelType) {
        self.models.insert(model.name().to_string(), model.clone());
    }

    pub fn get(&self, name: &str) -> Option<&ModelType> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }
}

/// A declared type: either concrete or an annotation still to be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Type(FieldType),
    Annotation(String),
}

impl TypeExpr {
    /// `ClassVar[...]` annotations declare class-level constants, not fields.
    pub fn is_class_var(&self) -> bool {
        match self {
            TypeExpr::Type(_) => false,
            TypeExpr::Annotation(text) => {
                let text = text.trim().trim_start_matches("typing.");
                text == "ClassVar" || text.starts_with("ClassVar[")
            }
        }
    }

    /// Resolve against `types`; unknown names yield [`FieldType::ForwardRef`].
    pub fn resolve(&self, types: &TypeNamespace) -> Result<FieldType, ConfigError> {
        match self {
            TypeExpr::Type(ty) => Ok(ty.clone()),
            TypeExpr::Annotation(text) => match parse_annotation(text, types) {
                Ok(ty) => Ok(ty),
                Err(Unresolved::Undefined(_)) => Ok(FieldType::ForwardRef(text.trim().to_string())),
                Err(Unresolved::Invalid(message)) => Err(ConfigError::new(message)),
            },
        }
    }

    /// Resolve against `types`; unknown names are an error.
    pub fn resolve_strict(&self, types: &TypeNamespace) -> Result<FieldType, ConfigError> {
        match self {
            TypeExpr::Type(ty) => Ok(ty.clone()),
            TypeExpr::Annotation(text) => {
                parse_annotation(text, types).map_err(|err| match err {
                    Unresolved::Undefined(name) => {
                        ConfigError::new(format!("name '{name}' is not defined"))
                    }
                    Unresolved::Invalid(message) => ConfigError::new(message),
                })
            }
        }
    }
}

impl From<FieldType> for TypeExpr {
    fn from(ty: FieldType) -> Self {
        TypeExpr::Type(ty)
    }
}

impl From<&str> for TypeExpr {
    fn from(text: &str) -> Self {
        TypeExpr::Annotation(text.to_string())
    }
}

impl From<String> for TypeExpr {
    fn from(text: String) -> Self {
        TypeExpr::Annotation(text)
    }
}

enum Unresolved {
    Undefined(String),
    Invalid(String),
}

#[derive(Debug)]
struct TypeNode {
    name: String,
    args: Vec<TypeNode>,
}

/// Recursive-descent parser for `Name[Arg, ...]` annotations.
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse(src: &'a str) -> Result<TypeNode, String> {
        let mut parser = Parser { src, pos: 0 };
        let node = parser.node()?;
        parser.skip_ws();
        if parser.pos != src.len() {
            return Err(format!("unexpected input in type annotation {src:?}"));
        }
        Ok(node)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn node(&mut self) -> Result<TypeNode, String> {
        self.skip_ws();
        let rest = self.rest();

        if let Some(quote @ ('\'' | '"')) = self.peek() {
            let end = rest[1..]
                .find(quote)
                .ok_or_else(|| format!("unterminated quote in type annotation {:?}", self.src))?;
            self.pos += end + 2;
            return Parser::parse(&rest[1..=end]);
        }

        let name = if rest.starts_with("...") {
            "...".to_string()
        } else {
            let len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
                .unwrap_or(rest.len());
            if len == 0 {
                return Err(format!("invalid type annotation {:?}", self.src));
            }
            rest[..len].to_string()
        };
        self.pos += name.len();
        self.skip_ws();

        let mut args = Vec::new();
        if self.peek() == Some('[') {
            self.pos += 1;
            loop {
                args.push(self.node()?);
                self.skip_ws();
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some(']') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(format!("unbalanced brackets in type annotation {:?}", self.src)),
                }
            }
        }
        Ok(TypeNode { name, args })
    }
}

fn parse_annotation(text: &str, types: &TypeNamespace) -> Result<FieldType, Unresolved> {
    let node = Parser::parse(text).map_err(Unresolved::Invalid)?;
    build(&node, types)
}

fn is_none(node: &TypeNode) -> bool {
    matches!(node.name.as_str(), "None" | "NoneType") && node.args.is_empty()
}

fn build(node: &TypeNode, types: &TypeNamespace) -> Result<FieldType, Unresolved> {
    let name = node.name.rsplit('.').next().unwrap_or(&node.name);
    let args = &node.args;
    let arg = |i: usize| build(&args[i], types);

    let ty = match (name, args.len()) {
        ("" | "...", _) => {
            return Err(Unresolved::Invalid(
                "'...' is only allowed as the last Tuple argument".to_string(),
            ));
        }
        ("str", 0) => FieldType::Str,
        ("int", 0) => FieldType::Int,
        ("float", 0) => FieldType::Float,
        ("bool", 0) => FieldType::Bool,
        ("bytes", 0) => FieldType::Bytes,
        ("Any", 0) => FieldType::Any,
        ("List" | "list" | "Sequence", 0) => FieldType::list(FieldType::Any),
        ("List" | "list" | "Sequence", 1) => FieldType::list(arg(0)?),
        ("Set" | "set" | "FrozenSet" | "frozenset", 0) => FieldType::set(FieldType::Any),
        ("Set" | "set" | "FrozenSet" | "frozenset", 1) => FieldType::set(arg(0)?),
        ("Tuple" | "tuple", 0) => FieldType::tuple_of(FieldType::Any),
        ("Tuple" | "tuple", 2) if args[1].name == "..." => FieldType::tuple_of(arg(0)?),
        ("Tuple" | "tuple", _) => FieldType::Tuple(
            args.iter()
                .map(|a| build(a, types))
                .collect::<Result<_, _>>()?,
        ),
        ("Dict" | "dict" | "Mapping", 0) => FieldType::map(FieldType::Any),
        ("Dict" | "dict" | "Mapping", 2) => match arg(0)? {
            FieldType::Str | FieldType::Any => FieldType::map(arg(1)?),
            key => {
                return Err(Unresolved::Invalid(format!(
                    "mapping keys must be str, not {key}"
                )));
            }
        },
        ("Optional", 1) => FieldType::optional(arg(0)?),
        ("Union", _) => {
            let (nones, rest): (Vec<&TypeNode>, Vec<&TypeNode>) = args.iter().partition(|a| is_none(a));
            match (nones.is_empty(), rest.as_slice()) {
                (true, [only]) => build(only, types)?,
                (false, [only]) => FieldType::optional(build(only, types)?),
                _ => {
                    return Err(Unresolved::Invalid(
                        "only Union[T, None] unions are supported".to_string(),
                    ));
                }
            }
        }
        (_, 0) if !is_none(node) => match types.get(name) {
            Some(model) => FieldType::Model(model.clone()),
            None => return Err(Unresolved::Undefined(name.to_string())),
        },
        _ => {
            return Err(Unresolved::Invalid(format!(
                "unsupported type annotation {}",
                node.name
            )));
        }
    };
    Ok(ty)
}
