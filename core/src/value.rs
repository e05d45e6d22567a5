//! `Value`: the erased data that flows between records, tools and constraints.
//!
//! Records expose their attributes as `Value`s, constraints test `Value`s, and
//! appliers write `Value`s back after coercing them to the attribute's declared
//! [`FieldKind`]. Keeping the value model a closed enum lets every comparator
//! match exhaustively instead of switching on runtime type names.
//!
//! # Extensibility via `Custom`
//!
//! Domain types not covered by the primitives implement [`CustomValue`] and are
//! wrapped as `Value::Custom(Arc::new(your_type))`.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Extension trait for domain-specific values.
///
/// Implementations must be `Send + Sync` so field tables and appliers can be
/// shared across threads.
///
/// # Example
///
/// ```
/// use std::any::Any;
/// use std::sync::Arc;
/// use fieldtools::{CustomValue, Value};
///
/// #[derive(Debug)]
/// struct Money { cents: i64 }
///
/// impl CustomValue for Money {
///     fn custom_type_name(&self) -> &'static str { "money" }
///     fn as_any(&self) -> &dyn Any { self }
///     fn is_zero(&self) -> bool { self.cents == 0 }
/// }
///
/// let value = Value::Custom(Arc::new(Money { cents: 0 }));
/// assert_eq!(value.type_name(), "money");
/// assert!(value.is_zero());
/// ```
pub trait CustomValue: Send + Sync + Debug {
    /// Human-readable type identifier, matched by `typeof(...)` constraints.
    ///
    /// Convention: `snake_case`, e.g. `"money"`, `"geo_point"`.
    fn custom_type_name(&self) -> &'static str;

    /// Returns `self` as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Whether this value counts as its type's zero value.
    fn is_zero(&self) -> bool {
        false
    }
}

/// The erased value type.
///
/// `Null` stands for an absent optional (a nil pointer in tag-driven
/// frameworks). Numeric widths are unified into `Int`, `Uint` and `Float`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// No value: an unset optional.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer of any width.
    Int(i64),
    /// Unsigned integer of any width.
    Uint(u64),
    /// Floating point of any width.
    Float(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// String-keyed mapping.
    Map(BTreeMap<String, Value>),
    /// Domain-specific value.
    Custom(Arc<dyn CustomValue>),
}

// Custom values compare by allocation, like the rest of the Arc-shared data.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A numeric value lifted out of [`Value`] for comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Floating point.
    Float(f64),
}

impl Number {
    /// Integer view, if this number is integral.
    #[must_use]
    pub fn as_i128(self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(i128::from(i)),
            Self::Uint(u) => Some(i128::from(u)),
            Self::Float(_) => None,
        }
    }

    /// Floating point view.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Uint(u) => u as f64,
            Self::Float(f) => f,
        }
    }
}

impl Value {
    /// Returns `true` for `Null`.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is the zero value of its type.
    ///
    /// Zero means: `Null`, `false`, `0`, `0.0`, empty text, bytes, list or map,
    /// or a custom value reporting [`CustomValue::is_zero`].
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Uint(u) => *u == 0,
            Self::Float(f) => *f == 0.0,
            Self::Text(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Map(m) => m.is_empty(),
            Self::Custom(c) => c.is_zero(),
        }
    }

    /// Try to get the value as a string slice.
    ///
    /// ```
    /// use fieldtools::Value;
    ///
    /// assert_eq!(Value::from("hello").as_str(), Some("hello"));
    /// assert_eq!(Value::Int(42).as_str(), None);
    /// ```
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to get the value as a boolean.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get the value as a signed integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Uint(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Lift a numeric value.
    #[must_use]
    pub fn number(&self) -> Option<Number> {
        match self {
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Uint(u) => Some(Number::Uint(*u)),
            Self::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Length of a sequence-like value (text in characters, bytes, list, map).
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Text(s) => Some(s.chars().count()),
            Self::Bytes(b) => Some(b.len()),
            Self::List(l) => Some(l.len()),
            Self::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    /// Returns `true` if this is a sequence-like value of length zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Short name of the variant, or the custom type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Custom(c) => c.custom_type_name(),
        }
    }

    /// Equality that treats the numeric variants as one family.
    ///
    /// ```
    /// use fieldtools::Value;
    ///
    /// assert!(Value::Int(3).same(&Value::Uint(3)));
    /// assert!(Value::Float(3.0).same(&Value::Int(3)));
    /// assert!(!Value::Text("3".into()).same(&Value::Int(3)));
    /// ```
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            _ => self == other,
        }
    }

    /// Infer a value from free text: bool, then integer, then float, else text.
    ///
    /// ```
    /// use fieldtools::Value;
    ///
    /// assert_eq!(Value::infer("true"), Value::Bool(true));
    /// assert_eq!(Value::infer("-4"), Value::Int(-4));
    /// assert_eq!(Value::infer("2.5"), Value::Float(2.5));
    /// assert_eq!(Value::infer("red"), Value::from("red"));
    /// ```
    #[must_use]
    pub fn infer(text: &str) -> Value {
        if let Ok(b) = text.parse::<bool>() {
            return Value::Bool(b);
        }
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(u) = text.parse::<u64>() {
            return Value::Uint(u);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(text.to_owned())
    }

    /// Parse text into a value of the given kind.
    ///
    /// # Errors
    ///
    /// Returns a message when the text is not a valid literal for `kind`.
    pub fn coerce_text(text: &str, kind: FieldKind) -> Result<Value, String> {
        let trimmed = text.trim();
        match kind {
            FieldKind::Text => Ok(Value::Text(text.to_owned())),
            FieldKind::Bytes => Ok(Value::Bytes(text.as_bytes().to_vec())),
            FieldKind::Bool => trimmed
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|e| format!("\"{text}\" is not a bool: {e}")),
            FieldKind::Int => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| format!("\"{text}\" is not an int: {e}")),
            FieldKind::Uint => trimmed
                .parse::<u64>()
                .map(Value::Uint)
                .map_err(|e| format!("\"{text}\" is not a uint: {e}")),
            FieldKind::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| format!("\"{text}\" is not a float: {e}")),
            FieldKind::List | FieldKind::Map => {
                let json: serde_json::Value = serde_json::from_str(trimmed)
                    .map_err(|e| format!("\"{text}\" is not a JSON {kind}: {e}"))?;
                Value::from(json).coerce(kind, false)
            }
            FieldKind::Any => Ok(Value::infer(text)),
            FieldKind::Record | FieldKind::Custom => {
                Err(format!("cannot parse \"{text}\" into a {kind} field"))
            }
        }
    }

    /// Convert this value so it can be stored in a field of `kind`.
    ///
    /// Text is parsed, integers widen or narrow when lossless, integral floats
    /// become integers, and scalars render to text. `Null` is only accepted by
    /// optional fields.
    ///
    /// # Errors
    ///
    /// Returns a message when the conversion would lose information or the
    /// kinds are unrelated.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn coerce(self, kind: FieldKind, optional: bool) -> Result<Value, String> {
        match (self, kind) {
            (Value::Null, _) if optional || kind == FieldKind::Any => Ok(Value::Null),
            (Value::Null, _) => Err(format!("cannot store null in a non-optional {kind} field")),
            (value, FieldKind::Any) => Ok(value),
            (Value::Text(s), FieldKind::Text) => Ok(Value::Text(s)),
            (Value::Text(s), FieldKind::Bytes) => Ok(Value::Bytes(s.into_bytes())),
            (Value::Text(s), kind) => Value::coerce_text(&s, kind),
            (v @ Value::Bool(_), FieldKind::Bool) => Ok(v),
            (v @ Value::Int(_), FieldKind::Int) => Ok(v),
            (Value::Int(i), FieldKind::Uint) => u64::try_from(i)
                .map(Value::Uint)
                .map_err(|_| format!("{i} does not fit in a uint")),
            (Value::Int(i), FieldKind::Float) => Ok(Value::Float(i as f64)),
            (v @ Value::Uint(_), FieldKind::Uint) => Ok(v),
            (Value::Uint(u), FieldKind::Int) => i64::try_from(u)
                .map(Value::Int)
                .map_err(|_| format!("{u} does not fit in an int")),
            (Value::Uint(u), FieldKind::Float) => Ok(Value::Float(u as f64)),
            (v @ Value::Float(_), FieldKind::Float) => Ok(v),
            (Value::Float(f), FieldKind::Int) if f.fract() == 0.0 && f.is_finite() => {
                if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Ok(Value::Int(f as i64))
                } else {
                    Err(format!("{f} does not fit in an int"))
                }
            }
            (Value::Float(f), FieldKind::Uint) if f.fract() == 0.0 && f >= 0.0 => {
                if f <= u64::MAX as f64 {
                    Ok(Value::Uint(f as u64))
                } else {
                    Err(format!("{f} does not fit in a uint"))
                }
            }
            (v @ (Value::Bool(_) | Value::Int(_) | Value::Uint(_) | Value::Float(_)), FieldKind::Text) => {
                Ok(Value::Text(v.to_string()))
            }
            (v @ Value::Bytes(_), FieldKind::Bytes) => Ok(v),
            (v @ Value::List(_), FieldKind::List) => Ok(v),
            (v @ Value::Map(_), FieldKind::Map | FieldKind::Record) => Ok(v),
            (v @ Value::Custom(_), FieldKind::Custom) => Ok(v),
            (v, kind) => Err(format!("cannot convert {} into a {kind} field", v.type_name())),
        }
    }

    /// Render as JSON, for diagnostics and CLI output.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Uint(u) => serde_json::Value::from(*u),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::from(b.clone()),
            Self::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Self::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Custom(c) => serde_json::Value::String(format!("<{}>", c.custom_type_name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Uint(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Declared type of a record attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `bool`.
    Bool,
    /// Signed integers.
    Int,
    /// Unsigned integers.
    Uint,
    /// Floating point.
    Float,
    /// `String`.
    Text,
    /// Raw bytes.
    Bytes,
    /// Sequences.
    List,
    /// String-keyed maps.
    Map,
    /// A nested record.
    Record,
    /// A [`CustomValue`].
    Custom,
    /// Accepts any [`Value`].
    Any,
}

impl FieldKind {
    /// The zero-value witness for an attribute of this kind.
    #[must_use]
    pub fn zero(self, optional: bool) -> Value {
        if optional {
            return Value::Null;
        }
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Uint => Value::Uint(0),
            Self::Float => Value::Float(0.0),
            Self::Text => Value::Text(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::List => Value::List(Vec::new()),
            Self::Map => Value::Map(BTreeMap::new()),
            Self::Record | Self::Custom | Self::Any => Value::Null,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Map => "map",
            Self::Record => "record",
            Self::Custom => "custom",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
