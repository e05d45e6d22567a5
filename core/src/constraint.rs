//! `Constraint`: composable predicates over [`Value`]s.
//!
//! Constraints are immutable once built and are shared as [`ConstraintRef`]
//! (`Arc<dyn Constraint>`), so one parsed expression can back every field that
//! uses the same tag text.
//!
//! Type mismatches fail closed: a numeric comparison against text is `false`,
//! a length constraint against a number is `false`. The one exception is
//! `Null` (an unset optional), which vacuously satisfies numeric comparisons
//! so that optional fields only fail a range when they are also `required`.
//!
//! # Available Constraints
//!
//! - [`Invalid`]: always false; the result of misconfiguration
//! - [`Required`], [`NotNil`], [`Nil`], [`Empty`]: presence checks
//! - [`IntCompare`], [`UintCompare`], [`FloatCompare`]: numeric comparison
//! - [`Length`], [`MinLength`], [`MaxLength`]: sequence length
//! - [`StartsWith`], [`EndsWith`], [`Regexp`], [`Base64`]: text checks
//! - [`OneOf`], [`TypeOf`], [`Equals`]: exact-match helpers
//!
//! Logical composition lives in [`crate::logic`].

use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::sync::Arc;

use base64::Engine as _;
use serde_json::json;

use crate::error::{Error, Result};
use crate::value::{Number, Value};

/// A predicate over a [`Value`] with diagnostic details.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; built constraints are cached and
/// shared across threads.
///
/// # Example
///
/// ```
/// use fieldtools::{Constraint, Value};
/// use fieldtools::constraint::{Compare, IntCompare};
///
/// let adult = IntCompare::new(Compare::Gte, 18);
/// assert!(adult.test(&Value::Int(21)));
/// assert!(!adult.test(&Value::Int(12)));
/// assert!(adult.test(&Value::Null)); // unset optionals pass
/// assert_eq!(adult.details()["op"], ">=");
/// ```
pub trait Constraint: Send + Sync + Debug {
    /// Returns `true` if `value` satisfies this constraint.
    fn test(&self, value: &Value) -> bool;

    /// Name/value pairs describing this constraint.
    fn details(&self) -> serde_json::Value;
}

/// Shared handle to a built constraint.
pub type ConstraintRef = Arc<dyn Constraint>;

impl<C: Constraint + ?Sized> Constraint for Arc<C> {
    fn test(&self, value: &Value) -> bool {
        (**self).test(value)
    }

    fn details(&self) -> serde_json::Value {
        (**self).details()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Presence
// ═══════════════════════════════════════════════════════════════════════════════

/// Never satisfied.
///
/// Produced by empty logical compositions and by contradictory bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invalid;

impl Constraint for Invalid {
    fn test(&self, _value: &Value) -> bool {
        false
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "invalid" })
    }
}

/// Satisfied by any value that is not `Null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Constraint for Required {
    fn test(&self, value: &Value) -> bool {
        !value.is_null()
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "required" })
    }
}

/// Satisfied by any value that is not `Null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotNil;

impl Constraint for NotNil {
    fn test(&self, value: &Value) -> bool {
        !value.is_null()
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "notnil" })
    }
}

/// Satisfied only by `Null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nil;

impl Constraint for Nil {
    fn test(&self, value: &Value) -> bool {
        value.is_null()
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "nil" })
    }
}

/// Satisfied by the zero value of any type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Constraint for Empty {
    fn test(&self, value: &Value) -> bool {
        value.is_zero()
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "empty" })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Numeric comparison
// ═══════════════════════════════════════════════════════════════════════════════

/// Comparison operator for numeric constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compare {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl Compare {
    /// Parse a symbol (`>=`) or mnemonic (`gte`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "==" | "eq" => Some(Self::Eq),
            "!=" | "ne" => Some(Self::Ne),
            ">" | "gt" => Some(Self::Gt),
            ">=" | "gte" => Some(Self::Gte),
            "<" | "lt" => Some(Self::Lt),
            "<=" | "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    /// The operator's symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Whether `value <op> bound` holds given `value.cmp(bound)`.
    #[must_use]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for Compare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

fn compare_numbers(value: Number, bound: Number) -> Option<Ordering> {
    match (value.as_i128(), bound.as_i128()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => value.as_f64().partial_cmp(&bound.as_f64()),
    }
}

fn test_numeric(value: &Value, op: Compare, bound: Number) -> bool {
    if value.is_null() {
        return true;
    }
    value
        .number()
        .and_then(|n| compare_numbers(n, bound))
        .is_some_and(|ordering| op.holds(ordering))
}

macro_rules! numeric_compare {
    ($(#[$doc:meta])* $name:ident, $bound:ty, $variant:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            op: Compare,
            bound: $bound,
        }

        impl $name {
            /// Compare against `bound` with `op`.
            #[must_use]
            pub fn new(op: Compare, bound: $bound) -> Self {
                Self { op, bound }
            }
        }

        impl Constraint for $name {
            fn test(&self, value: &Value) -> bool {
                test_numeric(value, self.op, Number::$variant(self.bound))
            }

            fn details(&self) -> serde_json::Value {
                json!({ "name": $label, "op": self.op.symbol(), "value": self.bound })
            }
        }
    };
}

numeric_compare!(
    /// Signed integer comparison. Other numeric widths compare by value.
    IntCompare, i64, Int, "int"
);
numeric_compare!(
    /// Unsigned integer comparison. Other numeric widths compare by value.
    UintCompare, u64, Uint, "uint"
);
numeric_compare!(
    /// Floating point comparison. `NaN` never satisfies it.
    FloatCompare, f64, Float, "float"
);

// ═══════════════════════════════════════════════════════════════════════════════
// Length
// ═══════════════════════════════════════════════════════════════════════════════

/// Inclusive length range over text (in characters), bytes, lists and maps.
#[derive(Debug, Clone, Copy)]
pub struct Length {
    min: usize,
    max: usize,
}

impl Length {
    /// Build a length range.
    ///
    /// A range with `min > max` can never be satisfied and is returned as
    /// [`Invalid`], with a warning.
    #[must_use]
    pub fn new(min: usize, max: usize) -> ConstraintRef {
        if min > max {
            tracing::warn!(min, max, "length range can never be satisfied");
            return Arc::new(Invalid);
        }
        Arc::new(Self { min, max })
    }
}

impl Constraint for Length {
    fn test(&self, value: &Value) -> bool {
        value.len().is_some_and(|n| n >= self.min && n <= self.max)
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "len", "min": self.min, "max": self.max })
    }
}

/// Minimum length.
#[derive(Debug, Clone, Copy)]
pub struct MinLength(pub usize);

impl Constraint for MinLength {
    fn test(&self, value: &Value) -> bool {
        value.len().is_some_and(|n| n >= self.0)
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "minlen", "min": self.0 })
    }
}

/// Maximum length.
#[derive(Debug, Clone, Copy)]
pub struct MaxLength(pub usize);

impl Constraint for MaxLength {
    fn test(&self, value: &Value) -> bool {
        value.len().is_some_and(|n| n <= self.0)
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "maxlen", "max": self.0 })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Text
// ═══════════════════════════════════════════════════════════════════════════════

/// Text prefix.
#[derive(Debug, Clone)]
pub struct StartsWith(pub String);

impl Constraint for StartsWith {
    fn test(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|s| s.starts_with(self.0.as_str()))
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "startswith", "prefix": self.0 })
    }
}

/// Text suffix.
#[derive(Debug, Clone)]
pub struct EndsWith(pub String);

impl Constraint for EndsWith {
    fn test(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|s| s.ends_with(self.0.as_str()))
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "endswith", "suffix": self.0 })
    }
}

/// Regular expression search over text.
///
/// Uses the `regex` crate, which guarantees linear-time matching.
#[derive(Debug, Clone)]
pub struct Regexp {
    regex: regex::Regex,
}

impl Regexp {
    /// Compile `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self> {
        regex::Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|e| Error::config(format!("invalid regexp '{pattern}': {e}")))
    }
}

impl Constraint for Regexp {
    fn test(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|s| self.regex.is_match(s))
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "regexp", "pattern": self.regex.as_str() })
    }
}

/// Text that decodes as standard, padded base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64;

impl Constraint for Base64 {
    fn test(&self, value: &Value) -> bool {
        value
            .as_str()
            .is_some_and(|s| base64::engine::general_purpose::STANDARD.decode(s).is_ok())
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "base64" })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Exact match
// ═══════════════════════════════════════════════════════════════════════════════

/// Satisfied when the value equals one of the options.
///
/// Numeric options match across widths: `oneof(1,2)` accepts `Uint(2)`.
#[derive(Debug, Clone)]
pub struct OneOf(pub Vec<Value>);

impl Constraint for OneOf {
    fn test(&self, value: &Value) -> bool {
        self.0.iter().any(|option| option.same(value))
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "oneof", "values": self.0.iter().map(Value::to_json).collect::<Vec<_>>() })
    }
}

/// Satisfied when the value's [`Value::type_name`] is listed.
#[derive(Debug, Clone)]
pub struct TypeOf(pub Vec<String>);

impl Constraint for TypeOf {
    fn test(&self, value: &Value) -> bool {
        let name = value.type_name();
        self.0.iter().any(|t| t == name)
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "typeof", "types": self.0 })
    }
}

/// Satisfied when the value equals the comparand.
#[derive(Debug, Clone)]
pub struct Equals(pub Value);

impl Constraint for Equals {
    fn test(&self, value: &Value) -> bool {
        value.same(&self.0)
    }

    fn details(&self) -> serde_json::Value {
        json!({ "name": "equals", "value": self.0.to_json() })
    }
}
