//! Built-in appliers that write values into fields.
//!
//! - [`ValueApplier`]: a literal, converted to the field's kind when built
//! - [`FunctionApplier`]: the result of a registered field function
//! - [`StructApplier`]: a value taken from the same record
//! - [`BypassIfSet`]: runs its inner applier only when the field is zero

use std::fmt;
use std::sync::Arc;

use crate::context::ToolContext;
use crate::error::{Error, Result};
use crate::fields::FieldInfo;
use crate::record::{read_path, snapshot, write_path, Record, SlotError};
use crate::tool::{Applier, ApplierRef};
use crate::value::Value;

/// A registered field function.
///
/// Receives the record root, the field being set, and the pass context. The
/// returned value is converted to the field's kind.
pub type FieldFunction =
    Arc<dyn Fn(&dyn Record, &FieldInfo, &mut ToolContext) -> Result<Value> + Send + Sync>;

/// Write `value` into `field`, mapping slot failures to errors.
///
/// # Errors
///
/// A missing or unsettable field is [`Error::Unprocessable`]; a value that
/// cannot be converted is a [`Error::Configuration`] attributed to the field.
pub fn store(record: &mut dyn Record, field: &FieldInfo, value: Value) -> Result<()> {
    write_path(record, &field.location, value).map_err(|e| slot_error(field, e))
}

pub(crate) fn slot_error(field: &FieldInfo, error: SlotError) -> Error {
    match error {
        SlotError::Missing | SlotError::Unsettable => Error::unprocessable(&field.location, error.to_string()),
        SlotError::Coerce(message) => Error::in_field(&field.location, Error::config(message)),
    }
}

fn coerce_for(field: &FieldInfo, value: Value, source: &str) -> Result<Value> {
    value
        .coerce(field.kind, field.optional)
        .map_err(|m| Error::in_field(&field.location, Error::config(format!("{source}: {m}"))))
}

/// Sets a field to a fixed value.
#[derive(Debug, Clone)]
pub struct ValueApplier {
    value: Value,
}

impl ValueApplier {
    /// Parse `literal` as the field's kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the literal does not fit.
    pub fn parse(literal: &str, field: &FieldInfo) -> Result<Self> {
        Value::coerce_text(literal, field.kind)
            .map(|value| Self { value })
            .map_err(|m| Error::config(format!("default \"{literal}\": {m}")))
    }

    /// Convert an existing value to the field's kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the value does not fit.
    pub fn from_value(value: Value, field: &FieldInfo) -> Result<Self> {
        value
            .coerce(field.kind, field.optional)
            .map(|value| Self { value })
            .map_err(|m| Error::config(format!("default value: {m}")))
    }

    /// The value written.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Applier for ValueApplier {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, _ctx: &mut ToolContext) -> Result<()> {
        store(record, field, self.value.clone())
    }
}

/// Sets a field to the result of a [`FieldFunction`].
#[derive(Clone)]
pub struct FunctionApplier {
    name: String,
    function: FieldFunction,
}

impl FunctionApplier {
    /// Bind the function registered as `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, function: FieldFunction) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

impl fmt::Debug for FunctionApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionApplier").field("name", &self.name).finish()
    }
}

impl Applier for FunctionApplier {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()> {
        let value = (self.function)(&*record, field, ctx)?;
        let value = coerce_for(field, value, &format!("function {}", self.name))?;
        store(record, field, value)
    }
}

/// Where a [`StructApplier`] reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructSource {
    /// `$`: the whole record, as a map snapshot.
    Whole,
    /// `$.path`: another field.
    Field(String),
    /// `$.name()`: a declared method.
    Method(String),
}

/// Copies or computes a value from elsewhere in the same record.
#[derive(Debug, Clone)]
pub struct StructApplier {
    source: StructSource,
}

impl StructApplier {
    /// Read from `source`.
    #[must_use]
    pub fn new(source: StructSource) -> Self {
        Self { source }
    }
}

impl Applier for StructApplier {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, _ctx: &mut ToolContext) -> Result<()> {
        let (value, source) = match &self.source {
            StructSource::Whole => (snapshot(&*record), "$".to_owned()),
            StructSource::Field(path) => {
                let value = read_path(&*record, path).ok_or_else(|| {
                    Error::unprocessable(&field.location, format!("source field \"{path}\" not found"))
                })?;
                (value, format!("$.{path}"))
            }
            StructSource::Method(method) => {
                let value = record.call(method).ok_or_else(|| {
                    Error::unprocessable(&field.location, format!("source method \"{method}()\" not found"))
                })?;
                (value, format!("$.{method}()"))
            }
        };
        let value = coerce_for(field, value, &source)?;
        store(record, field, value)
    }
}

/// Runs the inner applier only when the field holds its zero value.
pub struct BypassIfSet {
    inner: ApplierRef,
}

impl BypassIfSet {
    /// Guard `inner`.
    #[must_use]
    pub fn new(inner: ApplierRef) -> Self {
        Self { inner }
    }
}

impl Applier for BypassIfSet {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()> {
        if field.is_zero_in(&*record) {
            self.inner.apply(record, field, ctx)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldKind;

    crate::record! {
        #[derive(Debug, Default)]
        pub struct Item {
            pub code: String,
            pub count: i64,
            pub maybe: Option<i64>,
            pub copy: String,
            pub all: std::collections::BTreeMap<String, Value>,
        }
        methods { label }
    }

    impl Item {
        fn label(&self) -> String {
            format!("item-{}", self.count)
        }
    }

    fn field(location: &str, kind: FieldKind, optional: bool) -> FieldInfo {
        FieldInfo::new(location, kind, optional)
    }

    #[test]
    fn value_applier_coerces_at_build() {
        let count = field("count", FieldKind::Int, false);
        let applier = ValueApplier::parse("123", &count).unwrap();
        assert_eq!(applier.value(), &Value::Int(123));
        assert!(ValueApplier::parse("abc", &count).is_err());

        let mut item = Item::default();
        applier.apply(&mut item, &count, &mut ToolContext::new()).unwrap();
        assert_eq!(item.count, 123);
    }

    #[test]
    fn function_applier_coerces_result() {
        let code = field("code", FieldKind::Text, false);
        let function: FieldFunction = Arc::new(|_, _, ctx| Ok(Value::Int(ctx.increment("n", 1))));
        let applier = FunctionApplier::new("$n", function);

        let mut item = Item::default();
        let mut ctx = ToolContext::new();
        applier.apply(&mut item, &code, &mut ctx).unwrap();
        applier.apply(&mut item, &code, &mut ctx).unwrap();
        assert_eq!(item.code, "2");
    }

    #[test]
    fn function_result_that_does_not_fit_is_attributed() {
        let count = field("count", FieldKind::Int, false);
        let function: FieldFunction = Arc::new(|_, _, _| Ok(Value::from("nope")));
        let err = FunctionApplier::new("$bad", function)
            .apply(&mut Item::default(), &count, &mut ToolContext::new())
            .unwrap_err();
        assert_eq!(err.location(), Some("count"));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn struct_sources() {
        let mut item = Item {
            code: "x1".into(),
            count: 4,
            ..Item::default()
        };
        let mut ctx = ToolContext::new();

        let copy = field("copy", FieldKind::Text, false);
        StructApplier::new(StructSource::Field("code".into()))
            .apply(&mut item, &copy, &mut ctx)
            .unwrap();
        assert_eq!(item.copy, "x1");

        StructApplier::new(StructSource::Method("label".into()))
            .apply(&mut item, &copy, &mut ctx)
            .unwrap();
        assert_eq!(item.copy, "item-4");

        let all = field("all", FieldKind::Map, false);
        StructApplier::new(StructSource::Whole)
            .apply(&mut item, &all, &mut ctx)
            .unwrap();
        assert_eq!(item.all.get("code"), Some(&Value::from("x1")));

        let err = StructApplier::new(StructSource::Field("nope".into()))
            .apply(&mut item, &copy, &mut ctx)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unprocessable);
    }

    #[test]
    fn bypass_if_set_only_fills_zero_fields() {
        let count = field("count", FieldKind::Int, false);
        let inner: ApplierRef = Arc::new(ValueApplier::parse("9", &count).unwrap());
        let applier = BypassIfSet::new(inner);

        let mut item = Item::default();
        applier.apply(&mut item, &count, &mut ToolContext::new()).unwrap();
        assert_eq!(item.count, 9);

        item.count = 3;
        applier.apply(&mut item, &count, &mut ToolContext::new()).unwrap();
        assert_eq!(item.count, 3);
    }

    #[test]
    fn optional_fields_accept_values() {
        let maybe = field("maybe", FieldKind::Int, true);
        let mut item = Item::default();
        ValueApplier::parse("5", &maybe)
            .unwrap()
            .apply(&mut item, &maybe, &mut ToolContext::new())
            .unwrap();
        assert_eq!(item.maybe, Some(5));
    }

    #[test]
    fn missing_field_is_unprocessable() {
        let ghost = field("ghost", FieldKind::Text, false);
        let err = store(&mut Item::default(), &ghost, Value::from("x")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unprocessable);
    }
}
