//! Self-describing records.
//!
//! Tools need to enumerate a type's attributes, read their tags, and get and
//! set their values without knowing the concrete type. A [`Record`] provides
//! that description once per type through [`Record::attributes`] and exposes
//! object-safe accessors for live instances.
//!
//! Most records are declared with the [`record!`](crate::record!) macro:
//!
//! ```
//! use fieldtools::{record, Record, Value};
//!
//! record! {
//!     #[derive(Debug, Default)]
//!     pub struct Widget {
//!         pub color: String [default = "$color", json = "colour"],
//!         pub count: i64 [default = "=123"],
//!         secret: String,
//!     }
//! }
//!
//! let attrs = Widget::attributes();
//! assert_eq!(attrs[0].tag("json"), Some("colour"));
//! assert!(!attrs[2].exported);
//!
//! let mut widget = Widget::default();
//! widget.set("count", Value::from("7")).unwrap();
//! assert_eq!(widget.count, 7);
//! ```

use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::value::{FieldKind, Value};

/// How an attribute relates to the record that declares it.
#[derive(Debug, Clone, Copy)]
pub enum Nesting {
    /// A plain value.
    None,
    /// An embedded record whose fields are promoted into the parent (`+`).
    Embedded(fn() -> Vec<Attribute>),
    /// A named nested record (`.`).
    Named(fn() -> Vec<Attribute>),
}

/// Static description of one declared attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Declared identifier.
    pub name: &'static str,
    /// Declared value kind.
    pub kind: FieldKind,
    /// Whether the attribute holds an optional value.
    pub optional: bool,
    /// Whether the attribute is public. Private attributes are never tooled.
    pub exported: bool,
    /// `(key, value)` tags in declaration order.
    pub tags: Vec<(&'static str, &'static str)>,
    /// Nested record shape, if any.
    pub nesting: Nesting,
}

impl Attribute {
    /// Look up the first tag with this key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Shape of the nested record, if this attribute is one.
    #[must_use]
    pub fn nested_shape(&self) -> Option<Vec<Attribute>> {
        match self.nesting {
            Nesting::None => None,
            Nesting::Embedded(shape) | Nesting::Named(shape) => Some(shape()),
        }
    }
}

/// Why a slot could not be read or written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// No attribute with that name.
    #[error("no such field")]
    Missing,
    /// The attribute exists but cannot be assigned (e.g. a nested record).
    #[error("field cannot be set")]
    Unsettable,
    /// The value could not be converted to the attribute's type.
    #[error("{0}")]
    Coerce(String),
}

/// A record type that can describe and access its own attributes.
///
/// Implement with [`record!`](crate::record!) rather than by hand.
pub trait Record: Any + Send + Sync {
    /// Declared attributes, in declaration order.
    fn attributes() -> Vec<Attribute>
    where
        Self: Sized;

    /// Declared type name.
    fn record_name() -> &'static str
    where
        Self: Sized;

    /// [`Record::attributes`] for a live instance.
    fn shape(&self) -> Vec<Attribute>;

    /// [`Record::record_name`] for a live instance.
    fn type_name(&self) -> &'static str;

    /// Read an attribute. Nested records read as a [`Value::Map`] snapshot.
    fn get(&self, name: &str) -> Option<Value>;

    /// Write an attribute, converting `value` to its declared type.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError`] if the attribute is missing, not assignable, or
    /// the value cannot be converted.
    fn set(&mut self, name: &str, value: Value) -> Result<(), SlotError>;

    /// Borrow a nested record attribute.
    fn child(&self, name: &str) -> Option<&dyn Record>;

    /// Mutably borrow a nested record attribute.
    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Record>;

    /// Invoke a declared zero-argument method.
    fn call(&self, method: &str) -> Option<Value> {
        let _ = method;
        None
    }
}

/// Conversion between a Rust attribute type and [`Value`].
pub trait FieldType: Sized {
    /// Declared kind.
    const KIND: FieldKind;
    /// Whether `Null` is a legal value.
    const OPTIONAL: bool = false;

    /// Erase to a [`Value`].
    fn to_value(&self) -> Value;

    /// Convert from a [`Value`], coercing when lossless.
    ///
    /// # Errors
    ///
    /// Returns a message naming the mismatch.
    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch(expected: FieldKind, got: &Value) -> String {
    format!("expected {expected}, got {}", got.type_name())
}

macro_rules! signed_field_type {
    ($($t:ty),*) => {$(
        impl FieldType for $t {
            const KIND: FieldKind = FieldKind::Int;

            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, String> {
                match value.coerce(FieldKind::Int, false)? {
                    Value::Int(i) => <$t>::try_from(i)
                        .map_err(|_| format!("{i} does not fit in {}", stringify!($t))),
                    other => Err(mismatch(FieldKind::Int, &other)),
                }
            }
        }
    )*};
}

macro_rules! unsigned_field_type {
    ($($t:ty),*) => {$(
        impl FieldType for $t {
            const KIND: FieldKind = FieldKind::Uint;

            fn to_value(&self) -> Value {
                Value::Uint(u64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, String> {
                match value.coerce(FieldKind::Uint, false)? {
                    Value::Uint(u) => <$t>::try_from(u)
                        .map_err(|_| format!("{u} does not fit in {}", stringify!($t))),
                    other => Err(mismatch(FieldKind::Uint, &other)),
                }
            }
        }
    )*};
}

signed_field_type!(i8, i16, i32, i64);
unsigned_field_type!(u8, u16, u32, u64);

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value.coerce(FieldKind::Float, false)? {
            Value::Float(f) => Ok(f),
            other => Err(mismatch(FieldKind::Float, &other)),
        }
    }
}

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Result<Self, String> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value.coerce(FieldKind::Bool, false)? {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(FieldKind::Bool, &other)),
        }
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value.coerce(FieldKind::Text, false)? {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(FieldKind::Text, &other)),
        }
    }
}

impl FieldType for Value {
    const KIND: FieldKind = FieldKind::Any;

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;
    const OPTIONAL: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    const KIND: FieldKind = FieldKind::List;

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(T::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value.coerce(FieldKind::List, false)? {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch(FieldKind::List, &other)),
        }
    }
}

impl<T: FieldType> FieldType for BTreeMap<String, T> {
    const KIND: FieldKind = FieldKind::Map;

    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value.coerce(FieldKind::Map, false)? {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch(FieldKind::Map, &other)),
        }
    }
}

impl<T: FieldType> FieldType for HashMap<String, T> {
    const KIND: FieldKind = FieldKind::Map;

    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        BTreeMap::<String, T>::from_value(value).map(|m| m.into_iter().collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Paths
// ═══════════════════════════════════════════════════════════════════════════════

/// Split a location like `Audit+created` or `address.city` into its
/// container segments and the final attribute name.
#[must_use]
pub fn split_location(location: &str) -> (Vec<&str>, &str) {
    let mut segments: Vec<&str> = location.split(['.', '+']).collect();
    let last = segments.pop().unwrap_or_default();
    (segments, last)
}

/// Walk container segments to the record that owns the final attribute.
#[must_use]
pub fn resolve_path<'a>(record: &'a dyn Record, location: &str) -> Option<(&'a dyn Record, String)> {
    let (containers, last) = split_location(location);
    let mut current = record;
    for segment in containers {
        current = current.child(segment)?;
    }
    Some((current, last.to_owned()))
}

/// Read the attribute at `location`.
#[must_use]
pub fn read_path(record: &dyn Record, location: &str) -> Option<Value> {
    let (owner, name) = resolve_path(record, location)?;
    owner.get(&name)
}

/// Write the attribute at `location`.
///
/// # Errors
///
/// Returns [`SlotError::Missing`] if any segment does not resolve, or the
/// error from the owning record's [`Record::set`].
pub fn write_path(record: &mut dyn Record, location: &str, value: Value) -> Result<(), SlotError> {
    let (containers, last) = split_location(location);
    let mut current = record;
    for segment in containers {
        current = current.child_mut(segment).ok_or(SlotError::Missing)?;
    }
    current.set(last, value)
}

/// Capture every exported attribute of a record as a [`Value::Map`].
#[must_use]
pub fn snapshot(record: &dyn Record) -> Value {
    let mut map = BTreeMap::new();
    for attribute in record.shape() {
        if !attribute.exported {
            continue;
        }
        let value = match attribute.nesting {
            Nesting::None => record.get(attribute.name),
            Nesting::Embedded(_) | Nesting::Named(_) => record.child(attribute.name).map(snapshot),
        };
        map.insert(attribute.name.to_owned(), value.unwrap_or_default());
    }
    Value::Map(map)
}

// ═══════════════════════════════════════════════════════════════════════════════
// record! macro
// ═══════════════════════════════════════════════════════════════════════════════

/// Declare a struct and implement [`Record`] for it.
///
/// Each field may carry a nesting marker (`=> embedded` or `=> nested`) for
/// record-typed fields, and a bracketed tag list `[key = "value", ...]`.
/// Non-`pub` fields are described but marked unexported. An optional
/// `methods { name, ... }` block exposes zero-argument methods to `$.name()`
/// defaults.
///
/// ```
/// use fieldtools::{record, Record};
///
/// record! {
///     #[derive(Debug, Default)]
///     pub struct Audit {
///         pub created_by: String [default = "$user"],
///     }
/// }
///
/// record! {
///     #[derive(Debug, Default)]
///     pub struct Order {
///         pub id: String [id = "$.code(),id"],
///         pub audit: Audit => embedded,
///     }
///     methods { code }
/// }
///
/// impl Order {
///     pub fn code(&self) -> String {
///         "ord-1".into()
///     }
/// }
///
/// assert_eq!(Order::record_name(), "Order");
/// assert!(Order::default().child("audit").is_some());
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $fname:ident : $fty:ty
                $(=> $nest:ident)?
                $([ $($tkey:ident = $tval:literal),* $(,)? ])?
            ),* $(,)?
        }
        $(methods { $($method:ident),* $(,)? })?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $fname: $fty,
            )*
        }

        impl $crate::Record for $name {
            fn attributes() -> ::std::vec::Vec<$crate::Attribute> {
                ::std::vec![$(
                    $crate::Attribute {
                        name: stringify!($fname),
                        kind: $crate::__record_kind!($fty $(, $nest)?),
                        optional: $crate::__record_optional!($fty $(, $nest)?),
                        exported: !stringify!($fvis).is_empty(),
                        tags: ::std::vec![$($( (stringify!($tkey), $tval) ),*)?],
                        nesting: $crate::__record_nesting!($fty $(, $nest)?),
                    }
                ),*]
            }

            fn record_name() -> &'static str {
                stringify!($name)
            }

            fn shape(&self) -> ::std::vec::Vec<$crate::Attribute> {
                <Self as $crate::Record>::attributes()
            }

            fn type_name(&self) -> &'static str {
                stringify!($name)
            }

            fn get(&self, name: &str) -> ::std::option::Option<$crate::Value> {
                $(
                    if name == stringify!($fname) {
                        return $crate::__record_get!(self.$fname, $fty $(, $nest)?);
                    }
                )*
                ::std::option::Option::None
            }

            fn set(
                &mut self,
                name: &str,
                value: $crate::Value,
            ) -> ::std::result::Result<(), $crate::SlotError> {
                $(
                    if name == stringify!($fname) {
                        return $crate::__record_set!(self.$fname, $fty, value $(, $nest)?);
                    }
                )*
                let _ = value;
                ::std::result::Result::Err($crate::SlotError::Missing)
            }

            fn child(&self, name: &str) -> ::std::option::Option<&dyn $crate::Record> {
                $(
                    if name == stringify!($fname) {
                        return $crate::__record_child!(&self.$fname $(, $nest)?);
                    }
                )*
                ::std::option::Option::None
            }

            fn child_mut(&mut self, name: &str) -> ::std::option::Option<&mut dyn $crate::Record> {
                $(
                    if name == stringify!($fname) {
                        return $crate::__record_child!(&mut self.$fname $(, $nest)?);
                    }
                )*
                ::std::option::Option::None
            }

            fn call(&self, method: &str) -> ::std::option::Option<$crate::Value> {
                $($(
                    if method == stringify!($method) {
                        return ::std::option::Option::Some($crate::FieldType::to_value(&self.$method()));
                    }
                )*)?
                let _ = method;
                ::std::option::Option::None
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_kind {
    ($ty:ty) => {
        <$ty as $crate::FieldType>::KIND
    };
    ($ty:ty, $nest:ident) => {
        $crate::FieldKind::Record
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_optional {
    ($ty:ty) => {
        <$ty as $crate::FieldType>::OPTIONAL
    };
    ($ty:ty, $nest:ident) => {
        false
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_nesting {
    ($ty:ty) => {
        $crate::Nesting::None
    };
    ($ty:ty, embedded) => {
        $crate::Nesting::Embedded(<$ty as $crate::Record>::attributes)
    };
    ($ty:ty, nested) => {
        $crate::Nesting::Named(<$ty as $crate::Record>::attributes)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_get {
    ($field:expr, $ty:ty) => {
        ::std::option::Option::Some(<$ty as $crate::FieldType>::to_value(&$field))
    };
    ($field:expr, $ty:ty, $nest:ident) => {
        ::std::option::Option::Some($crate::record::snapshot(&$field))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_set {
    ($field:expr, $ty:ty, $value:ident) => {
        match <$ty as $crate::FieldType>::from_value($value) {
            ::std::result::Result::Ok(converted) => {
                $field = converted;
                ::std::result::Result::Ok(())
            }
            ::std::result::Result::Err(message) => {
                ::std::result::Result::Err($crate::SlotError::Coerce(message))
            }
        }
    };
    ($field:expr, $ty:ty, $value:ident, $nest:ident) => {{
        let _ = $value;
        ::std::result::Result::Err($crate::SlotError::Unsettable)
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_child {
    ($field:expr) => {
        ::std::option::Option::None
    };
    ($field:expr, $nest:ident) => {
        ::std::option::Option::Some($field)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    record! {
        #[derive(Debug, Default)]
        pub struct Address {
            pub city: String [validate = "required"],
            pub zip: Option<u32>,
        }
    }

    record! {
        #[derive(Debug, Default)]
        pub struct Stamp {
            pub by: String,
        }
    }

    record! {
        #[derive(Debug, Default)]
        pub struct Person {
            pub name: String [json = "full_name", default = "=anon"],
            pub age: u8,
            pub tags: Vec<String>,
            pub address: Address => nested,
            pub stamp: Stamp => embedded,
            hidden: i64,
        }
        methods { greeting }
    }

    impl Person {
        fn greeting(&self) -> String {
            format!("hi {}", self.name)
        }
    }

    #[test]
    fn attributes_describe_fields() {
        let attrs = Person::attributes();
        let names: Vec<_> = attrs.iter().map(|a| a.name).collect();
        assert_eq!(names, ["name", "age", "tags", "address", "stamp", "hidden"]);

        assert_eq!(attrs[0].tag("json"), Some("full_name"));
        assert_eq!(attrs[0].tag("default"), Some("=anon"));
        assert_eq!(attrs[1].kind, FieldKind::Uint);
        assert_eq!(attrs[2].kind, FieldKind::List);
        assert!(matches!(attrs[3].nesting, Nesting::Named(_)));
        assert!(matches!(attrs[4].nesting, Nesting::Embedded(_)));
        assert!(!attrs[5].exported);
        assert!(attrs[0].exported);
    }

    #[test]
    fn optional_fields() {
        let attrs = Address::attributes();
        assert!(!attrs[0].optional);
        assert!(attrs[1].optional);
        assert_eq!(attrs[1].kind, FieldKind::Uint);
    }

    #[test]
    fn get_and_set_coerce() {
        let mut person = Person::default();
        person.set("age", Value::from("42")).unwrap();
        assert_eq!(person.age, 42);
        assert_eq!(person.get("age"), Some(Value::Uint(42)));

        let err = person.set("age", Value::from("999")).unwrap_err();
        assert!(matches!(err, SlotError::Coerce(_)));
        assert_eq!(person.set("nope", Value::Null), Err(SlotError::Missing));
        assert_eq!(person.set("address", Value::Null), Err(SlotError::Unsettable));
    }

    #[test]
    fn paths_walk_nested_and_embedded() {
        let mut person = Person::default();
        write_path(&mut person, "address.city", Value::from("Oslo")).unwrap();
        write_path(&mut person, "stamp+by", Value::from("root")).unwrap();
        assert_eq!(person.address.city, "Oslo");
        assert_eq!(person.stamp.by, "root");
        assert_eq!(read_path(&person, "address.city"), Some(Value::from("Oslo")));
        assert_eq!(read_path(&person, "missing.city"), None);
    }

    #[test]
    fn methods_are_callable() {
        let person = Person {
            name: "ada".into(),
            ..Person::default()
        };
        assert_eq!(person.call("greeting"), Some(Value::from("hi ada")));
        assert_eq!(person.call("nope"), None);
    }

    #[test]
    fn snapshot_skips_private_fields() {
        let person = Person::default();
        let Value::Map(map) = snapshot(&person) else {
            panic!("expected map");
        };
        assert!(map.contains_key("address"));
        assert!(!map.contains_key("hidden"));
        assert!(matches!(map["address"], Value::Map(_)));
    }
}
