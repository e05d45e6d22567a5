//! Field metadata and per-type field tables.
//!
//! [`FieldTable::build`] walks a record type's attributes depth-first and asks
//! every tool associated with a tag key for an applier. The resulting table is
//! immutable and cached by the [`Catalog`] for the life of the process.
//!
//! Walk rules:
//!
//! - unexported attributes are skipped, including their nested records
//! - embedded records contribute their fields with a `+`-joined location
//! - named nested records contribute their fields with a `.`-joined location
//!   and those fields are marked [`FieldInfo::nested`]
//! - applier build failures are collected for the whole type
//!
//! Duplicate external names: a flat field always owns the name. A later flat
//! field with a taken name is skipped with a warning. A flat field replaces an
//! earlier nested owner in the name index, and the nested field keeps its
//! tool bindings.

use std::collections::BTreeMap;
use std::fmt;

use crate::access::AccessMask;
use crate::catalog::Catalog;
use crate::error::{Error, ErrorBatch, Result};
use crate::record::{read_path, Attribute, Nesting, Record};
use crate::tool::ApplierRef;
use crate::tools::{ACCESS, DEFAULT, ID};
use crate::value::{FieldKind, Value};

/// Metadata for one tooled field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Declared identifier.
    pub name: String,
    /// Path from the record root, joined with `+` (embedded) and `.` (nested).
    pub location: String,
    /// Serialized name.
    pub external_name: String,
    /// Declared kind.
    pub kind: FieldKind,
    /// Whether the field holds an optional value.
    pub optional: bool,
    /// Raw tags.
    pub tags: Vec<(&'static str, &'static str)>,
    /// Access bits, or `None` when the field has no access tag.
    pub access: Option<AccessMask>,
    /// Whether the caller may always supply the field.
    pub provided: bool,
    /// Raw default directive.
    pub default: Option<String>,
    /// Whether the default only applies to a zero field.
    pub bypass_if_set: bool,
    /// Zero value of the field's type.
    pub zero: Value,
    /// Whether the field sits inside a named nested record.
    pub nested: bool,
    /// Whether the field carries an id tag.
    pub id: bool,
}

impl FieldInfo {
    /// Untagged field at `location`.
    #[must_use]
    pub fn new(location: &str, kind: FieldKind, optional: bool) -> Self {
        let name = location.rsplit(['.', '+']).next().unwrap_or(location).to_owned();
        Self {
            external_name: name.clone(),
            name,
            location: location.to_owned(),
            kind,
            optional,
            tags: Vec::new(),
            access: None,
            provided: false,
            default: None,
            bypass_if_set: false,
            zero: kind.zero(optional),
            nested: false,
            id: false,
        }
    }

    /// Look up a tag.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Current value in `record`.
    #[must_use]
    pub fn read(&self, record: &dyn Record) -> Option<Value> {
        read_path(record, &self.location)
    }

    /// Whether the field is zero (or unreachable) in `record`.
    #[must_use]
    pub fn is_zero_in(&self, record: &dyn Record) -> bool {
        self.read(record).map_or(true, |v| v.is_zero())
    }
}

/// The memoized result of introspecting one record type.
pub struct FieldTable {
    type_name: &'static str,
    fields: Vec<FieldInfo>,
    by_name: BTreeMap<String, usize>,
    buckets: BTreeMap<String, Vec<(usize, ApplierRef)>>,
    id_field: Option<usize>,
}

impl fmt::Debug for FieldTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets: BTreeMap<&str, usize> = self
            .buckets
            .iter()
            .map(|(tool, bindings)| (tool.as_str(), bindings.len()))
            .collect();
        f.debug_struct("FieldTable")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("buckets", &buckets)
            .finish_non_exhaustive()
    }
}

impl FieldTable {
    /// Declared name of the record type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Every tooled field, in walk order.
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Field owning `external_name`.
    #[must_use]
    pub fn field(&self, external_name: &str) -> Option<&FieldInfo> {
        self.by_name.get(external_name).map(|&i| &self.fields[i])
    }

    /// Fields indexed by external name.
    pub fn named(&self) -> impl Iterator<Item = (&str, &FieldInfo)> {
        self.by_name
            .iter()
            .map(|(name, &i)| (name.as_str(), &self.fields[i]))
    }

    /// The designated id field.
    #[must_use]
    pub fn id_field(&self) -> Option<&FieldInfo> {
        self.id_field.map(|i| &self.fields[i])
    }

    /// Fields bound to `tool`, with their appliers, in walk order.
    pub fn bucket(&self, tool: &str) -> impl Iterator<Item = (&FieldInfo, &ApplierRef)> {
        self.buckets
            .get(tool)
            .into_iter()
            .flatten()
            .map(|(i, applier)| (&self.fields[*i], applier))
    }

    /// Names of tools with at least one bound field.
    pub fn tools(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Walk `attributes` and build the table.
    ///
    /// # Errors
    ///
    /// Returns every applier build failure, attributed to its field, plus id
    /// designation errors, batched into one error.
    pub fn build(catalog: &Catalog, type_name: &'static str, attributes: Vec<Attribute>) -> Result<Self> {
        let mut walk = Walk {
            catalog,
            table: FieldTable {
                type_name,
                fields: Vec::new(),
                by_name: BTreeMap::new(),
                buckets: BTreeMap::new(),
                id_field: None,
            },
            errors: ErrorBatch::new(),
        };
        walk.attributes(attributes, "", false);

        let Walk {
            mut table,
            mut errors,
            ..
        } = walk;

        let ids: Vec<usize> = table
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.id)
            .map(|(i, _)| i)
            .collect();
        match ids.as_slice() {
            [] if catalog.require_id() => errors.push(Error::config(format!(
                "type {type_name} must designate exactly one id field, found none"
            ))),
            [] => {}
            [one] => table.id_field = Some(*one),
            many => {
                let names: Vec<&str> = many.iter().map(|&i| table.fields[i].location.as_str()).collect();
                errors.push(Error::config(format!(
                    "type {type_name} must designate exactly one id field, found {}: {}",
                    many.len(),
                    names.join(", ")
                )));
            }
        }

        errors.into_result()?;
        tracing::debug!(
            type_name,
            fields = table.fields.len(),
            tools = table.buckets.len(),
            "introspected record type"
        );
        Ok(table)
    }
}

struct Walk<'c> {
    catalog: &'c Catalog,
    table: FieldTable,
    errors: ErrorBatch,
}

impl Walk<'_> {
    fn attributes(&mut self, attributes: Vec<Attribute>, prefix: &str, nested: bool) {
        for attribute in attributes {
            if !attribute.exported {
                continue;
            }
            match attribute.nesting {
                Nesting::Embedded(shape) => {
                    let prefix = format!("{prefix}{}+", attribute.name);
                    self.attributes(shape(), &prefix, nested);
                }
                Nesting::Named(shape) => {
                    let prefix = format!("{prefix}{}.", attribute.name);
                    self.attributes(shape(), &prefix, true);
                }
                Nesting::None => self.field(&attribute, format!("{prefix}{}", attribute.name), nested),
            }
        }
    }

    fn field(&mut self, attribute: &Attribute, location: String, nested: bool) {
        let external_name = external_name(attribute);
        let index = self.table.fields.len();

        match self.table.by_name.get(&external_name).map(|&i| self.table.fields[i].nested) {
            Some(false) if !nested => {
                tracing::warn!(
                    type_name = self.table.type_name,
                    name = %external_name,
                    skipped = %location,
                    "duplicate field name; keeping the first"
                );
                return;
            }
            Some(true) if !nested => {
                tracing::warn!(
                    type_name = self.table.type_name,
                    name = %external_name,
                    field = %location,
                    "field name shadows a nested field"
                );
                self.table.by_name.insert(external_name.clone(), index);
            }
            Some(_) => {
                tracing::warn!(
                    type_name = self.table.type_name,
                    name = %external_name,
                    field = %location,
                    "nested field name already taken; not indexed by name"
                );
            }
            None => {
                self.table.by_name.insert(external_name.clone(), index);
            }
        }

        let mut info = FieldInfo::new(&location, attribute.kind, attribute.optional);
        info.name = attribute.name.to_owned();
        info.external_name = external_name;
        info.tags.clone_from(&attribute.tags);
        info.nested = nested;
        info.id = attribute.tag(ID).is_some();
        if let Some(default) = attribute.tag(DEFAULT) {
            info.bypass_if_set = default.trim_start().starts_with('?');
            info.default = Some(default.to_owned());
        }
        if let Some(tag) = attribute.tag(ACCESS) {
            match self.catalog.principals().parse_tag(tag) {
                Ok(spec) => {
                    info.access = Some(spec.mask);
                    info.provided = spec.provided;
                }
                Err(e) => self.errors.push(Error::in_field(&location, e)),
            }
        }

        let mut bindings = Vec::new();
        for (key, tool) in self.catalog.tool_associations() {
            match tool.applier(self.catalog, &info, attribute.tag(key)) {
                Ok(Some(applier)) => bindings.push((tool.name().to_owned(), applier)),
                Ok(None) => {}
                Err(e) => self.errors.push(Error::in_field(&location, e)),
            }
        }

        self.table.fields.push(info);
        for (tool, applier) in bindings {
            self.table.buckets.entry(tool).or_default().push((index, applier));
        }
    }
}

/// `json` tag's first segment, overridden by the id tag's second segment,
/// falling back to the declared name.
fn external_name(attribute: &Attribute) -> String {
    let from_id = attribute
        .tag(ID)
        .and_then(|tag| tag.split_once(','))
        .map(|(_, name)| name.trim())
        .filter(|name| !name.is_empty());
    let from_json = attribute
        .tag("json")
        .and_then(|tag| tag.split(',').next())
        .map(str::trim)
        .filter(|name| !name.is_empty());
    from_id
        .or(from_json)
        .unwrap_or(attribute.name)
        .to_owned()
}
