//! The registry of tools, functions, principals and cached field tables.
//!
//! A [`CatalogBuilder`] collects registrations and validates each one as it
//! arrives. [`CatalogBuilder::build`] freezes them into an immutable
//! [`Catalog`]; no registration is possible afterwards. The catalog then owns
//! the per-type field tables and the parsed-expression caches for the life of
//! the process.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use fieldtools::{record, CatalogBuilder, ToolContext, Value};
//!
//! record! {
//!     #[derive(Debug, Default)]
//!     pub struct Widget {
//!         pub color: String [default = "$color"],
//!         pub label: String [default = "=123", validate = "len(1,8)"],
//!         pub size: i64 [default = "=123"],
//!     }
//! }
//!
//! let catalog = CatalogBuilder::new()
//!     .register_tool_function("$color", |_, _, _| Ok(Value::from("orange")))
//!     .unwrap()
//!     .build();
//!
//! let mut widget = Widget::default();
//! catalog.apply_defaults(&mut widget, &mut ToolContext::new()).unwrap();
//! assert_eq!(widget.color, "orange");
//! assert_eq!(widget.label, "123");
//! assert_eq!(widget.size, 123);
//! assert!(catalog.validate(&mut widget, &mut ToolContext::new()).is_ok());
//! ```

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::access::{AccessKind, AccessPrincipals, Principal};
use crate::appliers::{store, FieldFunction};
use crate::config::CatalogConfig;
use crate::constraint::ConstraintRef;
use crate::context::ToolContext;
use crate::error::{Error, ErrorBatch, Result};
use crate::expr::ConstraintParser;
use crate::fields::{FieldInfo, FieldTable};
use crate::record::Record;
use crate::scope::ScopeAliases;
use crate::tool::ToolRef;
use crate::tools::{self, AccessTool, DefaultTool, IdTool, ValidateTool, ACCESS, DEFAULT, ID, VALIDATE};
use crate::value::Value;
use crate::{FUNCTION_SIGIL, MAX_FUNCTION_NAME_LEN};

type TableCell = Arc<OnceCell<Arc<FieldTable>>>;

/// Scoped constraint groups of one validation tag, in tag order.
pub type ValidationGroups = Arc<Vec<(String, ConstraintRef)>>;

/// Builder for a [`Catalog`].
///
/// [`CatalogBuilder::new`] starts with the default tools and framework
/// functions; [`CatalogBuilder::default`] starts empty.
#[derive(Default)]
pub struct CatalogBuilder {
    principals: AccessPrincipals,
    aliases: ScopeAliases,
    functions: BTreeMap<String, FieldFunction>,
    constants: BTreeMap<String, Value>,
    parser: ConstraintParser,
    tools: BTreeMap<String, ToolRef>,
    require_id: bool,
}

impl CatalogBuilder {
    /// A builder with the `default`, `id`, `validate` and `access` tools and
    /// the `$_seq` and `$_scope` framework functions.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self::default().tag_to_field_tool_associations([
            (DEFAULT, Some(Arc::new(DefaultTool) as ToolRef)),
            (ID, Some(Arc::new(IdTool) as ToolRef)),
            (VALIDATE, Some(Arc::new(ValidateTool) as ToolRef)),
            (ACCESS, Some(Arc::new(AccessTool) as ToolRef)),
        ]);
        builder.insert_function("$_seq", Arc::new(tools::sequence), true);
        builder.insert_function("$_scope", Arc::new(tools::scope_name), true);
        builder
    }

    /// A builder seeded from a declarative config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for any registration the config
    /// describes that would fail if made directly.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let mut builder = Self::new()
            .register_access_principals(config.principals.iter().cloned())?
            .register_constants(
                config
                    .constants
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from(value.clone()))),
            )
            .register_constraint_expressions(config.constraints.iter().map(|(n, e)| (n.clone(), e.clone())))?
            .require_id_field(config.require_id);
        for (alias, scope) in &config.scope_aliases {
            builder = builder.scope_alias(alias, scope)?;
        }
        Ok(builder)
    }

    /// Register custom access principals, in bit-position order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for reserved or empty names, or when
    /// more than seven principals would be registered.
    pub fn register_access_principals<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principals.register(names)?;
        Ok(self)
    }

    /// Register field functions usable as `$name` defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a name lacks the `$` sigil, is
    /// outside 2 to 64 characters, or starts with `_` after the sigil.
    pub fn register_field_functions<I, S>(mut self, functions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, FieldFunction)>,
        S: Into<String>,
    {
        let functions: Vec<(String, FieldFunction)> =
            functions.into_iter().map(|(name, f)| (name.into(), f)).collect();
        for (name, _) in &functions {
            check_function_name(name, false)?;
        }
        for (name, function) in functions {
            self.insert_function(&name, function, false);
        }
        Ok(self)
    }

    /// Register one field function.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogBuilder::register_field_functions`].
    pub fn register_tool_function<F>(self, name: &str, function: F) -> Result<Self>
    where
        F: Fn(&dyn Record, &FieldInfo, &mut ToolContext) -> Result<Value> + Send + Sync + 'static,
    {
        let function: FieldFunction = Arc::new(function);
        self.register_field_functions([(name, function)])
    }

    fn insert_function(&mut self, name: &str, function: FieldFunction, internal: bool) {
        debug_assert!(check_function_name(name, internal).is_ok());
        if self.functions.insert(name.to_owned(), function).is_some() {
            tracing::warn!(name, "field function re-registered; the last registration wins");
        }
    }

    /// Register named constants usable as `=$name` defaults.
    ///
    /// The `$` sigil is added to names that lack it.
    #[must_use]
    pub fn register_constants<I, S, V>(mut self, constants: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in constants {
            self.constants.insert(sigiled(name.into()), value.into());
        }
        self
    }

    /// Register named constraints usable as `$name` terms.
    #[must_use]
    pub fn register_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = (S, ConstraintRef)>,
        S: AsRef<str>,
    {
        for (name, constraint) in constraints {
            self.parser.register(name.as_ref(), constraint);
        }
        self
    }

    /// Parse and register named constraint expressions.
    ///
    /// Expressions may refer to names registered earlier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the constraint whose
    /// expression does not parse.
    pub fn register_constraint_expressions<I, S, E>(mut self, expressions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, E)>,
        S: AsRef<str>,
        E: AsRef<str>,
    {
        for (name, expression) in expressions {
            let constraint = self.parser.parse(expression.as_ref()).map_err(|e| {
                Error::config(format!("named constraint \"{}\": {e}", name.as_ref()))
            })?;
            self.parser.register(name.as_ref(), constraint);
        }
        Ok(self)
    }

    /// Make `alias` select the same directives as `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `alias` already refers to a
    /// different scope.
    pub fn scope_alias(mut self, alias: impl Into<String>, scope: impl Into<String>) -> Result<Self> {
        self.aliases.insert(alias, scope)?;
        Ok(self)
    }

    /// Associate tag keys with tools. `None` removes an association.
    #[must_use]
    pub fn tag_to_field_tool_associations<I, S>(mut self, associations: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<ToolRef>)>,
        S: Into<String>,
    {
        for (tag, tool) in associations {
            let tag = tag.into();
            match tool {
                Some(tool) => {
                    self.tools.insert(tag, tool);
                }
                None => {
                    self.tools.remove(&tag);
                }
            }
        }
        self
    }

    /// Require every introspected type to designate exactly one id field.
    #[must_use]
    pub fn require_id_field(mut self, require: bool) -> Self {
        self.require_id = require;
        self
    }

    /// Freeze into a [`Catalog`].
    #[must_use]
    pub fn build(self) -> Catalog {
        tracing::debug!(
            tools = self.tools.len(),
            functions = self.functions.len(),
            principals = self.principals.len(),
            "catalog built"
        );
        Catalog {
            principals: Arc::new(self.principals),
            aliases: self.aliases,
            functions: self.functions,
            constants: self.constants,
            parser: self.parser,
            tools: self.tools,
            require_id: self.require_id,
            tables: DashMap::new(),
            expressions: DashMap::new(),
            validations: DashMap::new(),
        }
    }
}

impl fmt::Debug for CatalogBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogBuilder")
            .field("principals", &self.principals)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn sigiled(name: String) -> String {
    if name.starts_with(FUNCTION_SIGIL) {
        name
    } else {
        format!("{FUNCTION_SIGIL}{name}")
    }
}

fn check_function_name(name: &str, internal: bool) -> Result<()> {
    let Some(rest) = name.strip_prefix(FUNCTION_SIGIL) else {
        return Err(Error::config(format!(
            "field function \"{name}\" must start with '{FUNCTION_SIGIL}'"
        )));
    };
    let len = name.chars().count();
    if !(2..=MAX_FUNCTION_NAME_LEN).contains(&len) {
        return Err(Error::config(format!(
            "field function \"{name}\" must be 2 to {MAX_FUNCTION_NAME_LEN} characters long"
        )));
    }
    if rest.starts_with('_') && !internal {
        return Err(Error::config(format!(
            "field function \"{name}\": names starting with '{FUNCTION_SIGIL}_' are reserved"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable registry plus the process-lifetime caches built from it.
///
/// `Catalog` is `Send + Sync`. Field tables are computed at most once per
/// type, even under concurrent first use.
pub struct Catalog {
    principals: Arc<AccessPrincipals>,
    aliases: ScopeAliases,
    functions: BTreeMap<String, FieldFunction>,
    constants: BTreeMap<String, Value>,
    parser: ConstraintParser,
    tools: BTreeMap<String, ToolRef>,
    require_id: bool,
    tables: DashMap<TypeId, TableCell>,
    expressions: DashMap<String, ConstraintRef>,
    validations: DashMap<String, ValidationGroups>,
}

impl Default for Catalog {
    fn default() -> Self {
        CatalogBuilder::new().build()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("principals", &self.principals)
            .field("aliases", &self.aliases)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("cached_types", &self.tables.len())
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Registered access principals.
    #[must_use]
    pub fn principals(&self) -> &Arc<AccessPrincipals> {
        &self.principals
    }

    /// Registered scope aliases.
    #[must_use]
    pub fn aliases(&self) -> &ScopeAliases {
        &self.aliases
    }

    /// Field function registered as `name`.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FieldFunction> {
        self.functions.get(name)
    }

    /// Names of registered field functions.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Constant registered as `name`.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    /// Tag keys and their tools, ordered by tag key.
    pub fn tool_associations(&self) -> impl Iterator<Item = (&str, &ToolRef)> {
        self.tools.iter().map(|(tag, tool)| (tag.as_str(), tool))
    }

    /// Names of associated tools.
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.values().map(|tool| tool.name())
    }

    /// Whether types must designate exactly one id field.
    #[must_use]
    pub fn require_id(&self) -> bool {
        self.require_id
    }

    /// Number of record types with a cached field table.
    #[must_use]
    pub fn cached_types(&self) -> usize {
        self.tables.iter().filter(|entry| entry.value().get().is_some()).count()
    }

    /// Build (or fetch) the constraint for an expression list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a malformed expression. Failures
    /// are not cached.
    pub fn constraint(&self, expression: &str) -> Result<ConstraintRef> {
        if let Some(hit) = self.expressions.get(expression) {
            return Ok(Arc::clone(hit.value()));
        }
        let constraint = self.parser.parse(expression)?;
        tracing::debug!(expression, "built constraint expression");
        self.expressions
            .insert(expression.to_owned(), Arc::clone(&constraint));
        Ok(constraint)
    }

    /// Build (or fetch) the scoped constraint groups of a validation tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a malformed tag.
    pub fn validation(&self, tag: &str) -> Result<ValidationGroups> {
        if let Some(hit) = self.validations.get(tag) {
            return Ok(Arc::clone(hit.value()));
        }
        let groups = Arc::new(self.parser.parse_tag(tag)?);
        tracing::debug!(tag, groups = groups.len(), "built validation tag");
        self.validations.insert(tag.to_owned(), Arc::clone(&groups));
        Ok(groups)
    }

    /// The field table of `R`, computing it on first use.
    ///
    /// # Errors
    ///
    /// Returns every configuration error found in `R`'s tags. A failed
    /// introspection is not cached; later calls report the same errors.
    pub fn introspect<R: Record>(&self) -> Result<Arc<FieldTable>> {
        self.table_for(TypeId::of::<R>(), || FieldTable::build(self, R::record_name(), R::attributes()))
    }

    /// [`Catalog::introspect`] for a live record of any type.
    ///
    /// # Errors
    ///
    /// Same as [`Catalog::introspect`].
    pub fn introspect_dyn(&self, record: &dyn Record) -> Result<Arc<FieldTable>> {
        let type_id = Any::type_id(record);
        self.table_for(type_id, || FieldTable::build(self, record.type_name(), record.shape()))
    }

    fn table_for<F>(&self, type_id: TypeId, build: F) -> Result<Arc<FieldTable>>
    where
        F: FnOnce() -> Result<FieldTable>,
    {
        // clone the cell out so the shard lock is released before the walk
        let cell: TableCell = Arc::clone(self.tables.entry(type_id).or_default().value());
        cell.get_or_try_init(|| build().map(Arc::new)).map(Arc::clone)
    }

    /// Run `tools` in order over `record`.
    ///
    /// Every bound field is visited even after a failure; all errors are
    /// returned together, each attributed to its field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown tool name or a type
    /// that fails introspection, otherwise the batched field errors.
    pub fn apply_tools(&self, record: &mut dyn Record, ctx: &mut ToolContext, tools: &[&str]) -> Result<()> {
        for tool in tools {
            if !self.tools.values().any(|t| t.name() == *tool) {
                return Err(Error::config(format!("unknown tool \"{tool}\"")));
            }
        }
        let table = self.introspect_dyn(&*record)?;
        let mut errors = ErrorBatch::new();
        for tool in tools {
            for (field, applier) in table.bucket(tool) {
                if let Err(e) = applier.apply(record, field, ctx) {
                    errors.push(attribute(field, e));
                }
            }
        }
        errors.into_result()
    }

    /// Apply `id` then `default`.
    ///
    /// # Errors
    ///
    /// See [`Catalog::apply_tools`].
    pub fn apply_defaults(&self, record: &mut dyn Record, ctx: &mut ToolContext) -> Result<()> {
        self.apply_tools(record, ctx, &[ID, DEFAULT])
    }

    /// Apply `validate`.
    ///
    /// # Errors
    ///
    /// Returns a batch with one [`Error::Validation`] per failing field.
    pub fn validate(&self, record: &mut dyn Record, ctx: &mut ToolContext) -> Result<()> {
        self.apply_tools(record, ctx, &[VALIDATE])
    }

    /// Reset fields `principal` may not write with `kind` to their zero
    /// value. Provided fields are kept.
    ///
    /// # Errors
    ///
    /// See [`Catalog::apply_tools`].
    pub fn remove_non_writable(&self, record: &mut dyn Record, principal: &Principal, kind: AccessKind) -> Result<()> {
        let mut ctx = ToolContext::new()
            .with_principal(principal.clone())
            .with_access(kind);
        self.apply_tools(record, &mut ctx, &[ACCESS])
    }

    /// Fields `principal` may read, keyed by external name.
    ///
    /// Fields without an access tag are always readable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the type fails introspection.
    pub fn project_readable(&self, record: &dyn Record, principal: &Principal) -> Result<BTreeMap<String, Value>> {
        let table = self.introspect_dyn(record)?;
        let mut projection = BTreeMap::new();
        for (name, field) in table.named() {
            let readable = field
                .access
                .map_or(true, |mask| self.principals.allows(mask, principal, AccessKind::READ));
            if !readable {
                continue;
            }
            if let Some(value) = field.read(record) {
                projection.insert(name.to_owned(), value);
            }
        }
        Ok(projection)
    }

    /// Copy provided, non-zero fields from `source` into `target`.
    ///
    /// Used to rebuild the current version of a record before applying a
    /// partial update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the records are of different
    /// types, otherwise the batched field errors.
    pub fn copy_provided(&self, source: &dyn Record, target: &mut dyn Record) -> Result<()> {
        if Any::type_id(source) != Any::type_id(&*target) {
            return Err(Error::config(format!(
                "cannot copy provided fields from {} into {}",
                source.type_name(),
                target.type_name()
            )));
        }
        let table = self.introspect_dyn(source)?;
        let mut errors = ErrorBatch::new();
        for field in table.fields().iter().filter(|f| f.provided) {
            if let Some(value) = field.read(source).filter(|v| !v.is_zero()) {
                errors.capture(store(target, field, value));
            }
        }
        errors.into_result()
    }
}

fn attribute(field: &FieldInfo, error: Error) -> Error {
    match error {
        Error::Batch(errors) => Error::Batch(errors.into_iter().map(|e| attribute(field, e)).collect()),
        error if error.location() == Some(field.location.as_str()) => error,
        error => Error::in_field(&field.location, error),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Process-wide catalog
// ═══════════════════════════════════════════════════════════════════════════════

static GLOBAL: OnceCell<Catalog> = OnceCell::new();

/// Install the process-wide catalog. Call once at start-up.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if a catalog is already installed,
/// including the default one created by an earlier [`global`] call.
pub fn install(catalog: Catalog) -> Result<()> {
    GLOBAL
        .set(catalog)
        .map_err(|_| Error::config("a process-wide catalog is already installed"))
}

/// The process-wide catalog, or a default one if none was installed.
pub fn global() -> &'static Catalog {
    GLOBAL.get_or_init(Catalog::default)
}
