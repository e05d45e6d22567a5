//! Per-operation state threaded through one apply pass.

use std::collections::BTreeMap;

use crate::access::{AccessKind, Principal};
use crate::value::Value;
use crate::WILDCARD_SCOPE;

/// Mutable bag threaded through [`Catalog::apply_tools`](crate::Catalog::apply_tools).
///
/// Carries the active scope (usually the CRUD action name), the principal
/// and access kind used by the access tool, free-form values for field
/// functions, integer counters, named sub-contexts, and the projection
/// produced by read-access passes.
///
/// # Example
///
/// ```
/// use fieldtools::{ToolContext, Value};
///
/// let mut ctx = ToolContext::for_scope("create");
/// assert_eq!(ctx.scope(), "create");
/// assert_eq!(ctx.increment("seq", 1), 1);
/// assert_eq!(ctx.increment("seq", 1), 2);
///
/// ctx.sub_context("audit").set("user", Value::from("ada"));
/// assert_eq!(ctx.sub("audit").and_then(|c| c.get("user")), Some(&Value::from("ada")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    scope: Option<String>,
    principal: Option<Principal>,
    access: AccessKind,
    values: BTreeMap<String, Value>,
    counters: BTreeMap<String, i64>,
    children: BTreeMap<String, ToolContext>,
    projection: BTreeMap<String, Value>,
}

impl ToolContext {
    /// Context with no scope. [`ToolContext::scope`] reports the wildcard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for the given scope.
    #[must_use]
    pub fn for_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::default()
        }
    }

    /// Set the principal evaluated by access appliers.
    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Set the access kind evaluated by access appliers.
    #[must_use]
    pub fn with_access(mut self, access: AccessKind) -> Self {
        self.access = access;
        self
    }

    /// Active scope, or `*` when none was set.
    #[must_use]
    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or(WILDCARD_SCOPE)
    }

    /// Change the active scope.
    pub fn set_scope(&mut self, scope: impl Into<String>) {
        self.scope = Some(scope.into());
    }

    /// Principal for access checks. Unset means [`Principal::NoAccess`].
    #[must_use]
    pub fn principal(&self) -> &Principal {
        self.principal.as_ref().unwrap_or(&Principal::NoAccess)
    }

    /// Requested access kind.
    #[must_use]
    pub fn access(&self) -> AccessKind {
        self.access
    }

    /// Store a value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Read a stored value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Add `by` to a counter and return the new total. Counters start at 0.
    pub fn increment(&mut self, name: &str, by: i64) -> i64 {
        let counter = self.counters.entry(name.to_owned()).or_insert(0);
        *counter += by;
        *counter
    }

    /// Current value of a counter.
    #[must_use]
    pub fn counter(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Named nested context, created empty on first use.
    pub fn sub_context(&mut self, name: &str) -> &mut ToolContext {
        self.children.entry(name.to_owned()).or_default()
    }

    /// Named nested context, if it exists.
    #[must_use]
    pub fn sub(&self, name: &str) -> Option<&ToolContext> {
        self.children.get(name)
    }

    /// Record a projected field.
    pub fn project(&mut self, name: impl Into<String>, value: Value) {
        self.projection.insert(name.into(), value);
    }

    /// Fields projected so far.
    #[must_use]
    pub fn projection(&self) -> &BTreeMap<String, Value> {
        &self.projection
    }

    /// Take the projection, leaving it empty.
    pub fn take_projection(&mut self) -> BTreeMap<String, Value> {
        std::mem::take(&mut self.projection)
    }
}
