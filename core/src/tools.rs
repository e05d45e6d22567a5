//! Tools registered by default.
//!
//! | tag key    | tool       | effect |
//! |------------|------------|--------|
//! | `default`  | `default`  | fills the field from a literal, constant, function or sibling |
//! | `id`       | `id`       | the default grammar on the first segment; the second renames the field |
//! | `validate` | `validate` | checks the field against a scoped constraint expression |
//! | `access`   | `access`   | zeroes non-writable fields or projects readable ones |
//!
//! Default directive grammar, per scope segment:
//!
//! ```text
//! config := ["?"] ( "=" literal | "=$constant" | "$" | "$." field | "$." method "()" | "$" function )
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::access::{AccessMask, AccessPrincipals};
use crate::appliers::{store, BypassIfSet, FunctionApplier, StructApplier, StructSource, ValueApplier};
use crate::catalog::Catalog;
use crate::constraint::ConstraintRef;
use crate::context::ToolContext;
use crate::error::{Error, Result};
use crate::fields::FieldInfo;
use crate::record::Record;
use crate::scope::{parse_scoped, ScopedApplier};
use crate::tool::{Applier, ApplierRef, Tool};
use crate::value::Value;

/// Tag key and tool name of [`DefaultTool`].
pub const DEFAULT: &str = "default";
/// Tag key and tool name of [`IdTool`].
pub const ID: &str = "id";
/// Tag key and tool name of [`ValidateTool`].
pub const VALIDATE: &str = "validate";
/// Tag key and tool name of [`AccessTool`].
pub const ACCESS: &str = "access";

/// Build the applier for one default config.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for an empty or unrecognized config, an
/// unknown function, or a literal that does not fit the field.
pub fn build_default(catalog: &Catalog, field: &FieldInfo, config: &str) -> Result<ApplierRef> {
    let config = config.trim();
    let (bypass, rest) = match config.strip_prefix('?') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, config),
    };

    let applier: ApplierRef = if let Some(literal) = rest.strip_prefix('=') {
        match catalog.constant(literal) {
            Some(constant) => Arc::new(ValueApplier::from_value(constant.clone(), field)?),
            None => Arc::new(ValueApplier::parse(literal, field)?),
        }
    } else if rest == "$" {
        Arc::new(StructApplier::new(StructSource::Whole))
    } else if let Some(path) = rest.strip_prefix("$.") {
        let source = match path.strip_suffix("()") {
            Some(method) => StructSource::Method(method.to_owned()),
            None => StructSource::Field(path.to_owned()),
        };
        if matches!(&source, StructSource::Field(p) | StructSource::Method(p) if p.is_empty()) {
            return Err(Error::config(format!("default \"{config}\": missing source name")));
        }
        Arc::new(StructApplier::new(source))
    } else if rest.starts_with(crate::FUNCTION_SIGIL) {
        let function = catalog
            .function(rest)
            .ok_or_else(|| Error::config(format!("default \"{config}\": unknown field function \"{rest}\"")))?;
        Arc::new(FunctionApplier::new(rest, Arc::clone(function)))
    } else if rest.is_empty() {
        return Err(Error::config("empty default"));
    } else {
        return Err(Error::config(format!(
            "default \"{config}\" must start with '=' or '$'"
        )));
    };

    Ok(if bypass {
        Arc::new(BypassIfSet::new(applier))
    } else {
        applier
    })
}

fn scoped_default(catalog: &Catalog, field: &FieldInfo, directive: &str) -> Result<Option<ApplierRef>> {
    parse_scoped(directive, catalog.aliases(), &mut |_, config| {
        build_default(catalog, field, config).map(Some)
    })
}

/// Fills fields from their `default` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTool;

impl Tool for DefaultTool {
    fn name(&self) -> &str {
        DEFAULT
    }

    fn applier(&self, catalog: &Catalog, field: &FieldInfo, directive: Option<&str>) -> Result<Option<ApplierRef>> {
        match directive {
            Some(directive) => scoped_default(catalog, field, directive),
            None => Ok(None),
        }
    }
}

/// Fills the id field from the first segment of its `id` tag.
///
/// The second segment, the external name, is read during introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdTool;

impl Tool for IdTool {
    fn name(&self) -> &str {
        ID
    }

    fn applier(&self, catalog: &Catalog, field: &FieldInfo, directive: Option<&str>) -> Result<Option<ApplierRef>> {
        let Some(directive) = directive else {
            return Ok(None);
        };
        let config = directive.split(',').next().unwrap_or_default().trim();
        if config.is_empty() {
            return Ok(None);
        }
        scoped_default(catalog, field, config)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════════

/// Checks fields against their `validate` tag.
///
/// Fields inside named nested records are not validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateTool;

impl Tool for ValidateTool {
    fn name(&self) -> &str {
        VALIDATE
    }

    fn applier(&self, catalog: &Catalog, field: &FieldInfo, directive: Option<&str>) -> Result<Option<ApplierRef>> {
        let Some(tag) = directive else {
            return Ok(None);
        };
        if field.nested {
            return Ok(None);
        }
        let groups = catalog.validation(tag)?;
        let mut by_scope: HashMap<String, ApplierRef> = HashMap::new();
        for (scope, constraint) in groups.iter() {
            let scope = catalog.aliases().resolve(scope).to_owned();
            by_scope.insert(scope, Arc::new(ConstraintApplier::new(Arc::clone(constraint))));
        }
        Ok(ScopedApplier::build(by_scope, catalog.aliases()))
    }
}

/// Fails with [`Error::Validation`] when the field does not satisfy a constraint.
#[derive(Debug, Clone)]
pub struct ConstraintApplier {
    constraint: ConstraintRef,
}

impl ConstraintApplier {
    /// Check fields against `constraint`.
    #[must_use]
    pub fn new(constraint: ConstraintRef) -> Self {
        Self { constraint }
    }
}

impl Applier for ConstraintApplier {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()> {
        let value = field
            .read(&*record)
            .ok_or_else(|| Error::unprocessable(&field.location, "field not found"))?;
        if self.constraint.test(&value) {
            Ok(())
        } else {
            Err(Error::Validation {
                location: field.location.clone(),
                scope: ctx.scope().to_owned(),
                constraint: self.constraint.details(),
            })
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access
// ═══════════════════════════════════════════════════════════════════════════════

/// Enforces `access` tags against the context's principal.
///
/// With a write kind in the context, fields the principal may not write are
/// reset to zero. With a read kind, readable fields are copied into the
/// context's projection under their external name. Provided fields are
/// never reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessTool;

impl Tool for AccessTool {
    fn name(&self) -> &str {
        ACCESS
    }

    fn applier(&self, catalog: &Catalog, field: &FieldInfo, directive: Option<&str>) -> Result<Option<ApplierRef>> {
        if directive.is_none() {
            return Ok(None);
        }
        let Some(mask) = field.access else {
            return Ok(None);
        };
        Ok(Some(Arc::new(AccessApplier {
            principals: Arc::clone(catalog.principals()),
            mask,
            provided: field.provided,
        })))
    }
}

struct AccessApplier {
    principals: Arc<AccessPrincipals>,
    mask: AccessMask,
    provided: bool,
}

impl Applier for AccessApplier {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()> {
        let kind = ctx.access();
        if kind.is_write() {
            if self.provided || self.principals.allows(self.mask, ctx.principal(), kind) {
                return Ok(());
            }
            return store(record, field, field.zero.clone());
        }
        if kind.is_read() && self.principals.allows(self.mask, ctx.principal(), kind) {
            let value = field
                .read(&*record)
                .ok_or_else(|| Error::unprocessable(&field.location, "field not found"))?;
            ctx.project(field.external_name.clone(), value);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Framework functions
// ═══════════════════════════════════════════════════════════════════════════════

/// `$_seq`: the next value of the context's `seq` counter.
pub(crate) fn sequence(_: &dyn Record, _: &FieldInfo, ctx: &mut ToolContext) -> Result<Value> {
    Ok(Value::Int(ctx.increment("seq", 1)))
}

/// `$_scope`: the active scope name.
pub(crate) fn scope_name(_: &dyn Record, _: &FieldInfo, ctx: &mut ToolContext) -> Result<Value> {
    Ok(Value::from(ctx.scope()))
}
