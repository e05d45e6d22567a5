//! `Tool` and `Applier`: the plugin contract.
//!
//! A [`Tool`] turns a field's directive (usually a tag value) into at most
//! one [`Applier`] when a record type is introspected. Appliers are bound to
//! their field and run against live records during
//! [`Catalog::apply_tools`](crate::Catalog::apply_tools).
//!
//! Custom tools are registered against a tag key with
//! [`CatalogBuilder::tag_to_field_tool_associations`](crate::CatalogBuilder::tag_to_field_tool_associations).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use fieldtools::{Applier, ApplierRef, Catalog, FieldInfo, Record, Result, Tool, ToolContext, Value};
//!
//! /// Upper-cases text fields tagged `upper = "yes"`.
//! #[derive(Debug)]
//! struct Upper;
//!
//! impl Tool for Upper {
//!     fn name(&self) -> &str {
//!         "upper"
//!     }
//!
//!     fn applier(&self, _: &Catalog, _: &FieldInfo, directive: Option<&str>) -> Result<Option<ApplierRef>> {
//!         if directive != Some("yes") {
//!             return Ok(None);
//!         }
//!         let applier = |record: &mut dyn Record, field: &FieldInfo, _: &mut ToolContext| -> Result<()> {
//!             if let Some(Value::Text(s)) = fieldtools::record::read_path(record, &field.location) {
//!                 fieldtools::record::write_path(record, &field.location, Value::from(s.to_uppercase()))
//!                     .map_err(|e| fieldtools::Error::unprocessable(&field.location, e.to_string()))?;
//!             }
//!             Ok(())
//!         };
//!         Ok(Some(Arc::new(applier)))
//!     }
//! }
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::context::ToolContext;
use crate::error::Result;
use crate::fields::FieldInfo;
use crate::record::Record;

/// A unit of behavior bound to one field.
///
/// Implementations must be `Send + Sync`: appliers live in cached field tables
/// shared across threads.
pub trait Applier: Send + Sync {
    /// Run against `record`.
    ///
    /// # Errors
    ///
    /// Returns an error when the field cannot be processed or fails a check.
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()>;
}

impl<F> Applier for F
where
    F: Fn(&mut dyn Record, &FieldInfo, &mut ToolContext) -> Result<()> + Send + Sync,
{
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()> {
        self(record, field, ctx)
    }
}

/// Shared handle to an applier.
pub type ApplierRef = Arc<dyn Applier>;

/// A named factory of appliers.
pub trait Tool: Send + Sync + Debug {
    /// Stable name. Field tables bucket appliers under it.
    fn name(&self) -> &str;

    /// Build the applier for `field`.
    ///
    /// `directive` is the field's tag value for this tool's key, or `None`
    /// when the field has no such tag. Returning `Ok(None)` means the tool
    /// does not apply to the field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) for a
    /// malformed directive. Introspection collects these for every field.
    fn applier(
        &self,
        catalog: &Catalog,
        field: &FieldInfo,
        directive: Option<&str>,
    ) -> Result<Option<ApplierRef>>;
}

/// Shared handle to a tool.
pub type ToolRef = Arc<dyn Tool>;
