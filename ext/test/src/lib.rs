//! fieldtools-test: reference record domain for conformance testing
//!
//! Provides a small set of tagged records, the field functions they use, and
//! a custom tool. This is the reference extension that demonstrates how to
//! build on fieldtools.
//!
//! # Example
//!
//! ```
//! use fieldtools::ToolContext;
//! use fieldtools_test::prelude::*;
//!
//! let catalog = fieldtools_test::catalog().unwrap();
//! let mut widget = Widget::default();
//! catalog.apply_defaults(&mut widget, &mut ToolContext::new()).unwrap();
//! assert_eq!(widget.color, "orange");
//! assert_eq!(widget.label, "123");
//! assert_eq!(widget.size, 123);
//! ```

use std::sync::Arc;

use fieldtools::appliers::store;
use fieldtools::prelude::*;
use fieldtools::{ApplierRef, Result, ToolRef};

#[cfg(feature = "fixtures")]
pub mod fixture;

/// Custom principals registered by [`register`], in bit order.
pub const PRINCIPALS: [&str; 3] = ["owner", "support", "billing"];

/// Tag key of [`TrimTool`].
pub const TRIM: &str = "trim";

// ═══════════════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════════════

record! {
    /// One field per default flavour: function, text literal, integer literal.
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Widget {
        pub color: String [default = "$color"],
        pub label: String [default = "=123"],
        pub size: i64 [default = "=123"],
    }
}

record! {
    /// Postal address, nested by name inside [`Account`].
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Address {
        pub street: String [validate = "required,minlen(1)"],
        pub city: String [default = "?=Springfield"],
    }
}

record! {
    /// Audit stamp, embedded in [`Account`].
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Audit {
        pub created_by: String [json = "createdBy", default = "create:$actor", access = "r-r-r-"],
        pub revision: i64 [default = "$_seq", access = "r-r-r-"],
    }
}

record! {
    /// A customer account exercising every default tool.
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Account {
        pub id: String [id = "?$_seq,accountId"],
        pub email: String [
            json = "email,omitempty",
            validate = "required,regexp('^[^@ ]+@[^@ ]+$')",
            access = "rwr-r-",
            trim = "both"
        ],
        pub plan: String [default = "create:=free;*:?=free", validate = "oneof(free,pro)", access = "rwr---"],
        pub balance: i64 [validate = "int(>=,0)", access = "r-r-rw"],
        pub secret: String [access = "rw----"],
        pub owner: String [access = "--r-r-,p"],
        pub address: Address => nested,
        pub audit: Audit => embedded,
        note: String,
    }
    methods { display_name }
}

impl Account {
    /// Local part of the email address.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.email.split('@').next().unwrap_or_default().to_owned()
    }

    /// Free-form note; not exported, so never tooled.
    #[must_use]
    pub fn note(&self) -> &str {
        &self.note
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════════════

/// `$color`: always `"orange"`.
///
/// # Errors
///
/// Never fails.
pub fn color(_: &dyn Record, _: &FieldInfo, _: &mut ToolContext) -> Result<Value> {
    Ok(Value::from("orange"))
}

/// `$actor`: the context's `actor` value, or `"system"`.
///
/// # Errors
///
/// Never fails.
pub fn actor(_: &dyn Record, _: &FieldInfo, ctx: &mut ToolContext) -> Result<Value> {
    Ok(ctx.get("actor").cloned().unwrap_or_else(|| Value::from("system")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Custom tool
// ═══════════════════════════════════════════════════════════════════════════════

/// Trims whitespace from text fields tagged `trim = "both" | "start" | "end"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimTool;

#[derive(Debug, Clone, Copy)]
enum Side {
    Both,
    Start,
    End,
}

impl Tool for TrimTool {
    fn name(&self) -> &str {
        TRIM
    }

    fn applier(&self, _: &Catalog, field: &FieldInfo, directive: Option<&str>) -> Result<Option<ApplierRef>> {
        let Some(directive) = directive else {
            return Ok(None);
        };
        if field.kind != FieldKind::Text {
            return Err(Error::config(format!("trim applies to text fields, not {}", field.kind)));
        }
        let side = match directive {
            "both" => Side::Both,
            "start" => Side::Start,
            "end" => Side::End,
            other => return Err(Error::config(format!("unknown trim side \"{other}\""))),
        };
        let applier = move |record: &mut dyn Record, field: &FieldInfo, _: &mut ToolContext| -> Result<()> {
            let Some(Value::Text(text)) = field.read(&*record) else {
                return Ok(());
            };
            let trimmed = match side {
                Side::Both => text.trim(),
                Side::Start => text.trim_start(),
                Side::End => text.trim_end(),
            };
            if trimmed.len() == text.len() {
                return Ok(());
            }
            store(record, field, Value::from(trimmed))
        };
        Ok(Some(Arc::new(applier)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════════════════════════════════════════

/// Register the reference domain: principals, functions, the `post` alias
/// for `create`, and [`TrimTool`].
///
/// # Errors
///
/// Returns [`Error::Configuration`] if `builder` already holds conflicting
/// registrations.
pub fn register(builder: CatalogBuilder) -> Result<CatalogBuilder> {
    Ok(builder
        .register_access_principals(PRINCIPALS)?
        .register_tool_function("$color", color)?
        .register_tool_function("$actor", actor)?
        .scope_alias("post", "create")?
        .tag_to_field_tool_associations([(TRIM, Some(Arc::new(TrimTool) as ToolRef))]))
}

/// A fresh catalog with the reference domain registered.
///
/// # Errors
///
/// See [`register`].
pub fn catalog() -> Result<Catalog> {
    Ok(register(CatalogBuilder::new())?.build())
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{Account, Address, Audit, TrimTool, Widget, PRINCIPALS, TRIM};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_table_shape() {
        let catalog = catalog().unwrap();
        let table = catalog.introspect::<Account>().unwrap();
        let locations: Vec<_> = table.fields().iter().map(|f| f.location.as_str()).collect();
        assert_eq!(
            locations,
            [
                "id",
                "email",
                "plan",
                "balance",
                "secret",
                "owner",
                "address.street",
                "address.city",
                "audit+created_by",
                "audit+revision",
            ]
        );
        assert_eq!(table.id_field().map(|f| f.external_name.as_str()), Some("accountId"));
        assert_eq!(table.bucket(TRIM).count(), 1);
        // nested fields are never validated
        assert!(table.bucket("validate").all(|(f, _)| !f.nested));
    }

    #[test]
    fn trim_tool_rejects_non_text() {
        record! {
            #[derive(Debug, Default)]
            pub struct Bad {
                pub n: i64 [trim = "both"],
            }
        }
        let err = catalog().unwrap().introspect::<Bad>().unwrap_err();
        assert_eq!(err.location(), Some("n"));
    }

    #[test]
    fn create_pass_fills_everything() {
        let catalog = catalog().unwrap();
        let mut account = Account {
            email: "  ada@example.com ".into(),
            ..Account::default()
        };
        let mut ctx = ToolContext::for_scope("post");
        ctx.set("actor", Value::from("ada"));
        catalog
            .apply_tools(&mut account, &mut ctx, &["id", "default", TRIM])
            .unwrap();
        catalog.validate(&mut account, &mut ctx).unwrap();

        assert_eq!(account.id, "1");
        assert_eq!(account.plan, "free");
        assert_eq!(account.email, "ada@example.com");
        assert_eq!(account.address.city, "Springfield");
        assert_eq!(account.audit.created_by, "ada");
        assert_eq!(account.audit.revision, 2);
        assert_eq!(account.display_name(), "ada");
        assert_eq!(account.note(), "");
    }
}
