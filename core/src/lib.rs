//! fieldtools - tag-driven field tooling for plain Rust structs
//!
//! Record types declare their fields together with tags, much like struct
//! tags. A [`Catalog`] introspects each type once, asks every registered
//! [`Tool`] for an [`Applier`] per field, and caches the resulting
//! [`FieldTable`]. Apply passes then run the bound appliers against live
//! records: filling defaults, validating, and enforcing per-principal access.
//!
//! # Architecture
//!
//! - [`Value`]: erased field value (primitives + extensible `Custom` variant)
//! - [`Record`]: a struct that describes and accesses its own fields ([`record!`])
//! - [`Constraint`]: non-generic predicate over a `Value`, composable with `and`/`or`/`not`
//! - [`ConstraintParser`]: builds constraints from expressions such as `required,len(1,8)`
//! - [`parse_scoped`](scope::parse_scoped): per-scope directives (`create:=1;*:=2`)
//! - [`AccessPrincipals`]: 3 bits per principal, packed into an [`AccessMask`]
//! - [`Tool`] / [`Applier`]: the plugin contract; `default`, `id`, `validate`
//!   and `access` ship with the crate
//! - [`Catalog`]: immutable registry and process-lifetime caches
//!
//! # Key Design Insights
//!
//! 1. **Introspect once**: field tables are computed at most once per type,
//!    even when many threads meet a type for the first time together.
//!
//! 2. **Fail at introspection**: malformed tags, unknown functions and
//!    literals that do not fit their field are [`ErrorKind::Configuration`]
//!    errors reported for the whole type, before any record is touched.
//!
//! 3. **Report every field**: apply passes never stop at the first failing
//!    field. All errors come back as one batch.
//!
//! # Example
//!
//! ```
//! use fieldtools::prelude::*;
//!
//! record! {
//!     #[derive(Debug, Default)]
//!     pub struct Account {
//!         pub id: String [id = "$_seq,key"],
//!         pub plan: String [default = "create:=free;*:?=legacy", validate = "oneof(free,pro,legacy)"],
//!         pub email: String [validate = "required,regexp('^[^@]+@[^@]+$')", access = "rw--"],
//!         pub notes: String [access = "rwr-"],
//!     }
//! }
//!
//! let catalog = CatalogBuilder::new()
//!     .register_access_principals(["owner", "support"])
//!     .unwrap()
//!     .build();
//!
//! let mut account = Account {
//!     email: "ada@example.com".into(),
//!     ..Account::default()
//! };
//! let mut ctx = ToolContext::for_scope("create");
//! catalog.apply_defaults(&mut account, &mut ctx).unwrap();
//! catalog.validate(&mut account, &mut ctx).unwrap();
//! assert_eq!(account.id, "1");
//! assert_eq!(account.plan, "free");
//!
//! let visible = catalog
//!     .project_readable(&account, &Principal::from("support"))
//!     .unwrap();
//! assert!(visible.contains_key("notes"));
//! assert!(!visible.contains_key("email"));
//! ```

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

pub mod access;
pub mod appliers;
pub mod catalog;
pub mod config;
pub mod constraint;
pub mod context;
pub mod error;
pub mod expr;
pub mod fields;
pub mod logic;
pub mod record;
pub mod scope;
pub mod tool;
pub mod tools;
pub mod value;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

// Core types
pub use error::{Error, ErrorBatch, ErrorKind, Result};
pub use record::{Attribute, FieldType, Nesting, Record, SlotError};
pub use value::{CustomValue, FieldKind, Number, Value};

// Constraints
pub use constraint::{Constraint, ConstraintRef};
pub use expr::{parse_constraint, ConstraintParser};
pub use logic::{and, not, or};

// Access control
pub use access::{AccessKind, AccessMask, AccessPrincipals, AccessSpec, Principal};

// Tools
pub use appliers::FieldFunction;
pub use context::ToolContext;
pub use fields::{FieldInfo, FieldTable};
pub use scope::ScopeAliases;
pub use tool::{Applier, ApplierRef, Tool, ToolRef};

// Registry
pub use catalog::{global, install, Catalog, CatalogBuilder};
pub use config::CatalogConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use fieldtools::prelude::*;
/// ```
pub mod prelude {
    pub use crate::record;
    pub use crate::{
        // Access
        AccessKind,
        // Tools
        Applier,
        // Registry
        Catalog,
        CatalogBuilder,
        // Constraints
        Constraint,
        // Errors
        Error,
        ErrorKind,
        FieldInfo,
        // Records
        FieldKind,
        Principal,
        Record,
        Tool,
        ToolContext,
        Value,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of custom access principals.
///
/// Each principal takes three bits of an [`AccessMask`].
pub const MAX_PRINCIPALS: usize = 7;

/// Maximum length of the pairs part of an access tag.
///
/// Seven principals need at most 14 characters; one spare pair is tolerated.
pub const MAX_ACCESS_TAG_LEN: usize = 16;

/// Scope that applies when no more specific scope matches.
pub const WILDCARD_SCOPE: &str = "*";

/// Prefix of field function, constant and named constraint names.
pub const FUNCTION_SIGIL: char = '$';

/// Maximum length of a field function name, sigil included.
pub const MAX_FUNCTION_NAME_LEN: usize = 64;
