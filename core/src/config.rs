//! Declarative catalog configuration.
//!
//! Deserializes from JSON or YAML and seeds a builder via
//! [`CatalogBuilder::from_config`](crate::CatalogBuilder::from_config).
//! Functions and custom tools are code and must still be registered on the
//! builder.
//!
//! ```yaml
//! principals: [user, admin]
//! scope_aliases:
//!   post: create
//! constants:
//!   default_color: orange
//! constraints:
//!   code: "len(2,8),regexp('^[A-Z]+$')"
//! require_id: true
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Registrations for a [`Catalog`](crate::Catalog).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Custom access principals, in bit-position order.
    #[serde(default)]
    pub principals: Vec<String>,

    /// Scope aliases, alias to scope.
    #[serde(default)]
    pub scope_aliases: BTreeMap<String, String>,

    /// Named constants for `=$name` defaults. The `$` sigil is optional.
    #[serde(default)]
    pub constants: BTreeMap<String, serde_json::Value>,

    /// Named constraint expressions for `$name` terms, registered in name order.
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,

    /// Require exactly one id field per record type.
    #[serde(default)]
    pub require_id: bool,
}

impl CatalogConfig {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the document does not match.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::config(format!("catalog config: {e}")))
    }
}
