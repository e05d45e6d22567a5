//! Scoped directives.
//!
//! A directive configures one field for one or more scopes:
//!
//! ```text
//! directive := segment (";" segment)*
//! segment   := [scope ":"] config
//! ```
//!
//! The scope prefix ends at the first unescaped `:` and is recognized only
//! when it looks like a scope name (letters, digits, `_`, `-` or `*`), so a
//! config such as `=http://host` needs no escaping. Omitting the scope means
//! the wildcard `*`. Duplicate scopes resolve to the last occurrence.
//!
//! A directive may be composed with a top-level `?` or `&` outside quotes and
//! parentheses. A `?` that starts a segment is part of the config, not an
//! operator. Each side is parsed as a directive of its own:
//!
//! - `left ? right`: apply `left`, then `right` only if the field is still zero.
//! - `left & right`: apply `left`, then always apply `right`.
//!
//! Literal `;`, `:`, `?` and `&` are written `\;`, `\:`, `\?` and `\&`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ToolContext;
use crate::error::{Error, ErrorBatch, Result};
use crate::fields::FieldInfo;
use crate::record::{read_path, Record};
use crate::tool::{Applier, ApplierRef};
use crate::WILDCARD_SCOPE;

/// Alternative names for scopes.
#[derive(Debug, Clone, Default)]
pub struct ScopeAliases {
    aliases: HashMap<String, String>,
}

impl ScopeAliases {
    /// No aliases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `alias` stand for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `alias` already names a different
    /// scope, or if either side is the wildcard.
    pub fn insert(&mut self, alias: impl Into<String>, scope: impl Into<String>) -> Result<()> {
        let alias = alias.into();
        let scope = scope.into();
        if alias == WILDCARD_SCOPE || scope == WILDCARD_SCOPE {
            return Err(Error::config("the wildcard scope cannot be aliased"));
        }
        if alias == scope {
            return Err(Error::config(format!("scope alias \"{alias}\" points to itself")));
        }
        match self.aliases.get(&alias) {
            Some(existing) if *existing != scope => Err(Error::config(format!(
                "scope alias \"{alias}\" already refers to \"{existing}\", cannot redefine it as \"{scope}\""
            ))),
            _ => {
                self.aliases.insert(alias, scope);
                Ok(())
            }
        }
    }

    /// The scope `name` stands for, or `name` itself.
    #[must_use]
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    /// Aliases that resolve to `scope`.
    pub fn aliases_of<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.aliases
            .iter()
            .filter(move |(_, target)| target.as_str() == scope)
            .map(|(alias, _)| alias.as_str())
    }

    /// Number of aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether no aliases are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Appliers
// ═══════════════════════════════════════════════════════════════════════════════

/// Selects an applier by the context's active scope, falling back to the
/// wildcard applier.
pub struct ScopedApplier {
    by_scope: HashMap<String, ApplierRef>,
    fallback: Option<ApplierRef>,
}

impl ScopedApplier {
    /// Wrap per-scope appliers. Aliases of each scope select the same
    /// applier. Returns the wildcard applier alone when it is the only one.
    #[must_use]
    pub fn build(mut by_scope: HashMap<String, ApplierRef>, aliases: &ScopeAliases) -> Option<ApplierRef> {
        let fallback = by_scope.remove(WILDCARD_SCOPE);
        if by_scope.is_empty() {
            return fallback;
        }
        let scopes: Vec<String> = by_scope.keys().cloned().collect();
        for scope in scopes {
            let Some(applier) = by_scope.get(&scope).cloned() else {
                continue;
            };
            for alias in aliases.aliases_of(&scope) {
                by_scope.entry(alias.to_owned()).or_insert_with(|| Arc::clone(&applier));
            }
        }
        Some(Arc::new(Self { by_scope, fallback }))
    }
}

impl Applier for ScopedApplier {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()> {
        match self.by_scope.get(ctx.scope()).or(self.fallback.as_ref()) {
            Some(applier) => applier.apply(record, field, ctx),
            None => Ok(()),
        }
    }
}

/// How a composite's right side is gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// `?`: right runs only if the field is zero after the left side.
    Fallback,
    /// `&`: right always runs after the left side.
    Then,
}

/// Two appliers run in sequence, with errors from both sides batched.
pub struct CompositeApplier {
    left: Option<ApplierRef>,
    right: Option<ApplierRef>,
    composition: Composition,
}

impl Applier for CompositeApplier {
    fn apply(&self, record: &mut dyn Record, field: &FieldInfo, ctx: &mut ToolContext) -> Result<()> {
        let mut errors = ErrorBatch::new();
        if let Some(left) = &self.left {
            errors.capture(left.apply(record, field, ctx));
        }
        let proceed = match self.composition {
            Composition::Then => true,
            Composition::Fallback => read_path(record, &field.location).map_or(true, |v| v.is_zero()),
        };
        if proceed {
            if let Some(right) = &self.right {
                errors.capture(right.apply(record, field, ctx));
            }
        }
        errors.into_result()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a scoped directive, asking `leaf` for the applier of each
/// `(scope, config)` pair.
///
/// Scope names are resolved through `aliases` before `leaf` sees them, and
/// configs are unescaped. `leaf` may return `Ok(None)` to skip a segment.
///
/// # Errors
///
/// Returns the first error from `leaf`, or [`Error::Configuration`] for an
/// empty side of a `?` / `&` composition.
///
/// # Example
///
/// ```
/// use fieldtools::scope::{parse_scoped, ScopeAliases};
///
/// let mut seen = Vec::new();
/// let applier = parse_scoped("create:+=10;*:+=5", &ScopeAliases::new(), &mut |scope, config| {
///     seen.push((scope.to_owned(), config.to_owned()));
///     Ok(None)
/// })
/// .unwrap();
/// assert!(applier.is_none());
/// assert_eq!(seen[0], ("create".to_owned(), "+=10".to_owned()));
/// assert_eq!(seen[1], ("*".to_owned(), "+=5".to_owned()));
/// ```
pub fn parse_scoped<F>(directive: &str, aliases: &ScopeAliases, leaf: &mut F) -> Result<Option<ApplierRef>>
where
    F: FnMut(&str, &str) -> Result<Option<ApplierRef>>,
{
    if let Some((index, op)) = find_operator(directive) {
        let (left, right) = (&directive[..index], &directive[index + 1..]);
        if left.trim().is_empty() || right.trim().is_empty() {
            return Err(Error::config(format!(
                "directive \"{directive}\": '{op}' needs a directive on both sides"
            )));
        }
        let left = parse_scoped(left, aliases, leaf)?;
        let right = parse_scoped(right, aliases, leaf)?;
        if left.is_none() && right.is_none() {
            return Ok(None);
        }
        let composition = if op == '?' {
            Composition::Fallback
        } else {
            Composition::Then
        };
        return Ok(Some(Arc::new(CompositeApplier {
            left,
            right,
            composition,
        })));
    }

    let mut by_scope: HashMap<String, ApplierRef> = HashMap::new();
    for segment in split_unescaped(directive, ';') {
        let (scope, config) = split_scope(segment);
        let scope = aliases.resolve(scope).to_owned();
        match leaf(&scope, &unescape(config))? {
            Some(applier) => {
                by_scope.insert(scope, applier);
            }
            None => {
                by_scope.remove(&scope);
            }
        }
    }
    Ok(ScopedApplier::build(by_scope, aliases))
}

/// First top-level composition operator and its byte index.
fn find_operator(directive: &str) -> Option<(usize, char)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut segment_start = true;
    for (index, c) in directive.char_indices() {
        if escaped {
            escaped = false;
            segment_start = false;
            continue;
        }
        match (c, quote) {
            ('\\', _) => escaped = true,
            (c, Some(q)) if c == q => quote = None,
            (_, Some(_)) => {}
            ('\'' | '"', None) => quote = Some(c),
            ('(', None) => depth += 1,
            (')', None) => depth = depth.saturating_sub(1),
            ('?', None) if segment_start => {}
            ('?' | '&', None) if depth == 0 && index > 0 => return Some((index, c)),
            _ => {}
        }
        if !c.is_whitespace() {
            segment_start = matches!(c, ':' | ';') && quote.is_none();
        }
    }
    None
}

/// Split on `separator` where it is not escaped.
fn split_unescaped(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&text[start..index]);
            start = index + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Separate a `scope:` prefix from its config.
fn split_scope(segment: &str) -> (&str, &str) {
    let mut escaped = false;
    for (index, c) in segment.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ':' => {
                let candidate = segment[..index].trim();
                let is_scope = !candidate.is_empty()
                    && candidate
                        .chars()
                        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '*'));
                return if is_scope {
                    (candidate, &segment[index + 1..])
                } else {
                    (WILDCARD_SCOPE, segment)
                };
            }
            _ => {}
        }
    }
    (WILDCARD_SCOPE, segment)
}

/// Remove directive-level escapes. Other backslashes are kept.
fn unescape(config: &str) -> String {
    let mut out = String::with_capacity(config.len());
    let mut chars = config.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ';' | ':' | '?' | '&' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
