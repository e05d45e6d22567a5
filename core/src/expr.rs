//! Constraint expression parser.
//!
//! Parses the validation mini-language into [`ConstraintRef`]s:
//!
//! ```text
//! validateTag  := group (";" group)*
//! group        := [scope ":"] exprList
//! exprList     := term ("," term)*
//! term         := name
//!               | ("and" | "or" | "not") "(" [exprList] ")"
//!               | name "(" [arg ("," arg)*] ")"
//! arg          := quoted | raw
//! ```
//!
//! A list of terms is an implicit `and`. `not(a, b)` negates `and(a, b)`.
//!
//! Arguments are raw text. Quoted arguments (`'...'` or `"..."`) are taken
//! verbatim except for an escaped closing quote. Outside quotes, `\,` `\(`
//! `\)` `\;` `\\` and escaped quotes stand for the literal character, and any
//! other backslash sequence is kept as written so regular expressions survive.
//! Unquoted parentheses nest.
//!
//! Every malformed expression is a [`Error::Configuration`] naming the
//! remaining fragment where parsing stopped.
//!
//! # Example
//!
//! ```
//! use fieldtools::{Value, Constraint};
//! use fieldtools::expr::parse_constraint;
//!
//! let c = parse_constraint("required,len(1,3),or(startswith(a),endswith(z))").unwrap();
//! assert!(c.test(&Value::from("ab")));
//! assert!(c.test(&Value::from("xz")));
//! assert!(!c.test(&Value::from("xy")));
//! assert!(!c.test(&Value::from("abcd")));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::constraint::{
    Base64, Compare, ConstraintRef, Empty, EndsWith, Equals, FloatCompare, IntCompare, Length,
    MaxLength, MinLength, Nil, NotNil, OneOf, Regexp, Required, StartsWith, TypeOf, UintCompare,
};
use crate::error::{Error, Result};
use crate::logic;
use crate::value::Value;
use crate::{FUNCTION_SIGIL, WILDCARD_SCOPE};

/// Zero-argument constraints, resolved before anything else.
pub const SHORTCUTS: &[&str] = &["required", "empty", "nil", "notnil", "base64"];

/// Logical combinators.
pub const LOGICAL: &[&str] = &["and", "or", "not"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Int,
    Uint,
    Float,
    Text,
    Value,
    Compare,
}

/// Parameter list of a parameterized constraint. A variadic signature repeats
/// its last parameter zero or more times.
struct Signature {
    name: &'static str,
    params: &'static [ParamKind],
    variadic: bool,
}

const SIGNATURES: &[Signature] = &[
    Signature { name: "len", params: &[ParamKind::Uint, ParamKind::Uint], variadic: false },
    Signature { name: "minlen", params: &[ParamKind::Uint], variadic: false },
    Signature { name: "maxlen", params: &[ParamKind::Uint], variadic: false },
    Signature { name: "between", params: &[ParamKind::Int, ParamKind::Int], variadic: false },
    Signature { name: "ubetween", params: &[ParamKind::Uint, ParamKind::Uint], variadic: false },
    Signature { name: "fbetween", params: &[ParamKind::Float, ParamKind::Float], variadic: false },
    Signature { name: "min", params: &[ParamKind::Int], variadic: false },
    Signature { name: "max", params: &[ParamKind::Int], variadic: false },
    Signature { name: "int", params: &[ParamKind::Compare, ParamKind::Int], variadic: false },
    Signature { name: "uint", params: &[ParamKind::Compare, ParamKind::Uint], variadic: false },
    Signature { name: "float", params: &[ParamKind::Compare, ParamKind::Float], variadic: false },
    Signature { name: "startswith", params: &[ParamKind::Text], variadic: false },
    Signature { name: "endswith", params: &[ParamKind::Text], variadic: false },
    Signature { name: "regexp", params: &[ParamKind::Text], variadic: false },
    Signature { name: "oneof", params: &[ParamKind::Value], variadic: true },
    Signature { name: "typeof", params: &[ParamKind::Text], variadic: true },
    Signature { name: "equals", params: &[ParamKind::Value], variadic: false },
];

/// Names of every built-in term, for diagnostics and the CLI.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    SHORTCUTS
        .iter()
        .copied()
        .chain(LOGICAL.iter().copied())
        .chain(SIGNATURES.iter().map(|s| s.name))
}

#[derive(Debug, Clone)]
enum Arg {
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Value(Value),
    Compare(Compare),
}

#[derive(Debug, Clone)]
struct RawArg {
    text: String,
    quoted: bool,
}

/// Parser for constraint expressions, with optional named constraints
/// referenced as `$name` terms.
#[derive(Debug, Clone, Default)]
pub struct ConstraintParser {
    named: HashMap<String, ConstraintRef>,
}

impl ConstraintParser {
    /// A parser that only knows the built-in constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `constraint` available as the term `$name`.
    ///
    /// The sigil is added when `name` does not carry one.
    pub fn register(&mut self, name: &str, constraint: ConstraintRef) {
        self.named.insert(sigiled(name), constraint);
    }

    /// Whether a `$name` term is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.named.contains_key(&sigiled(name))
    }

    /// Parse one expression list into a single constraint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for any malformed input, including a
    /// scope prefix or `;` (use [`ConstraintParser::parse_tag`] for those).
    pub fn parse(&self, expression: &str) -> Result<ConstraintRef> {
        let mut cursor = Cursor::new(expression);
        let terms = self.parse_list(&mut cursor, None)?;
        if let Some(c) = cursor.peek() {
            return Err(cursor.error(&format!("unexpected '{c}'")));
        }
        Ok(logic::and(terms))
    }

    /// Parse a validation tag into `(scope, constraint)` groups in order.
    ///
    /// Groups without a scope prefix belong to the wildcard scope `*`.
    /// An empty tag yields no groups.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for any malformed group.
    pub fn parse_tag(&self, tag: &str) -> Result<Vec<(String, ConstraintRef)>> {
        let mut cursor = Cursor::new(tag);
        let mut groups = Vec::new();
        cursor.skip_ws();
        if cursor.at_end() {
            return Ok(groups);
        }
        loop {
            let scope = cursor.scope_prefix().unwrap_or_else(|| WILDCARD_SCOPE.to_owned());
            let terms = self.parse_list(&mut cursor, None)?;
            groups.push((scope, logic::and(terms)));
            match cursor.bump() {
                None => break,
                Some(';') => {}
                Some(c) => return Err(cursor.error(&format!("unexpected '{c}'"))),
            }
        }
        Ok(groups)
    }

    /// Parse terms until the end of input, a top-level `;`, or `closing`.
    /// Neither terminator is consumed.
    fn parse_list(&self, cursor: &mut Cursor<'_>, closing: Option<char>) -> Result<Vec<ConstraintRef>> {
        let mut terms = Vec::new();
        cursor.skip_ws();
        if closing.is_some() && cursor.peek() == closing {
            return Ok(terms);
        }
        if cursor.at_end() || cursor.peek() == Some(';') {
            return Err(cursor.error("empty expression"));
        }
        loop {
            terms.push(self.parse_term(cursor)?);
            cursor.skip_ws();
            match cursor.peek() {
                Some(',') => {
                    cursor.bump();
                    cursor.skip_ws();
                    if cursor.at_end() || matches!(cursor.peek(), Some(';')) || cursor.peek() == closing {
                        return Err(cursor.error("trailing ','"));
                    }
                }
                c if c == closing && closing.is_some() => return Ok(terms),
                None if closing.is_some() => return Err(cursor.error("unbalanced parentheses")),
                None => return Ok(terms),
                Some(';') if closing.is_none() => return Ok(terms),
                Some(c) => return Err(cursor.error(&format!("unexpected '{c}'"))),
            }
        }
    }

    fn parse_term(&self, cursor: &mut Cursor<'_>) -> Result<ConstraintRef> {
        let name = cursor.take_name();
        if name.is_empty() {
            return Err(cursor.error("expected a constraint name"));
        }
        cursor.skip_ws();
        if cursor.peek() != Some('(') {
            return self.build(&name, Vec::new(), cursor);
        }
        cursor.bump();

        if LOGICAL.contains(&name.as_str()) {
            let operands = self.parse_list(cursor, Some(')'))?;
            if cursor.bump() != Some(')') {
                return Err(cursor.error("unbalanced parentheses"));
            }
            return Ok(match name.as_str() {
                "and" => logic::and(operands),
                "or" => logic::or(operands),
                _ => logic::not(logic::and(operands)),
            });
        }

        let args = cursor.raw_args()?;
        self.build(&name, args, cursor)
    }

    fn build(&self, name: &str, args: Vec<RawArg>, cursor: &Cursor<'_>) -> Result<ConstraintRef> {
        let shortcut: Option<ConstraintRef> = match name {
            "required" => Some(Arc::new(Required)),
            "empty" => Some(Arc::new(Empty)),
            "nil" => Some(Arc::new(Nil)),
            "notnil" => Some(Arc::new(NotNil)),
            "base64" => Some(Arc::new(Base64)),
            _ => None,
        };
        if let Some(constraint) = shortcut {
            return if args.is_empty() {
                Ok(constraint)
            } else {
                Err(cursor.error(&format!("'{name}' takes no arguments")))
            };
        }

        if name.starts_with(FUNCTION_SIGIL) {
            let constraint = self
                .named
                .get(name)
                .ok_or_else(|| cursor.error(&format!("unknown constraint '{name}'")))?;
            return if args.is_empty() {
                Ok(Arc::clone(constraint))
            } else {
                Err(cursor.error(&format!("'{name}' takes no arguments")))
            };
        }

        let signature = SIGNATURES
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| cursor.error(&format!("unknown constraint '{name}'")))?;
        let args = convert_args(signature, args).map_err(|message| cursor.error(&message))?;
        construct(name, args).map_err(|e| match e {
            Error::Configuration { message } => cursor.error(&message),
            other => other,
        })
    }
}

fn sigiled(name: &str) -> String {
    if name.starts_with(FUNCTION_SIGIL) {
        name.to_owned()
    } else {
        format!("{FUNCTION_SIGIL}{name}")
    }
}

fn convert_args(signature: &Signature, args: Vec<RawArg>) -> std::result::Result<Vec<Arg>, String> {
    let fixed = signature.params.len();
    let arity_ok = if signature.variadic {
        args.len() + 1 >= fixed
    } else {
        args.len() == fixed
    };
    if !arity_ok {
        let expected = if signature.variadic {
            format!("at least {}", fixed - 1)
        } else {
            fixed.to_string()
        };
        return Err(format!(
            "'{}' expects {expected} argument(s), got {}",
            signature.name,
            args.len()
        ));
    }

    args.into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let kind = signature.params[i.min(fixed - 1)];
            convert_arg(kind, raw)
                .map_err(|message| format!("argument {} of '{}': {message}", i + 1, signature.name))
        })
        .collect()
}

fn convert_arg(kind: ParamKind, raw: RawArg) -> std::result::Result<Arg, String> {
    let text = raw.text;
    match kind {
        ParamKind::Int => text
            .trim()
            .parse()
            .map(Arg::Int)
            .map_err(|_| format!("\"{text}\" is not an int")),
        ParamKind::Uint => text
            .trim()
            .parse()
            .map(Arg::Uint)
            .map_err(|_| format!("\"{text}\" is not a uint")),
        ParamKind::Float => text
            .trim()
            .parse()
            .map(Arg::Float)
            .map_err(|_| format!("\"{text}\" is not a float")),
        ParamKind::Text => Ok(Arg::Text(text)),
        ParamKind::Value if raw.quoted => Ok(Arg::Value(Value::Text(text))),
        ParamKind::Value => Ok(Arg::Value(Value::infer(&text))),
        ParamKind::Compare => Compare::parse(text.trim())
            .map(Arg::Compare)
            .ok_or_else(|| format!("\"{text}\" is not a comparison operator")),
    }
}

fn to_usize(n: u64) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::config(format!("length {n} is out of range")))
}

fn construct(name: &str, args: Vec<Arg>) -> Result<ConstraintRef> {
    let constraint: ConstraintRef = match (name, args.as_slice()) {
        ("len", [Arg::Uint(min), Arg::Uint(max)]) => Length::new(to_usize(*min)?, to_usize(*max)?),
        ("minlen", [Arg::Uint(min)]) => Arc::new(MinLength(to_usize(*min)?)),
        ("maxlen", [Arg::Uint(max)]) => Arc::new(MaxLength(to_usize(*max)?)),
        ("between", [Arg::Int(lo), Arg::Int(hi)]) => logic::int_between(*lo, *hi),
        ("ubetween", [Arg::Uint(lo), Arg::Uint(hi)]) => logic::uint_between(*lo, *hi),
        ("fbetween", [Arg::Float(lo), Arg::Float(hi)]) => logic::float_between(*lo, *hi),
        ("min", [Arg::Int(bound)]) => Arc::new(IntCompare::new(Compare::Gte, *bound)),
        ("max", [Arg::Int(bound)]) => Arc::new(IntCompare::new(Compare::Lte, *bound)),
        ("int", [Arg::Compare(op), Arg::Int(bound)]) => Arc::new(IntCompare::new(*op, *bound)),
        ("uint", [Arg::Compare(op), Arg::Uint(bound)]) => Arc::new(UintCompare::new(*op, *bound)),
        ("float", [Arg::Compare(op), Arg::Float(bound)]) => Arc::new(FloatCompare::new(*op, *bound)),
        ("startswith", [Arg::Text(prefix)]) => Arc::new(StartsWith(prefix.clone())),
        ("endswith", [Arg::Text(suffix)]) => Arc::new(EndsWith(suffix.clone())),
        ("regexp", [Arg::Text(pattern)]) => Arc::new(Regexp::new(pattern)?),
        ("equals", [Arg::Value(value)]) => Arc::new(Equals(value.clone())),
        ("oneof", values) => Arc::new(OneOf(
            values
                .iter()
                .filter_map(|a| match a {
                    Arg::Value(v) => Some(v.clone()),
                    _ => None,
                })
                .collect(),
        )),
        ("typeof", names) => Arc::new(TypeOf(
            names
                .iter()
                .filter_map(|a| match a {
                    Arg::Text(t) => Some(t.trim().to_owned()),
                    _ => None,
                })
                .collect(),
        )),
        _ => return Err(Error::config(format!("cannot build '{name}' from {args:?}"))),
    };
    Ok(constraint)
}

/// Parse an expression using only the built-in constraints.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for any malformed expression.
pub fn parse_constraint(expression: &str) -> Result<ConstraintRef> {
    ConstraintParser::new().parse(expression)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cursor
// ═══════════════════════════════════════════════════════════════════════════════

struct Cursor<'s> {
    source: &'s str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn rest(&self) -> &'s str {
        self.chars
            .get(self.pos)
            .map_or("", |&(offset, _)| &self.source[offset..])
    }

    fn error(&self, what: &str) -> Error {
        let rest = self.rest();
        if rest.is_empty() {
            Error::config(format!("{what} at end of expression '{}'", self.source))
        } else {
            Error::config(format!("{what} at '{rest}' in expression '{}'", self.source))
        }
    }

    fn take_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == FUNCTION_SIGIL {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    /// Consume `scope:` if present. Scopes are identifiers, `-` and `*`.
    fn scope_prefix(&mut self) -> Option<String> {
        let start = self.pos;
        self.skip_ws();
        let mut scope = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '*') {
                scope.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        self.skip_ws();
        if !scope.is_empty() && self.peek() == Some(':') {
            self.pos += 1;
            Some(scope)
        } else {
            self.pos = start;
            None
        }
    }

    /// Read a call's arguments after its `(`, through the matching `)`.
    fn raw_args(&mut self) -> Result<Vec<RawArg>> {
        let mut args = Vec::new();
        let mut buf = String::new();
        let mut quoted: Option<String> = None;
        let mut depth = 0usize;

        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unbalanced parentheses"));
            };
            if quoted.is_some() && !matches!(c, ',' | ')') && !c.is_whitespace() {
                return Err(self.error("unexpected text after quoted argument"));
            }
            match c {
                '\\' => match self.bump() {
                    Some(e @ (',' | '(' | ')' | ';' | '\\' | '\'' | '"')) => buf.push(e),
                    Some(e) => {
                        buf.push('\\');
                        buf.push(e);
                    }
                    None => return Err(self.error("dangling escape")),
                },
                '\'' | '"' if buf.trim().is_empty() => {
                    quoted = Some(self.quoted(c)?);
                }
                '(' => {
                    depth += 1;
                    buf.push(c);
                }
                ')' if depth > 0 => {
                    depth -= 1;
                    buf.push(c);
                }
                ',' | ')' if depth == 0 => {
                    let arg = match quoted.take() {
                        Some(text) => Some(RawArg { text, quoted: true }),
                        None if c == ')' && args.is_empty() && buf.trim().is_empty() => None,
                        None => Some(RawArg {
                            text: buf.trim().to_owned(),
                            quoted: false,
                        }),
                    };
                    args.extend(arg);
                    buf.clear();
                    if c == ')' {
                        return Ok(args);
                    }
                }
                _ => buf.push(c),
            }
        }
    }

    /// Read quoted text after its opening `quote`, through the closing one.
    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated quote")),
                Some('\\') if self.peek() == Some(quote) => {
                    self.pos += 1;
                    text.push(quote);
                }
                Some(c) if c == quote => return Ok(text),
                Some(c) => text.push(c),
            }
        }
    }
}
