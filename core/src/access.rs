//! Field access control packed into a bitmask.
//!
//! Up to [`MAX_PRINCIPALS`] custom principals are registered in order. Each
//! receives a position, and each field's [`AccessMask`] reserves three bits
//! per position: read, create and update.
//!
//! Access tags list one character pair per registered principal, in
//! registration order. The first character is `r` (read) or `-`; the second is
//! `w` (create and update), `c`, `u` or `-`. Pairs may be separated by commas,
//! and a trailing `p` / `provided` segment marks the field as suppliable by the
//! caller even when writes are denied.
//!
//! ```
//! use fieldtools::access::{AccessKind, AccessPrincipals, Principal};
//!
//! let mut principals = AccessPrincipals::new();
//! principals.register(["admin", "user"]).unwrap();
//!
//! let spec = principals.parse_tag("rw,r-").unwrap();
//! let user = Principal::from("user");
//! assert!(principals.allows(spec.mask, &user, AccessKind::READ));
//! assert!(!principals.allows(spec.mask, &user, AccessKind::UPDATE));
//! assert!(principals.allows(spec.mask, &Principal::ReadWriteAll, AccessKind::UPDATE));
//! ```

use std::fmt;
use std::ops::BitOr;

use crate::error::{Error, Result};
use crate::{MAX_ACCESS_TAG_LEN, MAX_PRINCIPALS};

/// Names reserved for the universal principals.
pub const RESERVED_PRINCIPALS: [&str; 3] = ["ReadWriteAll", "ReadAll", "NoAccess"];

/// Who is asking for access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// Every kind of access, regardless of tags.
    ReadWriteAll,
    /// Any request that includes read, regardless of tags.
    ReadAll,
    /// No access at all.
    NoAccess,
    /// A registered custom principal. Unregistered names get no access.
    Named(String),
}

impl Principal {
    /// Name as written in configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ReadWriteAll => RESERVED_PRINCIPALS[0],
            Self::ReadAll => RESERVED_PRINCIPALS[1],
            Self::NoAccess => RESERVED_PRINCIPALS[2],
            Self::Named(name) => name,
        }
    }
}

impl From<&str> for Principal {
    fn from(name: &str) -> Self {
        match name {
            "ReadWriteAll" => Self::ReadWriteAll,
            "ReadAll" => Self::ReadAll,
            "NoAccess" | "" => Self::NoAccess,
            other => Self::Named(other.to_owned()),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of access kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessKind(u8);

impl AccessKind {
    /// No access.
    pub const NONE: Self = Self(0);
    /// Read the field.
    pub const READ: Self = Self(0b001);
    /// Set the field when creating.
    pub const CREATE: Self = Self(0b010);
    /// Set the field when updating.
    pub const UPDATE: Self = Self(0b100);
    /// Create and update.
    pub const WRITE: Self = Self(0b110);
    /// Everything.
    pub const ALL: Self = Self(0b111);

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every kind in `other` is in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the set includes read.
    #[must_use]
    pub const fn is_read(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    /// Whether the set includes create or update.
    #[must_use]
    pub const fn is_write(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    /// Parse `read`, `create`, `update`, `write` or `all`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::READ),
            "create" => Some(Self::CREATE),
            "update" => Some(Self::UPDATE),
            "write" => Some(Self::WRITE),
            "all" => Some(Self::ALL),
            _ => None,
        }
    }
}

impl BitOr for AccessKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for AccessKind {
    /// Renders as `rcu` with `-` for missing kinds.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |kind: Self, c: char| if self.contains(kind) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(Self::READ, 'r'),
            flag(Self::CREATE, 'c'),
            flag(Self::UPDATE, 'u')
        )
    }
}

/// Per-field access bits, three per principal position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessMask(u32);

impl AccessMask {
    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Access kinds granted to `position`.
    #[must_use]
    pub fn kinds(self, position: usize) -> AccessKind {
        if position >= MAX_PRINCIPALS {
            return AccessKind::NONE;
        }
        #[allow(clippy::cast_possible_truncation)]
        AccessKind(((self.0 >> (3 * position)) & 0b111) as u8)
    }

    /// Grant `kind` to `position`.
    #[must_use]
    pub fn with(self, position: usize, kind: AccessKind) -> Self {
        if position >= MAX_PRINCIPALS {
            return self;
        }
        Self(self.0 | (u32::from(kind.bits()) << (3 * position)))
    }
}

/// A parsed access tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessSpec {
    /// Granted bits.
    pub mask: AccessMask,
    /// Whether the caller may always supply the field.
    pub provided: bool,
}

/// Registered custom principals, in bit-position order.
#[derive(Debug, Clone, Default)]
pub struct AccessPrincipals {
    names: Vec<String>,
}

impl AccessPrincipals {
    /// No principals registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register principals, assigning positions in order.
    ///
    /// Re-registering a known name keeps its position. The call is atomic:
    /// on error nothing is registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for empty or reserved names, or when
    /// the total would exceed [`MAX_PRINCIPALS`].
    pub fn register<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if name.is_empty() {
                return Err(Error::config("access principal name cannot be empty"));
            }
            if RESERVED_PRINCIPALS.contains(&name.as_str()) {
                return Err(Error::config(format!(
                    "access principal \"{name}\" is reserved"
                )));
            }
            if !self.names.contains(&name) && !added.contains(&name) {
                added.push(name);
            }
        }
        if self.names.len() + added.len() > MAX_PRINCIPALS {
            return Err(Error::config(format!(
                "cannot register {} more access principal(s): {} already registered, at most {MAX_PRINCIPALS} allowed",
                added.len(),
                self.names.len()
            )));
        }
        self.names.extend(added);
        Ok(())
    }

    /// Bit position of a registered principal.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Registered names in position order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of registered principals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no principals are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Parse an access tag.
    ///
    /// Pairs beyond the registered principals are ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when a comma-separated segment splits
    /// a pair, when the pairs are longer than [`MAX_ACCESS_TAG_LEN`], or when
    /// a character falls outside the alphabet.
    pub fn parse_tag(&self, tag: &str) -> Result<AccessSpec> {
        let mut segments: Vec<&str> = tag.split(',').map(str::trim).collect();
        let provided = matches!(segments.last(), Some(&("p" | "provided")));
        if provided {
            segments.pop();
        }
        if let Some(segment) = segments.iter().find(|s| s.chars().count() % 2 != 0) {
            return Err(Error::config(format!(
                "access tag \"{tag}\": segment \"{segment}\" must hold whole pairs"
            )));
        }
        let pairs: String = segments.concat();
        let chars: Vec<char> = pairs.chars().collect();

        if chars.len() > MAX_ACCESS_TAG_LEN {
            return Err(Error::config(format!(
                "access tag \"{tag}\" must be at most {MAX_ACCESS_TAG_LEN} characters"
            )));
        }

        let mut mask = AccessMask::default();
        for (position, pair) in chars.chunks(2).enumerate() {
            let read = match pair[0] {
                'r' => AccessKind::READ,
                '-' => AccessKind::NONE,
                c => {
                    return Err(Error::config(format!(
                        "access tag \"{tag}\": invalid read character '{c}'"
                    )))
                }
            };
            let write = match pair[1] {
                'w' => AccessKind::WRITE,
                'c' => AccessKind::CREATE,
                'u' => AccessKind::UPDATE,
                '-' => AccessKind::NONE,
                c => {
                    return Err(Error::config(format!(
                        "access tag \"{tag}\": invalid write character '{c}'"
                    )))
                }
            };
            if position >= self.names.len() {
                tracing::warn!(tag, position, "access pair has no registered principal; ignored");
                continue;
            }
            mask = mask.with(position, read | write);
        }

        Ok(AccessSpec { mask, provided })
    }

    /// Whether `principal` holds every kind in `kind` under `mask`.
    #[must_use]
    pub fn allows(&self, mask: AccessMask, principal: &Principal, kind: AccessKind) -> bool {
        match principal {
            Principal::ReadWriteAll => true,
            Principal::ReadAll => kind.is_read(),
            Principal::NoAccess => false,
            Principal::Named(name) => self
                .position(name)
                .is_some_and(|position| mask.kinds(position).contains(kind)),
        }
    }

    /// Kinds granted to each registered principal under `mask`.
    #[must_use]
    pub fn describe(&self, mask: AccessMask) -> Vec<(&str, AccessKind)> {
        self.names
            .iter()
            .enumerate()
            .map(|(position, name)| (name.as_str(), mask.kinds(position)))
            .collect()
    }
}
