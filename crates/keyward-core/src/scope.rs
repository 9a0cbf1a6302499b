//! User scopes: which kinds of method a user may call at all.
//!
//! Scopes are coarse, per-user grants checked before any object-level
//! authorization. A user holding `Read` still needs membership in an
//! object's Access Object to read that object.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One grantable scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Read,
    Create,
    Update,
    Delete,
    Index,
    ObjectPermissions,
    UserManagement,
}

impl Scope {
    pub const ALL: [Scope; 7] = [
        Scope::Read,
        Scope::Create,
        Scope::Update,
        Scope::Delete,
        Scope::Index,
        Scope::ObjectPermissions,
        Scope::UserManagement,
    ];

    const fn bit(self) -> u64 {
        match self {
            Scope::Read => 1 << 0,
            Scope::Create => 1 << 1,
            Scope::Update => 1 << 2,
            Scope::Delete => 1 << 3,
            Scope::Index => 1 << 4,
            Scope::ObjectPermissions => 1 << 5,
            Scope::UserManagement => 1 << 6,
        }
    }

    /// Single-letter shorthand: `r c u d i o m`.
    pub const fn shorthand(self) -> char {
        match self {
            Scope::Read => 'r',
            Scope::Create => 'c',
            Scope::Update => 'u',
            Scope::Delete => 'd',
            Scope::Index => 'i',
            Scope::ObjectPermissions => 'o',
            Scope::UserManagement => 'm',
        }
    }

    fn from_shorthand(c: char) -> Option<Self> {
        Scope::ALL.into_iter().find(|s| s.shorthand() == c)
    }
}

/// A set of [`Scope`]s, stored as a bitmask.
///
/// Encodes as the bare integer; decoding rejects unknown bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ScopeSet(u64);

const ALL_BITS: u64 = (1 << Scope::ALL.len()) - 1;

impl ScopeSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(ALL_BITS)
    }

    /// Build from raw bits. `None` if any bit is outside the known scopes.
    pub const fn from_bits(bits: u64) -> Option<Self> {
        if bits & !ALL_BITS == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn contains(&self, scope: Scope) -> bool {
        self.0 & scope.bit() != 0
    }

    pub fn insert(&mut self, scope: Scope) {
        self.0 |= scope.bit();
    }

    #[must_use]
    pub fn with(mut self, scope: Scope) -> Self {
        self.insert(scope);
        self
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        Scope::ALL.into_iter().filter(|s| self.contains(*s))
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ScopeSet::empty(), |set, scope| set.with(scope))
    }
}

impl From<ScopeSet> for u64 {
    fn from(set: ScopeSet) -> u64 {
        set.0
    }
}

impl TryFrom<u64> for ScopeSet {
    type Error = CoreError;

    fn try_from(bits: u64) -> Result<Self, Self::Error> {
        ScopeSet::from_bits(bits)
            .ok_or_else(|| CoreError::DecodingError(format!("unknown scope bits {bits:#x}")))
    }
}

/// Shorthand letters, e.g. `rcio`.
impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for scope in self.iter() {
            write!(f, "{}", scope.shorthand())?;
        }
        Ok(())
    }
}

impl fmt::Debug for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeSet({self})")
    }
}

/// Parse shorthand letters. The empty string and `-` are the empty set.
impl FromStr for ScopeSet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            return Ok(ScopeSet::empty());
        }
        s.chars()
            .map(|c| {
                Scope::from_shorthand(c)
                    .ok_or_else(|| CoreError::DecodingError(format!("unknown scope {c:?}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_only_inserted() {
        let set = ScopeSet::empty().with(Scope::Read).with(Scope::Index);
        assert!(set.contains(Scope::Read));
        assert!(set.contains(Scope::Index));
        assert!(!set.contains(Scope::Create));
        assert!(!set.contains(Scope::UserManagement));
    }

    #[test]
    fn test_all_holds_every_scope() {
        for scope in Scope::ALL {
            assert!(ScopeSet::all().contains(scope));
        }
        assert_eq!(ScopeSet::all().bits(), 0x7f);
    }

    #[test]
    fn test_unknown_bits_rejected() {
        assert!(ScopeSet::from_bits(1 << 7).is_none());
        assert!(ScopeSet::try_from(0x80u64).is_err());
        assert_eq!(
            ScopeSet::from_bits(0x21),
            Some(ScopeSet::empty().with(Scope::Read).with(Scope::ObjectPermissions))
        );
    }

    #[test]
    fn test_shorthand_roundtrip() {
        let set: ScopeSet = "mri".parse().unwrap();
        assert_eq!(set.to_string(), "rim");
        assert_eq!(ScopeSet::all().to_string(), "rcudiom");
        assert_eq!("-".parse::<ScopeSet>().unwrap(), ScopeSet::empty());
        assert!("rx".parse::<ScopeSet>().is_err());
    }

    #[test]
    fn test_cbor_is_bare_integer() {
        let mut buf = Vec::new();
        ciborium::into_writer(&ScopeSet::all(), &mut buf).unwrap();
        // CBOR unsigned 0x7f: major type 0, one-byte argument.
        assert_eq!(buf, [0x18, 0x7f]);

        let bad = [0x19, 0x01, 0x00];
        assert!(ciborium::from_reader::<ScopeSet, _>(&bad[..]).is_err());
    }
}
