//! Package identities: idents, descriptors and locators.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::hash::{DescriptorHash, IdentHash, LocatorHash};

/// Reference slugs longer than this are truncated before the hash suffix.
const MAX_REFERENCE_SLUG: usize = 80;

/// Errors produced when parsing identity strings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The string is not a valid `name` or `@scope/name`.
    #[error("Invalid ident: {0}")]
    InvalidIdent(String),

    /// The string is not a valid `ident@range` pair.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The string is not a valid `ident@reference` pair.
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// The checksum is not a SHA256 hex digest.
    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),
}

/// A package name without version information.
///
/// The scope is stored without its leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
    scope: Option<String>,
    name: String,
    hash: IdentHash,
}

impl Ident {
    /// Build an ident from its parts. The scope must not include `@`.
    pub fn new(scope: Option<&str>, name: &str) -> Self {
        let scope = scope.map(str::to_string);
        let hash = IdentHash::compute(&[scope.as_deref().unwrap_or(""), name]);
        Self {
            scope,
            name: name.to_string(),
            hash,
        }
    }

    /// Parse `name` or `@scope/name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidIdent`] on an empty scope or name, or a
    /// stray `/` in an unscoped name.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidIdent(s.to_string());

        if let Some(rest) = s.strip_prefix('@') {
            let (scope, name) = rest.split_once('/').ok_or_else(invalid)?;
            if scope.is_empty() || name.is_empty() || name.contains('/') {
                return Err(invalid());
            }
            Ok(Self::new(Some(scope), name))
        } else {
            if s.is_empty() || s.contains('/') || s.contains('@') {
                return Err(invalid());
            }
            Ok(Self::new(None, s))
        }
    }

    /// Scope without the leading `@`.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Name without the scope.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable hash of scope and name.
    pub fn hash(&self) -> &IdentHash {
        &self.hash
    }

    /// Filesystem-safe rendering: `@scope-name` or `name`.
    pub fn slug(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{scope}-{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "@{scope}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Split `ident@selector` on the first `@` that is not the scope marker.
fn split_selector(s: &str) -> Option<(&str, &str)> {
    let at = s.get(1..)?.find('@')? + 1;
    let (ident, selector) = (&s[..at], &s[at + 1..]);
    if selector.is_empty() {
        return None;
    }
    Some((ident, selector))
}

/// A request for some package: an ident plus a range or protocol selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor {
    ident: Ident,
    range: String,
    hash: DescriptorHash,
}

impl Descriptor {
    /// Build a descriptor for `ident` with the given range.
    pub fn new(ident: Ident, range: impl Into<String>) -> Self {
        let range = range.into();
        let hash = DescriptorHash::compute(&[ident.hash().as_str(), &range]);
        Self { ident, range, hash }
    }

    /// Parse `name@range` or `@scope/name@range`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidDescriptor`] when the range is missing or
    /// the ident part is malformed.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidDescriptor(s.to_string());
        let (ident, range) = split_selector(s).ok_or_else(invalid)?;
        let ident = Ident::parse(ident).map_err(|_| invalid())?;
        Ok(Self::new(ident, range))
    }

    /// The requested package.
    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    /// The range or selector, including any protocol prefix.
    pub fn range(&self) -> &str {
        &self.range
    }

    /// Stable hash of ident and range.
    pub fn hash(&self) -> &DescriptorHash {
        &self.hash
    }

    /// Same ident, different range.
    pub fn with_range(&self, range: impl Into<String>) -> Self {
        Self::new(self.ident.clone(), range)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ident, self.range)
    }
}

/// Exactly one resolved package: an ident plus a concrete reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    ident: Ident,
    reference: String,
    hash: LocatorHash,
}

impl Locator {
    /// Build a locator for `ident` at the given reference.
    pub fn new(ident: Ident, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        let hash = LocatorHash::compute(&[ident.hash().as_str(), &reference]);
        Self {
            ident,
            reference,
            hash,
        }
    }

    /// Parse `name@reference` or `@scope/name@reference`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidLocator`] when the reference is missing or
    /// the ident part is malformed.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidLocator(s.to_string());
        let (ident, reference) = split_selector(s).ok_or_else(invalid)?;
        let ident = Ident::parse(ident).map_err(|_| invalid())?;
        Ok(Self::new(ident, reference))
    }

    /// The resolved package name.
    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    /// The concrete reference, including any protocol prefix.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Stable hash of ident and reference. Keys the fetch cache.
    pub fn hash(&self) -> &LocatorHash {
        &self.hash
    }

    /// The descriptor that requests exactly this locator.
    pub fn to_descriptor(&self) -> Descriptor {
        Descriptor::new(self.ident.clone(), self.reference.clone())
    }

    /// Consume the locator into the descriptor that requests exactly it.
    pub fn into_descriptor(self) -> Descriptor {
        Descriptor::new(self.ident, self.reference)
    }

    /// Cache-safe name: `<ident-slug>-<reference-slug>-<hash prefix>`.
    pub fn slug(&self) -> String {
        let reference: String = self
            .reference
            .chars()
            .map(|c| match c {
                ':' | '/' | '#' | '<' | '>' | '@' | '%' | '?' | '&' | '=' => '-',
                c if c.is_whitespace() => '-',
                c => c,
            })
            .take(MAX_REFERENCE_SLUG)
            .collect();
        format!("{}-{}-{}", self.ident.slug(), reference, self.hash.short(10))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ident, self.reference)
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl FromStr for $ty {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(Ident);
string_serde!(Descriptor);
string_serde!(Locator);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unscoped_and_scoped_idents() {
        let plain = Ident::parse("left-pad").unwrap();
        assert_eq!(plain.scope(), None);
        assert_eq!(plain.name(), "left-pad");
        assert_eq!(plain.slug(), "left-pad");

        let scoped = Ident::parse("@types/node").unwrap();
        assert_eq!(scoped.scope(), Some("types"));
        assert_eq!(scoped.name(), "node");
        assert_eq!(scoped.to_string(), "@types/node");
        assert_eq!(scoped.slug(), "@types-node");
    }

    #[test]
    fn reject_malformed_idents() {
        for bad in ["", "@", "@scope", "@/name", "@scope/", "a/b", "a@b"] {
            assert!(Ident::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn descriptor_splits_after_scope() {
        let desc = Descriptor::parse("@scope/pkg@npm:^1.0.0").unwrap();
        assert_eq!(desc.ident().to_string(), "@scope/pkg");
        assert_eq!(desc.range(), "npm:^1.0.0");
        assert_eq!(desc.to_string(), "@scope/pkg@npm:^1.0.0");
    }

    #[test]
    fn descriptor_range_may_contain_at() {
        let desc = Descriptor::parse("bindings@prebuild:@scope/owner#linux-x64").unwrap();
        assert_eq!(desc.ident().name(), "bindings");
        assert_eq!(desc.range(), "prebuild:@scope/owner#linux-x64");
    }

    #[test]
    fn descriptor_requires_range() {
        assert!(Descriptor::parse("pkg").is_err());
        assert!(Descriptor::parse("pkg@").is_err());
        assert!(Descriptor::parse("@scope/pkg").is_err());
    }

    #[test]
    fn hashes_distinguish_fields() {
        let a = Descriptor::parse("pkg@1.0.0").unwrap();
        let b = Descriptor::parse("pkg@1.0.1").unwrap();
        let c = Descriptor::parse("pkg@1.0.0").unwrap();
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), c.hash());

        let desc_hash = a.hash().as_str().to_string();
        let loc = Locator::parse("pkg@1.0.0").unwrap();
        assert_eq!(loc.to_descriptor().hash().as_str(), desc_hash);
    }

    #[test]
    fn locator_slug_is_filesystem_safe() {
        let loc = Locator::parse("variants-a-1@npm:1.0.0").unwrap();
        let slug = loc.slug();
        assert!(slug.starts_with("variants-a-1-npm-1.0.0-"));
        assert_eq!(slug.len(), "variants-a-1-npm-1.0.0-".len() + 10);

        let url = Locator::parse("@prebuilds/x@https://host/a b?c=d").unwrap();
        let slug = url.slug();
        assert!(!slug.contains('/'));
        assert!(!slug.contains(' '));
        assert!(slug.starts_with("@prebuilds-x-https---host-a-b-c-d-"));
    }

    #[test]
    fn serde_uses_string_form() {
        let loc = Locator::parse("@scope/pkg@npm:2.0.0").unwrap();
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, "\"@scope/pkg@npm:2.0.0\"");
        let back: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
    }
}
