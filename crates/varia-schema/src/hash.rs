//! Identity hashes and content checksums.

use serde::{Deserialize, Deserializer, Serialize};

use crate::ident::ParseError;

macro_rules! identity_hash {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Compute the BLAKE3 hash of the given fields.
            ///
            /// Each field is length-prefixed, so `("ab", "c")` and `("a", "bc")`
            /// produce different hashes.
            pub fn compute(fields: &[&str]) -> Self {
                let mut hasher = blake3::Hasher::new();
                for field in fields {
                    hasher.update(&(field.len() as u64).to_le_bytes());
                    hasher.update(field.as_bytes());
                }
                Self(hasher.finalize().to_hex().to_string())
            }

            /// Return the inner hex string as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The first `len` hex characters, for human-facing names.
            pub fn short(&self, len: usize) -> &str {
                &self.0[..len.min(self.0.len())]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identity_hash! {
    /// Hash of an [`Ident`](crate::Ident): a pure function of scope and name.
    IdentHash
}

identity_hash! {
    /// Hash of a [`Descriptor`](crate::Descriptor): ident hash plus range.
    DescriptorHash
}

identity_hash! {
    /// Hash of a [`Locator`](crate::Locator): ident hash plus reference.
    ///
    /// This is the key of the fetch cache.
    LocatorHash
}

/// A validated SHA256 checksum (64 lowercase hex characters).
///
/// Checksums identify the materialized contents of a cache entry. They are
/// validated at deserialization time so that a corrupt lock or sidecar file
/// can never compare equal to a real digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Create a new `Checksum`, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidChecksum`] if the hex portion is not
    /// exactly 64 ASCII hex characters.
    pub fn new(s: impl Into<String>) -> Result<Self, ParseError> {
        let s = s.into();
        let hex = s.strip_prefix("sha256:").unwrap_or(&s).trim();

        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidChecksum(s));
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Build a checksum from a finished SHA256 digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Get the checksum as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `len` hex characters, used in cache entry names.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
