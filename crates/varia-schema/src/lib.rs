//! Shared identity model and manifest wire format for varia.
//!
//! Everything in this crate is an immutable value type. "Changing" a
//! dependency always means building a new [`Descriptor`] or [`Package`].

pub mod hash;
pub mod ident;
pub mod manifest;
pub mod package;
pub mod variants;

// Re-exports
pub use hash::*;
pub use ident::{Descriptor, Ident, Locator, ParseError};
pub use manifest::{Bin, DependencyMeta, Manifest, Repository};
pub use package::{LinkType, Package, PackageBuilder, PackageVersion};
pub use variants::{VariantDefinition, VariantMatrix, VariantParameters};
