//! Resolved package metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::hash::DescriptorHash;
use crate::ident::{Descriptor, Locator};
use crate::manifest::DependencyMeta;
use crate::variants::VariantDefinition;

/// How a package is laid out on disk by the linker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Materialized contents.
    #[default]
    Hard,
    /// Symbolic reference to a location outside the cache.
    Soft,
}

/// The version recorded for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageVersion {
    /// A concrete version string.
    Known(String),
    /// Synthetic packages have no meaningful version.
    Wildcard,
}

impl std::fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v}"),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

/// Full resolved metadata for a [`Locator`].
///
/// Dependencies are still [`Descriptor`]s; the graph walker resolves them.
/// A `Package` is never mutated after construction. Rewriting a dependency
/// goes through [`Package::with_dependency_replaced`], which returns a new
/// record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    locator: Locator,
    version: PackageVersion,
    link_type: LinkType,
    dependencies: BTreeMap<DescriptorHash, Descriptor>,
    peer_dependencies: BTreeMap<DescriptorHash, Descriptor>,
    dependencies_meta: BTreeMap<String, DependencyMeta>,
    bin: BTreeMap<String, String>,
    variants: Option<Vec<VariantDefinition>>,
}

impl Package {
    /// Start a package record for `locator` with a known version.
    pub fn builder(locator: Locator, version: PackageVersion) -> PackageBuilder {
        PackageBuilder {
            package: Self {
                locator,
                version,
                link_type: LinkType::Hard,
                dependencies: BTreeMap::new(),
                peer_dependencies: BTreeMap::new(),
                dependencies_meta: BTreeMap::new(),
                bin: BTreeMap::new(),
                variants: None,
            },
        }
    }

    /// The locator this record describes.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Recorded version, or the wildcard for synthetic packages.
    pub fn version(&self) -> &PackageVersion {
        &self.version
    }

    /// Hard or soft link.
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Regular dependencies keyed by descriptor hash.
    pub fn dependencies(&self) -> &BTreeMap<DescriptorHash, Descriptor> {
        &self.dependencies
    }

    /// Peer dependencies keyed by descriptor hash.
    pub fn peer_dependencies(&self) -> &BTreeMap<DescriptorHash, Descriptor> {
        &self.peer_dependencies
    }

    /// Per-dependency metadata keyed by dependency name.
    pub fn dependencies_meta(&self) -> &BTreeMap<String, DependencyMeta> {
        &self.dependencies_meta
    }

    /// Binary entries, command name to relative path.
    pub fn bin(&self) -> &BTreeMap<String, String> {
        &self.bin
    }

    /// Declared variants, if this package is variant-aware.
    pub fn variants(&self) -> Option<&[VariantDefinition]> {
        self.variants.as_deref()
    }

    /// A copy of this package with a different link type.
    pub fn with_link_type(&self, link_type: LinkType) -> Self {
        Self {
            link_type,
            ..self.clone()
        }
    }

    /// A copy of this package whose dependency `old` is replaced by `new`.
    ///
    /// Returns a clone unchanged if `old` is not a dependency.
    pub fn with_dependency_replaced(&self, old: &DescriptorHash, new: Descriptor) -> Self {
        let mut next = self.clone();
        if next.dependencies.remove(old).is_some() {
            next.dependencies.insert(new.hash().clone(), new);
        }
        next
    }
}

/// Builder for [`Package`].
#[derive(Debug)]
pub struct PackageBuilder {
    package: Package,
}

impl PackageBuilder {
    /// Set the link type.
    pub fn link_type(mut self, link_type: LinkType) -> Self {
        self.package.link_type = link_type;
        self
    }

    /// Add a regular dependency.
    pub fn dependency(mut self, descriptor: Descriptor) -> Self {
        self.package
            .dependencies
            .insert(descriptor.hash().clone(), descriptor);
        self
    }

    /// Add a peer dependency.
    pub fn peer_dependency(mut self, descriptor: Descriptor) -> Self {
        self.package
            .peer_dependencies
            .insert(descriptor.hash().clone(), descriptor);
        self
    }

    /// Attach metadata for the dependency called `name`.
    pub fn dependency_meta(mut self, name: impl Into<String>, meta: DependencyMeta) -> Self {
        self.package.dependencies_meta.insert(name.into(), meta);
        self
    }

    /// Add a binary entry.
    pub fn bin(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.package.bin.insert(name.into(), path.into());
        self
    }

    /// Declare variants.
    pub fn variants(mut self, variants: Vec<VariantDefinition>) -> Self {
        self.package.variants = Some(variants);
        self
    }

    /// Finish the record.
    pub fn build(self) -> Package {
        self.package
    }
}
