//! The subset of `package.json` varia reads.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ident::{Descriptor, Ident, Locator, ParseError};
use crate::package::{Package, PackageVersion};
use crate::variants::{VariantDefinition, VariantParameters};

/// Consumer-side metadata for a single dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMeta {
    /// Variant parameters the consumer requests for this dependency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<VariantParameters>,
}

/// The `repository` field, in either of its npm spellings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Repository {
    /// `"repository": "git+https://github.com/o/r.git"`
    Url(String),
    /// `"repository": {"type": "git", "url": "..."}`
    Detailed {
        /// Repository URL.
        url: String,
        /// VCS kind, usually `git`.
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
}

impl Repository {
    /// The repository URL regardless of spelling.
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::Detailed { url, .. } => url,
        }
    }
}

/// The `bin` field: a single path named after the package, or a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bin {
    /// One binary named after the package.
    Single(String),
    /// Command name to relative path.
    Map(BTreeMap<String, String>),
}

/// A `package.json`-style manifest.
///
/// Used for the project root, for registry version records and for the
/// manifests the prebuild pipeline synthesizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Ident>,

    /// Package version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Entry point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// Dependency name to range, in declaration order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,

    /// Peer dependency name to range.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub peer_dependencies: IndexMap<String, String>,

    /// Per-dependency metadata, keyed by dependency name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies_meta: BTreeMap<String, DependencyMeta>,

    /// Binary entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<Bin>,

    /// Ordered variant alternatives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<VariantDefinition>>,

    /// Source repository link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
}

fn descriptors(map: &IndexMap<String, String>) -> Result<Vec<Descriptor>, ParseError> {
    map.iter()
        .map(|(name, range)| {
            if range.is_empty() {
                return Err(ParseError::InvalidDescriptor(format!("{name}@")));
            }
            Ok(Descriptor::new(Ident::parse(name)?, range.clone()))
        })
        .collect()
}

impl Manifest {
    /// Parse a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Regular dependencies as descriptors, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for a malformed dependency name or empty range.
    pub fn dependency_descriptors(&self) -> Result<Vec<Descriptor>, ParseError> {
        descriptors(&self.dependencies)
    }

    /// Variant parameters this manifest declares for dependency `name`.
    pub fn parameters_for(&self, name: &str) -> Option<&VariantParameters> {
        self.dependencies_meta
            .get(name)
            .and_then(|meta| meta.parameters.as_ref())
    }

    /// Build the package record for `locator` from this manifest.
    ///
    /// A missing version is recorded as `0.0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if any dependency entry is malformed.
    pub fn to_package(&self, locator: Locator) -> Result<Package, ParseError> {
        let version = PackageVersion::Known(
            self.version.clone().unwrap_or_else(|| "0.0.0".to_string()),
        );
        let mut builder = Package::builder(locator.clone(), version);

        for descriptor in descriptors(&self.dependencies)? {
            builder = builder.dependency(descriptor);
        }
        for descriptor in descriptors(&self.peer_dependencies)? {
            builder = builder.peer_dependency(descriptor);
        }
        for (name, meta) in &self.dependencies_meta {
            builder = builder.dependency_meta(name.clone(), meta.clone());
        }
        match &self.bin {
            Some(Bin::Single(path)) => {
                builder = builder.bin(locator.ident().name(), path.clone());
            }
            Some(Bin::Map(map)) => {
                for (name, path) in map {
                    builder = builder.bin(name.clone(), path.clone());
                }
            }
            None => {}
        }
        if let Some(variants) = &self.variants {
            builder = builder.variants(variants.clone());
        }

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIANT_MANIFEST: &str = r#"{
        "name": "variants",
        "version": "1.0.0",
        "bin": "./cli.js",
        "dependencies": {"left-pad": "^1.0.0", "@scope/util": "npm:2.0.0"},
        "dependenciesMeta": {"left-pad": {"parameters": {"par1": "a", "par2": 1}}},
        "variants": [
            {"pattern": "variants-%par1-%par2@1.0.0",
             "matrix": {"par1": {"candidates": ["a", "b", "c"]}, "par2": {"candidates": ["1"]}}},
            {"pattern": "variants-fallback@1.0.0"}
        ],
        "repository": {"type": "git", "url": "git+https://github.com/o/r.git"}
    }"#;

    #[test]
    fn parses_variant_manifest() {
        let manifest = Manifest::from_json(VARIANT_MANIFEST).unwrap();
        assert_eq!(manifest.name.as_ref().unwrap().name(), "variants");
        assert_eq!(manifest.variants.as_ref().unwrap().len(), 2);
        assert_eq!(
            manifest.repository.as_ref().unwrap().url(),
            "git+https://github.com/o/r.git"
        );

        let params = manifest.parameters_for("left-pad").unwrap();
        assert_eq!(params.get("par2"), Some("1"));
        assert!(manifest.parameters_for("@scope/util").is_none());
    }

    #[test]
    fn dependency_descriptors_keep_declaration_order() {
        let manifest = Manifest::from_json(VARIANT_MANIFEST).unwrap();
        let deps = manifest.dependency_descriptors().unwrap();
        let rendered: Vec<_> = deps.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["left-pad@^1.0.0", "@scope/util@npm:2.0.0"]);
    }

    #[test]
    fn to_package_carries_metadata() {
        let manifest = Manifest::from_json(VARIANT_MANIFEST).unwrap();
        let locator = Locator::parse("variants@npm:1.0.0").unwrap();
        let pkg = manifest.to_package(locator).unwrap();

        assert_eq!(pkg.dependencies().len(), 2);
        assert_eq!(pkg.bin().get("variants").map(String::as_str), Some("./cli.js"));
        assert!(pkg.dependencies_meta().contains_key("left-pad"));
        assert_eq!(pkg.variants().map(<[_]>::len), Some(2));
    }

    #[test]
    fn empty_range_is_rejected() {
        let manifest = Manifest::from_json(r#"{"dependencies": {"a": ""}}"#).unwrap();
        assert!(manifest.dependency_descriptors().is_err());
    }
}
