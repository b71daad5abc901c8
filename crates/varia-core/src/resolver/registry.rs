use async_trait::async_trait;
use semver::{Version, VersionReq};
use std::sync::Arc;

use varia_schema::{Descriptor, Locator, Manifest, Package};

use super::{ResolveOptions, ResolvedDependencies, Resolver};
use crate::error::ResolveError;
use crate::registry::{Registry, dist_tag, published_versions, version_manifest};

pub const NPM_PROTOCOL: &str = "npm:";

/// Resolves `npm:` ranges (and bare semver ranges) against a registry.
pub struct RegistryResolver {
    registry: Arc<dyn Registry>,
}

impl RegistryResolver {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }
}

fn selector(range: &str) -> &str {
    range.strip_prefix(NPM_PROTOCOL).unwrap_or(range)
}

#[async_trait]
impl Resolver for RegistryResolver {
    fn supports_descriptor(&self, descriptor: &Descriptor) -> bool {
        let range = descriptor.range();
        range.starts_with(NPM_PROTOCOL) || VersionReq::parse(range).is_ok()
    }

    fn supports_locator(&self, locator: &Locator) -> bool {
        locator.reference().starts_with(NPM_PROTOCOL)
    }

    async fn get_candidates(
        &self,
        descriptor: &Descriptor,
        _dependencies: &ResolvedDependencies,
        _options: &ResolveOptions,
    ) -> Result<Vec<Locator>, ResolveError> {
        let ident = descriptor.ident();
        let selector = selector(descriptor.range());
        let document = self.registry.metadata(ident).await?;
        let to_locator = |version: &str| Locator::new(ident.clone(), format!("{NPM_PROTOCOL}{version}"));

        if Version::parse(selector).is_ok() {
            version_manifest(&document, ident, selector)?;
            return Ok(vec![to_locator(selector)]);
        }

        if let Some(tagged) = dist_tag(&document, selector) {
            return Ok(vec![to_locator(tagged)]);
        }

        let req = VersionReq::parse(selector)
            .map_err(|_| ResolveError::UnsupportedDescriptor(descriptor.to_string()))?;
        let mut versions: Vec<Version> = published_versions(&document, ident)?
            .filter_map(|v| Version::parse(v).ok())
            .filter(|v| req.matches(v))
            .collect();
        versions.sort_by(|a, b| b.cmp(a));

        if versions.is_empty() {
            return Err(ResolveError::NoCandidates(descriptor.to_string()));
        }
        Ok(versions.iter().map(|v| to_locator(&v.to_string())).collect())
    }

    async fn resolve(
        &self,
        locator: &Locator,
        _options: &ResolveOptions,
    ) -> Result<Package, ResolveError> {
        let ident = locator.ident();
        let document = self.registry.metadata(ident).await?;
        let manifest = version_manifest(&document, ident, selector(locator.reference()))?;
        let manifest: Manifest = serde_json::from_value(manifest.clone())?;
        Ok(manifest.to_package(locator.clone())?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reporter::NullReporter;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use varia_schema::Ident;

    /// In-memory registry keyed by ident string.
    pub(crate) struct StaticRegistry(pub(crate) HashMap<String, Arc<Value>>);

    #[async_trait]
    impl Registry for StaticRegistry {
        async fn metadata(&self, ident: &Ident) -> Result<Arc<Value>, ResolveError> {
            self.0
                .get(&ident.to_string())
                .cloned()
                .ok_or_else(|| ResolveError::NoCandidates(ident.to_string()))
        }
    }

    fn resolver() -> RegistryResolver {
        let document = json!({
            "dist-tags": {"latest": "1.2.0"},
            "versions": {
                "1.0.0": {"version": "1.0.0"},
                "1.2.0": {"version": "1.2.0", "dependencies": {"dep": "^2.0.0"}},
                "2.0.0": {"version": "2.0.0"}
            }
        });
        let registry = StaticRegistry(HashMap::from([("pkg".to_string(), Arc::new(document))]));
        RegistryResolver::new(Arc::new(registry))
    }

    fn options() -> ResolveOptions {
        ResolveOptions {
            reporter: Arc::new(NullReporter),
            fetcher: None,
        }
    }

    async fn candidates(range: &str) -> Result<Vec<String>, ResolveError> {
        let desc = Descriptor::parse(&format!("pkg@{range}")).unwrap();
        let found = resolver()
            .get_candidates(&desc, &ResolvedDependencies::new(), &options())
            .await?;
        Ok(found.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn supports_npm_and_bare_ranges_only() {
        let resolver = resolver();
        for range in ["npm:^1.0.0", "^1.0.0", "1.0.0", "*"] {
            assert!(resolver.supports_descriptor(&Descriptor::parse(&format!("pkg@{range}")).unwrap()));
        }
        for range in ["workspace:.", "prebuild:owner#linux-x64", "https://x/y.tgz"] {
            assert!(!resolver.supports_descriptor(&Descriptor::parse(&format!("pkg@{range}")).unwrap()));
        }
    }

    #[tokio::test]
    async fn ranges_yield_newest_first() {
        assert_eq!(candidates("^1.0.0").await.unwrap(), vec!["pkg@npm:1.2.0", "pkg@npm:1.0.0"]);
        assert_eq!(candidates("npm:>=1.0.0").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn exact_versions_and_tags() {
        assert_eq!(candidates("1.0.0").await.unwrap(), vec!["pkg@npm:1.0.0"]);
        assert_eq!(candidates("npm:latest").await.unwrap(), vec!["pkg@npm:1.2.0"]);

        let err = candidates("3.0.0").await.unwrap_err();
        assert!(matches!(err, ResolveError::RegistryData(_)));
        let err = candidates("^5.0.0").await.unwrap_err();
        assert!(matches!(err, ResolveError::NoCandidates(_)));
    }

    #[tokio::test]
    async fn resolve_reads_the_version_manifest() {
        let locator = Locator::parse("pkg@npm:1.2.0").unwrap();
        let pkg = resolver().resolve(&locator, &options()).await.unwrap();
        assert_eq!(pkg.version().to_string(), "1.2.0");
        let deps: Vec<_> = pkg.dependencies().values().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["dep@^2.0.0"]);
    }
}
