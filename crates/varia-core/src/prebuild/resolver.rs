use async_trait::async_trait;

use varia_schema::{Descriptor, LinkType, Locator, Package, PackageVersion};

use super::{PROTOCOL, PrebuildSpec};
use crate::error::ResolveError;
use crate::resolver::{ResolveOptions, ResolvedDependencies, Resolver};

/// Answers `prebuild:` descriptors with a synthetic, unpersisted package.
///
/// The package contents only exist once [`super::PrebuildFetcher`] has run,
/// so candidates require a fetcher to be configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrebuildResolver;

#[async_trait]
impl Resolver for PrebuildResolver {
    fn supports_descriptor(&self, descriptor: &Descriptor) -> bool {
        descriptor.range().starts_with(PROTOCOL)
    }

    fn supports_locator(&self, locator: &Locator) -> bool {
        locator.reference().starts_with(PROTOCOL)
    }

    // depends on the host platform
    fn should_persist_resolution(&self, _locator: &Locator) -> bool {
        false
    }

    async fn get_candidates(
        &self,
        descriptor: &Descriptor,
        _dependencies: &ResolvedDependencies,
        options: &ResolveOptions,
    ) -> Result<Vec<Locator>, ResolveError> {
        if options.fetcher.is_none() {
            return Err(ResolveError::MissingContext("prebuild resolution requires a fetcher"));
        }
        PrebuildSpec::parse(descriptor.range())?;
        Ok(vec![Locator::new(descriptor.ident().clone(), descriptor.range())])
    }

    async fn resolve(
        &self,
        locator: &Locator,
        _options: &ResolveOptions,
    ) -> Result<Package, ResolveError> {
        Ok(Package::builder(locator.clone(), PackageVersion::Wildcard)
            .link_type(LinkType::Hard)
            .build())
    }
}
