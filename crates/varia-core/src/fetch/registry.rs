use async_trait::async_trait;
use std::sync::Arc;

use varia_schema::Locator;

use super::{FetchOptions, FetchResult, Fetcher, unpack_tar_gz_in_background};
use crate::error::ResolveError;
use crate::registry::{tarball_url, version_manifest};
use crate::resolver::registry::NPM_PROTOCOL;

/// Fetches `npm:` locators through their registry tarball.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryFetcher;

#[async_trait]
impl Fetcher for RegistryFetcher {
    fn supports(&self, locator: &Locator) -> bool {
        locator.reference().starts_with(NPM_PROTOCOL)
    }

    async fn fetch(
        &self,
        locator: &Locator,
        options: &FetchOptions,
    ) -> Result<FetchResult, ResolveError> {
        let ident = locator.ident();
        let version = locator
            .reference()
            .strip_prefix(NPM_PROTOCOL)
            .unwrap_or(locator.reference());

        let expected = options.checksums.get(locator.hash());
        let registry = Arc::clone(&options.registry);
        let transport = Arc::clone(&options.transport);
        let ident = ident.clone();
        let version = version.to_string();

        options
            .cache
            .fetch_package_from_cache(locator, expected, options.reporter.as_ref(), |staging| async move {
                let document = registry.metadata(&ident).await?;
                let manifest = version_manifest(&document, &ident, &version)?;
                let url = tarball_url(manifest, &ident)?.to_string();

                let data = transport.download(&url).await?;
                // npm tarballs nest everything under `package/`
                unpack_tar_gz_in_background(data, staging, 1).await?;
                Ok::<(), ResolveError>(())
            })
            .await
    }
}
