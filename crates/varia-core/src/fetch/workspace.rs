use async_trait::async_trait;

use varia_schema::Locator;

use super::{FetchOptions, FetchResult, Fetcher, PackageFs, ReleaseHandle};
use crate::error::ResolveError;
use crate::resolver::workspace::WORKSPACE_PROTOCOL;

/// Exposes project folders in place. Nothing is cached or hashed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkspaceFetcher;

#[async_trait]
impl Fetcher for WorkspaceFetcher {
    fn supports(&self, locator: &Locator) -> bool {
        locator.reference().starts_with(WORKSPACE_PROTOCOL)
    }

    async fn fetch(
        &self,
        locator: &Locator,
        options: &FetchOptions,
    ) -> Result<FetchResult, ResolveError> {
        let relative = locator
            .reference()
            .strip_prefix(WORKSPACE_PROTOCOL)
            .unwrap_or(".");
        Ok(FetchResult {
            package_fs: PackageFs::new(options.project_root.join(relative)),
            release: ReleaseHandle::noop(),
            checksum: None,
        })
    }
}
