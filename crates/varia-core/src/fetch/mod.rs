//! Fetching: turning a resolved locator into verified on-disk contents.

pub mod cache;
pub mod fs;
pub mod registry;
pub mod tarball;
pub mod transport;
pub mod workspace;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use varia_schema::{Checksum, Locator, LocatorHash, Package};

use crate::error::{FetchError, ResolveError};
use crate::platform::HostPlatform;
use crate::registry::Registry;
use crate::reporter::Reporter;
use crate::settings::Settings;

pub use cache::{Cache, CacheEntry, CacheOptions};
pub use fs::{Borrows, PackageFs, ReleaseHandle, checksum_in_background, compute_checksum};
pub use registry::RegistryFetcher;
pub use tarball::{TarballFetcher, unpack_tar_gz, unpack_tar_gz_in_background};
pub use transport::{HttpTransport, Transport};
pub use workspace::WorkspaceFetcher;

/// A fetched package with its release handle and checksum.
#[derive(Debug)]
pub struct FetchResult {
    pub package_fs: PackageFs,
    pub release: ReleaseHandle,
    /// `None` for uncached sources such as the workspace.
    pub checksum: Option<Checksum>,
}

/// Everything a fetcher may need. Passed explicitly; cheap to clone.
#[derive(Clone)]
pub struct FetchOptions {
    pub cache: Arc<Cache>,
    pub registry: Arc<dyn Registry>,
    pub transport: Arc<dyn Transport>,
    pub settings: Arc<Settings>,
    pub host: HostPlatform,
    pub project_root: PathBuf,
    /// Every package resolved in the current session.
    pub packages: Arc<Vec<Package>>,
    /// Known checksums, e.g. from an earlier fetch of the same session.
    pub checksums: Arc<HashMap<LocatorHash, Checksum>>,
    pub reporter: Arc<dyn Reporter>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn supports(&self, locator: &Locator) -> bool;

    async fn fetch(&self, locator: &Locator, options: &FetchOptions)
    -> Result<FetchResult, ResolveError>;
}

/// Dispatches to the first fetcher that supports a locator.
#[derive(Default)]
pub struct MultiFetcher {
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl MultiFetcher {
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>) -> Self {
        Self { fetchers }
    }

    fn find(&self, locator: &Locator) -> Option<&Arc<dyn Fetcher>> {
        self.fetchers.iter().find(|fetcher| fetcher.supports(locator))
    }
}

#[async_trait]
impl Fetcher for MultiFetcher {
    fn supports(&self, locator: &Locator) -> bool {
        self.find(locator).is_some()
    }

    async fn fetch(
        &self,
        locator: &Locator,
        options: &FetchOptions,
    ) -> Result<FetchResult, ResolveError> {
        let fetcher = self
            .find(locator)
            .ok_or_else(|| FetchError::Unsupported(locator.to_string()))?;
        let result = fetcher.fetch(locator, options).await?;
        options.reporter.fetched(locator);
        Ok(result)
    }
}
