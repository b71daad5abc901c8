use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use varia_schema::{Ident, Locator, Package, PackageVersion};

use super::url::{PrebuildTarget, mirror_url, prebuild_url};
use super::{PROTOCOL, PrebuildSpec, runtime_target};
use crate::error::{FetchError, ResolveError};
use crate::fetch::{FetchOptions, FetchResult, Fetcher, PackageFs, unpack_tar_gz_in_background};
use crate::registry::{repository_url, version_manifest};

const ARTIFACT: &str = "bindings.node";
// `bindings` is called as `bindings("addon.node")`; any name resolves to the prebuild
const LOADER: &str = "module.exports = () => require(\"./bindings.node\");\n";

/// Downloads the native artifact for a `prebuild:` locator and wraps it in
/// a loadable package.
///
/// The downloaded archive is cached under its own `@prebuilds/...` locator,
/// and the synthesized package under the `prebuild:` locator itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrebuildFetcher;

impl PrebuildFetcher {
    /// First resolved package with the owner's ident.
    fn owner<'a>(packages: &'a [Package], ident: &Ident) -> Result<&'a Package, ResolveError> {
        packages
            .iter()
            .find(|pkg| pkg.locator().ident() == ident)
            .ok_or_else(|| ResolveError::UpstreamLookup {
                ident: ident.to_string(),
                reason: "no resolved package owns this prebuild".to_string(),
            })
    }

    async fn repository(owner: &Package, version: &str, options: &FetchOptions) -> Result<Option<String>, ResolveError> {
        let ident = owner.locator().ident();
        let document = options.registry.metadata(ident).await?;
        let manifest = version_manifest(&document, ident, version)?;
        Ok(repository_url(manifest).map(str::to_string))
    }

    /// Download and unpack the archive at `url` as its own cache entry.
    async fn fetch_archive(
        artifact: &Locator,
        url: &str,
        owner: &str,
        options: &FetchOptions,
    ) -> Result<FetchResult, ResolveError> {
        let expected = options.checksums.get(artifact.hash());
        let transport = Arc::clone(&options.transport);

        options
            .cache
            .fetch_package_from_cache(artifact, expected, options.reporter.as_ref(), |staging| async move {
                let data = transport.download(url).await?;
                unpack_tar_gz_in_background(data, staging.clone(), 0).await?;
                binary_in(&staging, owner, url).await?;
                Ok::<(), ResolveError>(())
            })
            .await
    }
}

#[async_trait]
impl Fetcher for PrebuildFetcher {
    fn supports(&self, locator: &Locator) -> bool {
        locator.reference().starts_with(PROTOCOL)
    }

    async fn fetch(
        &self,
        locator: &Locator,
        options: &FetchOptions,
    ) -> Result<FetchResult, ResolveError> {
        let expected = options.checksums.get(locator.hash());
        let package_name = locator.slug();

        options
            .cache
            .fetch_package_from_cache(locator, expected, options.reporter.as_ref(), |staging| async move {
                let spec = PrebuildSpec::parse(locator.reference())?;
                let owner = Self::owner(&options.packages, &spec.owner)?;
                let PackageVersion::Known(version) = owner.version() else {
                    return Err(ResolveError::UpstreamLookup {
                        ident: owner.locator().to_string(),
                        reason: "package has no concrete version".to_string(),
                    });
                };

                let repository = match mirror_url(&options.settings, &spec.owner) {
                    Some(_) => None,
                    None => Self::repository(owner, version, options).await?,
                };
                let runtime = runtime_target(&options.packages, &options.settings)?;
                let target = PrebuildTarget {
                    ident: &spec.owner,
                    version,
                    platform: &spec.platform,
                    arch: &spec.arch,
                    runtime: &runtime,
                };
                let url = prebuild_url(&target, &options.host, &options.settings, repository.as_deref())?;

                // one archive entry per owner, platform and ABI
                let artifact = Locator::new(
                    Ident::new(
                        Some("prebuilds"),
                        &format!(
                            "{}-v{version}-{}-{}-{}-{}",
                            spec.owner.slug().trim_start_matches('@'),
                            spec.platform,
                            spec.arch,
                            runtime.runtime,
                            runtime.abi
                        ),
                    ),
                    url.clone(),
                );
                tracing::debug!(%locator, %artifact, "fetching prebuild");

                let owner_ident = owner.locator().to_string();
                let archive = Self::fetch_archive(&artifact, &url, &owner_ident, options).await?;
                let binary = binary_in(archive.package_fs.root(), &owner_ident, &url).await?;
                synthesize(&staging, &package_name, &archive.package_fs.root().join(binary)).await?;
                archive.release.release();
                Ok::<(), ResolveError>(())
            })
            .await
    }
}

/// First file of the unpacked archive under `root`.
async fn binary_in(root: &Path, owner: &str, url: &str) -> Result<PathBuf, ResolveError> {
    let unpacked = PackageFs::new(root);
    let first = tokio::task::spawn_blocking(move || unpacked.first_file())
        .await
        .map_err(std::io::Error::other)
        .and_then(|found| found)
        .map_err(FetchError::from)?;

    first.ok_or_else(|| ResolveError::UpstreamLookup {
        ident: owner.to_string(),
        reason: format!("prebuild archive at {url} is empty"),
    })
}

/// Lay out a minimal package whose `main` loads `binary`.
async fn synthesize(dest: &Path, name: &str, binary: &Path) -> Result<(), FetchError> {
    let manifest = serde_json::json!({
        "name": name,
        "main": "./index.js",
    });
    let manifest = serde_json::to_vec_pretty(&manifest).map_err(|err| FetchError::Populate(err.into()))?;

    tokio::fs::write(dest.join("package.json"), manifest).await?;
    tokio::fs::write(dest.join("index.js"), LOADER).await?;
    tokio::fs::copy(binary, dest.join(ARTIFACT)).await?;
    Ok(())
}
