//! Gzip tarball unpacking and the plain-URL tarball fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use varia_schema::Locator;

use super::{FetchOptions, FetchResult, Fetcher};
use crate::error::{FetchError, ResolveError};

/// Unpack a `.tar.gz` into `dest`, dropping `strip_components` leading path
/// components from every entry.
///
/// Only regular files are written. Entries that would land outside `dest`
/// are rejected.
pub fn unpack_tar_gz(data: &[u8], dest: &Path, strip_components: usize) -> Result<(), FetchError> {
    unpack_tar(GzDecoder::new(data), dest, strip_components)
}

/// [`unpack_tar_gz`] on the blocking pool.
pub async fn unpack_tar_gz_in_background(
    data: Bytes,
    dest: PathBuf,
    strip_components: usize,
) -> Result<(), FetchError> {
    tokio::task::spawn_blocking(move || unpack_tar_gz(&data, &dest, strip_components))
        .await
        .map_err(std::io::Error::other)?
}

fn unpack_tar<R: Read>(reader: R, dest: &Path, strip_components: usize) -> Result<(), FetchError> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry.path()?.into_owned();
        let Some(relative) = sanitize(&entry_path, strip_components)? else {
            continue;
        };

        let absolute = dest.join(&relative);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&absolute)?;
    }
    Ok(())
}

/// Strip leading components and refuse anything that could escape the root.
fn sanitize(path: &Path, strip_components: usize) -> Result<Option<PathBuf>, FetchError> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FetchError::Archive(format!(
                    "Invalid path in archive: {}",
                    path.display()
                )));
            }
        }
    }

    let stripped: PathBuf = relative.components().skip(strip_components).collect();
    if stripped.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(stripped))
}

/// Fetches `http(s)://` references as gzip tarballs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarballFetcher;

#[async_trait]
impl Fetcher for TarballFetcher {
    fn supports(&self, locator: &Locator) -> bool {
        let reference = locator.reference();
        reference.starts_with("http://") || reference.starts_with("https://")
    }

    async fn fetch(
        &self,
        locator: &Locator,
        options: &FetchOptions,
    ) -> Result<FetchResult, ResolveError> {
        let expected = options.checksums.get(locator.hash());
        let url = locator.reference().to_string();
        let transport = Arc::clone(&options.transport);

        options
            .cache
            .fetch_package_from_cache(locator, expected, options.reporter.as_ref(), |staging| async move {
                let data = transport.download(&url).await?;
                unpack_tar_gz_in_background(data, staging, 1).await?;
                Ok::<(), ResolveError>(())
            })
            .await
    }
}
