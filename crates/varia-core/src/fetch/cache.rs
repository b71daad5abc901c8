//! Content-addressed fetch cache.
//!
//! Entries live under the cache folder as `<locator slug>-<checksum prefix>`.
//! Each locator has one `<locator slug>.checksum` sidecar naming its current
//! entry, so a lookup reads a single file. Population happens in a `.tmp-*`
//! staging directory that is renamed into place before the sidecar is
//! published, so a sidecar always points at a complete entry. At most one
//! populate runs per locator at a time; other callers for the same locator
//! wait for it and then take the hit path.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use varia_schema::{Checksum, Locator, LocatorHash};

use super::fs::{Borrows, PackageFs, checksum_in_background};
use super::FetchResult;
use crate::error::FetchError;
use crate::reporter::Reporter;

const SIDECAR: &str = ".checksum";
const STAGING_PREFIX: &str = ".tmp-";
const CHECKSUM_PREFIX: usize = 10;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Misses are errors instead of populating.
    pub immutable: bool,
    /// Hits are re-hashed and compared to their sidecar.
    pub check: bool,
}

/// A visible cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub name: String,
    pub path: PathBuf,
    pub checksum: Checksum,
}

#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
    options: CacheOptions,
    locks: Mutex<HashMap<LocatorHash, KeyLock>>,
    borrows: Borrows,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>, options: CacheOptions) -> Self {
        Self {
            root: root.into(),
            options,
            locks: Mutex::new(HashMap::new()),
            borrows: Borrows::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Materialize `locator`, populating on a miss.
    ///
    /// `populate` receives an empty staging directory to write the package
    /// into. The cache hashes what it wrote, checks it against `expected`,
    /// and commits it atomically. On a hit the stored checksum must equal
    /// `expected` when one is given; a mismatch is an error and nothing is
    /// re-fetched.
    pub async fn fetch_package_from_cache<F, Fut, E>(
        &self,
        locator: &Locator,
        expected: Option<&Checksum>,
        reporter: &dyn Reporter,
        populate: F,
    ) -> Result<FetchResult, E>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<FetchError>,
    {
        let lock = self.key_lock(locator.hash());
        let outcome = {
            let _guard = lock.lock().await;
            self.fetch_locked(locator, expected, reporter, populate).await
        };
        self.forget_lock(locator.hash(), lock);
        outcome
    }

    /// Every visible entry, sorted by name.
    pub fn list(&self) -> Result<Vec<CacheEntry>, FetchError> {
        let read_dir = match std::fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(STAGING_PREFIX) || !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let Some((slug, prefix)) = name.rsplit_once('-') else {
                continue;
            };
            let text = match std::fs::read_to_string(self.sidecar(slug)) {
                Ok(text) => text,
                Err(err) if absent(&err) => continue,
                Err(err) => return Err(err.into()),
            };
            let checksum = self.parse_sidecar(slug, &text)?;
            // superseded entries stay on disk but are no longer current
            if checksum.short(CHECKSUM_PREFIX) == prefix {
                entries.push(self.entry(slug, checksum));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Number of unreleased handles for `locator`.
    pub fn outstanding(&self, locator: &Locator) -> usize {
        self.borrows.outstanding(locator.hash())
    }

    async fn fetch_locked<F, Fut, E>(
        &self,
        locator: &Locator,
        expected: Option<&Checksum>,
        reporter: &dyn Reporter,
        populate: F,
    ) -> Result<FetchResult, E>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<FetchError>,
    {
        if let Some(entry) = self.lookup(locator).await? {
            self.verify_hit(locator, &entry, expected).await?;
            reporter.cache_hit(locator);
            return Ok(self.hand_out(locator, entry));
        }

        if self.options.immutable {
            return Err(FetchError::CacheMiss(locator.to_string()).into());
        }
        reporter.cache_miss(locator);

        tokio::fs::create_dir_all(&self.root).await.map_err(FetchError::from)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(FetchError::from)?;

        // staging is removed on drop if populate or any check below fails
        populate(staging.path().to_path_buf()).await?;

        let checksum = checksum_in_background(staging.path().to_path_buf())
            .await
            .map_err(FetchError::from)?;
        if let Some(expected) = expected.filter(|expected| **expected != checksum) {
            return Err(FetchError::ChecksumMismatch {
                locator: locator.to_string(),
                expected: expected.clone(),
                actual: checksum,
            }
            .into());
        }

        let entry = self.commit(locator, staging, checksum).await?;
        tracing::debug!(%locator, entry = %entry.name, "cache entry committed");
        Ok(self.hand_out(locator, entry))
    }

    fn key_lock(&self, hash: &LocatorHash) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(hash.clone()).or_default())
    }

    /// Drop `lock`, and its map slot when no other caller holds it.
    fn forget_lock(&self, hash: &LocatorHash, lock: KeyLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(hash).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(hash);
        }
    }

    fn hand_out(&self, locator: &Locator, entry: CacheEntry) -> FetchResult {
        FetchResult {
            package_fs: PackageFs::new(entry.path),
            release: self.borrows.acquire(locator.hash()),
            checksum: Some(entry.checksum),
        }
    }

    fn sidecar(&self, slug: &str) -> PathBuf {
        self.root.join(format!("{slug}{SIDECAR}"))
    }

    fn entry(&self, slug: &str, checksum: Checksum) -> CacheEntry {
        let name = format!("{slug}-{}", checksum.short(CHECKSUM_PREFIX));
        CacheEntry {
            path: self.root.join(&name),
            name,
            checksum,
        }
    }

    fn parse_sidecar(&self, slug: &str, text: &str) -> Result<Checksum, FetchError> {
        Checksum::new(text.trim())
            .map_err(|err| FetchError::Archive(format!("{}: {err}", self.sidecar(slug).display())))
    }

    async fn lookup(&self, locator: &Locator) -> Result<Option<CacheEntry>, FetchError> {
        let slug = locator.slug();
        let text = match tokio::fs::read_to_string(self.sidecar(&slug)).await {
            Ok(text) => text,
            Err(err) if absent(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry = self.entry(&slug, self.parse_sidecar(&slug, &text)?);

        match tokio::fs::metadata(&entry.path).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(entry)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn verify_hit(
        &self,
        locator: &Locator,
        entry: &CacheEntry,
        expected: Option<&Checksum>,
    ) -> Result<(), FetchError> {
        if let Some(expected) = expected.filter(|expected| **expected != entry.checksum) {
            return Err(FetchError::ChecksumMismatch {
                locator: locator.to_string(),
                expected: expected.clone(),
                actual: entry.checksum.clone(),
            });
        }

        if self.options.check {
            let actual = checksum_in_background(entry.path.clone()).await?;
            if actual != entry.checksum {
                return Err(FetchError::ChecksumMismatch {
                    locator: locator.to_string(),
                    expected: entry.checksum.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    async fn commit(
        &self,
        locator: &Locator,
        staging: tempfile::TempDir,
        checksum: Checksum,
    ) -> Result<CacheEntry, FetchError> {
        let slug = locator.slug();
        let entry = self.entry(&slug, checksum);

        // Left over by an interrupted commit. No sidecar points at it.
        if tokio::fs::try_exists(&entry.path).await? {
            tokio::fs::remove_dir_all(&entry.path).await?;
        }
        tokio::fs::rename(staging.path(), &entry.path).await?;
        let _ = staging.keep();

        let sidecar = self.sidecar(&slug);
        let sidecar_tmp = self.root.join(format!("{STAGING_PREFIX}{slug}{SIDECAR}"));
        let published = async {
            tokio::fs::write(&sidecar_tmp, entry.checksum.as_str()).await?;
            tokio::fs::rename(&sidecar_tmp, &sidecar).await
        }
        .await;
        if let Err(err) = published {
            let _ = tokio::fs::remove_file(&sidecar_tmp).await;
            let _ = tokio::fs::remove_dir_all(&entry.path).await;
            return Err(err.into());
        }

        Ok(entry)
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Missing, or not a regular file.
fn absent(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory)
}
