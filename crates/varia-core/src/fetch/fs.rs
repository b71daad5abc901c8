//! Filesystem views handed out by fetchers, and their release handles.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use walkdir::WalkDir;

use varia_schema::{Checksum, LocatorHash};

/// A read-only directory view rooted at a cache entry or project folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFs {
    root: PathBuf,
}

impl PackageFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read(&self, relative: impl AsRef<Path>) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(relative))
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.root.join(relative).exists()
    }

    /// Every regular file, relative to the root, in traversal order.
    pub fn files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(self.relative(entry.path()));
            }
        }
        Ok(files)
    }

    /// The first regular file of a depth-first, name-ordered walk.
    ///
    /// The walk stops as soon as a file is found.
    pub fn first_file(&self) -> io::Result<Option<PathBuf>> {
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                return Ok(Some(self.relative(entry.path())));
            }
        }
        Ok(None)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }
}

/// SHA256 over the sorted relative paths, sizes and contents of every file
/// under `root`.
pub fn compute_checksum(root: &Path) -> io::Result<Checksum> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let contents = std::fs::read(entry.path())?;

        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }
    Ok(Checksum::from_digest(&hasher.finalize()))
}

/// [`compute_checksum`] on the blocking pool.
pub async fn checksum_in_background(root: PathBuf) -> io::Result<Checksum> {
    tokio::task::spawn_blocking(move || compute_checksum(&root))
        .await
        .map_err(io::Error::other)?
}

/// Outstanding borrows per cache key. A key is forgotten once its last
/// borrow is given back.
#[derive(Debug, Clone, Default)]
pub struct Borrows(Arc<Mutex<HashMap<LocatorHash, usize>>>);

impl Borrows {
    /// Take one borrow on `hash`.
    pub fn acquire(&self, hash: &LocatorHash) -> ReleaseHandle {
        *self.counts().entry(hash.clone()).or_insert(0) += 1;
        ReleaseHandle {
            released: AtomicBool::new(false),
            owner: Some((self.clone(), hash.clone())),
        }
    }

    pub fn outstanding(&self, hash: &LocatorHash) -> usize {
        self.counts().get(hash).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.counts().len()
    }

    fn give_back(&self, hash: &LocatorHash) {
        let mut counts = self.counts();
        if let Some(count) = counts.get_mut(hash) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(hash);
            }
        }
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<LocatorHash, usize>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped borrow of a fetched filesystem view.
///
/// Releasing is idempotent and also happens on drop, so every exit path
/// gives the borrow back.
#[derive(Debug)]
pub struct ReleaseHandle {
    released: AtomicBool,
    owner: Option<(Borrows, LocatorHash)>,
}

impl ReleaseHandle {
    /// A handle with nothing to give back.
    pub fn noop() -> Self {
        Self {
            released: AtomicBool::new(false),
            owner: None,
        }
    }

    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some((borrows, hash)) = &self.owner {
            borrows.give_back(hash);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.release();
    }
}
