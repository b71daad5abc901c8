//! Reporter trait for dependency injection
//!
//! Resolution and fetching report progress through this trait so the core
//! stays decoupled from how (or whether) the front-end displays it.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use varia_schema::Locator;

pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Resolution", "Fetch").
    fn section(&self, title: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// The locator was served from an existing cache entry.
    fn cache_hit(&self, locator: &Locator);

    /// The locator is not cached and will be populated.
    fn cache_miss(&self, locator: &Locator);

    /// A package finished fetching.
    fn fetched(&self, locator: &Locator);

    /// A resolution or fetch branch failed.
    fn failed(&self, subject: &str, reason: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn cache_hit(&self, locator: &Locator) {
        (**self).cache_hit(locator);
    }
    fn cache_miss(&self, locator: &Locator) {
        (**self).cache_miss(locator);
    }
    fn fetched(&self, locator: &Locator) {
        (**self).fetched(locator);
    }
    fn failed(&self, subject: &str, reason: &str) {
        (**self).failed(subject, reason);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn cache_hit(&self, _: &Locator) {}
    fn cache_miss(&self, _: &Locator) {}
    fn fetched(&self, _: &Locator) {}
    fn failed(&self, _: &str, _: &str) {}
}

/// Forwards to `tracing` and keeps cache statistics for a final summary.
#[derive(Debug, Default)]
pub struct TracingReporter {
    hits: AtomicUsize,
    misses: AtomicUsize,
    fetched: AtomicUsize,
    missed: Mutex<HashSet<String>>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn fetched_count(&self) -> usize {
        self.fetched.load(Ordering::Relaxed)
    }

    /// One-line cache summary, e.g. `3 packages fetched (2 cached, 1 new)`.
    pub fn summary(&self) -> String {
        format!(
            "{} packages fetched ({} cached, {} new)",
            self.fetched_count(),
            self.hits(),
            self.misses()
        )
    }
}

impl Reporter for TracingReporter {
    fn section(&self, title: &str) {
        tracing::info!(section = title);
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    fn cache_hit(&self, locator: &Locator) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%locator, "cache hit");
    }

    fn cache_miss(&self, locator: &Locator) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        // one message per locator even when several paths request it
        let first = self
            .missed
            .lock()
            .map(|mut seen| seen.insert(locator.to_string()))
            .unwrap_or(true);
        if first {
            tracing::info!(%locator, "not cached, fetching");
        }
    }

    fn fetched(&self, locator: &Locator) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%locator, "fetched");
    }

    fn failed(&self, subject: &str, reason: &str) {
        tracing::error!(subject, reason, "failed");
    }
}
