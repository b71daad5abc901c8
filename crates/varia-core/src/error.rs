//! Error types for resolution, fetching and graph walking.

use std::fmt;

use thiserror::Error;
use varia_schema::{Checksum, ParseError, VariantParameters};

/// Upstream metadata is missing something the resolver needs.
#[derive(Error, Debug)]
pub enum RegistryDataError {
    /// A required field is absent or has the wrong shape.
    #[error("Invalid registry metadata for {ident}: missing {field}")]
    Malformed { ident: String, field: &'static str },

    /// The requested version is not published.
    #[error("Registry failed to return {ident}@{version}")]
    NotFound { ident: String, version: String },
}

/// Failures while materializing package contents.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Checksum mismatch for {locator}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        locator: String,
        expected: Checksum,
        actual: Checksum,
    },

    #[error("{0} is not in the cache and the cache is immutable")]
    CacheMiss(String),

    #[error("No fetcher supports {0}")]
    Unsupported(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Populate failed: {0}")]
    Populate(Box<dyn std::error::Error + Send + Sync>),
}

/// Every way a single descriptor's resolution branch can fail.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A fallback variant pattern still contains a `%token`.
    #[error("Variant pattern `{pattern}` is invalid: {reason}")]
    TemplateContract { pattern: String, reason: String },

    /// No variant definition matched and there was no fallback.
    #[error("No variant of {descriptor} matches parameters {parameters:?}")]
    NoVariantMatch {
        descriptor: String,
        parameters: VariantParameters,
    },

    /// Context needed to build the package is unavailable.
    #[error("Cannot resolve {ident}: {reason}")]
    UpstreamLookup { ident: String, reason: String },

    #[error(transparent)]
    RegistryData(#[from] RegistryDataError),

    #[error("Registry request failed: {0}")]
    Registry(#[from] reqwest::Error),

    /// Declared resolution dependencies loop back on themselves.
    #[error("Resolution cycle: {}", cycle.join(" -> "))]
    ResolutionCycle { cycle: Vec<String> },

    #[error("No resolver supports descriptor {0}")]
    UnsupportedDescriptor(String),

    #[error("No resolver supports locator {0}")]
    UnsupportedLocator(String),

    #[error("No candidates found for {0}")]
    NoCandidates(String),

    #[error("Missing resolution context: {0}")]
    MissingContext(&'static str),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// One failed branch of a walk.
#[derive(Debug)]
pub struct Failure {
    /// The descriptor or locator the failure belongs to.
    pub subject: String,
    pub error: ResolveError,
}

/// Every branch failure collected during a walk.
#[derive(Debug)]
pub struct WalkError {
    pub failures: Vec<Failure>,
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resolution failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.subject, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for WalkError {}
