//! Prebuilt native bindings.
//!
//! A package that depends on the unscoped `bindings` package gets that edge
//! rewritten to `bindings@prebuild:<owner>#<platform>-<arch>`. The prebuild
//! resolver answers with a synthetic package, and the prebuild fetcher
//! downloads the matching native artifact and wraps it in a minimal package
//! whose `main` loads the binary.

pub mod abi;
pub mod fetcher;
pub mod hook;
pub mod resolver;
pub mod url;

use varia_schema::Ident;

use crate::error::ResolveError;

pub use abi::{RuntimeTarget, electron_abi, runtime_target};
pub use fetcher::PrebuildFetcher;
pub use hook::PrebuildHook;
pub use resolver::PrebuildResolver;

pub const PROTOCOL: &str = "prebuild:";

/// The placeholder dependency name that triggers the pipeline.
pub const BINDINGS: &str = "bindings";

/// Parsed `prebuild:<owner>#<platform>-<arch>` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuildSpec {
    pub owner: Ident,
    pub platform: String,
    pub arch: String,
}

impl PrebuildSpec {
    pub fn new(owner: Ident, platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            owner,
            platform: platform.into(),
            arch: arch.into(),
        }
    }

    pub fn parse(range: &str) -> Result<Self, ResolveError> {
        let invalid = || ResolveError::UnsupportedDescriptor(range.to_string());
        let rest = range.strip_prefix(PROTOCOL).ok_or_else(invalid)?;
        let (owner, target) = rest.rsplit_once('#').ok_or_else(invalid)?;
        let (platform, arch) = target.split_once('-').ok_or_else(invalid)?;
        if platform.is_empty() || arch.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(Ident::parse(owner)?, platform, arch))
    }

    pub fn range(&self) -> String {
        format!("{PROTOCOL}{}#{}-{}", self.owner, self.platform, self.arch)
    }
}
