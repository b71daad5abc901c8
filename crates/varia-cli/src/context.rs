//! Shared command context.
//!
//! Groups the settings, cache and network clients a command needs and wires
//! them into the resolver and fetcher stacks.

use anyhow::{Context as _, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use varia_core::fetch::{
    Cache, CacheOptions, FetchOptions, Fetcher, HttpTransport, MultiFetcher, RegistryFetcher,
    TarballFetcher, WorkspaceFetcher,
};
use varia_core::prebuild::{PrebuildFetcher, PrebuildHook, PrebuildResolver};
use varia_core::registry::HttpRegistry;
use varia_core::resolver::{MultiResolver, RegistryResolver, ResolveOptions, WorkspaceResolver};
use varia_core::{Comparators, HostPlatform, ResolveContext, Settings, TracingReporter};

#[derive(Clone)]
pub struct Context {
    pub settings: Arc<Settings>,
    pub cache: Arc<Cache>,
    pub registry: Arc<HttpRegistry>,
    pub transport: Arc<HttpTransport>,
    pub host: HostPlatform,
    pub reporter: Arc<TracingReporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cache", &self.cache.root())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(settings: Settings, cache_override: Option<PathBuf>) -> Result<Self> {
        let cache_folder = cache_override
            .or_else(|| settings.cache_folder())
            .context("Could not determine a cache folder; pass --cache")?;
        let cache = Cache::new(
            cache_folder,
            CacheOptions {
                immutable: settings.immutable_cache,
                check: settings.check_cache,
            },
        );
        let registry = HttpRegistry::new(&settings.registry).context("Failed to build registry client")?;
        let transport = HttpTransport::new().context("Failed to build download client")?;

        Ok(Self {
            settings: Arc::new(settings),
            cache: Arc::new(cache),
            registry: Arc::new(registry),
            transport: Arc::new(transport),
            host: HostPlatform::detect(),
            reporter: Arc::new(TracingReporter::new()),
        })
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        Arc::new(MultiFetcher::new(vec![
            Arc::new(WorkspaceFetcher),
            Arc::new(PrebuildFetcher),
            Arc::new(RegistryFetcher),
            Arc::new(TarballFetcher),
        ]))
    }

    pub fn resolve_context(&self, root: &Path, fetcher: Arc<dyn Fetcher>) -> ResolveContext {
        let resolver = MultiResolver::new(vec![
            Arc::new(WorkspaceResolver::new(root)),
            Arc::new(PrebuildResolver),
            Arc::new(RegistryResolver::new(self.registry.clone())),
        ]);
        ResolveContext {
            resolver: Arc::new(resolver),
            options: ResolveOptions {
                reporter: self.reporter.clone(),
                fetcher: Some(fetcher),
            },
            hooks: vec![Arc::new(PrebuildHook::new(self.host.clone()))],
            comparators: Comparators::default(),
        }
    }

    pub fn fetch_options(&self, root: &Path) -> FetchOptions {
        FetchOptions {
            cache: self.cache.clone(),
            registry: self.registry.clone(),
            transport: self.transport.clone(),
            settings: self.settings.clone(),
            host: self.host.clone(),
            project_root: root.to_path_buf(),
            packages: Arc::default(),
            checksums: Arc::default(),
            reporter: self.reporter.clone(),
        }
    }
}

/// Settings from `path`, else `~/.varia/settings.toml` if it exists, else
/// defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    if let Some(path) = path {
        return Settings::load(path).with_context(|| format!("Failed to load {}", path.display()));
    }
    match varia_core::default_settings_path().filter(|path| path.exists()) {
        Some(path) => Settings::load(&path).with_context(|| format!("Failed to load {}", path.display())),
        None => Ok(Settings::default()),
    }
}

/// The project directory for a directory or `package.json` argument.
pub fn project_root(manifest: &Path) -> PathBuf {
    if manifest.is_file() {
        manifest
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    } else {
        manifest.to_path_buf()
    }
}
