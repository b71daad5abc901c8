//! Read-only settings lookup.
//!
//! Settings are loaded once and passed explicitly into resolution, fetching
//! and synthesis. Nothing in the core reads configuration from global state.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use varia_schema::VariantMatrix;

use crate::paths::default_cache_path;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";
pub const DEFAULT_MIRROR_TEMPLATE: &str =
    "{mirror_url}/{tag_prefix}{version}/{name}-v{version}-{runtime}-v{abi}-{platform}{libc}-{arch}.tar.gz";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// String settings that a `[prebuild_scopes."@scope"]` table may shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    PrebuildTagPrefix,
    PrebuildHostMirrorUrl,
    PrebuildHostMirrorTemplate,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheParameters {
    /// Parameter space to pre-populate the cache with.
    pub matrix: VariantMatrix,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    pub prebuild_tag_prefix: Option<String>,
    pub prebuild_host_mirror_url: Option<String>,
    pub prebuild_host_mirror_template: Option<String>,
}

impl ScopeSettings {
    fn get(&self, key: SettingKey) -> Option<&str> {
        match key {
            SettingKey::PrebuildTagPrefix => self.prebuild_tag_prefix.as_deref(),
            SettingKey::PrebuildHostMirrorUrl => self.prebuild_host_mirror_url.as_deref(),
            SettingKey::PrebuildHostMirrorTemplate => {
                self.prebuild_host_mirror_template.as_deref()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub registry: String,
    pub cache_folder: Option<PathBuf>,
    /// Fail on cache misses instead of populating.
    pub immutable_cache: bool,
    /// Recompute checksums of cache hits.
    pub check_cache: bool,
    pub cache_parameters: CacheParameters,
    pub prebuild_tag_prefix: String,
    pub prebuild_host_mirror_url: Option<String>,
    pub prebuild_host_mirror_template: String,
    /// ABI of the host node runtime.
    pub node_abi: u32,
    pub prebuild_scopes: BTreeMap<String, ScopeSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            cache_folder: None,
            immutable_cache: false,
            check_cache: false,
            cache_parameters: CacheParameters::default(),
            prebuild_tag_prefix: "v".to_string(),
            prebuild_host_mirror_url: None,
            prebuild_host_mirror_template: DEFAULT_MIRROR_TEMPLATE.to_string(),
            node_abi: 115,
            prebuild_scopes: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| SettingsError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Global value of `key`.
    pub fn get(&self, key: SettingKey) -> Option<&str> {
        match key {
            SettingKey::PrebuildTagPrefix => Some(&self.prebuild_tag_prefix),
            SettingKey::PrebuildHostMirrorUrl => self.prebuild_host_mirror_url.as_deref(),
            SettingKey::PrebuildHostMirrorTemplate => Some(&self.prebuild_host_mirror_template),
        }
    }

    /// Value of `key` for a package in `scope` (without `@`).
    ///
    /// A non-empty value in the scope's table wins; otherwise the global
    /// value is returned. Scope tables may be keyed `@scope` or `scope`.
    pub fn get_scoped(&self, scope: Option<&str>, key: SettingKey) -> Option<&str> {
        let scoped = scope.and_then(|scope| {
            self.prebuild_scopes
                .get(&format!("@{scope}"))
                .or_else(|| self.prebuild_scopes.get(scope))
        });

        match scoped.and_then(|table| table.get(key)) {
            Some(value) if !value.is_empty() => Some(value),
            _ => self.get(key),
        }
    }

    /// The cache folder, falling back to `$VARIA_HOME/cache`.
    pub fn cache_folder(&self) -> Option<PathBuf> {
        self.cache_folder.clone().or_else(default_cache_path)
    }
}
