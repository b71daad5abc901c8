use dirs::home_dir;
use std::path::PathBuf;

/// Returns the varia home directory, or None if the user's home cannot be resolved.
pub fn try_varia_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("VARIA_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".varia"))
}

/// Default cache folder: ~/.varia/cache
pub fn default_cache_path() -> Option<PathBuf> {
    try_varia_home().map(|home| home.join("cache"))
}

/// Default settings file: ~/.varia/settings.toml
pub fn default_settings_path() -> Option<PathBuf> {
    try_varia_home().map(|home| home.join("settings.toml"))
}
