//! varia - variant-aware package resolution
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Resolves a project's dependency graph, rewrites dependencies to the
//! variant their consumer's parameters select, and fetches everything into
//! a content-addressed cache.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.varia/
//! ├── settings.toml   # Optional settings
//! └── cache/          # <locator slug>-<checksum> entries
//! ```

pub mod cmd;
pub mod context;

pub use varia_core::paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "varia")]
#[command(author, version, about = "varia - variant-aware package resolution")]
pub struct Cli {
    /// Settings file (defaults to ~/.varia/settings.toml when present)
    #[arg(long, global = true, env = "VARIA_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Cache folder, overriding the settings
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve the dependency graph of a project
    Resolve {
        /// Project directory or its package.json
        #[arg(default_value = ".")]
        manifest: PathBuf,
    },
    /// Resolve, then fetch every package into the cache
    Fetch {
        /// Project directory or its package.json
        #[arg(default_value = ".")]
        manifest: PathBuf,
    },
    /// Select a variant of a package from its own manifest
    Variant {
        /// Directory or package.json declaring `variants`
        manifest: PathBuf,
        /// Consumer parameter, repeatable: -p key=value
        #[arg(short = 'p', long = "param", value_parser = parse_parameter)]
        parameters: Vec<(String, String)>,
    },
    /// Inspect the fetch cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// List cache entries
    List,
}

/// Parse a `key=value` pair.
///
/// # Example
///
/// ```
/// use varia_cli::parse_parameter;
///
/// assert_eq!(parse_parameter("abi=115").unwrap(), ("abi".into(), "115".into()));
/// assert!(parse_parameter("abi").is_err());
/// ```
pub fn parse_parameter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
