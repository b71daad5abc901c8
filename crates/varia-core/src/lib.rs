pub mod error;
pub mod fetch;
pub mod matrix;
pub mod paths;
pub mod platform;
pub mod policy;
pub mod prebuild;
pub mod prewarm;
pub mod project;
pub mod registry;
pub mod resolver;
pub mod settings;

pub mod reporter;

pub use error::{FetchError, Failure, RegistryDataError, ResolveError, WalkError};
pub use paths::*;
pub use platform::HostPlatform;
pub use policy::{AtLeast, Comparators, Exact, ParameterComparator, VariantMatch, resolve_variant};
pub use project::{DependencyHook, Project, ResolveContext, Resolution};
pub use reporter::{NullReporter, Reporter, TracingReporter};
pub use settings::Settings;

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("varia-core/", env!("CARGO_PKG_VERSION"));
