//! The resolver protocol.
//!
//! The graph walker drives every descriptor through the same stages:
//! applicability, binding, resolution dependencies, candidates, resolution,
//! and finally the persistence decision. Each protocol (`npm:`,
//! `workspace:`, `prebuild:`) implements [`Resolver`]; [`MultiResolver`]
//! routes each stage to the first resolver that claims the input.

pub mod registry;
pub mod workspace;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use varia_schema::{Descriptor, DescriptorHash, Locator, Package};

use crate::error::ResolveError;
use crate::fetch::Fetcher;
use crate::reporter::Reporter;

pub use registry::RegistryResolver;
pub use workspace::WorkspaceResolver;

/// Packages already resolved for a descriptor's declared resolution
/// dependencies, keyed by the dependency's descriptor hash.
pub type ResolvedDependencies = HashMap<DescriptorHash, Package>;

#[derive(Clone)]
pub struct ResolveOptions {
    pub reporter: Arc<dyn Reporter>,
    /// Resolvers whose packages only exist once fetched require this.
    pub fetcher: Option<Arc<dyn Fetcher>>,
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Cheap syntactic check. Must not fail or have side effects.
    fn supports_descriptor(&self, descriptor: &Descriptor) -> bool;

    fn supports_locator(&self, locator: &Locator) -> bool;

    /// Whether a resolution should be written to durable lock state.
    fn should_persist_resolution(&self, _locator: &Locator) -> bool {
        true
    }

    /// Specialize `descriptor` for the package that depends on it.
    fn bind_descriptor(&self, descriptor: Descriptor, _from: &Locator) -> Descriptor {
        descriptor
    }

    /// Descriptors that must be resolved before `descriptor` can be.
    fn get_resolution_dependencies(&self, _descriptor: &Descriptor) -> Vec<Descriptor> {
        Vec::new()
    }

    /// Candidate locators, best first.
    async fn get_candidates(
        &self,
        descriptor: &Descriptor,
        dependencies: &ResolvedDependencies,
        options: &ResolveOptions,
    ) -> Result<Vec<Locator>, ResolveError>;

    /// The full package record for `locator`. Dependencies stay descriptors.
    async fn resolve(&self, locator: &Locator, options: &ResolveOptions)
    -> Result<Package, ResolveError>;
}

/// Routes each stage to the first resolver that supports its input.
#[derive(Default)]
pub struct MultiResolver {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl MultiResolver {
    pub fn new(resolvers: Vec<Arc<dyn Resolver>>) -> Self {
        Self { resolvers }
    }

    fn for_descriptor(&self, descriptor: &Descriptor) -> Option<&Arc<dyn Resolver>> {
        self.resolvers
            .iter()
            .find(|resolver| resolver.supports_descriptor(descriptor))
    }

    fn for_locator(&self, locator: &Locator) -> Option<&Arc<dyn Resolver>> {
        self.resolvers
            .iter()
            .find(|resolver| resolver.supports_locator(locator))
    }
}

#[async_trait]
impl Resolver for MultiResolver {
    fn supports_descriptor(&self, descriptor: &Descriptor) -> bool {
        self.for_descriptor(descriptor).is_some()
    }

    fn supports_locator(&self, locator: &Locator) -> bool {
        self.for_locator(locator).is_some()
    }

    fn should_persist_resolution(&self, locator: &Locator) -> bool {
        self.for_locator(locator)
            .is_some_and(|resolver| resolver.should_persist_resolution(locator))
    }

    fn bind_descriptor(&self, descriptor: Descriptor, from: &Locator) -> Descriptor {
        match self.for_descriptor(&descriptor) {
            Some(resolver) => resolver.bind_descriptor(descriptor, from),
            None => descriptor,
        }
    }

    fn get_resolution_dependencies(&self, descriptor: &Descriptor) -> Vec<Descriptor> {
        self.for_descriptor(descriptor)
            .map(|resolver| resolver.get_resolution_dependencies(descriptor))
            .unwrap_or_default()
    }

    async fn get_candidates(
        &self,
        descriptor: &Descriptor,
        dependencies: &ResolvedDependencies,
        options: &ResolveOptions,
    ) -> Result<Vec<Locator>, ResolveError> {
        let resolver = self
            .for_descriptor(descriptor)
            .ok_or_else(|| ResolveError::UnsupportedDescriptor(descriptor.to_string()))?;
        resolver.get_candidates(descriptor, dependencies, options).await
    }

    async fn resolve(
        &self,
        locator: &Locator,
        options: &ResolveOptions,
    ) -> Result<Package, ResolveError> {
        let resolver = self
            .for_locator(locator)
            .ok_or_else(|| ResolveError::UnsupportedLocator(locator.to_string()))?;
        resolver.resolve(locator, options).await
    }
}
