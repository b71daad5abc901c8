use async_trait::async_trait;
use std::path::PathBuf;

use varia_schema::{Descriptor, LinkType, Locator, Manifest, Package};

use super::{ResolveOptions, ResolvedDependencies, Resolver};
use crate::error::ResolveError;

pub const WORKSPACE_PROTOCOL: &str = "workspace:";

/// Resolves `workspace:<path>` against manifests under the project root.
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    root: PathBuf,
}

impl WorkspaceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn manifest_path(&self, reference: &str) -> PathBuf {
        let relative = reference.strip_prefix(WORKSPACE_PROTOCOL).unwrap_or(".");
        self.root.join(relative).join("package.json")
    }
}

#[async_trait]
impl Resolver for WorkspaceResolver {
    fn supports_descriptor(&self, descriptor: &Descriptor) -> bool {
        descriptor.range().starts_with(WORKSPACE_PROTOCOL)
    }

    fn supports_locator(&self, locator: &Locator) -> bool {
        locator.reference().starts_with(WORKSPACE_PROTOCOL)
    }

    async fn get_candidates(
        &self,
        descriptor: &Descriptor,
        _dependencies: &ResolvedDependencies,
        _options: &ResolveOptions,
    ) -> Result<Vec<Locator>, ResolveError> {
        Ok(vec![Locator::new(
            descriptor.ident().clone(),
            descriptor.range(),
        )])
    }

    async fn resolve(
        &self,
        locator: &Locator,
        _options: &ResolveOptions,
    ) -> Result<Package, ResolveError> {
        let path = self.manifest_path(locator.reference());
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(crate::error::FetchError::from)?;
        let manifest = Manifest::from_json(&text)?;
        // workspaces are used in place
        Ok(manifest
            .to_package(locator.clone())?
            .with_link_type(LinkType::Soft))
    }
}
