use varia_schema::{Descriptor, Package};

use super::{BINDINGS, PROTOCOL, PrebuildSpec};
use crate::platform::HostPlatform;
use crate::project::DependencyHook;

/// Rewrites `bindings` edges into host-specific `prebuild:` descriptors.
#[derive(Debug, Clone)]
pub struct PrebuildHook {
    host: HostPlatform,
}

impl PrebuildHook {
    pub fn new(host: HostPlatform) -> Self {
        Self { host }
    }
}

impl DependencyHook for PrebuildHook {
    fn reduce(&self, dependency: Descriptor, parent: &Package) -> Descriptor {
        let ident = dependency.ident();
        if ident.scope().is_some() || ident.name() != BINDINGS || dependency.range().starts_with(PROTOCOL) {
            return dependency;
        }

        let spec = PrebuildSpec::new(
            parent.locator().ident().clone(),
            &self.host.platform,
            &self.host.arch,
        );
        tracing::trace!(parent = %parent.locator(), range = %spec.range(), "rewriting bindings dependency");
        dependency.with_range(spec.range())
    }
}
