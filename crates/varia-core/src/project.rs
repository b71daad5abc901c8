//! The graph walker.
//!
//! [`Project::resolve`] starts at the root manifest and resolves dependency
//! edges level by level, each level concurrently. Every edge passes through
//! the dependency hooks and the resolver's binding before resolution. When
//! the resolved package declares `variants`, the edge is rewritten to the
//! variant the consumer's `dependenciesMeta` parameters select.
//!
//! A failed branch never stores anything; the walk keeps going and reports
//! every failure at the end.

use futures::future::{BoxFuture, join_all};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use varia_schema::{
    Checksum, Descriptor, DescriptorHash, Ident, Locator, LocatorHash, Manifest, Package,
    VariantParameters,
};

use crate::error::{FetchError, Failure, ResolveError, WalkError};
use crate::fetch::{FetchOptions, FetchResult, Fetcher};
use crate::policy::{Comparators, resolve_variant};
use crate::reporter::Reporter;
use crate::resolver::workspace::WORKSPACE_PROTOCOL;
use crate::resolver::{ResolveOptions, ResolvedDependencies, Resolver};

/// Rewrites a dependency edge before it is bound and resolved.
pub trait DependencyHook: Send + Sync {
    fn reduce(&self, dependency: Descriptor, parent: &Package) -> Descriptor;
}

/// Everything a walk needs. Nothing is read from ambient state.
#[derive(Clone)]
pub struct ResolveContext {
    pub resolver: Arc<dyn Resolver>,
    pub options: ResolveOptions,
    pub hooks: Vec<Arc<dyn DependencyHook>>,
    pub comparators: Comparators,
}

/// How a descriptor was resolved.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub descriptor: Descriptor,
    pub locator: Locator,
    pub persist: bool,
}

/// One package produced by [`resolve_descriptor`].
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub(crate) descriptor: Descriptor,
    pub(crate) locator: Locator,
    pub(crate) package: Package,
    pub(crate) persist: bool,
}

struct Edge {
    parent: LocatorHash,
    key: DescriptorHash,
    descriptor: Descriptor,
}

pub struct Project {
    root: PathBuf,
    manifest: Manifest,
    packages: IndexMap<LocatorHash, Package>,
    resolutions: IndexMap<DescriptorHash, Resolution>,
    /// Packages declaring variants, keyed by the descriptor that reached them.
    variant_sources: IndexMap<DescriptorHash, Package>,
    checksums: HashMap<LocatorHash, Checksum>,
}

impl Project {
    /// Read `<root>/package.json`.
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self, ResolveError> {
        let root = root.into();
        let text = tokio::fs::read_to_string(root.join("package.json"))
            .await
            .map_err(FetchError::from)?;
        Ok(Self::from_manifest(root, Manifest::from_json(&text)?))
    }

    pub fn from_manifest(root: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            root: root.into(),
            manifest,
            packages: IndexMap::new(),
            resolutions: IndexMap::new(),
            variant_sources: IndexMap::new(),
            checksums: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// `<name>@workspace:.`; unnamed projects are called `root`.
    pub fn root_descriptor(&self) -> Descriptor {
        let ident = self
            .manifest
            .name
            .clone()
            .unwrap_or_else(|| Ident::new(None, "root"));
        Descriptor::new(ident, format!("{WORKSPACE_PROTOCOL}."))
    }

    /// Resolved packages in discovery order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn package(&self, locator: &Locator) -> Option<&Package> {
        self.packages.get(locator.hash())
    }

    /// The locator a descriptor resolved to.
    pub fn resolution(&self, descriptor: &Descriptor) -> Option<&Locator> {
        self.resolutions
            .get(descriptor.hash())
            .map(|resolution| &resolution.locator)
    }

    /// Packages whose dependents were rewritten to one of their variants.
    pub fn variant_sources(&self) -> impl Iterator<Item = &Package> {
        self.variant_sources.values()
    }

    pub fn checksums(&self) -> &HashMap<LocatorHash, Checksum> {
        &self.checksums
    }

    /// Resolutions that belong in durable lock state.
    pub fn persisted_resolutions(&self) -> impl Iterator<Item = &Resolution> {
        self.resolutions.values().filter(|resolution| resolution.persist)
    }

    /// Walk the dependency graph from the root manifest.
    pub async fn resolve(&mut self, context: &ResolveContext) -> Result<(), WalkError> {
        let reporter = context.options.reporter.as_ref();
        reporter.section("Resolution");

        let mut failures = Vec::new();
        let root = self.root_descriptor();
        let mut frontier = match resolve_descriptor(context, root.clone(), Vec::new()).await {
            Ok(resolved) => self.store(resolved, true),
            Err(error) => {
                record(&mut failures, reporter, root.to_string(), error);
                Vec::new()
            }
        };

        while !frontier.is_empty() {
            frontier = self.resolve_level(context, &frontier, &mut failures).await;
        }

        tracing::debug!(
            packages = self.packages.len(),
            failures = failures.len(),
            "resolution finished"
        );
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WalkError { failures })
        }
    }

    /// Resolve every edge out of `parents`. Returns the packages first seen
    /// at this level.
    async fn resolve_level(
        &mut self,
        context: &ResolveContext,
        parents: &[LocatorHash],
        failures: &mut Vec<Failure>,
    ) -> Vec<LocatorHash> {
        let reporter = context.options.reporter.as_ref();

        let mut edges = Vec::new();
        for parent_hash in parents {
            let Some(parent) = self.packages.get(parent_hash) else {
                continue;
            };
            for (key, dependency) in parent.dependencies() {
                let reduced = context
                    .hooks
                    .iter()
                    .fold(dependency.clone(), |dependency, hook| hook.reduce(dependency, parent));
                edges.push(Edge {
                    parent: parent_hash.clone(),
                    key: key.clone(),
                    descriptor: context.resolver.bind_descriptor(reduced, parent.locator()),
                });
            }
        }

        let pending: Vec<Descriptor> = unique(edges.iter().map(|edge| &edge.descriptor))
            .filter(|descriptor| !self.is_known(descriptor))
            .collect();
        let (mut added, mut failed) = self.resolve_batch(context, pending, false, failures).await;

        // variant selection per edge
        let mut targets: Vec<Option<Descriptor>> = Vec::with_capacity(edges.len());
        for edge in &edges {
            if failed.contains(edge.descriptor.hash()) {
                targets.push(None);
                continue;
            }
            let Some(source) = self.variant_sources.get(edge.descriptor.hash()) else {
                targets.push(Some(edge.descriptor.clone()));
                continue;
            };
            let Some(parent) = self.packages.get(&edge.parent) else {
                targets.push(None);
                continue;
            };

            let parameters = consumer_parameters(parent, edge.descriptor.ident());
            let definitions = source.variants().unwrap_or_default();
            match resolve_variant(definitions, &parameters, &context.comparators) {
                Ok(Some(selected)) => {
                    tracing::debug!(
                        from = %edge.descriptor,
                        to = %selected.descriptor,
                        definition = selected.index,
                        "variant selected"
                    );
                    targets.push(Some(
                        context.resolver.bind_descriptor(selected.descriptor, parent.locator()),
                    ));
                }
                Ok(None) => {
                    let error = ResolveError::NoVariantMatch {
                        descriptor: edge.descriptor.to_string(),
                        parameters,
                    };
                    record(failures, reporter, edge.descriptor.to_string(), error);
                    targets.push(None);
                }
                Err(error) => {
                    record(failures, reporter, edge.descriptor.to_string(), error);
                    targets.push(None);
                }
            }
        }

        let pending: Vec<Descriptor> = unique(targets.iter().flatten())
            .filter(|descriptor| !self.resolutions.contains_key(descriptor.hash()))
            .collect();
        let (variants_added, variants_failed) = self.resolve_batch(context, pending, true, failures).await;
        added.extend(variants_added);
        failed.extend(variants_failed);

        // parents record the descriptor their edge finally resolved through
        for (edge, target) in edges.iter().zip(targets) {
            let Some(target) = target.filter(|target| !failed.contains(target.hash())) else {
                continue;
            };
            let Some(parent) = self.packages.get(&edge.parent) else {
                continue;
            };
            if parent.dependencies().get(&edge.key) != Some(&target) {
                let rewritten = parent.with_dependency_replaced(&edge.key, target);
                self.packages.insert(edge.parent.clone(), rewritten);
            }
        }

        added
    }

    /// Resolve `descriptors` concurrently and store every success.
    async fn resolve_batch(
        &mut self,
        context: &ResolveContext,
        descriptors: Vec<Descriptor>,
        variant_targets: bool,
        failures: &mut Vec<Failure>,
    ) -> (Vec<LocatorHash>, HashSet<DescriptorHash>) {
        let outcomes = join_all(
            descriptors
                .iter()
                .map(|descriptor| resolve_descriptor(context, descriptor.clone(), Vec::new())),
        )
        .await;

        let mut added = Vec::new();
        let mut failed = HashSet::new();
        for (descriptor, outcome) in descriptors.into_iter().zip(outcomes) {
            match outcome {
                Ok(resolved) => added.extend(self.store(resolved, variant_targets)),
                Err(error) => {
                    failed.insert(descriptor.hash().clone());
                    record(failures, context.options.reporter.as_ref(), descriptor.to_string(), error);
                }
            }
        }
        (added, failed)
    }

    /// Insert a resolved chain. A package declaring variants is kept aside
    /// as a variant source unless it is itself a variant target.
    fn store(&mut self, resolved: Vec<Resolved>, variant_targets: bool) -> Vec<LocatorHash> {
        let mut added = Vec::new();
        for Resolved {
            descriptor,
            locator,
            package,
            persist,
        } in resolved
        {
            if !variant_targets && package.variants().is_some() {
                self.variant_sources.insert(descriptor.hash().clone(), package);
                continue;
            }

            if !self.packages.contains_key(locator.hash()) {
                added.push(locator.hash().clone());
                self.packages.insert(locator.hash().clone(), package);
            }
            self.resolutions.insert(
                descriptor.hash().clone(),
                Resolution {
                    descriptor,
                    locator,
                    persist,
                },
            );
        }
        added
    }

    fn is_known(&self, descriptor: &Descriptor) -> bool {
        self.resolutions.contains_key(descriptor.hash())
            || self.variant_sources.contains_key(descriptor.hash())
    }

    /// Fetch every resolved package, recording checksums.
    pub async fn fetch_all(
        &mut self,
        fetcher: &dyn Fetcher,
        options: &FetchOptions,
    ) -> Result<Vec<(Locator, FetchResult)>, WalkError> {
        let reporter = options.reporter.as_ref();
        reporter.section("Fetch");

        let options = FetchOptions {
            packages: Arc::new(self.packages.values().cloned().collect()),
            checksums: Arc::new(self.checksums.clone()),
            ..options.clone()
        };
        let locators: Vec<Locator> = self
            .packages
            .values()
            .map(|pkg| pkg.locator().clone())
            .collect();
        let outcomes = join_all(locators.iter().map(|locator| fetcher.fetch(locator, &options))).await;

        let mut fetched = Vec::new();
        let mut failures = Vec::new();
        for (locator, outcome) in locators.into_iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    if let Some(checksum) = &result.checksum {
                        self.checksums.insert(locator.hash().clone(), checksum.clone());
                    }
                    fetched.push((locator, result));
                }
                Err(error) => record(&mut failures, reporter, locator.to_string(), error),
            }
        }

        if failures.is_empty() {
            Ok(fetched)
        } else {
            Err(WalkError { failures })
        }
    }
}

/// Resolve `descriptor` and, first, its declared resolution dependencies.
///
/// The returned chain ends with `descriptor`'s own resolution. `chain`
/// holds the descriptors currently being resolved above this one.
pub(crate) fn resolve_descriptor(
    context: &ResolveContext,
    descriptor: Descriptor,
    mut chain: Vec<String>,
) -> BoxFuture<'_, Result<Vec<Resolved>, ResolveError>> {
    Box::pin(async move {
        chain.push(descriptor.to_string());

        let mut resolved = Vec::new();
        let mut dependencies = ResolvedDependencies::new();
        for dependency in context.resolver.get_resolution_dependencies(&descriptor) {
            let name = dependency.to_string();
            if chain.contains(&name) {
                let mut cycle = chain.clone();
                cycle.push(name);
                return Err(ResolveError::ResolutionCycle { cycle });
            }

            let mut resolved_dependency = resolve_descriptor(context, dependency.clone(), chain.clone()).await?;
            if let Some(last) = resolved_dependency.last() {
                dependencies.insert(dependency.hash().clone(), last.package.clone());
            }
            resolved.append(&mut resolved_dependency);
        }

        let candidates = context
            .resolver
            .get_candidates(&descriptor, &dependencies, &context.options)
            .await?;
        let locator = candidates
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NoCandidates(descriptor.to_string()))?;
        let package = context.resolver.resolve(&locator, &context.options).await?;
        let persist = context.resolver.should_persist_resolution(&locator);
        tracing::trace!(%descriptor, %locator, persist, "resolved");

        resolved.push(Resolved {
            descriptor,
            locator,
            package,
            persist,
        });
        Ok(resolved)
    })
}

/// `dependenciesMeta.<name>.parameters` of `parent`, empty if absent.
fn consumer_parameters(parent: &Package, dependency: &Ident) -> VariantParameters {
    parent
        .dependencies_meta()
        .get(&dependency.to_string())
        .and_then(|meta| meta.parameters.clone())
        .unwrap_or_default()
}

/// First occurrence of each descriptor, in order.
fn unique<'a>(descriptors: impl Iterator<Item = &'a Descriptor>) -> impl Iterator<Item = Descriptor> {
    let mut seen = HashSet::new();
    descriptors
        .filter(move |descriptor| seen.insert(descriptor.hash().clone()))
        .cloned()
}

fn record(failures: &mut Vec<Failure>, reporter: &dyn Reporter, subject: String, error: ResolveError) {
    reporter.failed(&subject, &error.to_string());
    failures.push(Failure { subject, error });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NullReporter;
    use async_trait::async_trait;
    use varia_schema::{DependencyMeta, PackageVersion, VariantDefinition, VariantMatrix};

    /// Resolves `fixed:` descriptors from an in-memory table of packages.
    #[derive(Default)]
    struct TableResolver {
        packages: HashMap<String, Package>,
        requires: HashMap<String, Vec<Descriptor>>,
    }

    impl TableResolver {
        fn with(mut self, package: Package) -> Self {
            self.packages.insert(package.locator().to_string(), package);
            self
        }

        fn requiring(mut self, descriptor: &str, dependencies: &[&str]) -> Self {
            self.requires.insert(
                descriptor.to_string(),
                dependencies.iter().map(|d| Descriptor::parse(d).unwrap()).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl Resolver for TableResolver {
        fn supports_descriptor(&self, _: &Descriptor) -> bool {
            true
        }
        fn supports_locator(&self, _: &Locator) -> bool {
            true
        }
        fn should_persist_resolution(&self, locator: &Locator) -> bool {
            !locator.reference().starts_with("temp:")
        }
        fn get_resolution_dependencies(&self, descriptor: &Descriptor) -> Vec<Descriptor> {
            self.requires.get(&descriptor.to_string()).cloned().unwrap_or_default()
        }
        async fn get_candidates(
            &self,
            descriptor: &Descriptor,
            _: &ResolvedDependencies,
            _: &ResolveOptions,
        ) -> Result<Vec<Locator>, ResolveError> {
            let locator = Locator::new(descriptor.ident().clone(), descriptor.range());
            if self.packages.contains_key(&locator.to_string()) {
                Ok(vec![locator])
            } else {
                Ok(Vec::new())
            }
        }
        async fn resolve(&self, locator: &Locator, _: &ResolveOptions) -> Result<Package, ResolveError> {
            self.packages
                .get(&locator.to_string())
                .cloned()
                .ok_or_else(|| ResolveError::UnsupportedLocator(locator.to_string()))
        }
    }

    struct Rename;

    impl DependencyHook for Rename {
        fn reduce(&self, dependency: Descriptor, _parent: &Package) -> Descriptor {
            if dependency.ident().name() == "placeholder" {
                Descriptor::parse("real@fixed:1").unwrap()
            } else {
                dependency
            }
        }
    }

    fn pkg(locator: &str, dependencies: &[&str]) -> Package {
        dependencies.iter().fold(
            Package::builder(Locator::parse(locator).unwrap(), PackageVersion::Known("1.0.0".into())),
            |builder, d| builder.dependency(Descriptor::parse(d).unwrap()),
        )
        .build()
    }

    fn context(resolver: TableResolver) -> ResolveContext {
        ResolveContext {
            resolver: Arc::new(resolver),
            options: ResolveOptions {
                reporter: Arc::new(NullReporter),
                fetcher: None,
            },
            hooks: vec![Arc::new(Rename)],
            comparators: Comparators::default(),
        }
    }

    fn project(dependencies: &[&str]) -> (Project, Package) {
        let manifest = Manifest {
            name: Some(Ident::parse("app").unwrap()),
            ..Manifest::default()
        };
        let project = Project::from_manifest("/nonexistent", manifest);
        let root = pkg(&project.root_descriptor().to_string(), dependencies);
        (project, root)
    }

    fn names(project: &Project) -> Vec<String> {
        let mut names: Vec<_> = project.packages().map(|p| p.locator().to_string()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn walks_levels_and_dedups() {
        let (mut project, root) = project(&["a@fixed:1", "b@fixed:1"]);
        let resolver = TableResolver::default()
            .with(root)
            .with(pkg("a@fixed:1", &["c@fixed:1"]))
            .with(pkg("b@fixed:1", &["c@fixed:1"]))
            .with(pkg("c@fixed:1", &[]));
        let context = context(resolver);

        project.resolve(&context).await.unwrap();
        assert_eq!(
            names(&project),
            vec!["a@fixed:1", "app@workspace:.", "b@fixed:1", "c@fixed:1"]
        );
        assert_eq!(project.persisted_resolutions().count(), 4);
    }

    #[tokio::test]
    async fn hooks_rewrite_edges_before_resolution() {
        let (mut project, root) = project(&["placeholder@*"]);
        let resolver = TableResolver::default().with(root).with(pkg("real@fixed:1", &[]));
        let context = context(resolver);

        project.resolve(&context).await.unwrap();
        let root = project.package(&Locator::parse("app@workspace:.").unwrap()).unwrap();
        let deps: Vec<_> = root.dependencies().values().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["real@fixed:1"]);
    }

    #[tokio::test]
    async fn failures_are_collected_and_nothing_partial_is_stored() {
        let (mut project, root) = project(&["missing@fixed:1", "ok@fixed:1", "other@fixed:1"]);
        let resolver = TableResolver::default()
            .with(root)
            .with(pkg("ok@fixed:1", &[]))
            .with(pkg("dep@fixed:1", &[]))
            .requiring("other@fixed:1", &["dep@fixed:1"]);
        let context = context(resolver);

        let err = project.resolve(&context).await.unwrap_err();
        assert_eq!(err.failures.len(), 2);
        assert!(err.failures.iter().all(|f| matches!(f.error, ResolveError::NoCandidates(_))));

        // `dep` resolved only as part of the failed `other` branch
        assert_eq!(names(&project), vec!["app@workspace:.", "ok@fixed:1"]);
    }

    #[tokio::test]
    async fn resolution_dependencies_resolve_first() {
        let (mut project, root) = project(&["late@fixed:1"]);
        let resolver = TableResolver::default()
            .with(root)
            .with(pkg("late@fixed:1", &[]))
            .with(pkg("early@temp:1", &[]))
            .requiring("late@fixed:1", &["early@temp:1"]);
        let context = context(resolver);

        project.resolve(&context).await.unwrap();
        assert!(names(&project).contains(&"early@temp:1".to_string()));
        let persisted: Vec<_> = project
            .persisted_resolutions()
            .map(|r| r.locator.to_string())
            .collect();
        assert!(!persisted.contains(&"early@temp:1".to_string()));
    }

    #[tokio::test]
    async fn resolution_cycles_are_reported() {
        let (mut project, root) = project(&["x@fixed:1"]);
        let resolver = TableResolver::default()
            .with(root)
            .with(pkg("x@fixed:1", &[]))
            .with(pkg("y@fixed:1", &[]))
            .requiring("x@fixed:1", &["y@fixed:1"])
            .requiring("y@fixed:1", &["x@fixed:1"]);
        let context = context(resolver);

        let err = project.resolve(&context).await.unwrap_err();
        let ResolveError::ResolutionCycle { cycle } = &err.failures[0].error else {
            panic!("expected a cycle, got {:?}", err.failures[0].error);
        };
        assert_eq!(cycle, &["x@fixed:1", "y@fixed:1", "x@fixed:1"]);
    }

    fn variant_source() -> Package {
        let matrix = VariantMatrix::new().with_axis("par1", ["a", "b"]);
        Package::builder(
            Locator::parse("lib@fixed:1").unwrap(),
            PackageVersion::Known("1.0.0".into()),
        )
        .variants(vec![VariantDefinition::Matrix {
            pattern: "lib-%par1@fixed:1".into(),
            matrix,
            exclude: Vec::new(),
        }])
        .build()
    }

    fn consumer(root: Package, parameters: Option<VariantParameters>) -> Package {
        let builder = Package::builder(root.locator().clone(), root.version().clone())
            .dependency(Descriptor::parse("lib@fixed:1").unwrap());
        match parameters {
            Some(parameters) => builder
                .dependency_meta(
                    "lib",
                    DependencyMeta {
                        parameters: Some(parameters),
                    },
                )
                .build(),
            None => builder.build(),
        }
    }

    #[tokio::test]
    async fn variants_rewrite_the_consumer_edge() {
        let (mut project, root) = project(&[]);
        let root = consumer(root, Some(VariantParameters::new().with("par1", "b")));
        let resolver = TableResolver::default()
            .with(root)
            .with(variant_source())
            .with(pkg("lib-b@fixed:1", &[]));
        let context = context(resolver);

        project.resolve(&context).await.unwrap();
        assert_eq!(names(&project), vec!["app@workspace:.", "lib-b@fixed:1"]);
        assert_eq!(project.variant_sources().count(), 1);

        let root = project.package(&Locator::parse("app@workspace:.").unwrap()).unwrap();
        let deps: Vec<_> = root.dependencies().values().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["lib-b@fixed:1"]);
    }

    #[tokio::test]
    async fn no_variant_match_fails_the_edge() {
        let (mut project, root) = project(&[]);
        let root = consumer(root, None);
        let resolver = TableResolver::default().with(root).with(variant_source());
        let context = context(resolver);

        let err = project.resolve(&context).await.unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert!(matches!(err.failures[0].error, ResolveError::NoVariantMatch { .. }));
        assert_eq!(names(&project), vec!["app@workspace:."]);
    }
}
