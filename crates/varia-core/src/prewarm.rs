//! Cache pre-warming.
//!
//! Consumers with different parameters can share one cache folder. Running
//! the variant policy over every combination of the configured
//! `cache_parameters.matrix` fetches each reachable variant up front, so
//! later installs hit the cache whichever variant they select.

use futures::future::join_all;
use indexmap::IndexMap;
use std::sync::Arc;

use varia_schema::{Descriptor, DescriptorHash, Locator};

use crate::error::{Failure, ResolveError};
use crate::fetch::{FetchOptions, Fetcher};
use crate::matrix::expand;
use crate::policy::resolve_variant;
use crate::project::{Project, ResolveContext, resolve_descriptor};

#[derive(Debug, Default)]
pub struct PrewarmReport {
    /// Variant packages now present in the cache.
    pub fetched: Vec<Locator>,
    /// Combinations no definition accepted.
    pub skipped: usize,
    pub failures: Vec<Failure>,
}

/// Fetch every variant the cache parameter matrix can select.
pub async fn prewarm(
    project: &Project,
    context: &ResolveContext,
    fetcher: &dyn Fetcher,
    options: &FetchOptions,
) -> PrewarmReport {
    let mut report = PrewarmReport::default();
    let combinations = expand(&options.settings.cache_parameters.matrix, &[]);
    if combinations.is_empty() {
        return report;
    }
    options.reporter.section("Cache pre-warm");

    let mut descriptors: IndexMap<DescriptorHash, Descriptor> = IndexMap::new();
    for source in project.variant_sources() {
        let definitions = source.variants().unwrap_or_default();
        for combination in &combinations {
            match resolve_variant(definitions, combination, &context.comparators) {
                Ok(Some(selected)) => {
                    descriptors
                        .entry(selected.descriptor.hash().clone())
                        .or_insert(selected.descriptor);
                }
                Ok(None) => {
                    tracing::debug!(package = %source.locator(), ?combination, "no variant for combination");
                    report.skipped += 1;
                }
                Err(error) => report.failures.push(Failure {
                    subject: source.locator().to_string(),
                    error,
                }),
            }
        }
    }

    let resolved = join_all(
        descriptors
            .values()
            .map(|descriptor| resolve_descriptor(context, descriptor.clone(), Vec::new())),
    )
    .await;

    let mut locators = Vec::new();
    for (descriptor, outcome) in descriptors.values().zip(resolved) {
        match outcome.and_then(|chain| {
            chain
                .into_iter()
                .last()
                .map(|resolved| resolved.locator)
                .ok_or_else(|| ResolveError::NoCandidates(descriptor.to_string()))
        }) {
            Ok(locator) => locators.push(locator),
            Err(error) => report.failures.push(Failure {
                subject: descriptor.to_string(),
                error,
            }),
        }
    }

    let options = FetchOptions {
        packages: Arc::new(project.packages().cloned().collect()),
        ..options.clone()
    };
    let fetched = join_all(locators.iter().map(|locator| fetcher.fetch(locator, &options))).await;
    for (locator, outcome) in locators.into_iter().zip(fetched) {
        match outcome {
            // handles are released on drop
            Ok(_) => report.fetched.push(locator),
            Err(error) => {
                options.reporter.failed(&locator.to_string(), &error.to_string());
                report.failures.push(Failure {
                    subject: locator.to_string(),
                    error,
                });
            }
        }
    }

    tracing::info!(
        fetched = report.fetched.len(),
        skipped = report.skipped,
        failed = report.failures.len(),
        "cache pre-warm finished"
    );
    report
}
