//! Fetch command

use anyhow::Result;
use std::path::Path;

use varia_core::Project;
use varia_core::prewarm::prewarm;

use crate::context::{Context, project_root};

/// Resolve, fetch everything and pre-warm configured variants
pub async fn fetch(ctx: &Context, manifest: &Path) -> Result<()> {
    let root = project_root(manifest);
    let mut project = Project::load(&root).await?;
    let fetcher = ctx.fetcher();
    let resolve_context = ctx.resolve_context(&root, fetcher.clone());
    project.resolve(&resolve_context).await?;

    let options = ctx.fetch_options(&root);
    let fetched = project.fetch_all(fetcher.as_ref(), &options).await?;
    for (locator, result) in &fetched {
        tracing::debug!(%locator, path = %result.package_fs.root().display(), "fetched");
    }

    let report = prewarm(&project, &resolve_context, fetcher.as_ref(), &options).await;
    for failure in &report.failures {
        tracing::warn!(subject = %failure.subject, "pre-warm failed: {}", failure.error);
    }
    if !report.fetched.is_empty() {
        println!("Pre-warmed {} variant(s)", report.fetched.len());
    }

    println!("{}", ctx.reporter.summary());
    Ok(())
}
