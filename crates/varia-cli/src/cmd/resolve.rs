//! Resolve command

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

use varia_core::Project;

use crate::context::{Context, project_root};

/// Walk the dependency graph and print one row per package
pub async fn resolve(ctx: &Context, manifest: &Path) -> Result<()> {
    let root = project_root(manifest);
    let mut project = Project::load(&root).await?;
    let resolve_context = ctx.resolve_context(&root, ctx.fetcher());
    project.resolve(&resolve_context).await?;

    print_packages(&project);
    Ok(())
}

fn print_packages(project: &Project) {
    let persisted: HashSet<_> = project
        .persisted_resolutions()
        .map(|resolution| resolution.locator.clone())
        .collect();

    let width = project
        .packages()
        .map(|pkg| pkg.locator().to_string().len())
        .max()
        .unwrap_or(0);
    for pkg in project.packages() {
        let locator = pkg.locator();
        let persist = if persisted.contains(locator) { "persisted" } else { "transient" };
        println!("{:<width$}  {:<12}  {persist}", locator.to_string(), pkg.version().to_string());
    }
}
