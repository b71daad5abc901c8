//! Variant command (offline)

use anyhow::{Context as _, Result, bail};
use std::path::Path;

use varia_core::{Comparators, resolve_variant};
use varia_schema::{Manifest, VariantParameters};

use crate::context::project_root;

/// Select a variant of the package at `manifest` for `parameters`
pub fn variant(manifest: &Path, parameters: &[(String, String)]) -> Result<()> {
    let path = project_root(manifest).join("package.json");
    let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let manifest = Manifest::from_json(&text).with_context(|| format!("Invalid manifest {}", path.display()))?;

    let Some(definitions) = &manifest.variants else {
        bail!("{} declares no variants", path.display());
    };
    let parameters: VariantParameters = parameters.iter().cloned().collect();

    match resolve_variant(definitions, &parameters, &Comparators::default())? {
        Some(selected) => {
            println!("{}", selected.descriptor);
            Ok(())
        }
        None => bail!("No variant matches parameters {parameters:?}"),
    }
}
