//! Cache inspection

use anyhow::Result;

use crate::context::Context;

/// List cache entries
pub fn list(ctx: &Context) -> Result<()> {
    let entries = ctx.cache.list()?;
    if entries.is_empty() {
        println!("  Cache is empty: {}", ctx.cache.root().display());
        return Ok(());
    }

    for entry in &entries {
        println!("{}  {}", entry.name, entry.checksum.short(16));
    }
    println!();
    println!("  {} entries in {}", entries.len(), ctx.cache.root().display());
    Ok(())
}
