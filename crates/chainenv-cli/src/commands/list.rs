use std::io::Write;

use anyhow::{Context as _, Result};

use super::Context;

/// Keys declared in the config, in file order
pub fn list(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let config = ctx.require_config()?;
    if config.document.keys.is_empty() {
        writeln!(out, "No keys found")?;
        return Ok(());
    }
    for entry in &config.document.keys {
        writeln!(out, "{}", entry.name)?;
    }
    Ok(())
}

/// Accounts actually stored in the selected backend, sorted
pub async fn ls(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let store = ctx.store(&ctx.backend).await?;
    let mut accounts = store
        .list()
        .await
        .with_context(|| format!("failed to list accounts in {}", ctx.backend))?;

    if accounts.is_empty() {
        writeln!(out, "No accounts found")?;
        return Ok(());
    }

    accounts.sort();
    accounts.dedup();
    for account in accounts {
        writeln!(out, "{}", account)?;
    }
    Ok(())
}
