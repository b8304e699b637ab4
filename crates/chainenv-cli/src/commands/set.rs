use std::io::Write;

use anyhow::{Context as _, Result};
use clap::Args;

use chainenv_core::config::{ConfigFile, KeyEntry};
use chainenv_core::secrets::WriteMode;

use super::Context;

#[derive(Args, Debug)]
pub struct SetArgs {
    pub account: String,
    pub password: String,

    /// Default value to record in the config for when the secret is missing
    #[arg(long)]
    pub default: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub account: String,
    pub password: String,
}

/// Create the item, then record `account` and its backend in the config
///
/// A config is created in the working directory when none is found above
/// it. An existing default is kept unless `--default` is given.
pub async fn set(ctx: &Context, args: &SetArgs, out: &mut dyn Write) -> Result<()> {
    let store = ctx.store(&ctx.backend).await?;
    store
        .set_password(&args.account, &args.password, WriteMode::Create)
        .await
        .with_context(|| format!("failed to set password for {}", args.account))?;

    let mut config = ConfigFile::open_or_default(&ctx.cwd).context("failed to read config")?;
    let previous_default = config
        .document
        .find_key(&args.account)
        .and_then(|entry| entry.default.clone());

    let mut entry = KeyEntry::new(args.account.as_str()).with_provider(ctx.backend.as_str());
    entry.default = args.default.clone().or(previous_default);
    config.document.upsert_key(entry);
    config
        .save()
        .with_context(|| format!("failed to write {}", config.path().display()))?;

    writeln!(out, "Password set for {}", args.account)?;
    Ok(())
}

pub async fn update(ctx: &Context, args: &UpdateArgs, out: &mut dyn Write) -> Result<()> {
    let store = ctx.store(&ctx.backend).await?;
    store
        .set_password(&args.account, &args.password, WriteMode::Update)
        .await
        .with_context(|| format!("failed to update password for {}", args.account))?;

    writeln!(out, "Password updated for {}", args.account)?;
    Ok(())
}
