use std::io::Write;

use anyhow::{bail, Result};
use clap::Args;

use chainenv_core::export::{format_exports, Shell};
use chainenv_core::resolver::{fetch_all, fetch_one};

use super::{split_accounts, Context};

#[derive(Args, Debug)]
pub struct GetArgs {
    pub account: String,
}

/// Output format selection, with the old per-shell switches still accepted
#[derive(Args, Debug, Default)]
pub struct ShellArgs {
    /// Shell format (fish, bash, zsh, plain)
    #[arg(long, default_value_t = Shell::Plain, conflicts_with_all = ["fish", "bash", "zsh"])]
    pub shell: Shell,

    /// Use fish shell format (legacy)
    #[arg(long, conflicts_with_all = ["bash", "zsh"])]
    pub fish: bool,

    /// Use bash shell format (legacy)
    #[arg(long, conflicts_with = "zsh")]
    pub bash: bool,

    /// Use zsh shell format (legacy)
    #[arg(long)]
    pub zsh: bool,
}

impl ShellArgs {
    pub fn resolve(&self) -> Shell {
        if self.fish {
            Shell::Fish
        } else if self.bash {
            Shell::Bash
        } else if self.zsh {
            Shell::Zsh
        } else {
            self.shell
        }
    }
}

#[derive(Args, Debug)]
pub struct GetEnvArgs {
    /// Comma-separated accounts, e.g. AWS_KEY,AWS_SECRET
    pub accounts: String,

    #[command(flatten)]
    pub format: ShellArgs,
}

pub async fn get(ctx: &Context, args: &GetArgs, out: &mut dyn Write) -> Result<()> {
    let password = fetch_one(&args.account, ctx.document(), &ctx.backend, ctx.factory.as_ref())
        .await?;
    writeln!(out, "{}", password)?;
    Ok(())
}

pub async fn get_env(ctx: &Context, args: &GetEnvArgs, out: &mut dyn Write) -> Result<()> {
    let accounts = split_accounts(&[args.accounts.as_str()]);
    export(ctx, &accounts, args.format.resolve(), out).await
}

pub async fn generate_env(ctx: &Context, args: &ShellArgs, out: &mut dyn Write) -> Result<()> {
    let accounts = ctx.require_config()?.document.key_names();
    if accounts.is_empty() {
        eprintln!("No keys found");
        return Ok(());
    }
    export(ctx, &accounts, args.resolve(), out).await
}

async fn export(ctx: &Context, accounts: &[String], shell: Shell, out: &mut dyn Write) -> Result<()> {
    tracing::debug!(count = accounts.len(), %shell, "exporting accounts");
    let result = fetch_all(accounts, ctx.document(), &ctx.backend, ctx.factory.as_ref()).await;

    if let Some(err) = &result.first_error {
        eprintln!("Error: {}", err);
    }
    if result.is_empty() {
        bail!("No passwords found");
    }

    out.write_all(format_exports(&result.passwords, shell).as_bytes())?;
    Ok(())
}
