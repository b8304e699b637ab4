//! chainenv - environment variables backed by the keychain or 1Password

mod commands;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{copy, diag, get, list, set, Context, GlobalArgs};

#[derive(Parser)]
#[command(name = "chainenv", version)]
#[command(
    about = "Store secrets in the system keychain or 1Password and export them as environment variables",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the password for an account
    Get(get::GetArgs),
    /// Print exports for a comma-separated list of accounts
    GetEnv(get::GetEnvArgs),
    /// Print exports for every key declared in the config
    GenerateEnv(get::ShellArgs),
    /// Store a new password and record the account in the config
    Set(set::SetArgs),
    /// Replace the password of an existing account
    Update(set::UpdateArgs),
    /// List keys declared in the config
    List,
    /// List accounts stored in the selected backend
    Ls,
    /// Copy passwords between backends
    #[command(alias = "cp")]
    Copy(copy::CopyArgs),
    /// Check which backends are usable on this system
    Diag,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    chainenv_core::logging::init(cli.global.debug);
    tracing::debug!(backend = %cli.global.backend, vault = %cli.global.vault, "starting");

    let ctx = Context::load(&cli.global)?;
    let mut out = io::stdout();

    match cli.command {
        Command::Get(args) => get::get(&ctx, &args, &mut out).await,
        Command::GetEnv(args) => get::get_env(&ctx, &args, &mut out).await,
        Command::GenerateEnv(args) => get::generate_env(&ctx, &args, &mut out).await,
        Command::Set(args) => set::set(&ctx, &args, &mut out).await,
        Command::Update(args) => set::update(&ctx, &args, &mut out).await,
        Command::List => list::list(&ctx, &mut out),
        Command::Ls => list::ls(&ctx, &mut out).await,
        Command::Copy(args) => copy::copy(&ctx, &args, &mut out).await,
        Command::Diag => {
            let registry = commands::registry(&cli.global, ctx.config.as_ref());
            diag::diag(&registry, &mut out).await
        }
    }
}
