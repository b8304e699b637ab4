use std::io::Write;

use anyhow::{bail, Result};
use clap::Args;

use chainenv_core::secrets::{SecretStore, StoreError, StoreResult, WriteMode};

use super::{ensure_provider, split_accounts, Context};

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Source backend (keychain or 1password)
    #[arg(long)]
    pub from: String,

    /// Target backend (keychain or 1password)
    #[arg(long)]
    pub to: String,

    /// Overwrite passwords that already exist in the target backend
    #[arg(long)]
    pub overwrite: bool,

    /// Keys to copy; commas separate several keys in one argument
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Copied,
    Overwritten,
    Skipped,
}

/// Copy passwords between backends
///
/// Keys that already exist in the target are skipped unless `--overwrite`
/// is set. Missing source keys and failed writes make the command fail
/// after every key has been tried.
pub async fn copy(ctx: &Context, args: &CopyArgs, out: &mut dyn Write) -> Result<()> {
    ensure_provider(&args.from)?;
    ensure_provider(&args.to)?;
    if args.from == args.to {
        bail!("source and target backend are both {}", args.from);
    }

    let source = ctx.store(&args.from).await?;
    let target = ctx.store(&args.to).await?;

    let keys = split_accounts(&args.keys);
    let passwords = source.get_many(&keys).await;

    let mut failed = 0;
    for key in &keys {
        let Some(password) = passwords.get(key) else {
            eprintln!("Failed to copy {}: not found in {}", key, args.from);
            failed += 1;
            continue;
        };

        match copy_one(target.as_ref(), key, password, args.overwrite).await {
            Ok(Outcome::Copied) => {
                writeln!(out, "Copied password for {} from {} to {}", key, args.from, args.to)?
            }
            Ok(Outcome::Overwritten) => writeln!(
                out,
                "Overwrote password for {} in {} with the one from {}",
                key, args.to, args.from
            )?,
            Ok(Outcome::Skipped) => eprintln!(
                "Skipped {}: it already exists in {}, use --overwrite to replace it",
                key, args.to
            ),
            Err(e) => {
                eprintln!("Failed to copy {}: {}", key, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} keys could not be copied", failed, keys.len());
    }
    Ok(())
}

async fn copy_one(
    target: &dyn SecretStore,
    key: &str,
    password: &str,
    overwrite: bool,
) -> StoreResult<Outcome> {
    match target.set_password(key, password, WriteMode::Create).await {
        Ok(()) => Ok(Outcome::Copied),
        Err(StoreError::AlreadyExists(_)) if overwrite => {
            target.set_password(key, password, WriteMode::Update).await?;
            Ok(Outcome::Overwritten)
        }
        Err(StoreError::AlreadyExists(_)) => Ok(Outcome::Skipped),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context, output, MemoryFactory};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn factory() -> Arc<MemoryFactory> {
        Arc::new(
            MemoryFactory::default()
                .with("keychain", &[("A", "a"), ("B", "b"), ("C", "c")])
                .with("1password", &[("B", "old")]),
        )
    }

    fn args(keys: &[&str], overwrite: bool) -> CopyArgs {
        CopyArgs {
            from: "keychain".to_string(),
            to: "1password".to_string(),
            overwrite,
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_copy_skips_existing() {
        let dir = tempdir().unwrap();
        let factory = factory();
        let ctx = context(dir.path(), factory.clone());

        let mut out = Vec::new();
        copy(&ctx, &args(&["A,B", "C"], false), &mut out).await.unwrap();

        let target = factory.store("1password");
        assert_eq!(target.get_password("A").await.unwrap(), "a");
        assert_eq!(target.get_password("B").await.unwrap(), "old");
        assert_eq!(target.get_password("C").await.unwrap(), "c");
        assert_eq!(
            output(out),
            "Copied password for A from keychain to 1password\n\
             Copied password for C from keychain to 1password\n"
        );
    }

    #[tokio::test]
    async fn test_copy_overwrite() {
        let dir = tempdir().unwrap();
        let factory = factory();
        let ctx = context(dir.path(), factory.clone());

        let mut out = Vec::new();
        copy(&ctx, &args(&["B"], true), &mut out).await.unwrap();
        assert_eq!(factory.store("1password").get_password("B").await.unwrap(), "b");
        assert!(output(out).starts_with("Overwrote password for B"));
    }

    #[tokio::test]
    async fn test_copy_missing_source_key_fails_after_copying_rest() {
        let dir = tempdir().unwrap();
        let factory = factory();
        let ctx = context(dir.path(), factory.clone());

        let err = copy(&ctx, &args(&["MISSING", "A"], false), &mut Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 keys could not be copied");
        assert_eq!(factory.store("1password").get_password("A").await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_copy_same_backend() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), factory());
        let mut same = args(&["A"], false);
        same.to = "keychain".to_string();
        assert!(copy(&ctx, &same, &mut Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_copy_unknown_backend() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), factory());
        let mut unknown = args(&["A"], false);
        unknown.from = "vault".to_string();
        let err = copy(&ctx, &unknown, &mut Vec::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("unknown backend 'vault'"));
    }
}
