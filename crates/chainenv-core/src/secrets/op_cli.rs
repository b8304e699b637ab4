//! Thin wrapper around the 1Password `op` CLI

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::traits::{StoreError, StoreResult};

/// Environment variable `op` reads a service-account token from
pub const SERVICE_ACCOUNT_TOKEN_ENV: &str = "OP_SERVICE_ACCOUNT_TOKEN";

const PROVIDER: &str = "1password";

/// Captured result of one `op` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl OpOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Executes `op` subcommands
///
/// `OpCli` is the real implementation; tests script their own. `input` is
/// written to the child's stdin (used by `op inject`).
#[async_trait]
pub trait OpRunner: Send + Sync {
    async fn run(&self, args: &[String], input: Option<&str>) -> StoreResult<OpOutput>;
}

/// Runs the `op` binary found on `PATH`
#[derive(Clone)]
pub struct OpCli {
    program: String,
    token: Option<String>,
}

impl OpCli {
    pub fn new() -> Self {
        Self {
            program: "op".to_string(),
            token: None,
        }
    }

    /// Pass a service-account token to every child process
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Use a different executable (e.g. an absolute path)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for OpCli {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OpCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpCli")
            .field("program", &self.program)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl OpRunner for OpCli {
    async fn run(&self, args: &[String], input: Option<&str>) -> StoreResult<OpOutput> {
        // args may carry `password=<value>` assignments, log the subcommand only
        debug!(subcommand = ?args.iter().take(2).collect::<Vec<_>>(), "running op");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(token) = &self.token {
            cmd.env(SERVICE_ACCOUNT_TOKEN_ENV, token);
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                StoreError::unavailable(PROVIDER, format!("{} CLI not found", self.program))
            }
            _ => StoreError::Io(e),
        })?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        Ok(OpOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
