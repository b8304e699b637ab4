use std::io::Write;

use anyhow::Result;

use chainenv_core::diag::{diagnose, ProviderStatus};
use chainenv_core::secrets::ProviderRegistry;

pub async fn diag(registry: &ProviderRegistry, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Backend diagnostics:")?;
    for status in diagnose(registry).await {
        writeln!(out, "{}", render(&status))?;
    }
    Ok(())
}

fn render(status: &ProviderStatus) -> String {
    match &status.detail {
        Some(detail) => format!("- {}: {} [{}]", status.provider, status.state, detail),
        None => format!("- {}: {}", status.provider, status.state),
    }
}
