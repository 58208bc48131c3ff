use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use desirium_client::{Provider, ProviderConfig, Workspace, DESIRIUM_PROGRAM};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "desirium_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    let workspace = Workspace::discover(&cwd).context("Failed to load workspace")?;

    // Configure the client to use the local cluster
    let config = ProviderConfig::from_env_or_workspace(&workspace)
        .context("Failed to load provider configuration")?;

    let provider = Arc::new(Provider::new(config)?);
    let program = workspace
        .program(DESIRIUM_PROGRAM, provider)
        .context("Failed to resolve program")?;

    info!("Program {} ({})", DESIRIUM_PROGRAM, program.id());

    let tx = program.methods("initialize").rpc().await?;
    println!("Your transaction signature {}", tx);

    Ok(())
}
