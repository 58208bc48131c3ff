use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::rpc::CommitmentLevel;
use crate::workspace::{Workspace, MANIFEST_FILE};

pub const LOCALNET_URL: &str = "http://127.0.0.1:8899";
pub const DEVNET_URL: &str = "https://api.devnet.solana.com";
pub const TESTNET_URL: &str = "https://api.testnet.solana.com";
pub const MAINNET_URL: &str = "https://api.mainnet-beta.solana.com";

/// Provider configuration: which cluster to talk to, who pays, and how
/// long to wait
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub url: String,
    pub wallet_path: PathBuf,

    /// Commitment for blockhash queries and confirmation
    pub commitment: CommitmentLevel,
    /// Commitment the node simulates against before accepting a transaction
    pub preflight_commitment: CommitmentLevel,
    pub skip_preflight: bool,

    pub confirm_timeout_seconds: u64,
    pub rpc_timeout_seconds: u64,
}

impl ProviderConfig {
    /// Load configuration from environment variables
    ///
    /// Required environment variables:
    /// - ANCHOR_PROVIDER_URL: Cluster JSON-RPC endpoint (e.g., http://127.0.0.1:8899)
    /// - ANCHOR_WALLET: Path to the fee payer keypair file
    ///
    /// Optional environment variables (with defaults):
    /// - ANCHOR_COMMITMENT: processed | confirmed | finalized (default: processed)
    /// - ANCHOR_PREFLIGHT_COMMITMENT: same values (default: processed)
    /// - ANCHOR_SKIP_PREFLIGHT: Skip transaction simulation (default: false)
    /// - ANCHOR_CONFIRM_TIMEOUT_SECONDS: Confirmation budget (default: 30)
    /// - ANCHOR_RPC_TIMEOUT_SECONDS: HTTP request timeout (default: 30)
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup("ANCHOR_PROVIDER_URL")
            .context("ANCHOR_PROVIDER_URL environment variable is required")?;

        let wallet = lookup("ANCHOR_WALLET")
            .context("ANCHOR_WALLET environment variable is required")?;

        let mut config = Self::with_defaults(url, expand_tilde(&wallet));
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Build configuration from the `[provider]` section of `Anchor.toml`
    ///
    /// Optional variables listed in [`ProviderConfig::from_env`] still apply.
    pub fn from_workspace(workspace: &Workspace) -> Result<Self> {
        Self::from_workspace_lookup(workspace, |key| env::var(key).ok())
    }

    /// Environment configuration, or `Anchor.toml` when ANCHOR_PROVIDER_URL
    /// is not set
    pub fn from_env_or_workspace(workspace: &Workspace) -> Result<Self> {
        dotenv::dotenv().ok();

        Self::resolve(workspace, |key| env::var(key).ok())
    }

    fn resolve(workspace: &Workspace, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if lookup("ANCHOR_PROVIDER_URL").is_some() {
            return Self::from_lookup(lookup);
        }

        info!(
            "ANCHOR_PROVIDER_URL not set, using [provider] from {}",
            workspace.root().join(MANIFEST_FILE).display()
        );
        Self::from_workspace_lookup(workspace, lookup)
    }

    fn from_workspace_lookup(
        workspace: &Workspace,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let provider = workspace
            .manifest()
            .provider
            .as_ref()
            .context("Anchor.toml has no [provider] section")?;

        // Relative wallet paths are relative to the workspace root
        let wallet = expand_tilde(&provider.wallet);
        let wallet = if wallet.is_relative() {
            workspace.root().join(wallet)
        } else {
            wallet
        };

        let mut config = Self::with_defaults(cluster_url(&provider.cluster), wallet);
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    fn with_defaults(url: String, wallet_path: PathBuf) -> Self {
        Self {
            url,
            wallet_path,
            commitment: CommitmentLevel::Processed,
            preflight_commitment: CommitmentLevel::Processed,
            skip_preflight: false,
            confirm_timeout_seconds: 30,
            rpc_timeout_seconds: 30,
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("ANCHOR_COMMITMENT") {
            self.commitment = value
                .parse()
                .context("ANCHOR_COMMITMENT must be processed, confirmed or finalized")?;
        }

        if let Some(value) = lookup("ANCHOR_PREFLIGHT_COMMITMENT") {
            self.preflight_commitment = value
                .parse()
                .context("ANCHOR_PREFLIGHT_COMMITMENT must be processed, confirmed or finalized")?;
        }

        if let Some(value) = lookup("ANCHOR_SKIP_PREFLIGHT") {
            self.skip_preflight = value
                .trim()
                .parse::<bool>()
                .context("ANCHOR_SKIP_PREFLIGHT must be 'true' or 'false'")?;
        }

        if let Some(value) = lookup("ANCHOR_CONFIRM_TIMEOUT_SECONDS") {
            self.confirm_timeout_seconds = value
                .trim()
                .parse::<u64>()
                .context("ANCHOR_CONFIRM_TIMEOUT_SECONDS must be a valid number")?;
        }

        if let Some(value) = lookup("ANCHOR_RPC_TIMEOUT_SECONDS") {
            self.rpc_timeout_seconds = value
                .trim()
                .parse::<u64>()
                .context("ANCHOR_RPC_TIMEOUT_SECONDS must be a valid number")?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("Provider URL cannot be empty");
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            anyhow::bail!("Provider URL must be http(s), got '{}'", self.url);
        }

        if self.wallet_path.as_os_str().is_empty() {
            anyhow::bail!("Wallet path cannot be empty");
        }

        if self.confirm_timeout_seconds == 0 || self.confirm_timeout_seconds > 300 {
            anyhow::bail!("Confirm timeout must be between 1 and 300 seconds");
        }

        if self.rpc_timeout_seconds == 0 || self.rpc_timeout_seconds > 300 {
            anyhow::bail!("RPC timeout must be between 1 and 300 seconds");
        }

        Ok(())
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }
}

/// Resolve a cluster moniker to its RPC URL; anything else is taken as a URL
pub fn cluster_url(cluster: &str) -> String {
    match cluster.trim().to_lowercase().as_str() {
        "localnet" | "l" => LOCALNET_URL.to_string(),
        "devnet" | "d" => DEVNET_URL.to_string(),
        "testnet" | "t" => TESTNET_URL.to_string(),
        "mainnet" | "mainnet-beta" | "m" => MAINNET_URL.to_string(),
        _ => cluster.trim().to_string(),
    }
}

/// Canonical name of a cluster given as a moniker or one of the known URLs
pub fn cluster_name(cluster: &str) -> Option<&'static str> {
    let cluster = cluster.trim().trim_end_matches('/').to_lowercase();
    match cluster.as_str() {
        "localnet" | "l" | LOCALNET_URL | "http://localhost:8899" => Some("localnet"),
        "devnet" | "d" | DEVNET_URL => Some("devnet"),
        "testnet" | "t" | TESTNET_URL => Some("testnet"),
        "mainnet" | "mainnet-beta" | "m" | MAINNET_URL => Some("mainnet"),
        _ => None,
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    Path::new(path).to_path_buf()
}
