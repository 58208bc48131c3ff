use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::instruction::Instruction;
use crate::keypair::{Keypair, Signer};
use crate::rpc::RpcClient;
use crate::transaction::{Message, Transaction};

/// Cluster connection plus the wallet that pays for and signs transactions
pub struct Provider {
    rpc: RpcClient,
    wallet: Keypair,
    config: ProviderConfig,
}

impl Provider {
    /// Provider configured from `ANCHOR_PROVIDER_URL` / `ANCHOR_WALLET`
    pub fn env() -> Result<Self> {
        let config = ProviderConfig::from_env().context("Failed to load provider configuration")?;
        Self::new(config)
    }

    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate().context("Invalid provider configuration")?;

        let wallet = Keypair::read_from_file(&config.wallet_path)
            .context("Failed to load provider wallet")?;

        Self::with_wallet(config, wallet)
    }

    pub fn with_wallet(config: ProviderConfig, wallet: Keypair) -> Result<Self> {
        let rpc = RpcClient::new(config.url.clone(), config.rpc_timeout())?;

        info!("Provider: {} (wallet {})", config.url, wallet.pubkey());

        Ok(Self {
            rpc,
            wallet,
            config,
        })
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn wallet(&self) -> &Keypair {
        &self.wallet
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Sign `instructions` with the wallet (plus `extra_signers`), submit and
    /// wait for the configured commitment
    ///
    /// # Returns
    /// * `Ok(signature)` - base58 transaction signature
    pub async fn send_and_confirm(
        &self,
        instructions: &[Instruction],
        extra_signers: &[&dyn Signer],
    ) -> Result<String> {
        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash(self.config.commitment)
            .await
            .context("Failed to fetch latest blockhash")?;

        debug!("Blockhash {} valid until height {}", blockhash, last_valid_block_height);

        let message = Message::new(instructions, &self.wallet.pubkey())?;
        let mut transaction = Transaction::new_unsigned(message);

        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(1 + extra_signers.len());
        signers.push(&self.wallet);
        signers.extend_from_slice(extra_signers);
        transaction.sign(&signers, blockhash)?;

        let signature = self
            .rpc
            .send_transaction(
                &transaction,
                self.config.skip_preflight,
                self.config.preflight_commitment,
            )
            .await
            .context("Failed to send transaction")?;

        info!("📡 Sent transaction {}", signature);

        self.rpc
            .confirm_transaction(
                &signature,
                self.config.commitment,
                last_valid_block_height,
                self.config.confirm_timeout(),
            )
            .await?;

        Ok(signature)
    }
}
