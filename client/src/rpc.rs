//! Cluster JSON-RPC client
//!
//! Thin typed layer over the HTTP JSON-RPC 2.0 endpoint of a cluster:
//! blockhash and block height queries, transaction submission, signature
//! status polling and log retrieval.

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::transaction::{Hash, Transaction};

/// Interval between signature status polls
pub const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    #[default]
    Processed,
    Confirmed,
    Finalized,
}

impl FromStr for CommitmentLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "processed" | "recent" => Ok(Self::Processed),
            "confirmed" | "single" | "singlegossip" => Ok(Self::Confirmed),
            "finalized" | "max" | "root" => Ok(Self::Finalized),
            other => anyhow::bail!(
                "Invalid commitment '{}': must be processed, confirmed or finalized",
                other
            ),
        }
    }
}

impl fmt::Display for CommitmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: Option<u64>,
    pub err: Option<Value>,
    pub confirmation_status: Option<CommitmentLevel>,
}

impl SignatureStatus {
    /// Whether the status has reached `commitment`
    pub fn satisfies(&self, commitment: CommitmentLevel) -> bool {
        match self.confirmation_status {
            Some(status) => status >= commitment,
            // Nodes that omit confirmationStatus report None confirmations once rooted
            None => self.confirmations.is_none() || commitment == CommitmentLevel::Processed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    log_messages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EncodedTransaction {
    meta: Option<TransactionMeta>,
}

/// JSON-RPC client for a single cluster endpoint
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `url` - Cluster JSON-RPC endpoint (e.g. http://127.0.0.1:8899)
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a JSON-RPC request and decode `result`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.call_optional(method, params)
            .await?
            .with_context(|| format!("RPC response for {} has a null result", method))
    }

    /// Like [`RpcClient::call`], but a null `result` is `None`
    pub async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC request #{} {}", id, method);

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("RPC returned status {} for {}: {}", status, method, body);
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = body.error {
            warn!("RPC error for {}: {} {}", method, error.code, error.message);
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            }
            .into());
        }

        Ok(body.result)
    }

    pub async fn get_health(&self) -> Result<()> {
        let status: String = self.call("getHealth", json!([])).await?;
        if status != "ok" {
            anyhow::bail!("Cluster reports unhealthy status: {}", status);
        }
        Ok(())
    }

    /// Latest blockhash and the last block height at which it is valid
    pub async fn get_latest_blockhash(&self, commitment: CommitmentLevel) -> Result<(Hash, u64)> {
        let response: WithContext<BlockhashValue> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": commitment.to_string() }]),
            )
            .await?;

        let hash = response
            .value
            .blockhash
            .parse()
            .context("Cluster returned an invalid blockhash")?;

        Ok((hash, response.value.last_valid_block_height))
    }

    pub async fn get_block_height(&self, commitment: CommitmentLevel) -> Result<u64> {
        self.call(
            "getBlockHeight",
            json!([{ "commitment": commitment.to_string() }]),
        )
        .await
    }

    /// Submit a signed transaction, returning its signature
    pub async fn send_transaction(
        &self,
        transaction: &Transaction,
        skip_preflight: bool,
        preflight_commitment: CommitmentLevel,
    ) -> Result<String> {
        let wire = transaction.serialize()?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&wire);

        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    encoded,
                    {
                        "encoding": "base64",
                        "skipPreflight": skip_preflight,
                        "preflightCommitment": preflight_commitment.to_string(),
                    }
                ]),
            )
            .await?;

        if let Some(expected) = transaction.signature() {
            if expected != signature {
                warn!(
                    "Cluster returned signature {} but transaction is signed as {}",
                    signature, expected
                );
            }
        }

        Ok(signature)
    }

    pub async fn get_signature_statuses(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<SignatureStatus>>> {
        let response: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([signatures, { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(response.value)
    }

    /// Wait until `signature` reaches `commitment`
    ///
    /// Fails with [`ClientError::TransactionFailed`] when the status carries
    /// an error, [`ClientError::BlockhashExpired`] once the block height
    /// passes `last_valid_block_height`, and
    /// [`ClientError::ConfirmationTimeout`] when `timeout` elapses.
    pub async fn confirm_transaction(
        &self,
        signature: &str,
        commitment: CommitmentLevel,
        last_valid_block_height: u64,
        timeout: Duration,
    ) -> Result<SignatureStatus> {
        let deadline = Instant::now() + timeout;
        let signatures = [signature.to_string()];

        loop {
            let status = self
                .get_signature_statuses(&signatures)
                .await
                .context("Failed to query signature status")?
                .into_iter()
                .next()
                .flatten();

            match status {
                Some(status) if status.err.is_some() => {
                    return Err(ClientError::TransactionFailed {
                        signature: signature.to_string(),
                        err: status.err.unwrap_or(Value::Null),
                    }
                    .into());
                }
                Some(status) if status.satisfies(commitment) => {
                    info!("✅ Transaction {} reached {} at slot {}", signature, commitment, status.slot);
                    return Ok(status);
                }
                Some(status) => {
                    debug!(
                        "Transaction {} at {:?}, waiting for {}",
                        signature, status.confirmation_status, commitment
                    );
                }
                None => {
                    let height = self.get_block_height(commitment).await?;
                    if height > last_valid_block_height {
                        return Err(ClientError::BlockhashExpired {
                            signature: signature.to_string(),
                            last_valid_block_height,
                        }
                        .into());
                    }
                    debug!("Transaction {} not yet processed, waiting...", signature);
                }
            }

            if Instant::now() >= deadline {
                return Err(ClientError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    seconds: timeout.as_secs(),
                }
                .into());
            }

            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }

    /// Program log lines of a landed transaction, `None` if the cluster does not know it
    pub async fn get_transaction_logs(
        &self,
        signature: &str,
        commitment: CommitmentLevel,
    ) -> Result<Option<Vec<String>>> {
        // getTransaction rejects processed
        let commitment = commitment.max(CommitmentLevel::Confirmed);

        let tx: Option<EncodedTransaction> = self
            .call_optional(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "commitment": commitment.to_string(),
                        "maxSupportedTransactionVersion": 0,
                    }
                ]),
            )
            .await?;

        Ok(tx.and_then(|tx| tx.meta).and_then(|meta| meta.log_messages))
    }
}
