//! Typed client failures
//!
//! Operations return `anyhow::Result`; the variants below are the failures
//! callers may want to match on (`err.downcast_ref::<ClientError>()`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// JSON-RPC error object returned by the cluster
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Non-2xx HTTP status from the RPC endpoint
    #[error("RPC endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The cluster accepted the transaction but execution failed
    #[error("Transaction {signature} failed: {err}")]
    TransactionFailed {
        signature: String,
        err: serde_json::Value,
    },

    /// Block height passed the blockhash validity window before confirmation
    #[error("Transaction {signature} expired: block height exceeded {last_valid_block_height}")]
    BlockhashExpired {
        signature: String,
        last_valid_block_height: u64,
    },

    #[error("Transaction {signature} was not confirmed within {seconds}s")]
    ConfirmationTimeout { signature: String, seconds: u64 },

    #[error("Program '{name}' not found in workspace (known: {known})")]
    UnknownProgram { name: String, known: String },

    #[error("Instruction '{name}' not found in IDL of program {program}")]
    UnknownInstruction { name: String, program: String },

    #[error("Account '{account}' not provided for instruction '{instruction}'")]
    MissingAccount { account: String, instruction: String },

    #[error("Missing signature for required signer {0}")]
    MissingSigner(String),
}
