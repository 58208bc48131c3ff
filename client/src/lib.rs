//! Client for the desirium on-chain program
//!
//! ```text
//! ProviderConfig (env / Anchor.toml)
//!     │
//!     ▼
//! Provider ── RpcClient ──► cluster JSON-RPC
//!     │  wallet: Keypair
//!     ▼
//! Workspace (Anchor.toml + target/idl) ──► Program ──► methods("initialize").rpc()
//! ```

pub mod config;
pub mod error;
pub mod idl;
pub mod instruction;
pub mod keypair;
pub mod program;
pub mod provider;
pub mod pubkey;
pub mod rpc;
pub mod transaction;
pub mod workspace;

pub use config::ProviderConfig;
pub use error::ClientError;
pub use keypair::{Keypair, Signer};
pub use program::{MethodsBuilder, Program};
pub use provider::Provider;
pub use pubkey::Pubkey;
pub use rpc::{CommitmentLevel, RpcClient};
pub use workspace::Workspace;

/// Workspace name of the program this harness exercises
pub const DESIRIUM_PROGRAM: &str = "DesiriumContract";
