//! Ed25519 keypairs in the cluster's keypair-file format
//!
//! A keypair file is a JSON array of 64 integers: the 32-byte secret key
//! followed by the 32-byte public key.

use anyhow::{Context, Result};
use ed25519_dalek::{Signer as _, SigningKey};
use std::fs;
use std::path::Path;

use crate::pubkey::Pubkey;

/// Anything able to sign a transaction message
pub trait Signer: Send + Sync {
    fn pubkey(&self) -> Pubkey;
    fn sign_message(&self, message: &[u8]) -> [u8; 64];
}

pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Build from 64 keypair bytes, rejecting a public half that does not
    /// belong to the secret half
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; 64] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Keypair must be 64 bytes, got {}", bytes.len()))?;

        let signing_key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid keypair bytes: {}", e))?;

        Ok(Self { signing_key })
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }

    /// Read a keypair file
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read keypair file {}", path.display()))?;

        let bytes: Vec<u8> = serde_json::from_str(&contents)
            .with_context(|| format!("Keypair file {} is not a JSON byte array", path.display()))?;

        Self::from_bytes(&bytes).with_context(|| format!("Invalid keypair in {}", path.display()))
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(&self.to_bytes().to_vec())?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write keypair file {}", path.display()))
    }
}

impl Signer for Keypair {
    fn pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.signing_key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", self.pubkey())
    }
}
