//! Program interface description (IDL) as emitted by the program build
//!
//! Only the parts needed to build instructions are modelled; unknown
//! fields are ignored.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::instruction::{sighash, to_snake_case, SIGHASH_GLOBAL_NAMESPACE};
use crate::pubkey::Pubkey;

#[derive(Debug, Clone, Deserialize)]
pub struct Idl {
    pub address: Option<Pubkey>,
    #[serde(default)]
    pub metadata: IdlMetadata,
    #[serde(default)]
    pub instructions: Vec<IdlInstruction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdlMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlInstruction {
    pub name: String,
    pub discriminator: Option<Vec<u8>>,
    #[serde(default)]
    pub accounts: Vec<IdlAccount>,
    #[serde(default)]
    pub args: Vec<IdlField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlAccount {
    pub name: String,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub signer: bool,
    /// Omitted optional accounts are passed as the program id
    #[serde(default)]
    pub optional: bool,
    /// Fixed address (e.g. system program)
    pub address: Option<Pubkey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: serde_json::Value,
}

impl Idl {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read IDL {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("Invalid IDL {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse IDL JSON")
    }

    /// Look up an instruction by name in any casing
    pub fn instruction(&self, name: &str) -> Option<&IdlInstruction> {
        let wanted = to_snake_case(name);
        self.instructions
            .iter()
            .find(|ix| to_snake_case(&ix.name) == wanted)
    }
}

impl IdlInstruction {
    /// Discriminator declared by the IDL, or the global sighash of the name
    pub fn discriminator(&self) -> Result<Vec<u8>> {
        match &self.discriminator {
            Some(d) if d.is_empty() => {
                anyhow::bail!("Instruction '{}' has an empty discriminator", self.name)
            }
            Some(d) => Ok(d.clone()),
            None => Ok(sighash(SIGHASH_GLOBAL_NAMESPACE, &self.name).to_vec()),
        }
    }
}
