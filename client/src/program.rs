//! Typed program handle and the instruction builder behind `methods()`

use anyhow::{Context, Result};
use borsh::BorshSerialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::idl::Idl;
use crate::instruction::{sighash, to_snake_case, AccountMeta, Instruction, SIGHASH_GLOBAL_NAMESPACE};
use crate::keypair::Signer;
use crate::provider::Provider;
use crate::pubkey::Pubkey;

pub struct Program {
    id: Pubkey,
    idl: Option<Idl>,
    provider: Arc<Provider>,
}

impl Program {
    pub fn new(id: Pubkey, idl: Option<Idl>, provider: Arc<Provider>) -> Self {
        Self { id, idl, provider }
    }

    pub fn id(&self) -> Pubkey {
        self.id
    }

    pub fn idl(&self) -> Option<&Idl> {
        self.idl.as_ref()
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Start building a call to instruction `name`
    pub fn methods(&self, name: &str) -> MethodsBuilder<'_> {
        MethodsBuilder {
            program: self,
            name: name.to_string(),
            args: Vec::new(),
            accounts: HashMap::new(),
            remaining_accounts: Vec::new(),
            signers: Vec::new(),
            error: None,
        }
    }
}

pub struct MethodsBuilder<'a> {
    program: &'a Program,
    name: String,
    args: Vec<u8>,
    accounts: HashMap<String, Pubkey>,
    remaining_accounts: Vec<AccountMeta>,
    signers: Vec<&'a dyn Signer>,
    /// First argument encoding failure, reported when the call is built
    error: Option<anyhow::Error>,
}

impl<'a> MethodsBuilder<'a> {
    /// Append a borsh-encoded argument
    pub fn arg<T: BorshSerialize>(mut self, value: &T) -> Self {
        if self.error.is_none() {
            if let Err(e) = value.serialize(&mut self.args) {
                self.error = Some(anyhow::Error::new(e).context("Failed to encode instruction argument"));
            }
        }
        self
    }

    /// Named accounts, matched against the IDL in any casing
    pub fn accounts<I, S>(mut self, accounts: I) -> Self
    where
        I: IntoIterator<Item = (S, Pubkey)>,
        S: AsRef<str>,
    {
        for (name, key) in accounts {
            self.accounts.insert(to_snake_case(name.as_ref()), key);
        }
        self
    }

    pub fn remaining_accounts(mut self, accounts: Vec<AccountMeta>) -> Self {
        self.remaining_accounts.extend(accounts);
        self
    }

    /// Additional signers besides the provider wallet
    pub fn signers(mut self, signers: &[&'a dyn Signer]) -> Self {
        self.signers.extend_from_slice(signers);
        self
    }

    /// Resolve the instruction without sending it
    pub fn instruction(&self) -> Result<Instruction> {
        if let Some(e) = &self.error {
            anyhow::bail!("{:#}", e);
        }

        let program_id = self.program.id;
        let mut accounts = Vec::new();

        let data = match &self.program.idl {
            Some(idl) => {
                let ix = idl.instruction(&self.name).ok_or_else(|| ClientError::UnknownInstruction {
                    name: self.name.clone(),
                    program: program_id.to_string(),
                })?;

                if ix.args.is_empty() != self.args.is_empty() {
                    anyhow::bail!(
                        "Instruction '{}' takes {} argument(s), got {} encoded byte(s)",
                        ix.name,
                        ix.args.len(),
                        self.args.len()
                    );
                }

                let wallet = self.program.provider.wallet().pubkey();
                for account in &ix.accounts {
                    let pubkey = match self.accounts.get(&to_snake_case(&account.name)) {
                        Some(key) => *key,
                        None => match account.address {
                            Some(fixed) => fixed,
                            None if account.signer => wallet,
                            None if account.optional => program_id,
                            None => {
                                return Err(ClientError::MissingAccount {
                                    account: account.name.clone(),
                                    instruction: ix.name.clone(),
                                }
                                .into())
                            }
                        },
                    };
                    accounts.push(AccountMeta {
                        pubkey,
                        is_signer: account.signer,
                        is_writable: account.writable,
                    });
                }

                ix.discriminator()
                    .with_context(|| format!("Bad discriminator for '{}'", ix.name))?
            }
            None => sighash(SIGHASH_GLOBAL_NAMESPACE, &self.name).to_vec(),
        };

        accounts.extend(self.remaining_accounts.iter().cloned());

        let mut data = data;
        data.extend_from_slice(&self.args);

        debug!(
            "Built '{}' for {}: {} account(s), data {}",
            self.name,
            program_id,
            accounts.len(),
            hex::encode(&data)
        );

        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }

    /// Build, sign, send and confirm; returns the transaction signature
    pub async fn rpc(self) -> Result<String> {
        let instruction = self.instruction()?;

        info!("🔗 Calling {} on program {}", self.name, self.program.id);

        self.program
            .provider
            .send_and_confirm(&[instruction], &self.signers)
            .await
            .with_context(|| format!("Failed to call {}", self.name))
    }
}
