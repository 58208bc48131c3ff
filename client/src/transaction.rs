//! Legacy transaction wire format
//!
//! ```text
//! Transaction = short_vec<[u8; 64]> signatures || Message
//! Message     = [u8; 3] header
//!               || short_vec<[u8; 32]> account keys
//!               || [u8; 32] recent blockhash
//!               || short_vec<CompiledInstruction>
//! CompiledInstruction = u8 program_id_index
//!               || short_vec<u8> account indices
//!               || short_vec<u8> data
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;
use crate::instruction::Instruction;
use crate::keypair::Signer;
use crate::pubkey::{Pubkey, PUBKEY_BYTES};

pub const SIGNATURE_BYTES: usize = 64;

/// Largest value a short_vec length prefix can carry
pub const SHORT_VEC_MAX: usize = u16::MAX as usize;

/// Recent blockhash
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Hash(pub [u8; 32]);

impl FromStr for Hash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .with_context(|| format!("Invalid base58 blockhash: {}", s))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| anyhow::anyhow!("Blockhash must be 32 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

// ============================================================================
// short_vec (compact-u16)
// ============================================================================

/// Append a compact-u16 length: 7 bits per byte, high bit set while more follow
pub fn encode_short_vec_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > SHORT_VEC_MAX {
        anyhow::bail!("Length {} exceeds short_vec maximum {}", len, SHORT_VEC_MAX);
    }

    let mut rem = len;
    loop {
        let mut elem = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(elem);
            return Ok(());
        }
        elem |= 0x80;
        out.push(elem);
    }
}

/// Decode a compact-u16 length, returning it and the number of bytes consumed
pub fn decode_short_vec_len(bytes: &[u8]) -> Result<(usize, usize)> {
    let mut len = 0usize;

    for (i, byte) in bytes.iter().enumerate().take(3) {
        let elem = (*byte & 0x7f) as usize;
        // The third byte may only carry the top 2 bits of a u16
        if i == 2 && *byte > 0x03 {
            anyhow::bail!("short_vec length overflows u16");
        }
        // Reject non-canonical encodings (trailing zero continuation)
        if i > 0 && *byte == 0 {
            anyhow::bail!("Non-canonical short_vec encoding");
        }
        len |= elem << (i * 7);
        if *byte & 0x80 == 0 {
            return Ok((len, i + 1));
        }
    }

    anyhow::bail!("Truncated short_vec length")
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Hash,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Clone, Copy, Default)]
struct KeyFlags {
    is_signer: bool,
    is_writable: bool,
}

impl Message {
    /// Compile instructions into a message paid for by `payer`
    ///
    /// Keys are ordered payer first, then writable signers, readonly
    /// signers, writable non-signers and readonly non-signers; within a
    /// group by key bytes.
    pub fn new(instructions: &[Instruction], payer: &Pubkey) -> Result<Self> {
        let mut flags: BTreeMap<Pubkey, KeyFlags> = BTreeMap::new();
        flags.insert(
            *payer,
            KeyFlags {
                is_signer: true,
                is_writable: true,
            },
        );

        for ix in instructions {
            flags.entry(ix.program_id).or_default();
            for meta in &ix.accounts {
                let entry = flags.entry(meta.pubkey).or_default();
                entry.is_signer |= meta.is_signer;
                entry.is_writable |= meta.is_writable;
            }
        }

        let group = |key: &Pubkey, f: &KeyFlags| -> u8 {
            if key == payer {
                0
            } else {
                match (f.is_signer, f.is_writable) {
                    (true, true) => 1,
                    (true, false) => 2,
                    (false, true) => 3,
                    (false, false) => 4,
                }
            }
        };

        let mut ordered: Vec<(Pubkey, KeyFlags)> = flags.into_iter().collect();
        // BTreeMap iteration is already key-ordered, a stable sort keeps it within groups
        ordered.sort_by_key(|(key, f)| group(key, f));

        if ordered.len() > u8::MAX as usize {
            anyhow::bail!("Too many accounts in message: {}", ordered.len());
        }

        let mut header = MessageHeader::default();
        for (_, f) in &ordered {
            if f.is_signer {
                header.num_required_signatures += 1;
                if !f.is_writable {
                    header.num_readonly_signed_accounts += 1;
                }
            } else if !f.is_writable {
                header.num_readonly_unsigned_accounts += 1;
            }
        }

        let account_keys: Vec<Pubkey> = ordered.into_iter().map(|(key, _)| key).collect();
        let index_of = |key: &Pubkey| -> Result<u8> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .with_context(|| format!("Account {} missing from compiled keys", key))
        };

        let instructions = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|meta| index_of(&meta.pubkey))
                        .collect::<Result<Vec<_>>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash: Hash::default(),
            instructions,
        })
    }

    /// Keys that must sign, in signature order
    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..self.header.num_required_signatures as usize]
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let h = &self.header;
        let signed = h.num_required_signatures as usize;
        if index < signed {
            index < signed - h.num_readonly_signed_accounts as usize
        } else {
            index < self.account_keys.len() - h.num_readonly_unsigned_accounts as usize
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            3 + 1 + self.account_keys.len() * PUBKEY_BYTES + 32 + 1 + 16 * self.instructions.len(),
        );

        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);

        encode_short_vec_len(&mut out, self.account_keys.len())?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }

        out.extend_from_slice(&self.recent_blockhash.0);

        encode_short_vec_len(&mut out, self.instructions.len())?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_short_vec_len(&mut out, ix.accounts.len())?;
            out.extend_from_slice(&ix.accounts);
            encode_short_vec_len(&mut out, ix.data.len())?;
            out.extend_from_slice(&ix.data);
        }

        Ok(out)
    }

    /// Parse a message, returning it and the number of bytes consumed
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut reader = Reader::new(bytes);

        let header_bytes = reader.take(3).context("Truncated message header")?;
        if header_bytes[0] & 0x80 != 0 {
            anyhow::bail!("Versioned messages are not supported");
        }
        let header = MessageHeader {
            num_required_signatures: header_bytes[0],
            num_readonly_signed_accounts: header_bytes[1],
            num_readonly_unsigned_accounts: header_bytes[2],
        };

        let key_count = reader.short_vec_len()?;
        let mut account_keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let key: [u8; PUBKEY_BYTES] = reader.array().context("Truncated account key")?;
            account_keys.push(Pubkey::new_from_array(key));
        }

        let recent_blockhash = Hash(reader.array().context("Truncated recent blockhash")?);

        let ix_count = reader.short_vec_len()?;
        let mut instructions = Vec::with_capacity(ix_count);
        for _ in 0..ix_count {
            let program_id_index = reader.take(1).context("Truncated instruction")?[0];
            let n = reader.short_vec_len()?;
            let accounts = reader.take(n).context("Truncated instruction accounts")?.to_vec();
            let n = reader.short_vec_len()?;
            let data = reader.take(n).context("Truncated instruction data")?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        let message = Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        };
        message.sanitize()?;

        Ok((message, reader.pos))
    }

    fn sanitize(&self) -> Result<()> {
        let h = &self.header;
        let keys = self.account_keys.len();
        if h.num_required_signatures as usize > keys
            || h.num_readonly_signed_accounts >= h.num_required_signatures.max(1)
            || h.num_required_signatures as usize + h.num_readonly_unsigned_accounts as usize > keys
        {
            anyhow::bail!("Message header inconsistent with {} account keys", keys);
        }
        for ix in &self.instructions {
            if ix.program_id_index as usize >= keys
                || ix.accounts.iter().any(|&i| i as usize >= keys)
            {
                anyhow::bail!("Instruction references an account index out of range");
            }
        }
        Ok(())
    }
}

// ============================================================================
// Transaction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<[u8; SIGNATURE_BYTES]>,
    pub message: Message,
}

impl Transaction {
    pub fn new_unsigned(message: Message) -> Self {
        let signatures = vec![[0u8; SIGNATURE_BYTES]; message.header.num_required_signatures as usize];
        Self {
            signatures,
            message,
        }
    }

    /// Set the blockhash and sign with every required signer
    pub fn sign(&mut self, signers: &[&dyn Signer], recent_blockhash: Hash) -> Result<()> {
        self.message.recent_blockhash = recent_blockhash;
        let message_bytes = self.message.serialize()?;

        let mut signatures = Vec::with_capacity(self.message.header.num_required_signatures as usize);
        for key in self.message.signer_keys() {
            let signer = signers
                .iter()
                .find(|s| s.pubkey() == *key)
                .ok_or_else(|| ClientError::MissingSigner(key.to_string()))?;
            signatures.push(signer.sign_message(&message_bytes));
        }

        self.signatures = signatures;
        Ok(())
    }

    /// Transaction id: base58 of the fee payer's signature
    pub fn signature(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let message = self.message.serialize()?;
        let mut out = Vec::with_capacity(1 + self.signatures.len() * SIGNATURE_BYTES + message.len());

        encode_short_vec_len(&mut out, self.signatures.len())?;
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(&message);

        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let sig_count = reader.short_vec_len()?;
        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            let sig: [u8; SIGNATURE_BYTES] = reader.array().context("Truncated signature")?;
            signatures.push(sig);
        }

        let (message, used) = Message::deserialize(&bytes[reader.pos..])?;
        if reader.pos + used != bytes.len() {
            anyhow::bail!("Trailing bytes after transaction message");
        }
        if signatures.len() != message.header.num_required_signatures as usize {
            anyhow::bail!(
                "Transaction has {} signatures, message requires {}",
                signatures.len(),
                message.header.num_required_signatures
            );
        }

        Ok(Self {
            signatures,
            message,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    fn short_vec_len(&mut self) -> Result<usize> {
        let (len, used) = decode_short_vec_len(&self.bytes[self.pos..])?;
        self.pos += used;
        Ok(len)
    }
}
