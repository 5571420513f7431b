//! Transactions in the ledger's legacy wire format
//!
//! A transaction is a list of instructions paid for by a fee payer. Before
//! submission it is compiled into a message:
//!
//! ```text
//! header (3 x u8) | account keys (compact array) | recent blockhash (32) | instructions (compact array)
//! ```
//!
//! and signed by every signer account, in account key order. Account keys are
//! ordered writable signers (payer first), readonly signers, writable
//! non-signers, readonly non-signers.

use super::address::{Address, Signature};
use super::keypair::Keypair;
use crate::error::LedgerError;

/// The system program owns unallocated accounts and creates new ones
pub const SYSTEM_PROGRAM_ID: Address = Address::EMPTY;

/// A recent blockhash; 32 bytes, base58 like an address
pub type Blockhash = Address;

/// An account referenced by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// System program create-account instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateAccount {
    pub lamports: u64,
    pub space: u64,
    pub owner: Address,
}

impl CreateAccount {
    const TAG: u32 = 0;
    const LEN: usize = 4 + 8 + 8 + 32;

    /// Instruction allocating `space` bytes at `to`, funded by `from` and owned by `owner`
    pub fn instruction(&self, from: Address, to: Address) -> Instruction {
        let mut data = Vec::with_capacity(Self::LEN);
        data.extend_from_slice(&Self::TAG.to_le_bytes());
        data.extend_from_slice(&self.lamports.to_le_bytes());
        data.extend_from_slice(&self.space.to_le_bytes());
        data.extend_from_slice(self.owner.as_bytes());

        Instruction {
            program_id: SYSTEM_PROGRAM_ID,
            accounts: vec![AccountMeta::writable(from, true), AccountMeta::writable(to, true)],
            data,
        }
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != Self::LEN || data[0..4] != Self::TAG.to_le_bytes() {
            return None;
        }
        let lamports = u64::from_le_bytes(data[4..12].try_into().ok()?);
        let space = u64::from_le_bytes(data[12..20].try_into().ok()?);
        let owner = Address::from_slice(&data[20..52]).ok()?;
        Some(Self {
            lamports,
            space,
            owner,
        })
    }
}

/// An unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub payer: Address,
    pub instructions: Vec<Instruction>,
}

impl Transaction {
    pub fn new(payer: Address) -> Self {
        Self {
            payer,
            instructions: Vec::new(),
        }
    }

    pub fn add(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    /// Accounts that must sign, payer first
    pub fn signer_addresses(&self) -> Vec<Address> {
        let keys = self.account_keys();
        keys.iter()
            .filter(|meta| meta.is_signer)
            .map(|meta| meta.address)
            .collect()
    }

    /// Deduplicated account keys in wire order
    fn account_keys(&self) -> Vec<AccountMeta> {
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::writable(self.payer, true)];
        let mut merge = |meta: AccountMeta| match metas.iter_mut().find(|m| m.address == meta.address)
        {
            Some(existing) => {
                existing.is_signer |= meta.is_signer;
                existing.is_writable |= meta.is_writable;
            }
            None => metas.push(meta),
        };

        for instruction in &self.instructions {
            for meta in &instruction.accounts {
                merge(*meta);
            }
            merge(AccountMeta::readonly(instruction.program_id, false));
        }

        // Stable sort keeps first-seen order within each group, so the payer stays first
        metas.sort_by_key(|meta| match (meta.is_signer, meta.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });
        metas
    }

    pub fn compile(&self, recent_blockhash: Blockhash) -> CompiledMessage {
        let metas = self.account_keys();
        let header = MessageHeader {
            num_required_signatures: metas.iter().filter(|m| m.is_signer).count() as u8,
            num_readonly_signed: metas
                .iter()
                .filter(|m| m.is_signer && !m.is_writable)
                .count() as u8,
            num_readonly_unsigned: metas
                .iter()
                .filter(|m| !m.is_signer && !m.is_writable)
                .count() as u8,
        };
        let account_keys: Vec<Address> = metas.iter().map(|m| m.address).collect();
        let index_of = |address: &Address| {
            account_keys
                .iter()
                .position(|key| key == address)
                .unwrap_or_default() as u8
        };

        let instructions = self
            .instructions
            .iter()
            .map(|instruction| CompiledInstruction {
                program_id_index: index_of(&instruction.program_id),
                accounts: instruction
                    .accounts
                    .iter()
                    .map(|meta| index_of(&meta.address))
                    .collect(),
                data: instruction.data.clone(),
            })
            .collect();

        CompiledMessage {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        }
    }

    /// Compile and sign; every signer account needs a matching keypair
    pub fn sign(
        &self,
        recent_blockhash: Blockhash,
        signers: &[&Keypair],
    ) -> Result<SignedTransaction, LedgerError> {
        let message = self.compile(recent_blockhash);
        let bytes = message.serialize();

        let signatures = message.account_keys[..usize::from(message.header.num_required_signatures)]
            .iter()
            .map(|address| {
                signers
                    .iter()
                    .find(|keypair| keypair.address() == *address)
                    .map(|keypair| keypair.sign(&bytes))
                    .ok_or(LedgerError::MissingSignature(*address))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SignedTransaction {
            signatures,
            message,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A transaction message ready to be signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMessage {
    pub header: MessageHeader,
    pub account_keys: Vec<Address>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl CompiledMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed,
            self.header.num_readonly_unsigned,
        ];
        write_compact_u16(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(self.recent_blockhash.as_bytes());
        write_compact_u16(&mut out, self.instructions.len());
        for instruction in &self.instructions {
            out.push(instruction.program_id_index);
            write_compact_u16(&mut out, instruction.accounts.len());
            out.extend_from_slice(&instruction.accounts);
            write_compact_u16(&mut out, instruction.data.len());
            out.extend_from_slice(&instruction.data);
        }
        out
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < usize::from(self.header.num_required_signatures)
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let signed = usize::from(self.header.num_required_signatures);
        if index < signed {
            index < signed - usize::from(self.header.num_readonly_signed)
        } else {
            index < self.account_keys.len() - usize::from(self.header.num_readonly_unsigned)
        }
    }
}

/// A compiled message plus one signature per required signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub signatures: Vec<Signature>,
    pub message: CompiledMessage,
}

impl SignedTransaction {
    /// The first signature identifies the transaction
    pub fn id(&self) -> Option<Signature> {
        self.signatures.first().copied()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_compact_u16(&mut out, self.signatures.len());
        for signature in &self.signatures {
            out.extend_from_slice(signature.as_bytes());
        }
        out.extend_from_slice(&self.message.serialize());
        out
    }
}

/// Variable length encoding used for array lengths: 7 bits per byte, high bit continues
fn write_compact_u16(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
