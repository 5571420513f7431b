//! Ledger port
//!
//! The ledger stores accounts, charges fees and rent, and applies
//! transactions atomically. The feed client never reimplements any of that;
//! it only reads accounts and submits transactions through this trait.

use async_trait::async_trait;

use crate::domain::entities::{Address, Keypair, Signature, Transaction};
use crate::error::LedgerError;

/// An account as stored on the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub lamports: u64,
    /// Program allowed to modify `data`
    pub owner: Address,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch an account, `None` if it does not exist
    async fn get_account(&self, address: &Address) -> Result<Option<Account>, LedgerError>;

    /// Balance an account of `data_len` bytes must hold to be exempt from rent
    async fn minimum_balance_for_rent_exemption(&self, data_len: usize)
        -> Result<u64, LedgerError>;

    /// Current transaction fee per signature
    async fn fee_per_signature(&self) -> Result<u64, LedgerError>;

    async fn balance(&self, address: &Address) -> Result<u64, LedgerError>;

    /// Fund an account (test clusters only)
    async fn request_airdrop(
        &self,
        address: &Address,
        lamports: u64,
    ) -> Result<Signature, LedgerError>;

    /// Sign, submit and wait for a transaction; all instructions apply or none do
    async fn send_and_confirm(
        &self,
        transaction: &Transaction,
        signers: &[&Keypair],
    ) -> Result<Signature, LedgerError>;
}
