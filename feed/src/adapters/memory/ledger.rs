//! In-memory ledger implementation

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::program;
use crate::domain::entities::{
    AccountMeta, Address, Blockhash, CreateAccount, Keypair, Signature, Transaction,
    SYSTEM_PROGRAM_ID,
};
use crate::domain::ports::{Account, Ledger};
use crate::error::LedgerError;

/// Default fee charged per transaction signature
pub const DEFAULT_FEE_PER_SIGNATURE: u64 = 5_000;

const LAMPORTS_PER_BYTE_YEAR: u64 = 3_480;
const EXEMPTION_THRESHOLD_YEARS: u64 = 2;
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

#[derive(Default)]
struct State {
    accounts: HashMap<Address, Account>,
    programs: HashSet<Address>,
    slot: u64,
    transactions: u64,
}

/// A single-process ledger applying transactions atomically under one lock
pub struct InMemoryLedger {
    state: Mutex<State>,
    fee_per_signature: u64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            fee_per_signature: DEFAULT_FEE_PER_SIGNATURE,
        }
    }

    pub fn with_fee_per_signature(mut self, fee: u64) -> Self {
        self.fee_per_signature = fee;
        self
    }

    /// Register a new instance of the message feed program and return its id
    pub fn deploy_message_feed_program(&self) -> Address {
        let program_id = Keypair::generate().address();
        self.lock().programs.insert(program_id);
        program_id
    }

    /// Replace or create an account directly
    pub fn set_account(&self, address: Address, account: Account) {
        self.lock().accounts.insert(address, account);
    }

    /// Delete an account, as a cluster reset would
    pub fn remove_account(&self, address: &Address) -> Option<Account> {
        self.lock().accounts.remove(address)
    }

    /// Number of transactions applied so far
    pub fn transaction_count(&self) -> u64 {
        self.lock().transactions
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rent_exempt_minimum(data_len: usize) -> u64 {
        (ACCOUNT_STORAGE_OVERHEAD + data_len as u64)
            * LAMPORTS_PER_BYTE_YEAR
            * EXEMPTION_THRESHOLD_YEARS
    }
}

impl State {
    fn blockhash(&self) -> Blockhash {
        let digest = Sha256::digest(self.slot.to_le_bytes());
        Address::new(digest.into())
    }

    fn next_signature(&mut self, tag: &[u8]) -> Signature {
        self.slot += 1;
        let mut hasher = Sha256::new();
        hasher.update(tag);
        hasher.update(self.slot.to_le_bytes());
        let first = hasher.finalize();
        let second = Sha256::digest(first);

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&first);
        bytes[32..].copy_from_slice(&second);
        Signature::new(bytes)
    }
}

fn create_account(
    accounts: &mut HashMap<Address, Account>,
    metas: &[AccountMeta],
    data: &[u8],
    index: usize,
) -> Result<(), LedgerError> {
    let failed = |reason: &str| LedgerError::InstructionFailed {
        index,
        reason: reason.to_string(),
    };
    let create = CreateAccount::decode(data).ok_or_else(|| failed("unsupported system instruction"))?;
    let [from, to] = metas else {
        return Err(failed("create account expects two accounts"));
    };
    if !from.is_signer || !to.is_signer {
        return Err(failed("create account requires both signatures"));
    }
    if accounts.contains_key(&to.address) {
        return Err(LedgerError::AccountInUse(to.address));
    }

    let rent = InMemoryLedger::rent_exempt_minimum(create.space as usize);
    if create.lamports < rent {
        return Err(failed("insufficient funds for rent"));
    }

    let funder = accounts
        .get_mut(&from.address)
        .ok_or(LedgerError::AccountNotFound(from.address))?;
    if funder.lamports < create.lamports {
        return Err(LedgerError::InsufficientFunds {
            account: from.address,
            needed: create.lamports,
            available: funder.lamports,
        });
    }
    funder.lamports -= create.lamports;

    accounts.insert(
        to.address,
        Account {
            lamports: create.lamports,
            owner: create.owner,
            data: vec![0; create.space as usize],
        },
    );
    Ok(())
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_account(&self, address: &Address) -> Result<Option<Account>, LedgerError> {
        Ok(self.lock().accounts.get(address).cloned())
    }

    async fn minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, LedgerError> {
        Ok(Self::rent_exempt_minimum(data_len))
    }

    async fn fee_per_signature(&self) -> Result<u64, LedgerError> {
        Ok(self.fee_per_signature)
    }

    async fn balance(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self
            .lock()
            .accounts
            .get(address)
            .map(|account| account.lamports)
            .unwrap_or(0))
    }

    async fn request_airdrop(
        &self,
        address: &Address,
        lamports: u64,
    ) -> Result<Signature, LedgerError> {
        let mut state = self.lock();
        let account = state.accounts.entry(*address).or_insert_with(|| Account {
            lamports: 0,
            owner: SYSTEM_PROGRAM_ID,
            data: Vec::new(),
        });
        account.lamports += lamports;
        Ok(state.next_signature(b"airdrop"))
    }

    async fn send_and_confirm(
        &self,
        transaction: &Transaction,
        signers: &[&Keypair],
    ) -> Result<Signature, LedgerError> {
        let mut state = self.lock();
        let signed = transaction.sign(state.blockhash(), signers)?;
        let message = &signed.message;

        // Work on a copy so a failing instruction leaves no trace
        let mut accounts = state.accounts.clone();

        let fee = self.fee_per_signature * signed.signatures.len() as u64;
        let payer = accounts
            .get_mut(&transaction.payer)
            .ok_or(LedgerError::AccountNotFound(transaction.payer))?;
        if payer.lamports < fee {
            return Err(LedgerError::InsufficientFunds {
                account: transaction.payer,
                needed: fee,
                available: payer.lamports,
            });
        }
        payer.lamports -= fee;

        for (index, instruction) in message.instructions.iter().enumerate() {
            let program_id = message.account_keys[usize::from(instruction.program_id_index)];
            let metas: Vec<AccountMeta> = instruction
                .accounts
                .iter()
                .map(|&i| {
                    let i = usize::from(i);
                    AccountMeta {
                        address: message.account_keys[i],
                        is_signer: message.is_signer(i),
                        is_writable: message.is_writable(i),
                    }
                })
                .collect();

            if program_id == SYSTEM_PROGRAM_ID {
                create_account(&mut accounts, &metas, &instruction.data, index)?;
            } else if state.programs.contains(&program_id) {
                program::process(&program_id, &mut accounts, &metas, &instruction.data)
                    .map_err(|reason| LedgerError::InstructionFailed { index, reason })?;
            } else {
                return Err(LedgerError::InstructionFailed {
                    index,
                    reason: format!("unknown program {}", program_id),
                });
            }
        }

        let signature = signed
            .id()
            .ok_or_else(|| LedgerError::TransactionFailed("transaction has no signers".to_string()))?;
        state.accounts = accounts;
        state.slot += 1;
        state.transactions += 1;
        tracing::trace!(%signature, "in-memory transaction applied");
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Instruction, MessageData, UserAccountData, USER_ACCOUNT_LEN};

    async fn funded(ledger: &InMemoryLedger) -> Keypair {
        let payer = Keypair::generate();
        ledger
            .request_airdrop(&payer.address(), 100_000_000)
            .await
            .unwrap();
        payer
    }

    fn create(payer: &Keypair, account: &Keypair, space: usize, owner: Address) -> Instruction {
        CreateAccount {
            lamports: InMemoryLedger::rent_exempt_minimum(space),
            space: space as u64,
            owner,
        }
        .instruction(payer.address(), account.address())
    }

    #[tokio::test]
    async fn test_airdrop_and_balance() {
        let ledger = InMemoryLedger::new();
        let payer = funded(&ledger).await;
        assert_eq!(ledger.balance(&payer.address()).await.unwrap(), 100_000_000);
        assert_eq!(ledger.balance(&Address::new([1; 32])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rent_matches_cluster_formula() {
        let ledger = InMemoryLedger::new();
        assert_eq!(
            ledger.minimum_balance_for_rent_exemption(0).await.unwrap(),
            890_880
        );
    }

    #[tokio::test]
    async fn test_create_account_charges_fee_and_rent() {
        let ledger = InMemoryLedger::new();
        let program_id = ledger.deploy_message_feed_program();
        let payer = funded(&ledger).await;
        let account = Keypair::generate();

        let mut tx = Transaction::new(payer.address());
        tx.add(create(&payer, &account, USER_ACCOUNT_LEN, program_id));
        ledger
            .send_and_confirm(&tx, &[&payer, &account])
            .await
            .unwrap();

        let rent = InMemoryLedger::rent_exempt_minimum(USER_ACCOUNT_LEN);
        let created = ledger.get_account(&account.address()).await.unwrap().unwrap();
        assert_eq!(created.owner, program_id);
        assert_eq!(created.data, vec![0; USER_ACCOUNT_LEN]);
        assert_eq!(
            ledger.balance(&payer.address()).await.unwrap(),
            100_000_000 - rent - 2 * DEFAULT_FEE_PER_SIGNATURE
        );
        assert_eq!(ledger.transaction_count(), 1);

        // Creating the same account again fails and charges nothing
        let err = ledger
            .send_and_confirm(&tx, &[&payer, &account])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountInUse(a) if a == account.address()));
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_instruction_rolls_back_whole_transaction() {
        let ledger = InMemoryLedger::new();
        let program_id = ledger.deploy_message_feed_program();
        let payer = funded(&ledger).await;
        let user = Keypair::generate();
        let message = Keypair::generate();
        let before = ledger.balance(&payer.address()).await.unwrap();

        let mut tx = Transaction::new(payer.address());
        tx.add(create(&payer, &user, USER_ACCOUNT_LEN, program_id));
        // Posts text into an account that was never allocated
        tx.add(Instruction {
            program_id,
            accounts: vec![
                AccountMeta::writable(user.address(), true),
                AccountMeta::writable(message.address(), true),
            ],
            data: b"hello".to_vec(),
        });

        let err = ledger
            .send_and_confirm(&tx, &[&payer, &user, &message])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InstructionFailed { index: 1, .. }));
        assert!(ledger.get_account(&user.address()).await.unwrap().is_none());
        assert_eq!(ledger.balance(&payer.address()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_program_rejected() {
        let ledger = InMemoryLedger::new();
        let payer = funded(&ledger).await;
        let mut tx = Transaction::new(payer.address());
        tx.add(Instruction {
            program_id: Address::new([3; 32]),
            accounts: vec![],
            data: vec![],
        });
        let err = ledger.send_and_confirm(&tx, &[&payer]).await.unwrap_err();
        assert!(matches!(err, LedgerError::InstructionFailed { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_unfunded_payer_rejected() {
        let ledger = InMemoryLedger::new();
        let payer = Keypair::generate();
        let err = ledger
            .send_and_confirm(&Transaction::new(payer.address()), &[&payer])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_program_links_and_bans() {
        let ledger = InMemoryLedger::new();
        let program_id = ledger.deploy_message_feed_program();
        let payer = funded(&ledger).await;
        let user = Keypair::generate();
        let first = Keypair::generate();

        // First post creates the user in the same transaction
        let text = "first";
        let mut tx = Transaction::new(payer.address());
        tx.add(create(&payer, &first, 96 + text.len(), program_id));
        tx.add(create(&payer, &user, USER_ACCOUNT_LEN, program_id));
        tx.add(Instruction {
            program_id,
            accounts: vec![
                AccountMeta::writable(user.address(), true),
                AccountMeta::writable(first.address(), true),
            ],
            data: vec![],
        });
        tx.add(Instruction {
            program_id,
            accounts: vec![
                AccountMeta::writable(user.address(), true),
                AccountMeta::writable(first.address(), true),
            ],
            data: text.as_bytes().to_vec(),
        });
        ledger
            .send_and_confirm(&tx, &[&payer, &user, &first])
            .await
            .unwrap();

        let first_data = MessageData::decode(
            &ledger.get_account(&first.address()).await.unwrap().unwrap().data,
        )
        .unwrap();
        assert_eq!(first_data.creator, first.address());
        assert_eq!(first_data.from, user.address());
        assert!(first_data.is_tail());

        // Second post links from the first and bans the author
        let second = Keypair::generate();
        let mut tx = Transaction::new(payer.address());
        tx.add(create(&payer, &second, 96 + 2, program_id));
        tx.add(Instruction {
            program_id,
            accounts: vec![
                AccountMeta::writable(user.address(), true),
                AccountMeta::writable(second.address(), true),
                AccountMeta::writable(first.address(), false),
                AccountMeta::writable(user.address(), false),
            ],
            data: b"hi".to_vec(),
        });
        ledger
            .send_and_confirm(&tx, &[&payer, &user, &second])
            .await
            .unwrap();

        let first_data = MessageData::decode(
            &ledger.get_account(&first.address()).await.unwrap().unwrap().data,
        )
        .unwrap();
        assert_eq!(first_data.next, second.address());
        assert_eq!(first_data.text, "first");

        let user_data = UserAccountData::decode(
            &ledger.get_account(&user.address()).await.unwrap().unwrap().data,
        )
        .unwrap();
        assert!(user_data.banned);
        assert_eq!(user_data.creator, first.address());
    }
}
