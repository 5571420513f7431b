//! Feed Poster
//!
//! Builds the single atomic transaction that allocates a new message account,
//! writes the message and links it after the current tail. The ledger rejects
//! the post if that tail already has a successor, so racing posters cannot
//! fork the chain; the loser re-reads the tail and retries.

use std::sync::Arc;

use super::feed_reader::fetch_account;
use crate::domain::entities::{
    message_account_size, AccountMeta, Address, CreateAccount, Instruction, Keypair, Signature,
    Transaction, USER_ACCOUNT_LEN,
};
use crate::domain::ports::Ledger;
use crate::error::FeedError;

/// Signatures on a post: payer, author and the new message account
const POST_SIGNATURES: u64 = 3;

/// Result of a successful post
#[derive(Debug, Clone)]
pub struct PostReceipt {
    pub signature: Signature,
    /// Address of the new message account
    pub message: Address,
    /// Author that signed the post; freshly created when none was supplied
    pub author: Keypair,
}

/// Submits messages and user accounts to the ledger
pub struct FeedPoster<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> FeedPoster<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Balance a payer needs to post `text`, including fees
    pub async fn required_balance(&self, text: &str, creates_author: bool) -> Result<u64, FeedError> {
        let fee = self.ledger.fee_per_signature().await.map_err(FeedError::Submission)?;
        let mut balance = self.rent(message_account_size(text)).await? + fee * POST_SIGNATURES;
        if creates_author {
            balance += self.rent(USER_ACCOUNT_LEN).await?;
        }
        Ok(balance)
    }

    /// Post `text` after `previous`, optionally banning `moderation_target`
    ///
    /// The program id is taken from the owner of the previous message.
    pub async fn post_message(
        &self,
        payer: &Keypair,
        author: &Keypair,
        text: &str,
        previous: &Address,
        moderation_target: Option<&Address>,
    ) -> Result<Signature, FeedError> {
        let previous_account = fetch_account(self.ledger.as_ref(), previous).await?;
        let message = Keypair::generate();
        let receipt = self
            .post_message_with_program_id(
                &previous_account.owner,
                payer,
                Some(author),
                &message,
                text,
                Some(previous),
                moderation_target,
            )
            .await?;
        Ok(receipt.signature)
    }

    /// Post with an explicit program id
    ///
    /// Without `author` a new user account is created and initialized in the
    /// same transaction. Without `previous` the message starts a new feed.
    /// `moderation_target` is only honored together with `previous`.
    #[allow(clippy::too_many_arguments)]
    pub async fn post_message_with_program_id(
        &self,
        program_id: &Address,
        payer: &Keypair,
        author: Option<&Keypair>,
        message: &Keypair,
        text: &str,
        previous: Option<&Address>,
        moderation_target: Option<&Address>,
    ) -> Result<PostReceipt, FeedError> {
        let mut transaction = Transaction::new(payer.address());

        // Allocate the message account
        transaction.add(
            CreateAccount {
                lamports: self.rent(message_account_size(text)).await?,
                space: message_account_size(text) as u64,
                owner: *program_id,
            }
            .instruction(payer.address(), message.address()),
        );

        let author = match author {
            Some(author) => author.clone(),
            None => {
                let user = Keypair::generate();
                self.add_create_user(&mut transaction, program_id, payer, &user, message)
                    .await?;
                user
            }
        };

        // Post the message, optionally link it and optionally ban another user
        let mut accounts = vec![
            AccountMeta::writable(author.address(), true),
            AccountMeta::writable(message.address(), true),
        ];
        if let Some(previous) = previous {
            accounts.push(AccountMeta::writable(*previous, false));
            if let Some(target) = moderation_target {
                accounts.push(AccountMeta::writable(*target, false));
            }
        }
        transaction.add(Instruction {
            program_id: *program_id,
            accounts,
            data: text.as_bytes().to_vec(),
        });

        let signature = self
            .ledger
            .send_and_confirm(&transaction, &[payer, &author, message])
            .await
            .map_err(FeedError::Submission)?;
        tracing::info!(
            message = %message.address(),
            author = %author.address(),
            %signature,
            "Posted message"
        );

        Ok(PostReceipt {
            signature,
            message: message.address(),
            author,
        })
    }

    /// Create a user account bound to the feed that starts at `first_message`
    pub async fn create_user(
        &self,
        program_id: &Address,
        payer: &Keypair,
        first_message: &Keypair,
    ) -> Result<Keypair, FeedError> {
        let user = Keypair::generate();
        let mut transaction = Transaction::new(payer.address());
        self.add_create_user(&mut transaction, program_id, payer, &user, first_message)
            .await?;

        let signature = self
            .ledger
            .send_and_confirm(&transaction, &[payer, &user, first_message])
            .await
            .map_err(FeedError::Submission)?;
        tracing::info!(user = %user.address(), %signature, "Created user account");
        Ok(user)
    }

    /// Allocate a user account and initialize its creator to `message`
    async fn add_create_user(
        &self,
        transaction: &mut Transaction,
        program_id: &Address,
        payer: &Keypair,
        user: &Keypair,
        message: &Keypair,
    ) -> Result<(), FeedError> {
        transaction.add(
            CreateAccount {
                lamports: self.rent(USER_ACCOUNT_LEN).await?,
                space: USER_ACCOUNT_LEN as u64,
                owner: *program_id,
            }
            .instruction(payer.address(), user.address()),
        );
        transaction.add(Instruction {
            program_id: *program_id,
            accounts: vec![
                AccountMeta::writable(user.address(), true),
                AccountMeta::writable(message.address(), true),
            ],
            data: Vec::new(),
        });
        Ok(())
    }

    async fn rent(&self, data_len: usize) -> Result<u64, FeedError> {
        self.ledger
            .minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(FeedError::Submission)
    }
}
