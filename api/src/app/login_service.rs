//! Login service
//!
//! Local login: every id gets one user account on the current feed, created
//! on first login and handed back unchanged afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use messagefeed::domain::entities::USER_ACCOUNT_LEN;
use messagefeed::{Address, FeedPoster, Keypair, Ledger};
use tokio::sync::Mutex;

use super::feed_controller::FeedMeta;
use crate::error::AppError;

/// Signatures on a create-user transaction: payer, user and first message
const CREATE_USER_SIGNATURES: u64 = 3;

#[derive(Default)]
struct Users {
    /// First message of the feed the accounts below belong to
    feed: Option<Address>,
    accounts: HashMap<String, Keypair>,
}

pub struct LoginService<L: Ledger> {
    ledger: Arc<L>,
    poster: FeedPoster<L>,
    users: Mutex<Users>,
}

impl<L: Ledger> LoginService<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            poster: FeedPoster::new(ledger.clone()),
            ledger,
            users: Mutex::new(Users::default()),
        }
    }

    /// User account for `id` on the feed described by `meta`
    pub async fn login(&self, id: &str, meta: &FeedMeta) -> Result<Keypair, AppError> {
        if id.is_empty() {
            return Err(AppError::BadRequest("id must not be empty".to_string()));
        }

        // Held across account creation so one id never gets two accounts
        let mut users = self.users.lock().await;
        let feed = meta.first_message.address();
        if users.feed != Some(feed) {
            if !users.accounts.is_empty() {
                tracing::info!(%feed, dropped = users.accounts.len(), "New feed, forgetting users");
            }
            users.accounts.clear();
            users.feed = Some(feed);
        }

        if let Some(user) = users.accounts.get(id) {
            tracing::debug!(id, "Account already exists for user");
            return Ok(user.clone());
        }

        tracing::info!(id, "Creating new account for user");
        let user = self.create_user(meta).await?;
        users.accounts.insert(id.to_string(), user.clone());
        Ok(user)
    }

    async fn create_user(&self, meta: &FeedMeta) -> Result<Keypair, AppError> {
        let fee = self.ledger.fee_per_signature().await?;
        let rent = self
            .ledger
            .minimum_balance_for_rent_exemption(USER_ACCOUNT_LEN)
            .await?;

        let payer = Keypair::generate();
        self.ledger
            .request_airdrop(&payer.address(), rent + fee * CREATE_USER_SIGNATURES)
            .await?;

        let user = self
            .poster
            .create_user(&meta.program_id, &payer, &meta.first_message)
            .await?;
        Ok(user)
    }
}
