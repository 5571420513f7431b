//! Feed controller
//!
//! Owns the feed instance the server hands to its clients. The feed is
//! bootstrapped by posting a first message on the deployed program; when that
//! message disappears (a cluster reset) the feed is bootstrapped again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use messagefeed::domain::entities::MessageFeedConfig;
use messagefeed::{Address, FeedError, FeedPoster, Keypair, Ledger};

pub const FIRST_POST: &str = "First post! 💫";

/// A live feed: the program it runs on and its first message
#[derive(Debug, Clone)]
pub struct FeedMeta {
    pub program_id: Address,
    /// Signs for the first message when new users are bound to this feed
    pub first_message: Keypair,
}

impl FeedMeta {
    pub fn client_config(&self) -> MessageFeedConfig {
        MessageFeedConfig {
            program_id: self.program_id,
            first_message_key: self.first_message.address(),
        }
    }
}

pub struct FeedController<L: Ledger> {
    ledger: Arc<L>,
    poster: FeedPoster<L>,
    program_id: Address,
    meta: RwLock<Option<FeedMeta>>,
    loading: AtomicBool,
}

impl<L: Ledger + 'static> FeedController<L> {
    pub fn new(ledger: Arc<L>, program_id: Address) -> Self {
        Self {
            poster: FeedPoster::new(ledger.clone()),
            ledger,
            program_id,
            meta: RwLock::new(None),
            loading: AtomicBool::new(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// The live feed, or `None` while there is none
    ///
    /// Verifies the first message still exists. A missing feed triggers a
    /// background bootstrap.
    pub async fn meta(self: &Arc<Self>) -> Option<FeedMeta> {
        if self.is_loading() {
            return None;
        }

        if let Some(meta) = self.current() {
            let first_message = meta.first_message.address();
            match self.ledger.get_account(&first_message).await {
                Ok(Some(_)) => return Some(meta),
                Ok(None) => {
                    tracing::warn!(%first_message, "First message is gone, recreating feed")
                }
                Err(e) => {
                    tracing::warn!(%first_message, error = %e, "Unable to check first message")
                }
            }
            self.set_current(None);
        }

        self.spawn_reload();
        None
    }

    pub fn spawn_reload(self: &Arc<Self>) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.reload().await;
        });
    }

    /// Bootstrap a new feed unless one is already being bootstrapped
    pub async fn reload(&self) -> Option<FeedMeta> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let result = self.create_message_feed().await;
        self.loading.store(false, Ordering::Release);

        match result {
            Ok(meta) => {
                self.set_current(Some(meta.clone()));
                Some(meta)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create message feed");
                None
            }
        }
    }

    async fn create_message_feed(&self) -> Result<FeedMeta, FeedError> {
        tracing::info!(program_id = %self.program_id, "Posting first message...");

        let payer = Keypair::generate();
        let balance = self.poster.required_balance(FIRST_POST, true).await?;
        self.ledger
            .request_airdrop(&payer.address(), balance)
            .await
            .map_err(FeedError::Submission)?;

        let first_message = Keypair::generate();
        self.poster
            .post_message_with_program_id(
                &self.program_id,
                &payer,
                None,
                &first_message,
                FIRST_POST,
                None,
                None,
            )
            .await?;

        tracing::info!(first_message = %first_message.address(), "Message feed created");
        Ok(FeedMeta {
            program_id: self.program_id,
            first_message,
        })
    }

    fn current(&self) -> Option<FeedMeta> {
        self.meta
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, meta: Option<FeedMeta>) {
        *self.meta.write().unwrap_or_else(PoisonError::into_inner) = meta;
    }
}
