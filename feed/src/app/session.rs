//! Feed session
//!
//! Everything one client knows about one feed: which program and first
//! message it follows, the logged-in user, the messages loaded so far and a
//! counter of successful posts. Shared by the refresh loop and the code that
//! posts on the user's behalf.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, Mutex};

use super::feed_poster::FeedPoster;
use super::feed_reader::FeedReader;
use super::notification::Notification;
use crate::domain::entities::{Address, Keypair, Message, MessageFeedConfig, Signature};
use crate::domain::ports::Ledger;
use crate::error::FeedError;

const EVENT_CAPACITY: usize = 256;

/// Holds an `AtomicBool` set for as long as the guard lives
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FeedSession<L: Ledger> {
    reader: FeedReader<L>,
    poster: FeedPoster<L>,
    config: RwLock<MessageFeedConfig>,
    user: RwLock<Option<Keypair>>,
    messages: Mutex<Vec<Message>>,
    post_count: AtomicU64,
    posting: AtomicBool,
    refreshing: AtomicBool,
    events: broadcast::Sender<Message>,
}

impl<L: Ledger> FeedSession<L> {
    pub fn new(ledger: Arc<L>, config: MessageFeedConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            reader: FeedReader::new(ledger.clone()),
            poster: FeedPoster::new(ledger),
            config: RwLock::new(config),
            user: RwLock::new(None),
            messages: Mutex::new(Vec::new()),
            post_count: AtomicU64::new(0),
            posting: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
            events,
        }
    }

    pub fn config(&self) -> MessageFeedConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Follow a new feed config
    ///
    /// A different program id or first message means a new feed (a redeploy
    /// or a re-bootstrap after a cluster reset): the loaded messages and the
    /// user are dropped. Returns whether that reset happened.
    pub async fn apply_config(&self, config: MessageFeedConfig) -> bool {
        let mut messages = self.messages.lock().await;
        {
            let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
            if *current == config {
                return false;
            }
            tracing::info!(
                program_id = %config.program_id,
                first_message = %config.first_message_key,
                "Feed changed, resetting session"
            );
            *current = config;
        }
        messages.clear();
        self.set_user(None);
        true
    }

    pub fn user(&self) -> Option<Keypair> {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_user(&self, user: Option<Keypair>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    /// Snapshot of the loaded messages, in chain order
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    /// Receive every message as the session first observes it
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    pub fn is_posting(&self) -> bool {
        self.posting.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn set_posting(&self, posting: bool) {
        self.posting.store(posting, Ordering::Release);
    }

    pub fn post_count(&self) -> u64 {
        self.post_count.load(Ordering::Acquire)
    }

    pub async fn is_user_banned(&self, user: &Address) -> Result<bool, FeedError> {
        self.reader.is_banned(user).await
    }

    /// Bring the loaded messages up to date with the chain
    ///
    /// Refreshes until no post completed while the refresh ran, so a post
    /// made from this session is always visible once `poll` returns. Returns
    /// immediately when another poll is already running.
    pub async fn poll(&self) -> Result<usize, FeedError> {
        let Some(_refreshing) = FlagGuard::acquire(&self.refreshing) else {
            tracing::trace!("Refresh already in flight");
            return Ok(0);
        };

        let mut appended = 0;
        loop {
            let post_count = self.post_count();
            let first_message = self.config().first_message_key;

            let mut messages = self.messages.lock().await;
            let start = messages.is_empty().then_some(first_message);
            appended += self
                .reader
                .refresh(&mut messages, start, |message| {
                    // No subscribers is fine
                    let _ = self.events.send(message.clone());
                })
                .await?;
            drop(messages);

            if post_count == self.post_count() {
                break;
            }
            tracing::debug!("Post count increased, refreshing");
        }
        Ok(appended)
    }

    /// Post `text` as the current user after the newest loaded message
    pub async fn try_post(
        &self,
        payer: &Keypair,
        text: &str,
        moderation_target: Option<&Address>,
    ) -> Result<Signature, FeedError> {
        let Some(_posting) = FlagGuard::acquire(&self.posting) else {
            return Err(FeedError::Busy);
        };
        let user = self.user().ok_or(FeedError::NoUser)?;
        if self.reader.is_banned(&user.address()).await? {
            return Err(FeedError::Banned(user.address()));
        }

        let tail = self
            .messages
            .lock()
            .await
            .last()
            .map(|message| message.address)
            .ok_or(FeedError::EmptyFeed)?;
        let signature = self
            .poster
            .post_message(payer, &user, text, &tail, moderation_target)
            .await?;
        self.post_count.fetch_add(1, Ordering::AcqRel);
        Ok(signature)
    }

    /// Like `try_post`, reporting the outcome as a notification
    pub async fn post(
        &self,
        payer: &Keypair,
        text: &str,
        moderation_target: Option<&Address>,
    ) -> Notification {
        match self.try_post(payer, text, moderation_target).await {
            Ok(signature) => Notification::with_signature("Message posted", signature),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to post message");
                match err {
                    FeedError::Banned(_)
                    | FeedError::Busy
                    | FeedError::NoUser
                    | FeedError::EmptyFeed => Notification::new(err.user_message()),
                    _ => Notification::new("An error occured when posting the message"),
                }
            }
        }
    }
}
