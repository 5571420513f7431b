//! Feed Reader
//!
//! Walks the singly linked chain of message accounts, appending every record
//! it has not seen yet to a caller-owned feed.

use std::sync::Arc;

use crate::domain::entities::{Address, Message, MessageData, UserAccountData};
use crate::domain::ports::{Account, Ledger};
use crate::error::{FeedError, LedgerError};

/// A decoded message plus the program that owns its account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub data: MessageData,
    pub program_id: Address,
}

/// Fetch an account, treating a missing account as a fetch failure
pub(crate) async fn fetch_account<L: Ledger + ?Sized>(
    ledger: &L,
    address: &Address,
) -> Result<Account, FeedError> {
    ledger
        .get_account(address)
        .await
        .and_then(|account| account.ok_or(LedgerError::AccountNotFound(*address)))
        .map_err(|source| FeedError::Fetch {
            address: *address,
            source,
        })
}

/// Reads messages and user accounts from the ledger
pub struct FeedReader<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> FeedReader<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Read the contents of a message
    pub async fn read_message(&self, address: &Address) -> Result<StoredMessage, FeedError> {
        let account = fetch_account(self.ledger.as_ref(), address).await?;
        let data = MessageData::decode(&account.data).map_err(|source| FeedError::Decode {
            address: *address,
            source,
        })?;
        Ok(StoredMessage {
            data,
            program_id: account.owner,
        })
    }

    /// Checks if a user has been banned
    pub async fn is_banned(&self, user: &Address) -> Result<bool, FeedError> {
        let account = fetch_account(self.ledger.as_ref(), user).await?;
        let data = UserAccountData::decode(&account.data).map_err(|source| FeedError::Decode {
            address: *user,
            source,
        })?;
        Ok(data.banned)
    }

    /// Where a walk continuing `feed` starts: the current tail's successor
    ///
    /// Returns `None` for an empty feed, which has nothing to anchor from.
    /// The successor may be the sentinel, meaning the feed is up to date.
    pub async fn tail_successor(&self, feed: &[Message]) -> Result<Option<Address>, FeedError> {
        match feed.last() {
            Some(tail) => Ok(Some(self.read_message(&tail.address).await?.data.next)),
            None => Ok(None),
        }
    }

    /// Append every message reachable from `start` to `feed`, in chain order
    ///
    /// With `start = None` the walk continues from the tail of `feed`; with an
    /// empty feed that is a no-op. `on_message` sees each message as it is
    /// appended. On failure, messages appended before the failing fetch stay
    /// in `feed`: each of them is a verified link, so `feed` is still a prefix
    /// of the chain and the next refresh resumes from its tail.
    ///
    /// Returns the number of messages appended.
    pub async fn refresh<F>(
        &self,
        feed: &mut Vec<Message>,
        start: Option<Address>,
        mut on_message: F,
    ) -> Result<usize, FeedError>
    where
        F: FnMut(&Message),
    {
        let mut current = match start {
            Some(address) => address,
            None => match self.tail_successor(feed).await? {
                Some(next) => next,
                None => return Ok(0),
            },
        };

        let mut appended = 0;
        while !current.is_empty() {
            tracing::debug!(message = %current, "Loading message");
            let stored = self.read_message(&current).await?;
            let next = stored.data.next;

            feed.push(Message::new(current, stored.data));
            appended += 1;
            if let Some(message) = feed.last() {
                on_message(message);
            }
            current = next;
        }
        Ok(appended)
    }
}
