//! Message Feed client library
//!
//! Walks and extends an append-only, singly linked feed of messages stored in
//! ledger accounts. Uses hexagonal (ports & adapters) architecture:
//! - `domain`: addresses, keys, the record codec and the transaction wire format
//! - `domain::ports`: the `Ledger` trait the client logic is written against
//! - `adapters`: JSON-RPC ledger client and an in-memory ledger
//! - `app`: Feed Reader, Feed Poster, session context and the refresh loop

pub mod adapters;
pub mod app;
pub mod domain;
pub mod error;

#[cfg(test)]
mod test_utils;

pub use app::{
    FeedPoster, FeedReader, FeedSession, LoopState, Notification, PostReceipt, RefreshConfig,
    RefreshHandle, RefreshLoop,
};
pub use domain::entities::{Address, ClientConfig, Keypair, Message, Signature};
pub use domain::ports::Ledger;
pub use error::{DecodeError, FeedError, KeyError, LedgerError};
