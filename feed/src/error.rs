//! Error types for the message feed client
//!
//! This module defines error types for each layer:
//! - `KeyError`: address, signature and keypair parsing errors
//! - `DecodeError`: malformed account data
//! - `LedgerError`: failures reported by a ledger adapter
//! - `FeedError`: errors surfaced by the Feed Reader, Feed Poster and session

use thiserror::Error;

use crate::domain::entities::Address;

/// Address, signature and keypair parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid base58: {0}")]
    Base58(String),

    #[error("Invalid hex: {0}")]
    Hex(String),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Invalid keypair: {0}")]
    Keypair(String),
}

/// Account data that does not match the expected layout
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Account data too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Message text is not valid UTF-8")]
    InvalidUtf8,
}

/// Ledger adapter errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(Address),

    #[error("Insufficient funds in {account}: needed {needed}, available {available}")]
    InsufficientFunds {
        account: Address,
        needed: u64,
        available: u64,
    },

    #[error("Account already in use: {0}")]
    AccountInUse(Address),

    #[error("Missing signature for {0}")]
    MissingSignature(Address),

    #[error("Instruction {index} failed: {reason}")]
    InstructionFailed { index: usize, reason: String },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Feed client errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// The config server is still bootstrapping the feed
    #[error("Config unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Failed to fetch {address}: {source}")]
    Fetch {
        address: Address,
        #[source]
        source: LedgerError,
    },

    #[error("Failed to decode {address}: {source}")]
    Decode {
        address: Address,
        #[source]
        source: DecodeError,
    },

    #[error("Submission failed: {0}")]
    Submission(#[source] LedgerError),

    #[error("User {0} is banned")]
    Banned(Address),

    #[error("Feed has no messages to post after")]
    EmptyFeed,

    #[error("No user account")]
    NoUser,

    /// Another post from this session is still outstanding
    #[error("A post is already in progress")]
    Busy,
}

impl FeedError {
    /// Short human readable text for a transient notification
    pub fn user_message(&self) -> &'static str {
        match self {
            FeedError::ConfigUnavailable(_) => "Waiting for the feed to finish loading",
            FeedError::Fetch { .. } | FeedError::Decode { .. } => "Unable to load messages",
            FeedError::Submission(_) => "An error occured when posting the message",
            FeedError::Banned(_) => "You are banned",
            FeedError::EmptyFeed => "Messages are still loading",
            FeedError::NoUser => "Login required",
            FeedError::Busy => "Unable to post message, please retry when not busy",
        }
    }
}
