//! Domain entities
//!
//! Core data types of the message feed.

pub mod address;
pub mod config;
pub mod keypair;
pub mod message;
pub mod names;
pub mod transaction;

pub use address::{Address, Signature, ADDRESS_LEN, SIGNATURE_LEN};
pub use config::{ClientConfig, LoginMethod, MessageFeedConfig, PredictionPollConfig};
pub use keypair::Keypair;
pub use message::{
    message_account_size, Message, MessageData, UserAccountData, MESSAGE_HEADER_LEN,
    USER_ACCOUNT_LEN,
};
pub use names::display_name;
pub use transaction::{
    AccountMeta, Blockhash, CompiledMessage, CreateAccount, Instruction, SignedTransaction,
    Transaction, SYSTEM_PROGRAM_ID,
};
