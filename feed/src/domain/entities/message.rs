//! Message and user account layouts
//!
//! The byte layouts are owned by the on-chain message feed program and must
//! match it exactly:
//!
//! ```text
//! message: next (32) | from (32) | creator (32) | text (rest, NUL terminated or to end)
//! user:    banned (1) | creator (32)
//! ```

use serde::Serialize;

use super::address::{Address, ADDRESS_LEN};
use super::names::display_name;
use crate::error::DecodeError;

/// Size of the fixed message header preceding the text
pub const MESSAGE_HEADER_LEN: usize = 3 * ADDRESS_LEN;

/// Size of a user account
pub const USER_ACCOUNT_LEN: usize = 1 + ADDRESS_LEN;

/// Size of a message account holding `text`
pub fn message_account_size(text: &str) -> usize {
    MESSAGE_HEADER_LEN + text.len()
}

/// Decoded contents of a message account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageData {
    /// Next message in the chain, or `Address::EMPTY` for the tail
    pub next: Address,
    /// User account that posted the message
    pub from: Address,
    /// First message of the feed this message belongs to
    pub creator: Address,
    pub text: String,
}

impl MessageData {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < MESSAGE_HEADER_LEN {
            return Err(DecodeError::TooShort {
                expected: MESSAGE_HEADER_LEN,
                actual: data.len(),
            });
        }

        let (header, text) = data.split_at(MESSAGE_HEADER_LEN);
        let text = match text.iter().position(|b| *b == 0) {
            Some(end) => &text[..end],
            None => text,
        };
        let text = std::str::from_utf8(text)
            .map_err(|_| DecodeError::InvalidUtf8)?
            .to_string();

        Ok(Self {
            next: read_address(header, 0),
            from: read_address(header, 1),
            creator: read_address(header, 2),
            text,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(message_account_size(&self.text));
        data.extend_from_slice(self.next.as_bytes());
        data.extend_from_slice(self.from.as_bytes());
        data.extend_from_slice(self.creator.as_bytes());
        data.extend_from_slice(self.text.as_bytes());
        data
    }

    pub fn is_tail(&self) -> bool {
        self.next.is_empty()
    }
}

/// Decoded contents of a user (author identity) account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAccountData {
    pub banned: bool,
    /// First message of the feed this user may post to
    pub creator: Address,
}

impl UserAccountData {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < USER_ACCOUNT_LEN {
            return Err(DecodeError::TooShort {
                expected: USER_ACCOUNT_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            banned: data[0] != 0,
            creator: read_address(&data[1..], 0),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(USER_ACCOUNT_LEN);
        data.push(self.banned as u8);
        data.extend_from_slice(self.creator.as_bytes());
        data
    }
}

fn read_address(data: &[u8], index: usize) -> Address {
    let start = index * ADDRESS_LEN;
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(&data[start..start + ADDRESS_LEN]);
    Address::new(bytes)
}

/// A message as held in a client feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Address of the message account
    pub address: Address,
    pub from: Address,
    /// Display name derived from `from`
    pub name: String,
    pub text: String,
}

impl Message {
    pub fn new(address: Address, data: MessageData) -> Self {
        Self {
            address,
            name: display_name(&data.from),
            from: data.from,
            text: data.text,
        }
    }
}
