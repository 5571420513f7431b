//! Message feed program semantics, executed in process
//!
//! Accounts: `[user, new message, previous tail?, user to ban?]`.
//! Empty instruction data initializes the user account; otherwise the data is
//! the message text.

use std::collections::HashMap;

use crate::domain::entities::{
    AccountMeta, Address, MessageData, UserAccountData, MESSAGE_HEADER_LEN,
};
use crate::domain::ports::Account;

pub(super) fn process(
    program_id: &Address,
    accounts: &mut HashMap<Address, Account>,
    metas: &[AccountMeta],
    data: &[u8],
) -> Result<(), String> {
    if metas.len() < 2 {
        return Err("expected at least two keys".to_string());
    }
    let user = metas[0];
    let message = metas[1];
    if !user.is_signer {
        return Err("not signed by key 0".to_string());
    }
    if !message.is_signer {
        return Err("not signed by key 1".to_string());
    }

    let mut user_data = UserAccountData::decode(&owned_data(program_id, accounts, &user)?)
        .map_err(|e| e.to_string())?;
    if user_data.banned {
        return Err("user is banned".to_string());
    }

    // No instruction data means that a new user account should be initialized
    if data.is_empty() {
        user_data.creator = message.address;
        return write(accounts, &user, user_data.encode());
    }

    let text = std::str::from_utf8(data).map_err(|_| "text is not valid UTF-8".to_string())?;
    let message_len = owned_data(program_id, accounts, &message)?.len();
    if message_len != MESSAGE_HEADER_LEN + data.len() {
        return Err(format!(
            "message account holds {} bytes, text needs {}",
            message_len,
            MESSAGE_HEADER_LEN + data.len()
        ));
    }

    let mut new_message = MessageData {
        next: Address::EMPTY,
        from: user.address,
        creator: message.address,
        text: text.to_string(),
    };

    if let Some(previous) = metas.get(2) {
        let mut previous_data = MessageData::decode(&owned_data(program_id, accounts, previous)?)
            .map_err(|e| e.to_string())?;
        if !previous_data.next.is_empty() {
            return Err(format!("{} already has a next message", previous.address));
        }

        // Link the new message to the previous tail
        previous_data.next = message.address;
        new_message.creator = previous_data.creator;
        write(accounts, previous, previous_data.encode())?;

        if let Some(ban) = metas.get(3) {
            let mut ban_data = UserAccountData::decode(&owned_data(program_id, accounts, ban)?)
                .map_err(|e| e.to_string())?;
            ban_data.banned = true;
            write(accounts, ban, ban_data.encode())?;
        }
    }

    if user_data.creator != new_message.creator {
        return Err("user and message creator mismatch".to_string());
    }

    write(accounts, &message, new_message.encode())
}

fn owned_data(
    program_id: &Address,
    accounts: &HashMap<Address, Account>,
    meta: &AccountMeta,
) -> Result<Vec<u8>, String> {
    let account = accounts
        .get(&meta.address)
        .ok_or_else(|| format!("account {} does not exist", meta.address))?;
    if account.owner != *program_id {
        return Err(format!("account {} is not owned by the program", meta.address));
    }
    Ok(account.data.clone())
}

/// Overwrite account data in place; the allocation size never changes
fn write(
    accounts: &mut HashMap<Address, Account>,
    meta: &AccountMeta,
    bytes: Vec<u8>,
) -> Result<(), String> {
    if !meta.is_writable {
        return Err(format!("account {} is not writable", meta.address));
    }
    let account = accounts
        .get_mut(&meta.address)
        .ok_or_else(|| format!("account {} does not exist", meta.address))?;
    if bytes.len() > account.data.len() {
        return Err(format!("account {} is too small", meta.address));
    }
    account.data[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}
