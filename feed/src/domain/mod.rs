//! Domain layer
//!
//! Contains the feed's data model with no I/O.
//! - `entities`: addresses, keys, records and transactions
//! - `ports`: trait definitions for the external ledger

pub mod entities;
pub mod ports;
