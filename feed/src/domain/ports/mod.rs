//! Domain ports (traits)
//!
//! Port traits define interfaces that the feed client requires.
//! Adapters provide concrete implementations of these traits.

pub mod ledger;

pub use ledger::{Account, Ledger};
