//! In-process ledger adapter
//!
//! Executes the system program and the message feed program against an
//! in-memory account map. Used by tests and local demos in place of a cluster.

mod ledger;
mod program;

pub use ledger::InMemoryLedger;
