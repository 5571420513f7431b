//! Adapters layer
//!
//! Implementations of the `Ledger` port.

#[cfg(any(test, feature = "memory-ledger"))]
pub mod memory;
pub mod rpc;

#[cfg(any(test, feature = "memory-ledger"))]
pub use memory::InMemoryLedger;
pub use rpc::RpcLedger;
