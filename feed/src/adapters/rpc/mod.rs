//! Ledger JSON-RPC adapter

mod client;

pub use client::RpcLedger;
