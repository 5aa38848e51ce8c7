//! CL8Y Gift - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod ledger;
pub mod listener;
pub mod metrics;
pub mod node_client;
pub mod server;
pub mod testing;
pub mod token;
pub mod types;
pub mod watcher;
