//! BNPL Ledger - Library Root
//!
//! Reconciles a local loan ledger with an on-chain BNPL contract.
//! Re-exports all modules for the daemon, integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
