//! Chain Adapters - Blockchain Interaction Layer
//!
//! Provides on-chain access via alloy-rs 0.9: a rate-limited JSON-RPC
//! transport with the service signer attached, plus startup validation
//! of the configured chain and contract deployments.

pub mod provider;

pub use provider::AlloyChainClient;
