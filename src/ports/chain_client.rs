//! Chain Client Port - Blockchain Transport Interface
//!
//! Thin transport over a JSON-RPC node plus one signing identity.
//! Knows nothing about the BNPL contract: it moves calldata out and
//! raw bytes, receipts and logs back. The alloy-backed adapter lives in
//! `adapters::chain`; tests substitute fakes and mocks.

use alloy::primitives::{Address, B256, Bytes, Log};
use async_trait::async_trait;

/// A contract call ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCall {
  /// ABI method name, used for logs, metrics and error messages.
  pub method: &'static str,
  /// Target contract.
  pub to: Address,
  /// ABI-encoded calldata (selector + arguments).
  pub calldata: Bytes,
}

impl ChainCall {
  pub fn new(method: &'static str, to: Address, calldata: impl Into<Bytes>) -> Self {
    Self {
      method,
      to,
      calldata: calldata.into(),
    }
  }
}

/// The parts of a mined transaction's receipt the engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
  pub tx_hash: B256,
  /// `true` when the transaction executed without reverting.
  pub status: bool,
  pub gas_used: u64,
  pub block_number: Option<u64>,
  /// Emitted logs, in order.
  pub logs: Vec<Log>,
}

/// A log returned by `eth_getLogs`, with its position on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedLog {
  pub log: Log,
  pub block_number: Option<u64>,
  pub tx_hash: Option<B256>,
}

/// Transport to a blockchain node with a single injected signer.
///
/// Every method is a network suspension point. None of them retry.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
  /// Address of the signer used for every outgoing transaction.
  fn signer_address(&self) -> Address;

  /// Chain id reported by the node.
  async fn chain_id(&self) -> anyhow::Result<u64>;

  /// Execute a read-only `eth_call` against the latest block.
  async fn call(&self, call: &ChainCall) -> anyhow::Result<Bytes>;

  /// Estimate gas for a write call sent from the signer.
  async fn estimate_gas(&self, call: &ChainCall) -> anyhow::Result<u64>;

  /// Sign and broadcast a write call with an explicit gas limit.
  async fn send_transaction(&self, call: &ChainCall, gas_limit: u64) -> anyhow::Result<B256>;

  /// Wait until the transaction is mined and return its receipt.
  ///
  /// Unbounded: callers apply their own timeout.
  async fn wait_for_receipt(&self, tx_hash: B256) -> anyhow::Result<TxReceipt>;

  /// Fetch a receipt once without waiting. `None` if not (yet) mined.
  async fn transaction_receipt(&self, tx_hash: B256) -> anyhow::Result<Option<TxReceipt>>;

  /// Latest block number.
  async fn block_number(&self) -> anyhow::Result<u64>;

  /// Logs emitted by `address` in the inclusive block range.
  async fn logs(&self, address: Address, from_block: u64, to_block: u64) -> anyhow::Result<Vec<ObservedLog>>;

  /// Check if the node connection is healthy.
  async fn is_healthy(&self) -> bool;
}
