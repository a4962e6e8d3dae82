//! User Directory Port - Wallet Lookup Collaborator

use alloy::primitives::Address;
use async_trait::async_trait;

/// Result of a wallet lookup for a known user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletLookup {
  /// The user exists and has linked this wallet.
  Linked(Address),
  /// The user exists but has no wallet on file.
  NoWallet,
  /// No such user.
  NotFound,
}

#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
  async fn wallet_address(&self, user_id: &str) -> anyhow::Result<WalletLookup>;
}
