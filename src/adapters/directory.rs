//! File-backed User Directory
//!
//! Loads the user → wallet mapping from a JSON file at startup:
//!
//! ```json
//! [{ "user_id": "u-1", "wallet_address": "0xabc..." },
//!  { "user_id": "u-2", "wallet_address": null }]
//! ```

use std::collections::HashMap;
use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::ports::user_directory::{UserDirectory, WalletLookup};

#[derive(Debug, Deserialize)]
struct UserEntry {
    user_id: String,
    #[serde(default)]
    wallet_address: Option<Address>,
}

#[derive(Debug, Default)]
pub struct StaticUserDirectory {
    wallets: HashMap<String, Option<Address>>,
}

impl StaticUserDirectory {
    /// Read the directory file. A missing file yields an empty directory.
    pub async fn load(path: &str) -> Result<Self> {
        if !tokio::fs::try_exists(Path::new(path)).await.unwrap_or(false) {
            warn!(path, "User directory file not found, every user lookup will miss");
            return Ok(Self::default());
        }
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read user directory: {path}"))?;
        let directory = Self::from_json(&json)?;
        info!(path, users = directory.wallets.len(), "User directory loaded");
        Ok(directory)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<UserEntry> = serde_json::from_str(json).context("Failed to parse user directory")?;
        Ok(Self::from_entries(
            entries.into_iter().map(|e| (e.user_id, e.wallet_address)),
        ))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Option<Address>)>) -> Self {
        Self {
            wallets: entries.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn wallet_address(&self, user_id: &str) -> Result<WalletLookup> {
        Ok(match self.wallets.get(user_id) {
            Some(Some(addr)) => WalletLookup::Linked(*addr),
            Some(None) => WalletLookup::NoWallet,
            None => WalletLookup::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[tokio::test]
    async fn test_lookup_variants() {
        let dir = StaticUserDirectory::from_json(
            r#"[
                {"user_id": "alice", "wallet_address": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"},
                {"user_id": "bob", "wallet_address": null},
                {"user_id": "carol"}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            dir.wallet_address("alice").await.unwrap(),
            WalletLookup::Linked(address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"))
        );
        assert_eq!(dir.wallet_address("bob").await.unwrap(), WalletLookup::NoWallet);
        assert_eq!(dir.wallet_address("carol").await.unwrap(), WalletLookup::NoWallet);
        assert_eq!(dir.wallet_address("dave").await.unwrap(), WalletLookup::NotFound);
    }

    #[test]
    fn test_rejects_malformed_address() {
        assert!(StaticUserDirectory::from_json(r#"[{"user_id": "x", "wallet_address": "0x12"}]"#).is_err());
    }
}
