//! Alloy Chain Client - JSON-RPC Transport with One Signing Identity
//!
//! Implements the `ChainClient` port over an alloy 0.9 HTTP provider
//! carrying the recommended fillers (nonce, gas price, chain id) and a
//! wallet filler for the injected signer. Every request first waits on
//! a `governor` rate limiter so bursts of concurrent ledger operations
//! stay within public-node limits.
//!
//! In alloy 0.9 the filled provider is a deeply nested generic type; we
//! store it type-erased as `dyn Provider` over a boxed transport.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256, Bytes};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, info, instrument};

use crate::config::ChainConfig;
use crate::config::loader::redact_url;
use crate::domain::errors::ConfigurationError;
use crate::ports::chain_client::{ChainCall, ChainClient, ObservedLog, TxReceipt};

pub struct AlloyChainClient {
    provider: Arc<dyn Provider + Send + Sync>,
    signer: Address,
    limiter: DefaultDirectRateLimiter,
    receipt_poll_interval: Duration,
}

impl AlloyChainClient {
    /// Connect to the node with `signer` attached for outgoing transactions.
    #[instrument(skip_all, fields(rpc = %redact_url(&config.rpc_url)))]
    pub async fn connect(config: &ChainConfig, signer: PrivateKeySigner) -> Result<Self> {
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_builtin(&config.rpc_url)
            .await
            .context("Failed to connect to RPC endpoint")?;
        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(provider);

        let per_second = NonZeroU32::new(config.max_rpc_per_second).unwrap_or(NonZeroU32::MIN);
        let client = Self {
            provider,
            signer: signer_address,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms.max(1)),
        };

        info!(signer = %signer_address, max_rps = per_second.get(), "Chain client connected");
        Ok(client)
    }

    /// Check chain id (when one is expected) and that both contracts hold code.
    #[instrument(skip(self))]
    pub async fn validate_deployment(
        &self,
        expected_chain_id: Option<u64>,
        bnpl: Address,
        token: Address,
    ) -> Result<u64> {
        let actual = self.chain_id().await?;
        if let Some(expected) = expected_chain_id {
            if expected != actual {
                return Err(ConfigurationError::ChainIdMismatch { expected, actual }.into());
            }
        }

        for (name, address) in [("bnpl_contract", bnpl), ("token_contract", token)] {
            self.limiter.until_ready().await;
            let code = self
                .provider
                .get_code_at(address)
                .await
                .with_context(|| format!("Failed to query code for {name}"))?;
            if code.is_empty() {
                return Err(ConfigurationError::NoContractCode { name, address }.into());
            }
            info!(contract = name, %address, "Contract validated: code exists on-chain");
        }

        Ok(actual)
    }

    fn request(&self, call: &ChainCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.signer)
            .with_to(call.to)
            .with_input(call.calldata.clone())
    }
}

fn to_port_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        status: receipt.status(),
        gas_used: receipt.gas_used,
        block_number: receipt.block_number,
        logs: receipt.inner.logs().iter().map(|l| l.inner.clone()).collect(),
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64> {
        self.limiter.until_ready().await;
        self.provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")
    }

    async fn call(&self, call: &ChainCall) -> Result<Bytes> {
        self.limiter.until_ready().await;
        let tx = self.request(call);
        self.provider
            .call(&tx)
            .await
            .with_context(|| format!("eth_call {} failed", call.method))
    }

    async fn estimate_gas(&self, call: &ChainCall) -> Result<u64> {
        self.limiter.until_ready().await;
        let tx = self.request(call);
        self.provider
            .estimate_gas(&tx)
            .await
            .with_context(|| format!("eth_estimateGas {} failed", call.method))
    }

    async fn send_transaction(&self, call: &ChainCall, gas_limit: u64) -> Result<B256> {
        self.limiter.until_ready().await;
        let tx = self.request(call).with_gas_limit(gas_limit);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .with_context(|| format!("Failed to submit {}", call.method))?;
        let tx_hash = *pending.tx_hash();
        debug!(method = call.method, %tx_hash, gas_limit, "Transaction broadcast");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        let mut ticker = tokio::time::interval(self.receipt_poll_interval);
        loop {
            ticker.tick().await;
            if let Some(receipt) = self.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
        }
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        self.limiter.until_ready().await;
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .with_context(|| format!("Failed to fetch receipt for {tx_hash:#x}"))?;
        Ok(receipt.as_ref().map(to_port_receipt))
    }

    async fn block_number(&self) -> Result<u64> {
        self.limiter.until_ready().await;
        self.provider
            .get_block_number()
            .await
            .context("Failed to query block number")
    }

    async fn logs(&self, address: Address, from_block: u64, to_block: u64) -> Result<Vec<ObservedLog>> {
        self.limiter.until_ready().await;
        let filter = Filter::new()
            .address(address)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .with_context(|| format!("eth_getLogs {from_block}..={to_block} failed"))?;
        Ok(logs
            .into_iter()
            .map(|l| ObservedLog {
                block_number: l.block_number,
                tx_hash: l.transaction_hash,
                log: l.inner,
            })
            .collect())
    }

    async fn is_healthy(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }
}
