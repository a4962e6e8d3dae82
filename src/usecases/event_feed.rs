//! Event Feed - Contract Log Polling
//!
//! Polls `eth_getLogs` for the BNPL contract on a fixed interval, decodes
//! each log and fans the result out on a broadcast channel. Subscribers
//! register through the `SubscriptionRegistry`.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::ports::chain_client::ChainClient;
use crate::ports::metrics::{EngineMetrics, NoopMetrics};

use super::events::{DecodedEvent, EventDecoder};

/// A decoded contract event plus where it was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent {
  pub event: DecodedEvent,
  pub block_number: Option<u64>,
  pub tx_hash: Option<B256>,
}

/// Default widest `eth_getLogs` window, inside what hosted providers accept.
pub const DEFAULT_MAX_LOG_BLOCK_RANGE: u64 = 2_000;

pub struct EventFeed {
  chain: Arc<dyn ChainClient>,
  /// Filters logs to the BNPL contract and decodes them.
  decoder: EventDecoder,
  poll_interval: Duration,
  /// Fan-out to subscribers. Sends with no receivers are dropped.
  tx: broadcast::Sender<ContractEvent>,
  /// `None` starts just after the head seen at startup.
  start_block: Option<u64>,
  /// Most blocks covered by one `logs` request, at least 1.
  max_block_range: u64,
  metrics: Arc<dyn EngineMetrics>,
}

impl EventFeed {
  pub fn new(chain: Arc<dyn ChainClient>, decoder: EventDecoder, poll_interval: Duration, capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self {
      chain,
      decoder,
      poll_interval,
      tx,
      start_block: None,
      max_block_range: DEFAULT_MAX_LOG_BLOCK_RANGE,
      metrics: Arc::new(NoopMetrics),
    }
  }

  pub fn with_metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
    self.metrics = metrics;
    self
  }

  /// Replay from `block` instead of starting after the current head.
  pub fn with_start_block(mut self, block: Option<u64>) -> Self {
    self.start_block = block;
    self
  }

  pub fn with_max_block_range(mut self, blocks: u64) -> Self {
    self.max_block_range = blocks.max(1);
    self
  }

  /// Sender side of the event stream, for the registry to subscribe on.
  pub fn sender(&self) -> broadcast::Sender<ContractEvent> {
    self.tx.clone()
  }

  /// Fetch and publish logs from `from_block` toward the chain head, at
  /// most `max_block_range` blocks per call.
  ///
  /// Returns the next block to poll from, so a caller far behind catches
  /// up over several calls. Logs from other contracts and
  /// unknown signatures are dropped; undecodable ones are logged.
  pub async fn poll_once(&self, from_block: u64) -> Result<u64> {
    let head = self.chain.block_number().await.context("Failed to read block number")?;
    if head < from_block {
      return Ok(from_block);
    }

    let to_block = head.min(from_block.saturating_add(self.max_block_range - 1));

    let logs = self
      .chain
      .logs(self.decoder.contract(), from_block, to_block)
      .await
      .with_context(|| format!("Failed to fetch logs {from_block}..={to_block}"))?;

    let mut published = 0usize;
    for observed in logs {
      let event = self.decoder.decode_log(&observed.log);
      match &event {
        DecodedEvent::Other { .. } => continue,
        DecodedEvent::DecodeFailed { kind, reason } => {
          warn!(event = %kind, reason = %reason, block = observed.block_number, "Undecodable contract log");
          continue;
        }
        decoded => {
          if let Some(kind) = decoded.kind() {
            self.metrics.record_event(kind.name());
          }
        }
      }
      // No receivers is fine: nobody is subscribed yet.
      let _ = self.tx.send(ContractEvent {
        event,
        block_number: observed.block_number,
        tx_hash: observed.tx_hash,
      });
      published += 1;
    }

    debug!(from_block, to_block, head, published, "Polled contract logs");
    Ok(to_block + 1)
  }

  /// Poll until shutdown, from the configured start block or after the current head.
  #[instrument(skip_all, fields(contract = %self.decoder.contract()))]
  pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let mut next = match self.start_block {
      Some(block) => block,
      None => self.chain.block_number().await.context("Failed to read starting block")? + 1,
    };
    info!(start_block = next, interval_ms = self.poll_interval.as_millis() as u64, "Event feed started");

    let mut ticker = tokio::time::interval(self.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Event feed shutting down");
          return Ok(());
        }
        _ = ticker.tick() => {
          match self.poll_once(next).await {
            Ok(n) => next = n,
            Err(e) => warn!(error = %format!("{e:#}"), from_block = next, "Log poll failed, will retry"),
          }
        }
      }
    }
  }
}
