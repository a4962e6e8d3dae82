//! Subscription Registry - Long-lived Contract Event Listeners
//!
//! Each subscription is a spawned task reading the event broadcast and
//! calling one handler for one event kind. Every subscription owns
//! exactly one teardown; it runs exactly once, either on `unsubscribe`
//! or on `shutdown`, whichever comes first.
//!
//! Handlers here only log or count. Feeding third-party state changes
//! back into the ledger is not done by this registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::event_feed::ContractEvent;
use super::events::{DecodedEvent, EventKind};

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
  fn name(&self) -> &str;

  /// Must be idempotent: the same event may be delivered again after a restart.
  async fn handle(&self, event: &ContractEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Teardown = Box<dyn FnOnce() + Send>;

struct Subscription {
  id: SubscriptionId,
  kind: EventKind,
  handler: Arc<dyn EventHandler>,
  teardown: Option<Teardown>,
  task: JoinHandle<()>,
}

impl Subscription {
  async fn close(mut self) {
    if let Some(teardown) = self.teardown.take() {
      teardown();
    }
    if let Err(e) = self.task.await {
      warn!(subscription = self.id.0, error = %e, "Subscription task ended abnormally");
    }
  }
}

pub struct SubscriptionRegistry {
  /// Feed sender; each subscription takes its own receiver.
  events: broadcast::Sender<ContractEvent>,
  subscriptions: Mutex<Vec<Subscription>>,
  next_id: AtomicU64,
  /// Set by `shutdown`, after which `subscribe` is refused.
  closed: AtomicBool,
}

impl SubscriptionRegistry {
  pub fn new(events: broadcast::Sender<ContractEvent>) -> Self {
    Self {
      events,
      subscriptions: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(1),
      closed: AtomicBool::new(false),
    }
  }

  /// Start delivering `kind` events to `handler`.
  pub async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> anyhow::Result<SubscriptionId> {
    let mut subs = self.subscriptions.lock().await;
    anyhow::ensure!(!self.closed.load(Ordering::Acquire), "subscription registry is shut down");

    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let mut rx = self.events.subscribe();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let task_handler = Arc::clone(&handler);

    let task = tokio::spawn(async move {
      loop {
        tokio::select! {
          biased;
          _ = &mut cancel_rx => break,
          msg = rx.recv() => match msg {
            Ok(ev) if ev.event.kind() == Some(kind) => task_handler.handle(&ev).await,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
              warn!(subscription = id.0, event = %kind, skipped, "Subscriber lagged, events dropped");
            }
            Err(RecvError::Closed) => break,
          }
        }
      }
    });

    let teardown: Teardown = Box::new(move || {
      let _ = cancel_tx.send(());
    });

    info!(subscription = id.0, event = %kind, handler = handler.name(), "Subscribed");
    subs.push(Subscription {
      id,
      kind,
      handler,
      teardown: Some(teardown),
      task,
    });
    Ok(id)
  }

  /// Remove the first subscription of `handler` to `kind`.
  ///
  /// Returns `false` if there was none.
  pub async fn unsubscribe(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> bool {
    let removed = {
      let mut subs = self.subscriptions.lock().await;
      subs
        .iter()
        .position(|s| s.kind == kind && Arc::ptr_eq(&s.handler, handler))
        .map(|idx| subs.remove(idx))
    };
    match removed {
      Some(sub) => {
        info!(subscription = sub.id.0, event = %kind, "Unsubscribed");
        sub.close().await;
        true
      }
      None => false,
    }
  }

  pub async fn active(&self) -> usize {
    self.subscriptions.lock().await.len()
  }

  /// Tear down every remaining subscription and refuse new ones.
  ///
  /// Returns how many teardowns ran. A second call returns 0.
  pub async fn shutdown(&self) -> usize {
    let subs = {
      let mut guard = self.subscriptions.lock().await;
      self.closed.store(true, Ordering::Release);
      std::mem::take(&mut *guard)
    };
    let count = subs.len();
    for sub in subs {
      sub.close().await;
    }
    info!(count, "Subscriptions torn down");
    count
  }
}

/// Logs every event it receives.
#[derive(Debug, Default)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
  fn name(&self) -> &str {
    "logging"
  }

  async fn handle(&self, event: &ContractEvent) {
    match &event.event {
      DecodedEvent::OrderLiquidated { id, seized_collateral } => {
        info!(order_id = %id, seized = %seized_collateral, block = event.block_number, "Order liquidated on-chain");
      }
      DecodedEvent::OrderFullyRepaid { id, payer, total_paid, .. } => {
        info!(order_id = %id, payer = %payer, total_paid = %total_paid, "Order fully repaid on-chain");
      }
      other => debug!(event = ?other, block = event.block_number, "Contract event"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use alloy::primitives::U256;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  #[derive(Default)]
  struct Counting(AtomicUsize);

  #[async_trait]
  impl EventHandler for Counting {
    fn name(&self) -> &str {
      "counting"
    }

    async fn handle(&self, _event: &ContractEvent) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn liquidated(id: u64) -> ContractEvent {
    ContractEvent {
      event: DecodedEvent::OrderLiquidated {
        id: U256::from(id),
        seized_collateral: U256::from(5u64),
      },
      block_number: Some(1),
      tx_hash: None,
    }
  }

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
  }

  #[tokio::test]
  async fn test_handler_receives_only_its_kind() {
    let (tx, _) = broadcast::channel(16);
    let registry = SubscriptionRegistry::new(tx.clone());
    let counter = Arc::new(Counting::default());
    let handler: Arc<dyn EventHandler> = counter.clone();

    registry.subscribe(EventKind::OrderLiquidated, handler).await.unwrap();
    tx.send(liquidated(1)).unwrap();
    tx.send(ContractEvent {
      event: DecodedEvent::LiquidityFunded {
        funder: Default::default(),
        amount: U256::from(1u64),
      },
      block_number: None,
      tx_hash: None,
    })
    .unwrap();
    settle().await;

    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert_eq!(registry.shutdown().await, 1);
  }

  #[tokio::test]
  async fn test_unsubscribe_stops_delivery() {
    let (tx, _) = broadcast::channel(16);
    let registry = SubscriptionRegistry::new(tx.clone());
    let counter = Arc::new(Counting::default());
    let handler: Arc<dyn EventHandler> = counter.clone();

    registry.subscribe(EventKind::OrderLiquidated, Arc::clone(&handler)).await.unwrap();
    assert!(registry.unsubscribe(EventKind::OrderLiquidated, &handler).await);
    assert!(!registry.unsubscribe(EventKind::OrderLiquidated, &handler).await);

    let _ = tx.send(liquidated(2));
    settle().await;
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    assert_eq!(registry.active().await, 0);
  }

  #[tokio::test]
  async fn test_shutdown_runs_each_teardown_once() {
    let (tx, _) = broadcast::channel(16);
    let registry = SubscriptionRegistry::new(tx);
    let handler: Arc<dyn EventHandler> = Arc::new(LoggingHandler);

    registry.subscribe(EventKind::OrderCreated, Arc::clone(&handler)).await.unwrap();
    registry.subscribe(EventKind::OrderLiquidated, Arc::clone(&handler)).await.unwrap();

    assert_eq!(registry.shutdown().await, 2);
    assert_eq!(registry.shutdown().await, 0);
    assert!(registry.subscribe(EventKind::OrderCreated, handler).await.is_err());
  }
}
