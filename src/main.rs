//! BNPL Ledger - Daemon Entry Point
//!
//! Wires the reconciliation engine to a live node and runs its
//! background tasks until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Read the signing key from the configured env var
//! 4. Connect the chain client, validate chain id and contract code
//! 5. Open the ledger store and user directory
//! 6. Build gateway → executor → ledger, report network and signer allowance
//! 7. Spawn metrics + health servers
//! 8. Spawn event feed, subscribe handlers, spawn the reconciliation sweep
//! 9. Wait for SIGINT → broadcast shutdown → tear down subscriptions

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use bnpl_ledger::adapters::chain::AlloyChainClient;
use bnpl_ledger::adapters::directory::StaticUserDirectory;
use bnpl_ledger::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use bnpl_ledger::adapters::persistence::FileLedgerStore;
use bnpl_ledger::config;
use bnpl_ledger::config::loader::redact_url;
use bnpl_ledger::domain::units::format_token_amount;
use bnpl_ledger::ports::{ChainClient, EngineMetrics, LedgerStore, NoopMetrics, UserDirectory};
use bnpl_ledger::usecases::{
    ContractGateway, EventDecoder, EventFeed, EventHandler, EventKind, LedgerSettings, LoggingHandler,
    ReconciliationLedger, ReconciliationSweep, SubscriptionRegistry, TransactionExecutor,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config_path = std::env::var("BNPL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        rpc = %redact_url(&config.chain.rpc_url),
        "Starting BNPL ledger"
    );

    // ── 3. Signing key (env only, never logged) ─────────────
    let signer = config.chain.signing_key()?;
    let (bnpl_address, token_address) = config.chain.contract_addresses()?;

    // ── 4. Chain client + deployment validation ─────────────
    let alloy_client = AlloyChainClient::connect(&config.chain, signer)
        .await
        .context("Failed to connect chain client")?;
    let chain_id = alloy_client
        .validate_deployment(config.chain.expected_chain_id, bnpl_address, token_address)
        .await?;
    let chain: Arc<dyn ChainClient> = Arc::new(alloy_client);

    // ── 5. Store + user directory ───────────────────────────
    let store: Arc<dyn LedgerStore> = Arc::new(
        FileLedgerStore::open(&config.persistence.data_dir)
            .await
            .context("Failed to open ledger store")?,
    );
    let users: Arc<dyn UserDirectory> = Arc::new(
        StaticUserDirectory::load(&config.persistence.users_file).await?,
    );

    let metrics_registry = Arc::new(MetricsRegistry::new().context("Failed to build metrics registry")?);
    let metrics: Arc<dyn EngineMetrics> = if config.metrics.enabled {
        Arc::clone(&metrics_registry) as Arc<dyn EngineMetrics>
    } else {
        Arc::new(NoopMetrics)
    };

    // ── 6. Engine ───────────────────────────────────────────
    let gateway = ContractGateway::new(Arc::clone(&chain), bnpl_address, token_address);
    let executor = Arc::new(
        TransactionExecutor::new(
            Arc::clone(&chain),
            config.chain.gas_buffer_percent,
            Duration::from_secs(config.chain.receipt_timeout_secs),
        )
        .with_metrics(Arc::clone(&metrics)),
    );
    let settings = LedgerSettings {
        token_decimals: config.token.decimals,
        default_merchant: config.loans.merchant()?.unwrap_or_else(|| chain.signer_address()),
        default_due_in_seconds: config.loans.default_due_in_seconds,
        default_installments: config.loans.default_installments,
    };
    let ledger = ReconciliationLedger::new(
        gateway,
        Arc::clone(&executor),
        Arc::clone(&store),
        Arc::clone(&users),
        settings,
    )
    .with_metrics(Arc::clone(&metrics));

    report_startup_state(&ledger, chain_id, config.token.decimals).await?;

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 7. Metrics + health servers ─────────────────────────
    let metrics_handle = if config.metrics.enabled {
        let rx = shutdown_tx.subscribe();
        let bind = config.metrics.bind_address.clone();
        let registry = Arc::clone(&metrics_registry);
        Some(tokio::spawn(async move {
            if let Err(e) = registry.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    let health = HealthServer::new(
        HealthState::new(Arc::clone(&chain), Arc::clone(&store)),
        config.metrics.health_port,
    );
    let health_rx = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health.run(health_rx).await {
            error!(error = %e, "Health server failed");
        }
    });

    // ── 8. Event feed, subscriptions, sweep ─────────────────
    let decoder = EventDecoder::new(bnpl_address);
    let feed = EventFeed::new(
        Arc::clone(&chain),
        decoder.clone(),
        Duration::from_secs(config.chain.log_poll_interval_secs),
        EVENT_CHANNEL_CAPACITY,
    )
    .with_start_block(config.chain.start_block)
    .with_max_block_range(config.chain.max_log_block_range)
    .with_metrics(Arc::clone(&metrics));

    let registry = SubscriptionRegistry::new(feed.sender());
    let logging: Arc<dyn EventHandler> = Arc::new(LoggingHandler);
    for kind in EventKind::ALL {
        registry.subscribe(kind, Arc::clone(&logging)).await?;
    }

    let feed_rx = shutdown_tx.subscribe();
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = feed.run(feed_rx).await {
            error!(error = %format!("{e:#}"), "Event feed failed");
        }
    });

    let sweep_handle = if config.reconciliation.enabled {
        let sweep = ReconciliationSweep::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            decoder,
            Duration::from_secs(config.reconciliation.interval_secs),
        )
        .with_metrics(Arc::clone(&metrics));
        let rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = sweep.run(rx).await {
                error!(error = %format!("{e:#}"), "Reconciliation sweep failed");
            }
        }))
    } else {
        info!("Reconciliation sweep disabled");
        None
    };

    info!("All tasks spawned, ledger is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    }
    info!("SIGINT received, initiating graceful shutdown");

    let _ = shutdown_tx.send(());
    let removed = registry.shutdown().await;
    info!(subscriptions = removed, "Subscriptions torn down");

    let grace = Duration::from_secs(10);
    let _ = tokio::time::timeout(grace, feed_handle).await;
    if let Some(handle) = sweep_handle {
        let _ = tokio::time::timeout(grace, handle).await;
    }
    let _ = tokio::time::timeout(grace, health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(grace, handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Log network identity and the signer's standing allowance.
///
/// Fails when the token's own decimals disagree with `token.decimals`.
async fn report_startup_state(ledger: &ReconciliationLedger, chain_id: u64, decimals: u8) -> Result<()> {
    match ledger.gateway().token_info().await {
        Ok(token) => {
            token.ensure_decimals(decimals)?;
            info!(
                chain_id,
                token = %token.symbol,
                token_decimals = token.decimals,
                "Connected to BNPL deployment"
            );
        }
        Err(e) => warn!(error = %e, "Failed to read token metadata, decimals unverified"),
    }

    let signer = ledger.gateway().signer_address();
    match ledger.check_allowance_status("startup", signer).await {
        Ok(snapshot) => info!(
            signer = %signer,
            allowance = %format_token_amount(snapshot.amount, decimals).unwrap_or_default(),
            balance = %format_token_amount(snapshot.balance, decimals).unwrap_or_default(),
            "Signer allowance status"
        ),
        Err(e) => warn!(error = %e, "Failed to read signer allowance"),
    }
    Ok(())
}
