// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Wires clients, stores, services, the bus and the watchers into a running
//! validator and owns the shutdown sequence.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ethers::types::Address as EthAddress;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::committee::{spawn_committee_refresh, CommitteeCache};
use crate::config::BridgeNodeConfig;
use crate::confirm::{ReceiptWaiter, RECEIPT_POLL_INTERVAL};
use crate::eth_client::{EthBridge, EthClient};
use crate::events::EventKind;
use crate::fees::{FeeCalculator, FixedRateOracle};
use crate::ledger_client::{LedgerNode, LedgerNodeHttpClient};
use crate::messages::{MessageHandler, MessageService, TRANSFER_POLL_INTERVAL};
use crate::metrics::BridgeMetrics;
use crate::mirror_client::{LedgerMirror, MirrorHttpClient};
use crate::storage::pg::PgStore;
use crate::storage::{CursorStore, MessageStore, TransferStore};
use crate::transfers::{TransferContext, TransferService};
use crate::types::{now_nanos, BridgeCommittee};
use crate::watchers::burn::{BurnHandler, BurnWatcher};
use crate::watchers::credit::CreditTransferWatcher;
use crate::watchers::topic::TopicWatcher;
use crate::watchers::WatcherState;

pub async fn run_bridge_node(
    config: BridgeNodeConfig,
    prometheus_registry: prometheus::Registry,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let metrics = Arc::new(BridgeMetrics::new(&prometheus_registry));

    let signer = config.load_signer().context("loading authority key")?;
    info!("authority address: {:?}", signer.address());
    let registry = config
        .wrapped_token_registry()
        .context("building wrapped token registry")?;

    PgStore::run_migrations(&config.db.url)
        .await
        .context("running migrations")?;
    let store = Arc::new(
        PgStore::connect(
            &config.db.url,
            config.db.pool_size,
            Duration::from_millis(config.db.connection_timeout_ms),
        )
        .await
        .context("connecting to the database")?,
    );
    let transfers: Arc<dyn TransferStore> = store.clone();
    let message_store: Arc<dyn MessageStore> = store.clone();
    let cursors: Arc<dyn CursorStore> = store.clone();

    let bridge_address = EthAddress::from_str(&config.eth.bridge_contract_address)
        .context("parsing bridge contract address")?;
    let eth: Arc<dyn EthBridge> = Arc::new(
        EthClient::connect(
            &config.eth.rpc_url,
            &signer,
            bridge_address,
            config.eth.expected_chain_id,
        )
        .await
        .context("connecting to the EVM endpoint")?,
    );
    let ledger: Arc<dyn LedgerNode> = Arc::new(
        LedgerNodeHttpClient::new(&config.ledger.node_url, &config.ledger.topic_id)
            .context("building ledger node client")?,
    );
    let mirror: Arc<dyn LedgerMirror> = Arc::new(
        MirrorHttpClient::new(&config.ledger.mirror_url, config.ledger.mirror_page_limit)
            .context("building mirror client")?,
    );

    // Initial committee is fetched synchronously; a node that cannot see the
    // member set must not start
    let members = eth
        .members()
        .await
        .map_err(|e| anyhow::anyhow!("fetching committee members: {:?}", e))?;
    let committee = Arc::new(CommitteeCache::new(BridgeCommittee::new(members)));
    info!(
        "committee loaded: {} members, threshold {}",
        committee.current().await.len(),
        committee.threshold().await
    );

    let mut handles = Vec::new();
    handles.push(spawn_committee_refresh(
        committee.clone(),
        eth.clone(),
        Duration::from_secs(config.committee_refresh_secs),
        cancel.clone(),
    ));

    let fees = Arc::new(FeeCalculator::new(Arc::new(
        FixedRateOracle::new(config.wei_per_base_unit()?)
            .map_err(|e| anyhow::anyhow!("fee oracle: {:?}", e))?,
    )));

    let transfer_service = Arc::new(TransferService::new(
        transfers.clone(),
        ledger.clone(),
        fees,
        signer.clone(),
        registry,
        TransferContext {
            native_asset: config.route.native_asset.clone(),
            source_chain_id: config.route.source_chain_id,
            target_chain_id: config.route.target_chain_id,
            native_chain_id: config.route.native_chain_id,
        },
        metrics.clone(),
    ));

    let waiter = Arc::new(ReceiptWaiter {
        eth: eth.clone(),
        transfers: transfers.clone(),
        poll_interval: RECEIPT_POLL_INTERVAL,
        metrics: metrics.clone(),
        cancel: cancel.clone(),
    });
    let message_service = MessageService::new(
        transfers.clone(),
        message_store,
        eth.clone(),
        ledger,
        committee,
        waiter,
        signer.address(),
        Duration::from_secs(config.submission_deadline_secs),
        TRANSFER_POLL_INTERVAL,
        metrics.clone(),
        cancel.clone(),
    );

    let mut bus = EventBus::new(config.event_queue_depth);
    bus.register(EventKind::CreditTransfer, transfer_service.clone(), cancel.clone());
    let message_handler = Arc::new(MessageHandler(message_service));
    bus.register(EventKind::TopicSignature, message_handler.clone(), cancel.clone());
    bus.register(EventKind::TopicEthTransaction, message_handler, cancel.clone());
    bus.register(
        EventKind::Burn,
        Arc::new(BurnHandler {
            metrics: metrics.clone(),
        }),
        cancel.clone(),
    );

    // Default checkpoints: "now" for ledger streams, current head for the
    // EVM stream. Used only on first start; restarts resume from the store.
    let ledger_start = if config.ledger.start_timestamp == 0 {
        now_nanos()
    } else {
        config.ledger.start_timestamp
    };
    let eth_start = if config.eth.start_block == 0 {
        eth.latest_block()
            .await
            .map_err(|e| anyhow::anyhow!("fetching head block: {:?}", e))?
    } else {
        config.eth.start_block
    };

    let credit_watcher = Arc::new(CreditTransferWatcher {
        mirror: mirror.clone(),
        cursors: cursors.clone(),
        transfers: transfer_service,
        publisher: bus.publisher(),
        bridge_account: config.ledger.bridge_account.clone(),
        start_timestamp: ledger_start,
        polling_interval: config.ledger_polling_interval(),
        max_retry_duration: config.max_retry_duration(),
        metrics: metrics.clone(),
        state: Mutex::new(WatcherState::Idle),
    });
    handles.push(credit_watcher.spawn(cancel.clone()));

    let topic_watcher = Arc::new(TopicWatcher {
        mirror,
        cursors: cursors.clone(),
        publisher: bus.publisher(),
        topic_id: config.ledger.topic_id.clone(),
        start_timestamp: ledger_start,
        polling_interval: config.ledger_polling_interval(),
        max_retry_duration: config.max_retry_duration(),
        metrics: metrics.clone(),
        state: Mutex::new(WatcherState::Idle),
    });
    handles.push(topic_watcher.spawn(cancel.clone()));

    let burn_watcher = Arc::new(BurnWatcher {
        eth,
        cursors,
        publisher: bus.publisher(),
        start_block: eth_start,
        max_block_range: config.eth.max_block_range,
        polling_interval: config.eth_polling_interval(),
        max_retry_duration: config.max_retry_duration(),
        metrics,
    });
    handles.push(burn_watcher.spawn(cancel.clone()));

    info!("bridge validator node started");
    cancel.cancelled().await;
    info!("shutting down, draining in-flight handlers");

    let drain_deadline = Duration::from_secs(config.shutdown_drain_secs);
    bus.shutdown(drain_deadline).await;
    if tokio::time::timeout(drain_deadline, futures::future::join_all(handles))
        .await
        .is_err()
    {
        warn!("some background tasks did not stop within {:?}", drain_deadline);
    }
    info!("bridge validator node stopped");
    Ok(())
}
