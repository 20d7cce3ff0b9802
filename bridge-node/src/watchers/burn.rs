// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Watches the bridge contract for `Burn` events (the EVM -> ledger
//! direction). The checkpoint is a block number; queries are chunked so a
//! large gap after downtime cannot exceed provider log-range limits.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{EventHandler, EventPublisher};
use crate::error::BridgeResult;
use crate::eth_client::EthBridge;
use crate::events::BridgeEvent;
use crate::metrics::BridgeMetrics;
use crate::retry_with_max_elapsed_time;
use crate::storage::CursorStore;

pub struct BurnWatcher {
    pub eth: Arc<dyn EthBridge>,
    pub cursors: Arc<dyn CursorStore>,
    pub publisher: EventPublisher,
    pub start_block: u64,
    pub max_block_range: u64,
    pub polling_interval: Duration,
    pub max_retry_duration: Duration,
    pub metrics: Arc<BridgeMetrics>,
}

impl BurnWatcher {
    pub fn stream_name(&self) -> String {
        format!("contract:{:#x}", self.eth.bridge_contract_address())
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let stream = self.stream_name();
        let mut cursor = match self.cursors.ensure(&stream, self.start_block as i64).await {
            Ok(cursor) => cursor.max(0) as u64,
            Err(e) => {
                error!("[{}] cannot create watcher checkpoint: {:?}", stream, e);
                return;
            }
        };
        info!("[{}] starting burn watcher after block {}", stream, cursor);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] burn watcher cancelled", stream);
                    return;
                }
                _ = tokio::time::sleep(self.polling_interval) => {}
            }

            if let Err(e) = self.poll_once(&stream, &mut cursor).await {
                error!("[{}] provider unreachable, watcher failed: {:?}", stream, e);
                return;
            }
        }
    }

    async fn poll_once(&self, stream: &str, cursor: &mut u64) -> BridgeResult<()> {
        let latest = match retry_with_max_elapsed_time!(
            self.eth.latest_block(),
            self.max_retry_duration
        ) {
            Ok(Ok(latest)) => latest,
            Ok(Err(e)) | Err(e) => return Err(e),
        };
        if latest <= *cursor {
            return Ok(());
        }

        let from_block = *cursor + 1;
        let to_block = latest.min(from_block + self.max_block_range - 1);
        let events = match retry_with_max_elapsed_time!(
            self.eth.burn_events_in_range(from_block, to_block),
            self.max_retry_duration
        ) {
            Ok(Ok(events)) => events,
            Ok(Err(e)) | Err(e) => return Err(e),
        };

        for event in events {
            self.metrics
                .watcher_received_events
                .with_label_values(&[stream])
                .inc();
            if self.publisher.publish(BridgeEvent::Burn(event)).await.is_err() {
                // Shutdown; keep the checkpoint where it is
                return Ok(());
            }
        }

        *cursor = to_block;
        if let Err(e) = self.cursors.advance(stream, to_block as i64).await {
            warn!("[{}] failed to advance checkpoint: {:?}", stream, e);
        }
        self.metrics
            .cursor_position
            .with_label_values(&[stream])
            .set(to_block as i64);
        Ok(())
    }
}

/// The ledger-bound release flow mirrors the mint state machine and is driven
/// by the ledger-side collaborator; the validator records the observation.
pub struct BurnHandler {
    pub metrics: Arc<BridgeMetrics>,
}

#[async_trait::async_trait]
impl EventHandler for BurnHandler {
    async fn handle(&self, event: BridgeEvent) {
        if let BridgeEvent::Burn(burn) = event {
            self.metrics.burn_events_observed.inc();
            info!(
                "observed burn of {} by {:?} at block {}, releasing to {}",
                burn.amount, burn.account, burn.block_number, burn.receiver
            );
        }
    }
}
