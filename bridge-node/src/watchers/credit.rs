// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Watches the mirror for transactions crediting the bridge account and turns
//! them into credit-transfer events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::EventPublisher;
use crate::events::BridgeEvent;
use crate::metrics::BridgeMetrics;
use crate::mirror_client::LedgerMirror;
use crate::retry_with_max_elapsed_time;
use crate::storage::CursorStore;
use crate::transfers::TransferService;
use crate::watchers::WatcherState;

pub struct CreditTransferWatcher {
    pub mirror: Arc<dyn LedgerMirror>,
    pub cursors: Arc<dyn CursorStore>,
    pub transfers: Arc<TransferService>,
    pub publisher: EventPublisher,
    pub bridge_account: String,
    pub start_timestamp: i64,
    pub polling_interval: Duration,
    pub max_retry_duration: Duration,
    pub metrics: Arc<BridgeMetrics>,
    pub state: Mutex<WatcherState>,
}

impl CreditTransferWatcher {
    pub fn stream_name(&self) -> String {
        format!("account:{}", self.bridge_account)
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let stream = self.stream_name();
        let mut cursor = match self.cursors.ensure(&stream, self.start_timestamp).await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("[{}] cannot create watcher checkpoint: {:?}", stream, e);
                return;
            }
        };
        info!("[{}] starting credit watcher after {}", stream, cursor);
        *self.state.lock().await = WatcherState::Streaming;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] credit watcher cancelled", stream);
                    return;
                }
                _ = tokio::time::sleep(self.polling_interval) => {}
            }

            let batch = match retry_with_max_elapsed_time!(
                self.mirror.credit_transfers_after(&self.bridge_account, cursor),
                self.max_retry_duration
            ) {
                Ok(Ok(batch)) => batch,
                Ok(Err(e)) | Err(e) => {
                    error!("[{}] mirror unreachable, watcher failed: {:?}", stream, e);
                    return;
                }
            };
            if batch.is_empty() {
                continue;
            }

            for tx in &batch {
                self.metrics
                    .watcher_received_events
                    .with_label_values(&[&stream])
                    .inc();
                match self.transfers.sanity_check(tx, &self.bridge_account) {
                    Ok(event) => {
                        if self
                            .publisher
                            .publish(BridgeEvent::CreditTransfer(event))
                            .await
                            .is_err()
                        {
                            // Bus is gone; shutdown in progress
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("[{}] dropping credit {}: {:?}", stream, tx.transaction_id, e);
                    }
                }
            }

            // Advance only after every emission of the batch was enqueued
            cursor = batch.last().expect("non-empty batch").consensus_timestamp;
            if let Err(e) = self.cursors.advance(&stream, cursor).await {
                warn!("[{}] failed to advance checkpoint: {:?}", stream, e);
            }
            self.metrics
                .cursor_position
                .with_label_values(&[&stream])
                .set(cursor);
        }
    }
}
