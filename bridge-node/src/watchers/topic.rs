// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Watches the bridge consensus topic. On (re)start the watcher drains the
//! gap from `last_fetched` via mirror pulls before it is considered
//! streaming, so no message is missed across restarts. The topic's global
//! consensus order is preserved into the bus.

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
use crate::proto::{TopicMessage, TopicMessageType};
use crate::retry_with_max_elapsed_time;
use crate::storage::CursorStore;
use crate::watchers::WatcherState;

pub struct TopicWatcher {
    pub mirror: Arc<dyn LedgerMirror>,
    pub cursors: Arc<dyn CursorStore>,
    pub publisher: EventPublisher,
    pub topic_id: String,
    pub start_timestamp: i64,
    pub polling_interval: Duration,
    pub max_retry_duration: Duration,
    pub metrics: Arc<BridgeMetrics>,
    pub state: Mutex<WatcherState>,
}

impl TopicWatcher {
    pub fn stream_name(&self) -> String {
        format!("topic:{}", self.topic_id)
    }

    pub async fn state(&self) -> WatcherState {
        *self.state.lock().await
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
        info!("[{}] starting topic watcher after {}", stream, cursor);
        *self.state.lock().await = WatcherState::CatchingUp;

        loop {
            // Pull strictly after the checkpoint; resumption therefore starts
            // at last_fetched + 1 ns
            let batch = match retry_with_max_elapsed_time!(
                self.mirror.topic_messages_after(&self.topic_id, cursor),
                self.max_retry_duration
            ) {
                Ok(Ok(batch)) => batch,
                Ok(Err(e)) | Err(e) => {
                    error!("[{}] mirror unreachable, watcher failed: {:?}", stream, e);
                    return;
                }
            };

            if batch.is_empty() {
                let mut state = self.state.lock().await;
                if *state == WatcherState::CatchingUp {
                    info!("[{}] caught up, switching to streaming", stream);
                    *state = WatcherState::Streaming;
                }
            }

            for record in batch {
                self.metrics
                    .watcher_received_events
                    .with_label_values(&[&stream])
                    .inc();
                match TopicMessage::from_bytes_with_ts(&record.contents, record.consensus_timestamp)
                {
                    Ok(message) => {
                        let event = match TopicMessageType::try_from(message.message_type) {
                            Ok(TopicMessageType::EthSignature) => {
                                Some(BridgeEvent::TopicSignature(message))
                            }
                            Ok(TopicMessageType::EthTransaction) => {
                                Some(BridgeEvent::TopicEthTransaction(message))
                            }
                            _ => {
                                self.metrics.malformed_topic_messages.inc();
                                warn!(
                                    "[{}] message with unknown type {} at {}, skipping",
                                    stream, message.message_type, record.consensus_timestamp
                                );
                                None
                            }
                        };
                        if let Some(event) = event {
                            if self.publisher.publish(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        self.metrics.malformed_topic_messages.inc();
                        warn!(
                            "[{}] undecodable message at {}, skipping: {:?}",
                            stream, record.consensus_timestamp, e
                        );
                    }
                }

                cursor = record.consensus_timestamp;
                if let Err(e) = self.cursors.advance(&stream, cursor).await {
                    warn!("[{}] failed to advance checkpoint: {:?}", stream, e);
                }
                self.metrics
                    .cursor_position
                    .with_label_values(&[&stream])
                    .set(cursor);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] topic watcher cancelled", stream);
                    return;
                }
                _ = tokio::time::sleep(self.polling_interval) => {}
            }
        }
    }
}
