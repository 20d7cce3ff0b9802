// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! In-process event bus: one bounded queue and one worker per event kind.
//!
//! `publish` blocks the producing watcher when a queue is full, which pauses
//! its checkpoint advancement; the system prefers slowness to drops. Within a
//! kind, events are handled in publish order. Across kinds no ordering holds;
//! the transfer state machine's monotone transitions are the only cross-stream
//! serializer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, EventKind};

#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: BridgeEvent);
}

pub struct EventBus {
    queue_depth: usize,
    senders: HashMap<EventKind, mpsc::Sender<BridgeEvent>>,
    workers: Vec<JoinHandle<()>>,
}

impl EventBus {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            queue_depth,
            senders: HashMap::new(),
            workers: Vec::new(),
        }
    }

    /// Attach a handler for one event kind. The worker loop finishes the
    /// in-flight event after cancellation, then exits.
    pub fn register(
        &mut self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
        cancel: CancellationToken,
    ) {
        let (tx, mut rx) = mpsc::channel::<BridgeEvent>(self.queue_depth);
        self.senders.insert(kind, tx);
        self.workers.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("[{}] event worker cancelled", kind);
                        break;
                    }
                    event = rx.recv() => {
                        match event {
                            Some(event) => handler.handle(event).await,
                            None => break,
                        }
                    }
                }
            }
        }));
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            senders: self.senders.clone(),
        }
    }

    /// Wait for workers to drain, bounded by the shutdown deadline.
    pub async fn shutdown(self, drain_deadline: Duration) {
        drop(self.senders);
        let drain = futures::future::join_all(self.workers);
        if tokio::time::timeout(drain_deadline, drain).await.is_err() {
            warn!(
                "event workers did not drain within {:?}, abandoning them",
                drain_deadline
            );
        }
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    senders: HashMap<EventKind, mpsc::Sender<BridgeEvent>>,
}

impl EventPublisher {
    /// Enqueue an event for its kind's worker. Blocks on a full queue.
    pub async fn publish(&self, event: BridgeEvent) -> BridgeResult<()> {
        let kind = event.kind();
        let sender = self.senders.get(&kind).ok_or_else(|| {
            BridgeError::InternalError(format!("no handler registered for {}", kind))
        })?;
        sender
            .send(event)
            .await
            .map_err(|_| BridgeError::InternalError(format!("{} worker stopped", kind)))
    }
}
