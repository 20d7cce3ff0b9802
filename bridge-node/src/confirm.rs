// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Receipt waiter: one fiber per submitted EVM hash, polling until the
//! transaction is mined or reverted, then driving the terminal conditional
//! update. Cancellation leaves database state untouched; a restarted node
//! resumes from the persisted status.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::H256;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::eth_client::EthBridge;
use crate::metrics::BridgeMetrics;
use crate::storage::TransferStore;
use crate::types::{EthTxStatus, TransferStatus};

pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct ReceiptWaiter {
    pub eth: Arc<dyn EthBridge>,
    pub transfers: Arc<dyn TransferStore>,
    pub poll_interval: Duration,
    pub metrics: Arc<BridgeMetrics>,
    pub cancel: CancellationToken,
}

impl ReceiptWaiter {
    pub fn spawn(self: Arc<Self>, transfer_id: String, tx_hash: H256) -> JoinHandle<()> {
        tokio::spawn(async move { self.wait(transfer_id, tx_hash).await })
    }

    async fn wait(&self, transfer_id: String, tx_hash: H256) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            match self.eth.transaction_status(tx_hash).await {
                Ok(EthTxStatus::Pending) => continue,
                Ok(EthTxStatus::Mined) => {
                    info!("[{}] mint transaction {:#x} was mined", transfer_id, tx_hash);
                    self.metrics.eth_tx_mined.inc();
                    self.finalize(&transfer_id, TransferStatus::EthTxMined).await;
                    return;
                }
                Ok(EthTxStatus::Reverted) => {
                    warn!("[{}] mint transaction {:#x} reverted", transfer_id, tx_hash);
                    self.metrics.eth_tx_reverted.inc();
                    self.finalize(&transfer_id, TransferStatus::EthTxReverted).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        "[{}] receipt poll for {:#x} failed, retrying: {:?}",
                        transfer_id, tx_hash, e
                    );
                }
            }
        }
    }

    // The receipt already happened on chain: keep retrying the status write
    // until it lands or the node shuts down.
    async fn finalize(&self, transfer_id: &str, to: TransferStatus) {
        loop {
            match self.transfers.update_status(transfer_id, to).await {
                Ok(applied) => {
                    if !applied {
                        // Another waiter (or the conditional guard) got here first
                        info!("[{}] terminal transition to {} already applied", transfer_id, to);
                    }
                    return;
                }
                Err(e) => {
                    warn!("[{}] failed to record {}: {:?}", transfer_id, to, e);
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
