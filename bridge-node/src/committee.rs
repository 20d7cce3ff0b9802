// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Read-mostly cache of the multisig member set. Quorum decisions and signer
//! checks read the cache; a background task refreshes it from the contract.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address as EthAddress;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::BridgeResult;
use crate::eth_client::EthBridge;
use crate::types::BridgeCommittee;

pub struct CommitteeCache {
    inner: RwLock<BridgeCommittee>,
}

impl CommitteeCache {
    pub fn new(initial: BridgeCommittee) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub async fn current(&self) -> BridgeCommittee {
        self.inner.read().await.clone()
    }

    pub async fn is_member(&self, address: &EthAddress) -> bool {
        self.inner.read().await.is_member(address)
    }

    pub async fn threshold(&self) -> usize {
        self.inner.read().await.threshold()
    }

    pub async fn refresh_from(&self, eth: &dyn EthBridge) -> BridgeResult<()> {
        let members = eth.members().await?;
        let committee = BridgeCommittee::new(members);
        let mut inner = self.inner.write().await;
        if *inner != committee {
            info!(
                "committee updated: {} members, threshold {}",
                committee.len(),
                committee.threshold()
            );
            *inner = committee;
        }
        Ok(())
    }
}

pub fn spawn_committee_refresh(
    cache: Arc<CommitteeCache>,
    eth: Arc<dyn EthBridge>,
    refresh_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("committee refresh task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = cache.refresh_from(eth.as_ref()).await {
                        warn!("committee refresh failed: {:?}", e);
                    }
                }
            }
        }
    })
}
