// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, IntCounter, IntCounterVec, IntGaugeVec, Registry,
};

/// Node-wide counters and gauges. The registry (and everything that serves or
/// pushes it) is owned by the embedding process.
#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    pub(crate) watcher_received_events: IntCounterVec,
    pub(crate) cursor_position: IntGaugeVec,

    pub(crate) transfers_initiated: IntCounter,
    pub(crate) transfers_skipped_replay: IntCounter,
    pub(crate) insufficient_fee_transfers: IntCounter,
    pub(crate) signatures_published: IntCounter,
    pub(crate) signature_publish_failures: IntCounter,

    pub(crate) signatures_recorded: IntCounter,
    pub(crate) duplicate_signatures: IntCounter,
    pub(crate) malformed_topic_messages: IntCounter,
    pub(crate) fraud_attempts: IntCounterVec,
    pub(crate) quorum_detections: IntCounter,

    pub(crate) eth_mint_submissions: IntCounter,
    pub(crate) eth_mint_submission_failures: IntCounter,
    pub(crate) eth_tx_mined: IntCounter,
    pub(crate) eth_tx_reverted: IntCounter,
    pub(crate) parked_transfers: IntCounter,

    pub(crate) burn_events_observed: IntCounter,
}

impl BridgeMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            watcher_received_events: register_int_counter_vec_with_registry!(
                "bridge_watcher_received_events",
                "Total number of events emitted per watcher stream",
                &["stream"],
                registry,
            )
            .unwrap(),
            cursor_position: register_int_gauge_vec_with_registry!(
                "bridge_cursor_position",
                "Last checkpoint per watcher stream (ns or block number)",
                &["stream"],
                registry,
            )
            .unwrap(),
            transfers_initiated: register_int_counter_with_registry!(
                "bridge_transfers_initiated",
                "Total number of transfer rows created",
                registry,
            )
            .unwrap(),
            transfers_skipped_replay: register_int_counter_with_registry!(
                "bridge_transfers_skipped_replay",
                "Total number of credit observations skipped as replays",
                registry,
            )
            .unwrap(),
            insufficient_fee_transfers: register_int_counter_with_registry!(
                "bridge_insufficient_fee_transfers",
                "Total number of transfers failed on fee verification",
                registry,
            )
            .unwrap(),
            signatures_published: register_int_counter_with_registry!(
                "bridge_signatures_published",
                "Total number of own signatures submitted to the topic",
                registry,
            )
            .unwrap(),
            signature_publish_failures: register_int_counter_with_registry!(
                "bridge_signature_publish_failures",
                "Total number of rejected own topic submissions",
                registry,
            )
            .unwrap(),
            signatures_recorded: register_int_counter_with_registry!(
                "bridge_signatures_recorded",
                "Total number of member signatures persisted",
                registry,
            )
            .unwrap(),
            duplicate_signatures: register_int_counter_with_registry!(
                "bridge_duplicate_signatures",
                "Total number of duplicate signature messages ignored",
                registry,
            )
            .unwrap(),
            malformed_topic_messages: register_int_counter_with_registry!(
                "bridge_malformed_topic_messages",
                "Total number of undecodable topic messages dropped",
                registry,
            )
            .unwrap(),
            fraud_attempts: register_int_counter_vec_with_registry!(
                "bridge_fraud_attempts",
                "Total number of rejected messages that failed verification, by error type",
                &["type"],
                registry,
            )
            .unwrap(),
            quorum_detections: register_int_counter_with_registry!(
                "bridge_quorum_detections",
                "Total number of transfers whose quorum was first observed here",
                registry,
            )
            .unwrap(),
            eth_mint_submissions: register_int_counter_with_registry!(
                "bridge_eth_mint_submissions",
                "Total number of mint transactions broadcast by this node",
                registry,
            )
            .unwrap(),
            eth_mint_submission_failures: register_int_counter_with_registry!(
                "bridge_eth_mint_submission_failures",
                "Total number of failed mint broadcasts",
                registry,
            )
            .unwrap(),
            eth_tx_mined: register_int_counter_with_registry!(
                "bridge_eth_tx_mined",
                "Total number of transfers that reached EthTxMined",
                registry,
            )
            .unwrap(),
            eth_tx_reverted: register_int_counter_with_registry!(
                "bridge_eth_tx_reverted",
                "Total number of transfers that reached EthTxReverted",
                registry,
            )
            .unwrap(),
            parked_transfers: register_int_counter_with_registry!(
                "bridge_parked_transfers",
                "Total number of transfers parked for operator recovery",
                registry,
            )
            .unwrap(),
            burn_events_observed: register_int_counter_with_registry!(
                "bridge_burn_events_observed",
                "Total number of Burn events observed on the bridge contract",
                registry,
            )
            .unwrap(),
        }
    }

    #[cfg(test)]
    pub fn new_for_testing() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new(&Registry::new()))
    }
}
