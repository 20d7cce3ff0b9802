// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Store seams over the three persisted aggregates. The database is the only
//! authority for transfer and message state; every transfer mutation is a
//! single conditional update so concurrent handlers cannot lose updates or
//! move a transfer backwards.

pub mod pg;

use async_trait::async_trait;
use bridge_schema::models::{MessageRow, TransferRow};

use crate::error::BridgeResult;
use crate::types::{EthMessageStatus, TransferStatus};

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn transfer_by_id(&self, transfer_id: &str) -> BridgeResult<Option<TransferRow>>;

    /// Idempotent insert keyed by `transfer_id`. Returns the stored row and
    /// whether this call created it.
    async fn initiate(&self, row: TransferRow) -> BridgeResult<(TransferRow, bool)>;

    /// Conditional transition: applies only when the current status is an
    /// allowed predecessor of `to`. Returns whether a row was updated.
    async fn update_status(&self, transfer_id: &str, to: TransferStatus) -> BridgeResult<bool>;

    /// Transition to `EthTxSubmitted`, recording the broadcast hash. Returns
    /// true when the row now carries this hash at `EthTxSubmitted` or beyond
    /// (idempotent re-application included); false when a different hash was
    /// already recorded.
    async fn record_eth_submission(
        &self,
        transfer_id: &str,
        eth_tx_hash: &str,
    ) -> BridgeResult<bool>;

    /// Track the lifecycle of the topic hash message for this transfer.
    async fn set_eth_message_status(
        &self,
        transfer_id: &str,
        status: EthMessageStatus,
    ) -> BridgeResult<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a signature record. Returns false when a row with the same
    /// (transfer_id, signature) or (transfer_id, signer) already exists.
    async fn record(&self, row: MessageRow) -> BridgeResult<bool>;

    async fn distinct_signers(&self, transfer_id: &str) -> BridgeResult<u64>;

    /// All recorded signatures for a transfer, ordered by
    /// (transaction_timestamp, signer) — the submitter election order.
    async fn messages_for_transfer(&self, transfer_id: &str) -> BridgeResult<Vec<MessageRow>>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Create the cursor with `initial` on first start, then return whatever
    /// value is stored.
    async fn ensure(&self, stream_name: &str, initial: i64) -> BridgeResult<i64>;

    /// Monotone advancement; values at or below the stored one are no-ops.
    async fn advance(&self, stream_name: &str, to: i64) -> BridgeResult<()>;
}
