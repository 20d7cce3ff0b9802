// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;

use crate::schema::{messages, status_cursors, transfers};

/// One cross-chain transfer, keyed by the ledger transaction id of the
/// originating credit. `status` holds the canonical state machine value as
/// text; all timestamps are nanoseconds since epoch.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = transfers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransferRow {
    pub transfer_id: String,
    pub receiver: String,
    pub amount: String,
    pub tx_reimbursement: String,
    pub gas_price: String,
    pub native_asset: String,
    pub wrapped_asset: String,
    pub source_chain_id: i64,
    pub target_chain_id: i64,
    pub native_chain_id: i64,
    pub status: String,
    pub eth_tx_hash: Option<String>,
    pub eth_submission_status: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A received authority signature for a transfer. Primary key is
/// (transfer_id, signature); (transfer_id, signer) carries a unique index so
/// a member can be counted at most once per transfer.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageRow {
    pub transfer_id: String,
    pub signature: String,
    pub hash: String,
    pub signer: String,
    pub transaction_timestamp: i64,
}

/// Replayable checkpoint per watcher stream. `last_fetched` is a consensus
/// timestamp (ns) for ledger streams and a block number for EVM streams.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = status_cursors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StatusCursorRow {
    pub stream_name: String,
    pub last_fetched: i64,
    pub updated_at: i64,
}
