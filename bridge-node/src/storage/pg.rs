// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use bridge_schema::models::{MessageRow, StatusCursorRow, TransferRow};
use bridge_schema::schema::{messages, status_cursors, transfers};
use diesel::dsl::count_distinct;
use diesel::prelude::*;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::error::{BridgeError, BridgeResult};
use crate::storage::{CursorStore, MessageStore, TransferStore};
use crate::types::{now_nanos, EthMessageStatus, TransferStatus};

/// Postgres-backed store shared by all services. Clones share the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<AsyncPgConnection>,
}

impl PgStore {
    pub async fn connect(
        database_url: &str,
        pool_size: u32,
        connection_timeout: Duration,
    ) -> BridgeResult<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(connection_timeout)
            .build(manager)
            .await
            .map_err(|e| BridgeError::StorageError(format!("pool setup failed: {}", e)))?;
        Ok(Self { pool })
    }

    /// Run embedded migrations on a dedicated connection.
    pub async fn run_migrations(database_url: &str) -> BridgeResult<()> {
        use diesel_migrations::MigrationHarness;

        info!("Running migrations ...");
        let conn = AsyncPgConnection::establish(database_url)
            .await
            .map_err(|e| BridgeError::StorageError(format!("migration connection: {}", e)))?;
        let mut wrapper: AsyncConnectionWrapper<AsyncPgConnection> = conn.into();

        tokio::task::spawn_blocking(move || {
            wrapper
                .run_pending_migrations(bridge_schema::MIGRATIONS)
                .map(|_| ())
                .map_err(|e| BridgeError::StorageError(format!("migrations failed: {:?}", e)))
        })
        .await
        .map_err(|e| BridgeError::InternalError(format!("migration task: {}", e)))??;
        info!("Migrations complete.");
        Ok(())
    }

    async fn conn(&self) -> BridgeResult<PooledConnection<'_, AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| BridgeError::StorageError(format!("pool checkout failed: {}", e)))
    }
}

fn status_names(statuses: &[TransferStatus]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl TransferStore for PgStore {
    async fn transfer_by_id(&self, transfer_id: &str) -> BridgeResult<Option<TransferRow>> {
        let mut conn = self.conn().await?;
        Ok(transfers::table
            .find(transfer_id)
            .select(TransferRow::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn initiate(&self, row: TransferRow) -> BridgeResult<(TransferRow, bool)> {
        let mut conn = self.conn().await?;
        let inserted = diesel::insert_into(transfers::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        let stored = transfers::table
            .find(&row.transfer_id)
            .select(TransferRow::as_select())
            .first(&mut conn)
            .await?;
        Ok((stored, inserted == 1))
    }

    async fn update_status(&self, transfer_id: &str, to: TransferStatus) -> BridgeResult<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            transfers::table
                .find(transfer_id)
                .filter(transfers::status.eq_any(status_names(to.allowed_predecessors()))),
        )
        .set((
            transfers::status.eq(to.to_string()),
            transfers::updated_at.eq(now_nanos()),
        ))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }

    async fn record_eth_submission(
        &self,
        transfer_id: &str,
        eth_tx_hash: &str,
    ) -> BridgeResult<bool> {
        let mut conn = self.conn().await?;
        let to = TransferStatus::EthTxSubmitted;
        let updated = diesel::update(
            transfers::table
                .find(transfer_id)
                .filter(transfers::status.eq_any(status_names(to.allowed_predecessors()))),
        )
        .set((
            transfers::status.eq(to.to_string()),
            transfers::eth_tx_hash.eq(eth_tx_hash),
            transfers::updated_at.eq(now_nanos()),
        ))
        .execute(&mut conn)
        .await?;
        if updated == 1 {
            return Ok(true);
        }
        // Already past the transition: accept only the recorded hash.
        let stored: Option<Option<String>> = transfers::table
            .find(transfer_id)
            .select(transfers::eth_tx_hash)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(stored.flatten().as_deref() == Some(eth_tx_hash))
    }

    async fn set_eth_message_status(
        &self,
        transfer_id: &str,
        status: EthMessageStatus,
    ) -> BridgeResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(transfers::table.find(transfer_id))
            .set((
                transfers::eth_submission_status.eq(status.to_string()),
                transfers::updated_at.eq(now_nanos()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn record(&self, row: MessageRow) -> BridgeResult<bool> {
        let mut conn = self.conn().await?;
        // Bare ON CONFLICT DO NOTHING also covers the (transfer_id, signer)
        // unique index, so duplicate signers are silently ignored.
        let inserted = diesel::insert_into(messages::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(inserted == 1)
    }

    async fn distinct_signers(&self, transfer_id: &str) -> BridgeResult<u64> {
        let mut conn = self.conn().await?;
        let count: i64 = messages::table
            .filter(messages::transfer_id.eq(transfer_id))
            .select(count_distinct(messages::signer))
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    async fn messages_for_transfer(&self, transfer_id: &str) -> BridgeResult<Vec<MessageRow>> {
        let mut conn = self.conn().await?;
        Ok(messages::table
            .filter(messages::transfer_id.eq(transfer_id))
            .order((
                messages::transaction_timestamp.asc(),
                messages::signer.asc(),
            ))
            .select(MessageRow::as_select())
            .load(&mut conn)
            .await?)
    }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn ensure(&self, stream_name: &str, initial: i64) -> BridgeResult<i64> {
        let mut conn = self.conn().await?;
        let row = StatusCursorRow {
            stream_name: stream_name.to_string(),
            last_fetched: initial,
            updated_at: now_nanos(),
        };
        diesel::insert_into(status_cursors::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        let stored: StatusCursorRow = status_cursors::table
            .find(stream_name)
            .select(StatusCursorRow::as_select())
            .first(&mut conn)
            .await?;
        Ok(stored.last_fetched)
    }

    async fn advance(&self, stream_name: &str, to: i64) -> BridgeResult<()> {
        let mut conn = self.conn().await?;
        diesel::update(
            status_cursors::table
                .find(stream_name)
                .filter(status_cursors::last_fetched.lt(to)),
        )
        .set((
            status_cursors::last_fetched.eq(to),
            status_cursors::updated_at.eq(now_nanos()),
        ))
        .execute(&mut conn)
        .await?;
        Ok(())
    }
}
