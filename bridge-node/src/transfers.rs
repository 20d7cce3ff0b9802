// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Transfer service: validates bridge-account credits, persists the transfer
//! aggregate, signs the authorization digest and publishes the signature to
//! the bridge topic. Publication is deliberately not atomic with database
//! state; the topic is the source of truth for "this node has signed".

use std::str::FromStr;
use std::sync::Arc;

use ethers::types::{Address as EthAddress, U256};
use tracing::{debug, error, info, warn};

use crate::bus::EventHandler;
use crate::crypto::{authorization_digest, BridgeSigner};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, CreditTransferEvent};
use crate::fees::FeeCalculator;
use crate::ledger_client::LedgerNode;
use crate::memo::{parse_amount, Memo};
use crate::metrics::BridgeMetrics;
use crate::mirror_client::MirrorTransaction;
use crate::proto::TopicMessage;
use crate::storage::TransferStore;
use crate::types::{now_nanos, TransferStatus, WrappedTokenRegistry};
use bridge_schema::models::TransferRow;

/// Route identifiers of the ledger -> EVM direction served by this node.
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub native_asset: String,
    pub source_chain_id: u64,
    pub target_chain_id: u64,
    pub native_chain_id: u64,
}

#[allow(clippy::too_many_arguments)]
pub fn new_transfer_row(
    transfer_id: &str,
    receiver: &str,
    amount: &str,
    tx_reimbursement: &str,
    gas_price: &str,
    native_asset: &str,
    wrapped_asset: &str,
    source_chain_id: u64,
    target_chain_id: u64,
    native_chain_id: u64,
) -> TransferRow {
    let now = now_nanos();
    TransferRow {
        transfer_id: transfer_id.to_string(),
        receiver: receiver.to_string(),
        amount: amount.to_string(),
        tx_reimbursement: tx_reimbursement.to_string(),
        gas_price: gas_price.to_string(),
        native_asset: native_asset.to_string(),
        wrapped_asset: wrapped_asset.to_string(),
        source_chain_id: source_chain_id as i64,
        target_chain_id: target_chain_id as i64,
        native_chain_id: native_chain_id as i64,
        status: TransferStatus::Initial.to_string(),
        eth_tx_hash: None,
        eth_submission_status: None,
        created_at: now,
        updated_at: now,
    }
}

pub struct TransferService {
    store: Arc<dyn TransferStore>,
    ledger: Arc<dyn LedgerNode>,
    fees: Arc<FeeCalculator>,
    signer: BridgeSigner,
    registry: WrappedTokenRegistry,
    context: TransferContext,
    metrics: Arc<BridgeMetrics>,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn TransferStore>,
        ledger: Arc<dyn LedgerNode>,
        fees: Arc<FeeCalculator>,
        signer: BridgeSigner,
        registry: WrappedTokenRegistry,
        context: TransferContext,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            store,
            ledger,
            fees,
            signer,
            registry,
            context,
            metrics,
        }
    }

    /// Validate a credit against the memo policy and produce the normalized
    /// event for the bus. The emitted amount is net of the reimbursement.
    pub fn sanity_check(
        &self,
        tx: &MirrorTransaction,
        bridge_account: &str,
    ) -> BridgeResult<CreditTransferEvent> {
        let credited = tx.credited_amount(bridge_account).ok_or_else(|| {
            BridgeError::Generic(format!("no credit to {} in {}", bridge_account, tx.transaction_id))
        })?;
        let memo = Memo::parse(&tx.memo)?;

        let reimbursement = memo.tx_reimbursement()?;
        let net = U256::from(credited)
            .checked_sub(reimbursement)
            .filter(|net| !net.is_zero())
            .ok_or_else(|| {
                BridgeError::MemoParseFailure(format!(
                    "reimbursement {} consumes the credited amount {}",
                    reimbursement, credited
                ))
            })?;

        Ok(CreditTransferEvent {
            transfer_id: tx.transaction_id.clone(),
            receiver: memo.receiver_raw().to_string(),
            amount: net.to_string(),
            tx_reimbursement: memo.tx_reimbursement_raw().to_string(),
            gas_price: memo.gas_price_gwei_raw().to_string(),
            native_asset: self.context.native_asset.clone(),
            timestamp: tx.consensus_timestamp,
        })
    }

    /// Idempotent upsert keyed by transfer id. Replays return the stored row
    /// untouched.
    pub async fn initiate_new_transfer(
        &self,
        event: &CreditTransferEvent,
    ) -> BridgeResult<(TransferRow, bool)> {
        let wrapped_asset = self.registry.wrapped_asset(
            self.context.native_chain_id,
            &event.native_asset,
            self.context.target_chain_id,
        )?;
        let row = new_transfer_row(
            &event.transfer_id,
            &event.receiver,
            &event.amount,
            &event.tx_reimbursement,
            &event.gas_price,
            &event.native_asset,
            &format!("0x{}", hex::encode(wrapped_asset.as_bytes())),
            self.context.source_chain_id,
            self.context.target_chain_id,
            self.context.native_chain_id,
        );
        self.store.initiate(row).await
    }

    /// Re-check the quoted reimbursement at the current oracle rate.
    pub async fn verify_fee(&self, event: &CreditTransferEvent) -> BridgeResult<()> {
        let quoted = parse_amount(&event.tx_reimbursement)?;
        let gas_price = parse_amount(&event.gas_price)?;
        self.fees.verify_fee(quoted, gas_price).await
    }

    /// Sign the authorization digest and publish it to the bridge topic.
    pub async fn process_transfer(&self, row: &TransferRow) -> BridgeResult<()> {
        let receiver = EthAddress::from_str(&row.receiver)
            .map_err(|e| BridgeError::InternalError(format!("stored receiver: {}", e)))?;
        let wrapped_token = EthAddress::from_str(&row.wrapped_asset)
            .map_err(|e| BridgeError::InternalError(format!("stored wrapped asset: {}", e)))?;
        let digest = authorization_digest(
            &row.transfer_id,
            wrapped_token,
            receiver,
            parse_amount(&row.amount)?,
            parse_amount(&row.tx_reimbursement)?,
        )?;
        let signature_hex = self.signer.sign_authorization(digest)?;

        let message = TopicMessage::new_signature(
            &row.transfer_id,
            &row.receiver,
            &row.amount,
            &row.tx_reimbursement,
            &row.gas_price,
            &signature_hex,
            &row.wrapped_asset,
        );
        let submission_id = self.ledger.submit_topic_message(message.to_bytes()).await?;
        info!(
            "[{}] published authorization signature to the topic (submission {})",
            row.transfer_id, submission_id
        );
        Ok(())
    }

    async fn handle_credit(&self, event: CreditTransferEvent) {
        let transfer_id = event.transfer_id.clone();

        let (row, created) = match self.initiate_new_transfer(&event).await {
            Ok(result) => result,
            Err(e) => {
                error!("[{}] failed to initiate transfer: {:?}", transfer_id, e);
                return;
            }
        };
        if created {
            self.metrics.transfers_initiated.inc();
        }
        // Replays (and redeliveries after a restart) only proceed when the
        // transfer never got past Initial.
        if !created && TransferStatus::parse(&row.status).map(|s| s != TransferStatus::Initial).unwrap_or(true)
        {
            debug!("[{}] already processed (status {}), skipping", transfer_id, row.status);
            self.metrics.transfers_skipped_replay.inc();
            return;
        }

        if let Err(e) = self.verify_fee(&event).await {
            match e {
                BridgeError::InsufficientFee { ref quoted, ref floor } => {
                    warn!(
                        "[{}] insufficient reimbursement: quoted {}, floor {}",
                        transfer_id, quoted, floor
                    );
                    self.metrics.insufficient_fee_transfers.inc();
                    if let Err(e) = self
                        .store
                        .update_status(&transfer_id, TransferStatus::InsufficientFee)
                        .await
                    {
                        error!("[{}] failed to record InsufficientFee: {:?}", transfer_id, e);
                    }
                }
                e => error!("[{}] fee verification errored: {:?}", transfer_id, e),
            }
            return;
        }

        match self.process_transfer(&row).await {
            Ok(()) => {
                self.metrics.signatures_published.inc();
                if let Err(e) = self
                    .store
                    .update_status(&transfer_id, TransferStatus::SignatureSubmitted)
                    .await
                {
                    error!(
                        "[{}] failed to record SignatureSubmitted: {:?}",
                        transfer_id, e
                    );
                }
            }
            Err(e) => {
                error!("[{}] topic submission rejected: {:?}", transfer_id, e);
                self.metrics.signature_publish_failures.inc();
                if let Err(e) = self
                    .store
                    .update_status(&transfer_id, TransferStatus::SignatureFailed)
                    .await
                {
                    error!("[{}] failed to record SignatureFailed: {:?}", transfer_id, e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for TransferService {
    async fn handle(&self, event: BridgeEvent) {
        if let BridgeEvent::CreditTransfer(credit) = event {
            self.handle_credit(credit).await;
        }
    }
}
