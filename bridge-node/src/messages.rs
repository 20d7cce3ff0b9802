// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Message service: ingests topic messages, aggregates member signatures,
//! detects quorum and drives the at-most-once EVM submission.
//!
//! Quorum counting goes through the message store, not an in-memory counter,
//! so a restarted node recovers by cursor-driven catch-up instead of replaying
//! the topic from the start. Submitter election is deterministic from the
//! globally ordered topic (timestamp, then signer address), which removes the
//! need for a leader-election protocol; safety is still policed by the
//! multisig contract.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address as EthAddress, Bytes, Signature, H256, U256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::bus::EventHandler;
use crate::committee::CommitteeCache;
use crate::confirm::ReceiptWaiter;
use crate::contracts::{decode_mint_call, MintParams};
use crate::crypto::{authorization_digest, decode_signature, recover_signer};
use crate::error::{BridgeError, BridgeResult};
use crate::eth_client::EthBridge;
use crate::events::BridgeEvent;
use crate::ledger_client::LedgerNode;
use crate::memo::parse_amount;
use crate::metrics::BridgeMetrics;
use crate::proto::TopicMessage;
use crate::storage::{MessageStore, TransferStore};
use crate::types::{EthMessageStatus, TransferStatus};
use bridge_schema::models::{MessageRow, TransferRow};
use tokio_util::sync::CancellationToken;

pub const TRANSFER_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const SUBMISSION_DEADLINE: Duration = Duration::from_secs(300);

pub fn address_hex(address: &EthAddress) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Rebuild the mint call arguments and authorization digest from the
/// persisted transfer row.
pub fn mint_params_and_digest(row: &TransferRow) -> BridgeResult<(MintParams, H256)> {
    let receiver = EthAddress::from_str(&row.receiver)
        .map_err(|e| BridgeError::InternalError(format!("stored receiver: {}", e)))?;
    let wrapped_token = EthAddress::from_str(&row.wrapped_asset)
        .map_err(|e| BridgeError::InternalError(format!("stored wrapped asset: {}", e)))?;
    let amount = parse_amount(&row.amount)?;
    let tx_reimbursement = parse_amount(&row.tx_reimbursement)?;
    let digest = authorization_digest(
        &row.transfer_id,
        wrapped_token,
        receiver,
        amount,
        tx_reimbursement,
    )?;
    Ok((
        MintParams {
            transfer_id: row.transfer_id.clone(),
            wrapped_token,
            receiver,
            amount,
            tx_reimbursement,
        },
        digest,
    ))
}

/// Deterministic submitter ranking: rows are already ordered by
/// (transaction_timestamp, signer); the first `threshold` distinct signers
/// qualify, rank 0 submits.
pub fn ranked_submitters(rows: &[MessageRow], threshold: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ranked = Vec::new();
    for row in rows {
        if seen.insert(row.signer.clone()) {
            ranked.push(row.signer.clone());
        }
    }
    ranked.truncate(threshold);
    ranked
}

fn same_address(a: &str, b: &str) -> bool {
    match (EthAddress::from_str(a), EthAddress::from_str(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub struct MessageService {
    transfers: Arc<dyn TransferStore>,
    messages: Arc<dyn MessageStore>,
    eth: Arc<dyn EthBridge>,
    ledger: Arc<dyn LedgerNode>,
    committee: Arc<CommitteeCache>,
    waiter: Arc<ReceiptWaiter>,
    own_address: EthAddress,
    submission_deadline: Duration,
    transfer_poll_interval: Duration,
    metrics: Arc<BridgeMetrics>,
    cancel: CancellationToken,
    quorum_seen: Mutex<HashSet<String>>,
    watched_hashes: Mutex<HashSet<H256>>,
}

impl MessageService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transfers: Arc<dyn TransferStore>,
        messages: Arc<dyn MessageStore>,
        eth: Arc<dyn EthBridge>,
        ledger: Arc<dyn LedgerNode>,
        committee: Arc<CommitteeCache>,
        waiter: Arc<ReceiptWaiter>,
        own_address: EthAddress,
        submission_deadline: Duration,
        transfer_poll_interval: Duration,
        metrics: Arc<BridgeMetrics>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            transfers,
            messages,
            eth,
            ledger,
            committee,
            waiter,
            own_address,
            submission_deadline,
            transfer_poll_interval,
            metrics,
            cancel,
            quorum_seen: Mutex::new(HashSet::new()),
            watched_hashes: Mutex::new(HashSet::new()),
        })
    }

    /// Resolve the transfer row for an incoming topic message. The credit
    /// watcher may not have caught up yet, so poll until it lands.
    async fn await_transfer(&self, transfer_id: &str) -> BridgeResult<TransferRow> {
        loop {
            if let Some(transfer) = self.transfers.transfer_by_id(transfer_id).await? {
                return Ok(transfer);
            }
            debug!(
                "[{}] transfer not yet persisted, querying again in {:?}",
                transfer_id, self.transfer_poll_interval
            );
            if self.sleep_or_cancelled(self.transfer_poll_interval).await {
                return Err(BridgeError::Generic("shutting down".to_string()));
            }
        }
    }

    /// Returns true when the node is shutting down.
    async fn sleep_or_cancelled(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    pub async fn handle_signature_message(
        self: &Arc<Self>,
        message: TopicMessage,
    ) -> BridgeResult<()> {
        let payload = message.signature_payload()?.clone();
        let transfer_id = payload.transfer_id.clone();

        let transfer = self.await_transfer(&transfer_id).await?;

        // Reject signatures over anything but the persisted transfer
        if transfer.receiver != payload.receiver
            || transfer.amount != payload.amount
            || transfer.tx_reimbursement != payload.tx_reimbursement
            || !same_address(&transfer.wrapped_asset, &payload.wrapped_token)
        {
            return Err(BridgeError::MismatchedTransfer(transfer_id));
        }

        let (_, digest) = mint_params_and_digest(&transfer)?;
        let (signature, normalized_hex) = decode_signature(&payload.signature)?;
        let signer = recover_signer(digest, &signature)?;
        if !self.committee.is_member(&signer).await {
            return Err(BridgeError::NonMemberSigner(signer));
        }

        if signer == self.own_address {
            // Our own signature came back through consensus
            self.transfers
                .update_status(&transfer_id, TransferStatus::SignatureMined)
                .await?;
        }

        let recorded = self
            .messages
            .record(MessageRow {
                transfer_id: transfer_id.clone(),
                signature: normalized_hex,
                hash: hex::encode(digest.as_bytes()),
                signer: address_hex(&signer),
                transaction_timestamp: message.transaction_timestamp,
            })
            .await?;
        if !recorded {
            debug!("[{}] signature from {:?} already recorded", transfer_id, signer);
            self.metrics.duplicate_signatures.inc();
            return Ok(());
        }
        self.metrics.signatures_recorded.inc();
        info!("[{}] recorded signature from {:?}", transfer_id, signer);

        let threshold = self.committee.threshold().await;
        if threshold == 0 {
            return Ok(());
        }
        let signer_count = self.messages.distinct_signers(&transfer_id).await?;
        if signer_count < threshold as u64 {
            return Ok(());
        }
        {
            let mut seen = self.quorum_seen.lock().await;
            if !seen.insert(transfer_id.clone()) {
                return Ok(());
            }
        }
        self.metrics.quorum_detections.inc();
        info!(
            "[{}] quorum reached with {}/{} signers",
            transfer_id, signer_count, threshold
        );
        self.on_quorum(&transfer_id, threshold).await
    }

    async fn on_quorum(self: &Arc<Self>, transfer_id: &str, threshold: usize) -> BridgeResult<()> {
        let rows = self.messages.messages_for_transfer(transfer_id).await?;
        let ranked = ranked_submitters(&rows, threshold);
        let me = address_hex(&self.own_address);

        if ranked.first() == Some(&me) {
            info!("[{}] elected as submitter", transfer_id);
            let service = self.clone();
            let transfer_id = transfer_id.to_string();
            tokio::spawn(async move { service.submit_mint(&transfer_id).await });
        } else {
            debug!(
                "[{}] submitter is {:?}, arming submission watchdog",
                transfer_id,
                ranked.first()
            );
            self.spawn_submission_watchdog(transfer_id.to_string(), ranked);
        }
        Ok(())
    }

    /// Non-submitters watch the deadline. One rank advance is attempted; after
    /// that the transfer is parked for operator recovery.
    fn spawn_submission_watchdog(self: &Arc<Self>, transfer_id: String, ranked: Vec<String>) {
        let service = self.clone();
        tokio::spawn(async move {
            let me = address_hex(&service.own_address);

            if service.sleep_or_cancelled(service.submission_deadline).await {
                return;
            }
            if service.is_submitted(&transfer_id).await {
                return;
            }
            warn!(
                "[{}] no submission from {:?} within {:?}",
                transfer_id,
                ranked.first(),
                service.submission_deadline
            );
            if ranked.get(1) == Some(&me) {
                info!("[{}] taking over as backup submitter", transfer_id);
                service.submit_mint(&transfer_id).await;
                return;
            }

            if service.sleep_or_cancelled(service.submission_deadline).await {
                return;
            }
            if service.is_submitted(&transfer_id).await {
                return;
            }
            error!(
                "[{}] backup submitter missed the deadline too, parking transfer for operator recovery",
                transfer_id
            );
            service.metrics.parked_transfers.inc();
        });
    }

    async fn is_submitted(&self, transfer_id: &str) -> bool {
        match self.transfers.transfer_by_id(transfer_id).await {
            Ok(Some(row)) => TransferStatus::parse(&row.status)
                .map(|status| status.ordinal() >= TransferStatus::EthTxSubmitted.ordinal())
                .unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                warn!("[{}] failed to read transfer: {:?}", transfer_id, e);
                false
            }
        }
    }

    /// Build and broadcast the multisig mint call, then announce the hash on
    /// the topic and wait for the receipt.
    async fn submit_mint(self: &Arc<Self>, transfer_id: &str) {
        let transfer = match self.transfers.transfer_by_id(transfer_id).await {
            Ok(Some(transfer)) => transfer,
            Ok(None) => {
                error!("[{}] transfer disappeared before submission", transfer_id);
                return;
            }
            Err(e) => {
                error!("[{}] failed to load transfer: {:?}", transfer_id, e);
                return;
            }
        };
        if self.is_submitted(transfer_id).await {
            debug!("[{}] already submitted, skipping", transfer_id);
            return;
        }

        let (params, digest) = match mint_params_and_digest(&transfer) {
            Ok(result) => result,
            Err(e) => {
                error!("[{}] cannot rebuild mint call: {:?}", transfer_id, e);
                return;
            }
        };
        let rows = match self.messages.messages_for_transfer(transfer_id).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("[{}] failed to load signatures: {:?}", transfer_id, e);
                return;
            }
        };

        // One signature per signer, byte-sorted concatenation order
        let mut seen = HashSet::new();
        let mut signatures: Vec<Vec<u8>> = Vec::new();
        for row in &rows {
            if !seen.insert(row.signer.clone()) {
                continue;
            }
            match hex::decode(&row.signature) {
                Ok(bytes) => signatures.push(bytes),
                Err(e) => warn!("[{}] stored signature undecodable: {}", transfer_id, e),
            }
        }
        signatures.sort();

        let gas_price_wei = match parse_amount(&transfer.gas_price) {
            Ok(gwei) => gwei * U256::exp10(9),
            Err(e) => {
                error!("[{}] stored gas price undecodable: {:?}", transfer_id, e);
                return;
            }
        };

        let tx_hash = match self
            .eth
            .submit_mint(
                &params,
                signatures.into_iter().map(Bytes::from).collect(),
                gas_price_wei,
            )
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!("[{}] mint broadcast failed: {:?}", transfer_id, e);
                self.metrics.eth_mint_submission_failures.inc();
                return;
            }
        };
        self.metrics.eth_mint_submissions.inc();
        let tx_hash_hex = format!("{:#x}", tx_hash);
        info!("[{}] submitted mint transaction {}", transfer_id, tx_hash_hex);

        match self.transfers.record_eth_submission(transfer_id, &tx_hash_hex).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "[{}] a different submission hash is already recorded",
                transfer_id
            ),
            Err(e) => error!("[{}] failed to record submission: {:?}", transfer_id, e),
        }

        // Announce the hash to the other validators
        let hash_message = TopicMessage::new_eth_transaction(
            transfer_id,
            &hex::encode(digest.as_bytes()),
            &tx_hash_hex,
        );
        match self.ledger.submit_topic_message(hash_message.to_bytes()).await {
            Ok(submission) => {
                info!(
                    "[{}] announced {} on the topic (submission {})",
                    transfer_id, tx_hash_hex, submission
                );
                if let Err(e) = self
                    .transfers
                    .set_eth_message_status(transfer_id, EthMessageStatus::Submitted)
                    .await
                {
                    warn!("[{}] failed to track hash message: {:?}", transfer_id, e);
                }
            }
            Err(e) => {
                error!("[{}] failed to announce hash on the topic: {:?}", transfer_id, e);
                let _ = self
                    .transfers
                    .set_eth_message_status(transfer_id, EthMessageStatus::Failed)
                    .await;
            }
        }

        self.watch_receipt(transfer_id, tx_hash).await;
    }

    pub async fn handle_eth_transaction_message(
        self: &Arc<Self>,
        message: TopicMessage,
    ) -> BridgeResult<()> {
        let payload = message.eth_transaction_payload()?.clone();
        let transfer_id = payload.transfer_id.clone();

        let transfer = match self.transfers.transfer_by_id(&transfer_id).await? {
            Some(transfer) => transfer,
            None => {
                return Err(BridgeError::Generic(format!(
                    "[{}] hash message for unknown transfer",
                    transfer_id
                )))
            }
        };

        let tx_hash = H256::from_str(payload.eth_tx_hash.trim_start_matches("0x")).map_err(|e| {
            BridgeError::FraudulentEthTransaction(format!("undecodable hash: {}", e))
        })?;

        self.verify_eth_transaction(&transfer, tx_hash).await?;

        let tx_hash_hex = format!("{:#x}", tx_hash);
        match self.transfers.record_eth_submission(&transfer_id, &tx_hash_hex).await? {
            true => {
                if let Err(e) = self
                    .transfers
                    .set_eth_message_status(&transfer_id, EthMessageStatus::Mined)
                    .await
                {
                    warn!("[{}] failed to track hash message: {:?}", transfer_id, e);
                }
                self.watch_receipt(&transfer_id, tx_hash).await;
                Ok(())
            }
            false => {
                // A different hash is already on the row. With at-most-once
                // submission this only happens under fraud.
                Err(BridgeError::FraudulentEthTransaction(format!(
                    "[{}] conflicting submission hash {}",
                    transfer_id, tx_hash_hex
                )))
            }
        }
    }

    /// Fetch the announced transaction and verify it against the persisted
    /// transfer: target contract, decoded call data, and distinct member
    /// signatures over the authorization digest.
    async fn verify_eth_transaction(
        &self,
        transfer: &TransferRow,
        tx_hash: H256,
    ) -> BridgeResult<()> {
        let data = self
            .eth
            .mint_transaction(tx_hash)
            .await?
            .ok_or(BridgeError::TxNotFound)?;

        if data.to != Some(self.eth.bridge_contract_address()) {
            return Err(BridgeError::FraudulentEthTransaction(format!(
                "[{}] targets {:?}, not the bridge contract",
                transfer.transfer_id, data.to
            )));
        }

        let call = decode_mint_call(&data.input)?;
        let (params, digest) = mint_params_and_digest(transfer)?;
        if MintParams::from(&call) != params {
            return Err(BridgeError::FraudulentEthTransaction(format!(
                "[{}] call data does not match the persisted transfer",
                transfer.transfer_id
            )));
        }

        let committee = self.committee.current().await;
        let mut signers = HashSet::new();
        for signature_bytes in &call.signatures {
            let signature = Signature::try_from(signature_bytes.as_ref()).map_err(|e| {
                BridgeError::FraudulentEthTransaction(format!("undecodable signature: {}", e))
            })?;
            let signer = recover_signer(digest, &signature)?;
            if !committee.is_member(&signer) {
                return Err(BridgeError::FraudulentEthTransaction(format!(
                    "[{}] signature from non-member {:?}",
                    transfer.transfer_id, signer
                )));
            }
            if !signers.insert(signer) {
                return Err(BridgeError::FraudulentEthTransaction(format!(
                    "[{}] duplicate signer {:?} in signature set",
                    transfer.transfer_id, signer
                )));
            }
        }
        if signers.len() < committee.threshold() {
            return Err(BridgeError::FraudulentEthTransaction(format!(
                "[{}] only {} of {} required signatures",
                transfer.transfer_id,
                signers.len(),
                committee.threshold()
            )));
        }
        Ok(())
    }

    async fn watch_receipt(&self, transfer_id: &str, tx_hash: H256) {
        let mut watched = self.watched_hashes.lock().await;
        if !watched.insert(tx_hash) {
            return;
        }
        drop(watched);
        self.waiter
            .clone()
            .spawn(transfer_id.to_string(), tx_hash);
    }
}

/// Bus adapter. Classifies failures per the error-handling policy: fraud is
/// counted and logged, mismatches and malformed payloads are dropped.
pub struct MessageHandler(pub Arc<MessageService>);

#[async_trait::async_trait]
impl EventHandler for MessageHandler {
    async fn handle(&self, event: BridgeEvent) {
        let result = match event {
            BridgeEvent::TopicSignature(message) => {
                self.0.handle_signature_message(message).await
            }
            BridgeEvent::TopicEthTransaction(message) => {
                self.0.handle_eth_transaction_message(message).await
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            if e.is_fraud() {
                self.0
                    .metrics
                    .fraud_attempts
                    .with_label_values(&[e.error_type()])
                    .inc();
                error!("rejected fraudulent message: {:?}", e);
            } else if matches!(e, BridgeError::MalformedTopicMessage(_)) {
                self.0.metrics.malformed_topic_messages.inc();
                warn!("dropped malformed topic message: {:?}", e);
            } else {
                warn!("dropped topic message: {:?}", e);
            }
        }
    }
}
