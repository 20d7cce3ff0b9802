// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Shared test fixtures: deterministic signers, in-memory stores and fake
//! clients mirroring the trait seams.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::types::{Address as EthAddress, Bytes, H256, U256};
use tokio::sync::{Mutex, RwLock};

use crate::contracts::{MintCall, MintParams};
use crate::crypto::{authorization_digest, BridgeSigner};
use crate::error::{BridgeError, BridgeResult};
use crate::eth_client::{EthBridge, EthTransactionData};
use crate::events::{BurnEvent, CreditTransferEvent};
use crate::ledger_client::LedgerNode;
use crate::memo::parse_amount;
use crate::mirror_client::{LedgerMirror, MirrorTopicMessage, MirrorTransaction, MirrorTransferLeg};
use crate::proto::TopicMessage;
use crate::storage::{CursorStore, MessageStore, TransferStore};
use crate::transfers::new_transfer_row;
use crate::types::{now_nanos, EthMessageStatus, EthTxStatus, TransferStatus, WrappedTokenRegistry};
use bridge_schema::models::{MessageRow, TransferRow};

pub const BRIDGE_ACCOUNT: &str = "0.0.5005";
pub const RECEIVER: &str = "0x7cFae2deF15dF86CfdA9f2d25A361f1123F42eDD";
pub const TEST_WRAPPED: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

// Well-known development keys (hardhat accounts #0..#2)
const TEST_KEYS: [&str; 3] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

pub fn test_signer(index: usize) -> BridgeSigner {
    BridgeSigner::from_hex(TEST_KEYS[index]).expect("test key")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("info")
        .try_init();
}

pub fn test_registry() -> WrappedTokenRegistry {
    let mut registry = WrappedTokenRegistry::default();
    registry.insert(295, "LGR", 1, EthAddress::from_str(TEST_WRAPPED).unwrap());
    registry
}

pub fn mirror_credit(transfer_id: &str, amount: i64, memo_suffix: &str) -> MirrorTransaction {
    MirrorTransaction {
        transaction_id: transfer_id.to_string(),
        consensus_timestamp: 1_000_000,
        memo: format!("{}-{}", RECEIVER, memo_suffix),
        transfers: vec![
            MirrorTransferLeg {
                account: "0.0.42".to_string(),
                amount: -amount,
            },
            MirrorTransferLeg {
                account: BRIDGE_ACCOUNT.to_string(),
                amount,
            },
        ],
    }
}

pub fn credit_event(
    transfer_id: &str,
    amount: &str,
    tx_reimbursement: &str,
    gas_price: &str,
) -> CreditTransferEvent {
    CreditTransferEvent {
        transfer_id: transfer_id.to_string(),
        receiver: RECEIVER.to_string(),
        amount: amount.to_string(),
        tx_reimbursement: tx_reimbursement.to_string(),
        gas_price: gas_price.to_string(),
        native_asset: "LGR".to_string(),
        timestamp: 1_000_000,
    }
}

/// Insert the canonical test transfer (amount 399900000, reimbursement
/// 100000, gas price 100) and return its row.
pub async fn seeded_transfer(store: &Arc<InMemoryStore>, transfer_id: &str) -> TransferRow {
    let row = new_transfer_row(
        transfer_id,
        RECEIVER,
        "399900000",
        "100000",
        "100",
        "LGR",
        TEST_WRAPPED,
        295,
        1,
        295,
    );
    store.initiate(row.clone()).await.unwrap();
    row
}

/// A topic signature message over the canonical test transfer, signed by
/// `test_signer(signer_index)` and stamped with `consensus_timestamp`.
pub fn signature_message(
    transfer_id: &str,
    signer_index: usize,
    consensus_timestamp: i64,
) -> TopicMessage {
    let signer = test_signer(signer_index);
    let digest = authorization_digest(
        transfer_id,
        EthAddress::from_str(TEST_WRAPPED).unwrap(),
        EthAddress::from_str(RECEIVER).unwrap(),
        parse_amount("399900000").unwrap(),
        parse_amount("100000").unwrap(),
    )
    .unwrap();
    let signature = signer.sign_authorization(digest).unwrap();
    let mut message = TopicMessage::new_signature(
        transfer_id,
        RECEIVER,
        "399900000",
        "100000",
        "100",
        &signature,
        TEST_WRAPPED,
    );
    message.transaction_timestamp = consensus_timestamp;
    message
}

pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if condition().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// In-memory store

#[derive(Default)]
pub struct InMemoryStore {
    transfers: Mutex<HashMap<String, TransferRow>>,
    messages: Mutex<Vec<MessageRow>>,
    cursors: Mutex<HashMap<String, i64>>,
}

pub fn in_memory_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::default())
}

impl InMemoryStore {
    pub async fn transfer(&self, transfer_id: &str) -> Option<TransferRow> {
        self.transfers.lock().await.get(transfer_id).cloned()
    }
}

#[async_trait]
impl TransferStore for InMemoryStore {
    async fn transfer_by_id(&self, transfer_id: &str) -> BridgeResult<Option<TransferRow>> {
        Ok(self.transfers.lock().await.get(transfer_id).cloned())
    }

    async fn initiate(&self, row: TransferRow) -> BridgeResult<(TransferRow, bool)> {
        let mut transfers = self.transfers.lock().await;
        if let Some(existing) = transfers.get(&row.transfer_id) {
            return Ok((existing.clone(), false));
        }
        transfers.insert(row.transfer_id.clone(), row.clone());
        Ok((row, true))
    }

    async fn update_status(&self, transfer_id: &str, to: TransferStatus) -> BridgeResult<bool> {
        let mut transfers = self.transfers.lock().await;
        let Some(row) = transfers.get_mut(transfer_id) else {
            return Ok(false);
        };
        let current = TransferStatus::parse(&row.status)?;
        if !to.allowed_predecessors().contains(&current) {
            return Ok(false);
        }
        row.status = to.to_string();
        row.updated_at = now_nanos();
        Ok(true)
    }

    async fn record_eth_submission(
        &self,
        transfer_id: &str,
        eth_tx_hash: &str,
    ) -> BridgeResult<bool> {
        let mut transfers = self.transfers.lock().await;
        let Some(row) = transfers.get_mut(transfer_id) else {
            return Ok(false);
        };
        let current = TransferStatus::parse(&row.status)?;
        if TransferStatus::EthTxSubmitted
            .allowed_predecessors()
            .contains(&current)
        {
            row.status = TransferStatus::EthTxSubmitted.to_string();
            row.eth_tx_hash = Some(eth_tx_hash.to_string());
            row.updated_at = now_nanos();
            return Ok(true);
        }
        Ok(row.eth_tx_hash.as_deref() == Some(eth_tx_hash))
    }

    async fn set_eth_message_status(
        &self,
        transfer_id: &str,
        status: EthMessageStatus,
    ) -> BridgeResult<()> {
        let mut transfers = self.transfers.lock().await;
        if let Some(row) = transfers.get_mut(transfer_id) {
            row.eth_submission_status = Some(status.to_string());
            row.updated_at = now_nanos();
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn record(&self, row: MessageRow) -> BridgeResult<bool> {
        let mut messages = self.messages.lock().await;
        let duplicate = messages.iter().any(|existing| {
            existing.transfer_id == row.transfer_id
                && (existing.signature == row.signature || existing.signer == row.signer)
        });
        if duplicate {
            return Ok(false);
        }
        messages.push(row);
        Ok(true)
    }

    async fn distinct_signers(&self, transfer_id: &str) -> BridgeResult<u64> {
        let messages = self.messages.lock().await;
        let signers: std::collections::HashSet<_> = messages
            .iter()
            .filter(|row| row.transfer_id == transfer_id)
            .map(|row| row.signer.clone())
            .collect();
        Ok(signers.len() as u64)
    }

    async fn messages_for_transfer(&self, transfer_id: &str) -> BridgeResult<Vec<MessageRow>> {
        let messages = self.messages.lock().await;
        let mut rows: Vec<MessageRow> = messages
            .iter()
            .filter(|row| row.transfer_id == transfer_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.transaction_timestamp, &a.signer).cmp(&(b.transaction_timestamp, &b.signer))
        });
        Ok(rows)
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn ensure(&self, stream_name: &str, initial: i64) -> BridgeResult<i64> {
        let mut cursors = self.cursors.lock().await;
        Ok(*cursors.entry(stream_name.to_string()).or_insert(initial))
    }

    async fn advance(&self, stream_name: &str, to: i64) -> BridgeResult<()> {
        let mut cursors = self.cursors.lock().await;
        let entry = cursors.entry(stream_name.to_string()).or_insert(to);
        if to > *entry {
            *entry = to;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake clients

#[derive(Default)]
pub struct FakeLedgerNode {
    submissions: std::sync::Mutex<Vec<Vec<u8>>>,
    reject: bool,
}

impl FakeLedgerNode {
    pub fn rejecting() -> Self {
        Self {
            submissions: std::sync::Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub async fn submissions(&self) -> Vec<Vec<u8>> {
        self.submissions_sync()
    }

    pub fn submissions_sync(&self) -> Vec<Vec<u8>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerNode for FakeLedgerNode {
    async fn submit_topic_message(&self, payload: Vec<u8>) -> BridgeResult<String> {
        if self.reject {
            return Err(BridgeError::LedgerError("submission rejected".to_string()));
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(payload);
        Ok(format!("0.0.5005-{}", submissions.len()))
    }
}

#[derive(Default)]
pub struct FakeMirror {
    credits: Mutex<Vec<MirrorTransaction>>,
    topic_messages: Mutex<Vec<MirrorTopicMessage>>,
}

impl FakeMirror {
    pub async fn add_credit(&self, tx: MirrorTransaction) {
        self.credits.lock().await.push(tx);
    }

    pub async fn add_topic_message(&self, consensus_timestamp: i64, contents: Vec<u8>) {
        let mut messages = self.topic_messages.lock().await;
        let sequence_number = messages.len() as u64 + 1;
        messages.push(MirrorTopicMessage {
            consensus_timestamp,
            sequence_number,
            contents,
        });
    }
}

#[async_trait]
impl LedgerMirror for FakeMirror {
    async fn credit_transfers_after(
        &self,
        _account: &str,
        after_ns: i64,
    ) -> BridgeResult<Vec<MirrorTransaction>> {
        let mut batch: Vec<MirrorTransaction> = self
            .credits
            .lock()
            .await
            .iter()
            .filter(|tx| tx.consensus_timestamp > after_ns)
            .cloned()
            .collect();
        batch.sort_by_key(|tx| tx.consensus_timestamp);
        Ok(batch)
    }

    async fn topic_messages_after(
        &self,
        _topic_id: &str,
        after_ns: i64,
    ) -> BridgeResult<Vec<MirrorTopicMessage>> {
        let mut batch: Vec<MirrorTopicMessage> = self
            .topic_messages
            .lock()
            .await
            .iter()
            .filter(|message| message.consensus_timestamp > after_ns)
            .cloned()
            .collect();
        batch.sort_by_key(|message| message.consensus_timestamp);
        Ok(batch)
    }
}

pub fn bridge_contract_address_for_testing() -> EthAddress {
    EthAddress::repeat_byte(0xbb)
}

pub struct FakeEthBridge {
    members: RwLock<Vec<EthAddress>>,
    mint_calls: Mutex<Vec<(MintParams, Vec<Bytes>)>>,
    last_hash: Mutex<Option<H256>>,
    statuses: Mutex<HashMap<H256, EthTxStatus>>,
    transactions: Mutex<HashMap<H256, EthTransactionData>>,
    burn_events: Mutex<Vec<BurnEvent>>,
    latest_block: Mutex<u64>,
    next_hash: AtomicU64,
}

impl FakeEthBridge {
    pub fn new(members: Vec<EthAddress>) -> Self {
        Self {
            members: RwLock::new(members),
            mint_calls: Mutex::new(Vec::new()),
            last_hash: Mutex::new(None),
            statuses: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            burn_events: Mutex::new(Vec::new()),
            latest_block: Mutex::new(0),
            next_hash: AtomicU64::new(1),
        }
    }

    pub async fn set_members(&self, members: Vec<EthAddress>) {
        *self.members.write().await = members;
    }

    pub async fn mint_calls(&self) -> Vec<(MintParams, Vec<Bytes>)> {
        self.mint_calls.lock().await.clone()
    }

    pub async fn last_mint_hash(&self) -> Option<H256> {
        *self.last_hash.lock().await
    }

    pub async fn set_transaction_status(&self, tx_hash: H256, status: EthTxStatus) {
        self.statuses.lock().await.insert(tx_hash, status);
    }

    pub async fn add_burn_event(&self, event: BurnEvent) {
        self.burn_events.lock().await.push(event);
    }

    pub async fn set_latest_block(&self, block: u64) {
        *self.latest_block.lock().await = block;
    }

    fn fresh_hash(&self) -> H256 {
        H256::from_low_u64_be(0x1_0000 + self.next_hash.fetch_add(1, Ordering::SeqCst))
    }

    fn mint_calldata(params: &MintParams, signatures: &[Bytes]) -> Vec<u8> {
        MintCall {
            transfer_id: params.transfer_id.clone(),
            wrapped_token: params.wrapped_token,
            receiver: params.receiver,
            amount: params.amount,
            tx_reimbursement: params.tx_reimbursement,
            signatures: signatures.to_vec(),
        }
        .encode()
    }

    /// Register an on-chain mint transaction without going through
    /// `submit_mint` (used to stage fraudulent announcements).
    pub async fn add_mint_transaction(&self, params: &MintParams, signatures: Vec<Bytes>) -> H256 {
        let tx_hash = self.fresh_hash();
        self.transactions.lock().await.insert(
            tx_hash,
            EthTransactionData {
                to: Some(bridge_contract_address_for_testing()),
                input: Bytes::from(Self::mint_calldata(params, &signatures)),
            },
        );
        tx_hash
    }
}

#[async_trait]
impl EthBridge for FakeEthBridge {
    fn bridge_contract_address(&self) -> EthAddress {
        bridge_contract_address_for_testing()
    }

    async fn members(&self) -> BridgeResult<Vec<EthAddress>> {
        Ok(self.members.read().await.clone())
    }

    async fn mint_transaction(&self, tx_hash: H256) -> BridgeResult<Option<EthTransactionData>> {
        Ok(self.transactions.lock().await.get(&tx_hash).cloned())
    }

    async fn submit_mint(
        &self,
        params: &MintParams,
        signatures: Vec<Bytes>,
        _gas_price_wei: U256,
    ) -> BridgeResult<H256> {
        let tx_hash = self.fresh_hash();
        self.transactions.lock().await.insert(
            tx_hash,
            EthTransactionData {
                to: Some(bridge_contract_address_for_testing()),
                input: Bytes::from(Self::mint_calldata(params, &signatures)),
            },
        );
        self.mint_calls
            .lock()
            .await
            .push((params.clone(), signatures));
        *self.last_hash.lock().await = Some(tx_hash);
        Ok(tx_hash)
    }

    async fn transaction_status(&self, tx_hash: H256) -> BridgeResult<EthTxStatus> {
        Ok(self
            .statuses
            .lock()
            .await
            .get(&tx_hash)
            .copied()
            .unwrap_or(EthTxStatus::Pending))
    }

    async fn burn_events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<BurnEvent>> {
        Ok(self
            .burn_events
            .lock()
            .await
            .iter()
            .filter(|event| event.block_number >= from_block && event.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn latest_block(&self) -> BridgeResult<u64> {
        Ok(*self.latest_block.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario: the same signer shows up with two different signatures for
    // one transfer. Only the first one counts.
    #[tokio::test]
    async fn test_in_memory_store_rejects_duplicate_signers() {
        let store = in_memory_store();
        let row = MessageRow {
            transfer_id: "t".to_string(),
            signature: "aa".to_string(),
            hash: "h".to_string(),
            signer: "0x01".to_string(),
            transaction_timestamp: 1,
        };
        assert!(store.record(row.clone()).await.unwrap());
        assert!(!store.record(row.clone()).await.unwrap());

        let mut second = row.clone();
        second.signature = "bb".to_string();
        assert!(!store.record(second).await.unwrap());
        assert_eq!(store.distinct_signers("t").await.unwrap(), 1);

        let mut other_signer = row;
        other_signer.signature = "cc".to_string();
        other_signer.signer = "0x02".to_string();
        assert!(store.record(other_signer).await.unwrap());
        assert_eq!(store.distinct_signers("t").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_store_is_monotone() {
        let store = in_memory_store();
        seeded_transfer(&store, "t").await;

        assert!(store
            .update_status("t", TransferStatus::SignatureSubmitted)
            .await
            .unwrap());
        assert!(store
            .update_status("t", TransferStatus::SignatureMined)
            .await
            .unwrap());
        // lower-ordinal transitions no longer apply
        assert!(!store
            .update_status("t", TransferStatus::SignatureSubmitted)
            .await
            .unwrap());
        assert!(store.record_eth_submission("t", "0xabc").await.unwrap());
        assert!(!store
            .update_status("t", TransferStatus::InsufficientFee)
            .await
            .unwrap());
        assert!(store
            .update_status("t", TransferStatus::EthTxMined)
            .await
            .unwrap());
        assert!(!store
            .update_status("t", TransferStatus::EthTxReverted)
            .await
            .unwrap());
    }
}
