// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Adapter to the ledger mirror/indexer REST API. Exposes the two read paths
//! the watchers need: credit transactions against the bridge account and
//! topic messages, both strictly after a consensus timestamp and in consensus
//! order.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use url::Url;

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MirrorTransferLeg {
    pub account: String,
    pub amount: i64,
}

/// A ledger transaction as reported by the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MirrorTransaction {
    pub transaction_id: String,
    pub consensus_timestamp: i64,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub transfers: Vec<MirrorTransferLeg>,
}

impl MirrorTransaction {
    /// Sum of the positive legs crediting `account`, if any.
    pub fn credited_amount(&self, account: &str) -> Option<u64> {
        let credited: i64 = self
            .transfers
            .iter()
            .filter(|leg| leg.account == account && leg.amount > 0)
            .map(|leg| leg.amount)
            .sum();
        (credited > 0).then_some(credited as u64)
    }
}

/// One message on the bridge topic, contents already base64-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTopicMessage {
    pub consensus_timestamp: i64,
    pub sequence_number: u64,
    pub contents: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct WireTopicMessage {
    consensus_timestamp: i64,
    sequence_number: u64,
    message: String,
}

impl TryFrom<WireTopicMessage> for MirrorTopicMessage {
    type Error = BridgeError;

    fn try_from(wire: WireTopicMessage) -> BridgeResult<Self> {
        let contents = BASE64
            .decode(&wire.message)
            .map_err(|e| BridgeError::MalformedTopicMessage(format!("bad base64: {}", e)))?;
        Ok(Self {
            consensus_timestamp: wire.consensus_timestamp,
            sequence_number: wire.sequence_number,
            contents,
        })
    }
}

#[async_trait]
pub trait LedgerMirror: Send + Sync {
    async fn credit_transfers_after(
        &self,
        account: &str,
        after_ns: i64,
    ) -> BridgeResult<Vec<MirrorTransaction>>;

    async fn topic_messages_after(
        &self,
        topic_id: &str,
        after_ns: i64,
    ) -> BridgeResult<Vec<MirrorTopicMessage>>;
}

pub struct MirrorHttpClient {
    http: reqwest::Client,
    base_url: Url,
    page_limit: u32,
}

#[derive(Debug, Deserialize)]
struct TransactionsPage {
    transactions: Vec<MirrorTransaction>,
}

#[derive(Debug, Deserialize)]
struct TopicMessagesPage {
    messages: Vec<WireTopicMessage>,
}

impl MirrorHttpClient {
    pub fn new(base_url: &str, page_limit: u32) -> BridgeResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BridgeError::Generic(format!("invalid mirror url: {}", e)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            page_limit,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> BridgeResult<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| BridgeError::Generic(e.to_string()))?;
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::LedgerError(format!(
                "mirror returned status {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl LedgerMirror for MirrorHttpClient {
    async fn credit_transfers_after(
        &self,
        account: &str,
        after_ns: i64,
    ) -> BridgeResult<Vec<MirrorTransaction>> {
        let page: TransactionsPage = self
            .get_json(&format!(
                "api/v1/accounts/{}/credits?after={}&order=asc&limit={}",
                account, after_ns, self.page_limit
            ))
            .await?;
        Ok(page.transactions)
    }

    async fn topic_messages_after(
        &self,
        topic_id: &str,
        after_ns: i64,
    ) -> BridgeResult<Vec<MirrorTopicMessage>> {
        let page: TopicMessagesPage = self
            .get_json(&format!(
                "api/v1/topics/{}/messages?after={}&order=asc&limit={}",
                topic_id, after_ns, self.page_limit
            ))
            .await?;
        page.messages
            .into_iter()
            .map(MirrorTopicMessage::try_from)
            .collect()
    }
}
