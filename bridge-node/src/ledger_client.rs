// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Thin adapter to the ledger node, used for one thing only: submitting
//! messages to the bridge consensus topic. The topic itself is the source of
//! truth for "this node has signed"; submission is deliberately not atomic
//! with any database state.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BridgeError, BridgeResult};

#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// Submit a payload to the bridge topic. Returns the ledger transaction id
    /// of the submission.
    async fn submit_topic_message(&self, payload: Vec<u8>) -> BridgeResult<String>;
}

pub struct LedgerNodeHttpClient {
    http: reqwest::Client,
    base_url: Url,
    topic_id: String,
}

#[derive(Debug, Serialize)]
struct SubmitMessageRequest {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubmitMessageResponse {
    transaction_id: String,
}

impl LedgerNodeHttpClient {
    pub fn new(base_url: &str, topic_id: &str) -> BridgeResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BridgeError::Generic(format!("invalid ledger node url: {}", e)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            topic_id: topic_id.to_string(),
        })
    }
}

#[async_trait]
impl LedgerNode for LedgerNodeHttpClient {
    async fn submit_topic_message(&self, payload: Vec<u8>) -> BridgeResult<String> {
        let url = self
            .base_url
            .join(&format!("api/v1/topics/{}/messages", self.topic_id))
            .map_err(|e| BridgeError::Generic(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .json(&SubmitMessageRequest {
                message: BASE64.encode(&payload),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BridgeError::LedgerError(format!(
                "topic submission rejected with status {}",
                response.status()
            )));
        }

        let body: SubmitMessageResponse = response.json().await?;
        Ok(body.transaction_id)
    }
}
