// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Wire format of bridge topic messages.
//!
//! Messages are protobuf-encoded (tag-length-value with stable field numbers)
//! so that validators written against any protobuf binding produce
//! byte-identical payloads for the same tuple. The envelope carries a type
//! discriminator and a oneof payload; `transaction_timestamp` is assigned from
//! the ledger consensus timestamp at receive time and is never set by senders,
//! so it does not appear on the wire.

use prost::Message;

use crate::error::{BridgeError, BridgeResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum TopicMessageType {
    Unspecified = 0,
    EthSignature = 1,
    EthTransaction = 2,
}

/// Signature announcement: one validator's authorization over a transfer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopicSignaturePayload {
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    #[prost(string, tag = "2")]
    pub receiver: String,
    #[prost(string, tag = "3")]
    pub amount: String,
    #[prost(string, tag = "4")]
    pub tx_reimbursement: String,
    #[prost(string, tag = "5")]
    pub gas_price: String,
    #[prost(string, tag = "6")]
    pub signature: String,
    #[prost(string, tag = "7")]
    pub wrapped_token: String,
}

/// Announcement of the EVM mint submission by the elected submitter.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopicEthTransactionPayload {
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    #[prost(string, tag = "2")]
    pub hash: String,
    #[prost(string, tag = "3")]
    pub eth_tx_hash: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopicMessage {
    #[prost(enumeration = "TopicMessageType", tag = "1")]
    pub message_type: i32,
    #[prost(oneof = "Payload", tags = "2, 3")]
    pub payload: Option<Payload>,
    /// Ledger consensus timestamp (ns). Filled at receive, not on wire.
    #[prost(int64, tag = "4")]
    pub transaction_timestamp: i64,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "2")]
    Signature(TopicSignaturePayload),
    #[prost(message, tag = "3")]
    EthTransaction(TopicEthTransactionPayload),
}

impl TopicMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new_signature(
        transfer_id: &str,
        receiver: &str,
        amount: &str,
        tx_reimbursement: &str,
        gas_price: &str,
        signature: &str,
        wrapped_token: &str,
    ) -> Self {
        Self {
            message_type: TopicMessageType::EthSignature as i32,
            payload: Some(Payload::Signature(TopicSignaturePayload {
                transfer_id: transfer_id.to_string(),
                receiver: receiver.to_string(),
                amount: amount.to_string(),
                tx_reimbursement: tx_reimbursement.to_string(),
                gas_price: gas_price.to_string(),
                signature: signature.to_string(),
                wrapped_token: wrapped_token.to_string(),
            })),
            transaction_timestamp: 0,
        }
    }

    pub fn new_eth_transaction(transfer_id: &str, hash: &str, eth_tx_hash: &str) -> Self {
        Self {
            message_type: TopicMessageType::EthTransaction as i32,
            payload: Some(Payload::EthTransaction(TopicEthTransactionPayload {
                transfer_id: transfer_id.to_string(),
                hash: hash.to_string(),
                eth_tx_hash: eth_tx_hash.to_string(),
            })),
            transaction_timestamp: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> BridgeResult<Self> {
        Self::decode(data).map_err(|e| BridgeError::MalformedTopicMessage(e.to_string()))
    }

    /// Decode a received payload, stamping the ledger consensus timestamp.
    pub fn from_bytes_with_ts(data: &[u8], consensus_timestamp: i64) -> BridgeResult<Self> {
        let mut message = Self::from_bytes(data)?;
        message.transaction_timestamp = consensus_timestamp;
        Ok(message)
    }

    pub fn signature_payload(&self) -> BridgeResult<&TopicSignaturePayload> {
        match &self.payload {
            Some(Payload::Signature(payload)) => Ok(payload),
            _ => Err(BridgeError::MalformedTopicMessage(
                "expected signature payload".to_string(),
            )),
        }
    }

    pub fn eth_transaction_payload(&self) -> BridgeResult<&TopicEthTransactionPayload> {
        match &self.payload {
            Some(Payload::EthTransaction(payload)) => Ok(payload),
            _ => Err(BridgeError::MalformedTopicMessage(
                "expected eth transaction payload".to_string(),
            )),
        }
    }
}
