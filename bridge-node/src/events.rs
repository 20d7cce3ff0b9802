// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Typed events flowing from watchers into the in-process bus.

use ethers::types::{Address as EthAddress, U256};

use crate::proto::TopicMessage;

/// A normalized bridge-account credit observed on the ledger. `amount` is
/// already net of the quoted reimbursement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditTransferEvent {
    pub transfer_id: String,
    pub receiver: String,
    pub amount: String,
    pub tx_reimbursement: String,
    pub gas_price: String,
    pub native_asset: String,
    pub timestamp: i64,
}

/// A `Burn` observed on the bridge contract (EVM -> ledger direction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnEvent {
    pub account: EthAddress,
    pub amount: U256,
    pub receiver: String,
    pub block_number: u64,
}

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    CreditTransfer(CreditTransferEvent),
    TopicSignature(TopicMessage),
    TopicEthTransaction(TopicMessage),
    Burn(BurnEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    CreditTransfer,
    TopicSignature,
    TopicEthTransaction,
    Burn,
}

impl BridgeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::CreditTransfer(_) => EventKind::CreditTransfer,
            BridgeEvent::TopicSignature(_) => EventKind::TopicSignature,
            BridgeEvent::TopicEthTransaction(_) => EventKind::TopicEthTransaction,
            BridgeEvent::Burn(_) => EventKind::Burn,
        }
    }
}
