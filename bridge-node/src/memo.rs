// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Memo carried by the originating ledger credit:
//! `<receiver>-<tx reimbursement>-<gas price gwei>`, ASCII, where receiver is
//! a 0x-prefixed 40-hex EVM address and the integers are base-10.
//!
//! Fields are kept as the original substrings so re-encoding a parsed memo is
//! byte-identical to the input (receiver casing and leading zeros included).

use std::fmt;
use std::str::FromStr;

use ethers::types::{Address as EthAddress, U256};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BridgeError, BridgeResult};

static MEMO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0x[0-9a-fA-F]{40})-(\d+)-(\d+)$").expect("invalid memo regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memo {
    receiver: String,
    tx_reimbursement: String,
    gas_price_gwei: String,
}

impl Memo {
    pub fn parse(memo: &str) -> BridgeResult<Self> {
        let captures = MEMO_RE
            .captures(memo)
            .ok_or_else(|| BridgeError::MemoParseFailure(memo.to_string()))?;
        Ok(Self {
            receiver: captures[1].to_string(),
            tx_reimbursement: captures[2].to_string(),
            gas_price_gwei: captures[3].to_string(),
        })
    }

    pub fn receiver_raw(&self) -> &str {
        &self.receiver
    }

    pub fn tx_reimbursement_raw(&self) -> &str {
        &self.tx_reimbursement
    }

    pub fn gas_price_gwei_raw(&self) -> &str {
        &self.gas_price_gwei
    }

    pub fn receiver(&self) -> EthAddress {
        // The regex guarantees 0x + 40 hex
        EthAddress::from_str(&self.receiver).expect("regex-validated address")
    }

    pub fn tx_reimbursement(&self) -> BridgeResult<U256> {
        parse_amount(&self.tx_reimbursement)
    }

    pub fn gas_price_gwei(&self) -> BridgeResult<U256> {
        parse_amount(&self.gas_price_gwei)
    }
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.receiver, self.tx_reimbursement, self.gas_price_gwei
        )
    }
}

/// Parse a base-10 fixed-point integer string into a U256.
pub fn parse_amount(s: &str) -> BridgeResult<U256> {
    U256::from_dec_str(s).map_err(|e| BridgeError::Generic(format!("bad amount {:?}: {}", s, e)))
}
