// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::Address as EthAddress;

use crate::error::{BridgeError, BridgeResult};

/// Canonical transfer state machine. Stored as SCREAMING_SNAKE_CASE text.
///
/// ```text
/// Initial -> SignatureSubmitted -> SignatureMined -> EthTxSubmitted -> EthTxMined
///                                                                  \-> EthTxReverted
///        \-> InsufficientFee                     \-> SignatureFailed
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Initial,
    SignatureSubmitted,
    SignatureMined,
    EthTxSubmitted,
    EthTxMined,
    EthTxReverted,
    InsufficientFee,
    SignatureFailed,
}

impl TransferStatus {
    /// Position along the happy path. Terminal failure states rank above
    /// everything so nothing can overwrite them.
    pub fn ordinal(self) -> u8 {
        match self {
            TransferStatus::Initial => 0,
            TransferStatus::SignatureSubmitted => 1,
            TransferStatus::SignatureMined => 2,
            TransferStatus::EthTxSubmitted => 3,
            TransferStatus::EthTxMined => 4,
            TransferStatus::EthTxReverted => 4,
            TransferStatus::InsufficientFee => 5,
            TransferStatus::SignatureFailed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::EthTxMined
                | TransferStatus::EthTxReverted
                | TransferStatus::InsufficientFee
                | TransferStatus::SignatureFailed
        )
    }

    /// States a transfer may be in for a transition into `self` to apply.
    /// Conditional updates use this as the `WHERE status IN (..)` set, which
    /// keeps every transition monotone without explicit locking.
    pub fn allowed_predecessors(self) -> &'static [TransferStatus] {
        match self {
            TransferStatus::Initial => &[],
            TransferStatus::SignatureSubmitted => &[TransferStatus::Initial],
            // A node that crashed before persisting SignatureSubmitted still
            // converges when its replayed signature arrives from the topic.
            TransferStatus::SignatureMined => {
                &[TransferStatus::Initial, TransferStatus::SignatureSubmitted]
            }
            TransferStatus::EthTxSubmitted => &[
                TransferStatus::Initial,
                TransferStatus::SignatureSubmitted,
                TransferStatus::SignatureMined,
            ],
            TransferStatus::EthTxMined => &[TransferStatus::EthTxSubmitted],
            TransferStatus::EthTxReverted => &[TransferStatus::EthTxSubmitted],
            TransferStatus::InsufficientFee => {
                &[TransferStatus::Initial, TransferStatus::SignatureSubmitted]
            }
            TransferStatus::SignatureFailed => {
                &[TransferStatus::Initial, TransferStatus::SignatureSubmitted]
            }
        }
    }

    pub fn parse(s: &str) -> BridgeResult<Self> {
        Self::from_str(s)
            .map_err(|_| BridgeError::InternalError(format!("unknown transfer status {:?}", s)))
    }
}

/// Lifecycle of the topic hash message announcing the EVM submission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EthMessageStatus {
    Submitted,
    Mined,
    Failed,
}

/// Outcome of polling an EVM transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthTxStatus {
    Pending,
    Mined,
    Reverted,
}

/// The multisig contract's member set. Quorum is the contract's 2/3 rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeCommittee {
    members: BTreeSet<EthAddress>,
}

impl BridgeCommittee {
    pub fn new(members: impl IntoIterator<Item = EthAddress>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    pub fn is_member(&self, address: &EthAddress) -> bool {
        self.members.contains(address)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Minimum number of distinct member signatures: ceil(M * 2 / 3).
    pub fn threshold(&self) -> usize {
        (self.members.len() * 2).div_ceil(3)
    }
}

/// Pure lookup of the wrapped ERC-20 address for a route, keyed by
/// (native chain id, native asset, target chain id).
#[derive(Debug, Clone, Default)]
pub struct WrappedTokenRegistry {
    routes: HashMap<(u64, String, u64), EthAddress>,
}

impl WrappedTokenRegistry {
    pub fn new(routes: HashMap<(u64, String, u64), EthAddress>) -> Self {
        Self { routes }
    }

    pub fn insert(
        &mut self,
        native_chain_id: u64,
        native_asset: &str,
        target_chain_id: u64,
        wrapped: EthAddress,
    ) {
        self.routes
            .insert((native_chain_id, native_asset.to_string(), target_chain_id), wrapped);
    }

    pub fn wrapped_asset(
        &self,
        native_chain_id: u64,
        native_asset: &str,
        target_chain_id: u64,
    ) -> BridgeResult<EthAddress> {
        self.routes
            .get(&(native_chain_id, native_asset.to_string(), target_chain_id))
            .copied()
            .ok_or_else(|| {
                BridgeError::UnknownAsset(format!(
                    "{}/{} -> {}",
                    native_chain_id, native_asset, target_chain_id
                ))
            })
    }
}

/// Nanoseconds since epoch, the ledger's native timestamp resolution.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            TransferStatus::Initial,
            TransferStatus::SignatureSubmitted,
            TransferStatus::SignatureMined,
            TransferStatus::EthTxSubmitted,
            TransferStatus::EthTxMined,
            TransferStatus::EthTxReverted,
            TransferStatus::InsufficientFee,
            TransferStatus::SignatureFailed,
        ] {
            let text = status.to_string();
            assert_eq!(TransferStatus::parse(&text).unwrap(), status);
            assert!(text.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
        assert_eq!(
            TransferStatus::SignatureSubmitted.to_string(),
            "SIGNATURE_SUBMITTED"
        );
    }

    #[test]
    fn test_transitions_are_monotone() {
        // No state may be reachable from a state with a higher ordinal.
        for target in [
            TransferStatus::SignatureSubmitted,
            TransferStatus::SignatureMined,
            TransferStatus::EthTxSubmitted,
            TransferStatus::EthTxMined,
            TransferStatus::EthTxReverted,
            TransferStatus::InsufficientFee,
            TransferStatus::SignatureFailed,
        ] {
            for pred in target.allowed_predecessors() {
                assert!(
                    pred.ordinal() < target.ordinal(),
                    "{} -> {} is not monotone",
                    pred,
                    target
                );
                assert!(!pred.is_terminal(), "terminal {} has a successor", pred);
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for terminal in [
            TransferStatus::EthTxMined,
            TransferStatus::EthTxReverted,
            TransferStatus::InsufficientFee,
            TransferStatus::SignatureFailed,
        ] {
            for target in [
                TransferStatus::SignatureSubmitted,
                TransferStatus::SignatureMined,
                TransferStatus::EthTxSubmitted,
                TransferStatus::EthTxMined,
                TransferStatus::EthTxReverted,
            ] {
                assert!(!target.allowed_predecessors().contains(&terminal));
            }
        }
    }

    #[test]
    fn test_committee_threshold() {
        let committee = |n: usize| {
            BridgeCommittee::new((0..n).map(|i| EthAddress::repeat_byte(i as u8 + 1)))
        };
        assert_eq!(committee(3).threshold(), 2);
        assert_eq!(committee(4).threshold(), 3);
        assert_eq!(committee(5).threshold(), 4);
        assert_eq!(committee(6).threshold(), 4);
        assert_eq!(committee(9).threshold(), 6);
    }

    #[test]
    fn test_committee_membership() {
        let a = EthAddress::repeat_byte(1);
        let b = EthAddress::repeat_byte(2);
        let committee = BridgeCommittee::new(vec![a, b, a]);
        assert_eq!(committee.len(), 2);
        assert!(committee.is_member(&a));
        assert!(!committee.is_member(&EthAddress::repeat_byte(9)));
    }

    #[test]
    fn test_wrapped_asset_lookup() {
        let mut registry = WrappedTokenRegistry::default();
        let token = EthAddress::repeat_byte(7);
        registry.insert(295, "LGR", 1, token);

        assert_eq!(registry.wrapped_asset(295, "LGR", 1).unwrap(), token);
        let err = registry.wrapped_asset(295, "LGR", 5).unwrap_err();
        assert_eq!(err.error_type(), "unknown_asset");
    }
}
