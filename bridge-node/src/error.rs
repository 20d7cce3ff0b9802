// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

use ethers::types::Address as EthAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    // The referenced EVM transaction does not exist (yet)
    TxNotFound,
    // Memo on the originating credit could not be parsed
    MemoParseFailure(String),
    // Quoted reimbursement no longer covers the submission fee floor
    InsufficientFee { quoted: String, floor: String },
    // Topic payload could not be decoded
    MalformedTopicMessage(String),
    // Signature bytes are not a valid recoverable ECDSA signature
    InvalidSignature(String),
    // Recovered signer is not a committee member
    NonMemberSigner(EthAddress),
    // Topic message fields do not match the persisted transfer
    MismatchedTransfer(String),
    // Hash message points at an EVM transaction that does not match the transfer
    FraudulentEthTransaction(String),
    // No wrapped asset registered for the requested route
    UnknownAsset(String),
    // Transient EVM provider error
    TransientProviderError(String),
    // EVM provider error
    ProviderError(String),
    // Ledger node / mirror error
    LedgerError(String),
    // Storage error
    StorageError(String),
    // Internal invariant violation
    InternalError(String),
    // Uncategorized error
    Generic(String),
}

impl BridgeError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::TxNotFound => "tx_not_found",
            BridgeError::MemoParseFailure(_) => "memo_parse_failure",
            BridgeError::InsufficientFee { .. } => "insufficient_fee",
            BridgeError::MalformedTopicMessage(_) => "malformed_topic_message",
            BridgeError::InvalidSignature(_) => "invalid_signature",
            BridgeError::NonMemberSigner(_) => "non_member_signer",
            BridgeError::MismatchedTransfer(_) => "mismatched_transfer",
            BridgeError::FraudulentEthTransaction(_) => "fraudulent_eth_transaction",
            BridgeError::UnknownAsset(_) => "unknown_asset",
            BridgeError::TransientProviderError(_) => "transient_provider_error",
            BridgeError::ProviderError(_) => "provider_error",
            BridgeError::LedgerError(_) => "ledger_error",
            BridgeError::StorageError(_) => "storage_error",
            BridgeError::InternalError(_) => "internal_error",
            BridgeError::Generic(_) => "generic",
        }
    }

    /// Whether the receiving handler should drop the event and record it as a
    /// fraud attempt (as opposed to retrying or transitioning state).
    pub fn is_fraud(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidSignature(_)
                | BridgeError::NonMemberSigner(_)
                | BridgeError::FraudulentEthTransaction(_)
        )
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for BridgeError {}

impl From<ethers::providers::ProviderError> for BridgeError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        BridgeError::TransientProviderError(e.to_string())
    }
}

impl From<diesel::result::Error> for BridgeError {
    fn from(e: diesel::result::Error) -> Self {
        BridgeError::StorageError(e.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::LedgerError(e.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_valid_prometheus_labels() {
        let errors = vec![
            BridgeError::TxNotFound,
            BridgeError::MemoParseFailure("x".to_string()),
            BridgeError::InsufficientFee {
                quoted: "1".to_string(),
                floor: "2".to_string(),
            },
            BridgeError::MalformedTopicMessage("x".to_string()),
            BridgeError::InvalidSignature("x".to_string()),
            BridgeError::NonMemberSigner(EthAddress::zero()),
            BridgeError::MismatchedTransfer("x".to_string()),
            BridgeError::FraudulentEthTransaction("x".to_string()),
            BridgeError::UnknownAsset("x".to_string()),
            BridgeError::TransientProviderError("x".to_string()),
            BridgeError::ProviderError("x".to_string()),
            BridgeError::LedgerError("x".to_string()),
            BridgeError::StorageError("x".to_string()),
            BridgeError::InternalError("x".to_string()),
            BridgeError::Generic("x".to_string()),
        ];

        for error in errors {
            let error_type = error.error_type();
            assert!(!error_type.is_empty());
            for c in error_type.chars() {
                assert!(
                    c.is_ascii_lowercase() || c == '_',
                    "error_type '{}' contains invalid character '{}' for Prometheus label",
                    error_type,
                    c
                );
            }
            assert!(!error_type.starts_with('_'));
            assert!(!error_type.ends_with('_'));
        }
    }

    #[test]
    fn test_fraud_classification() {
        assert!(BridgeError::InvalidSignature("x".to_string()).is_fraud());
        assert!(BridgeError::NonMemberSigner(EthAddress::zero()).is_fraud());
        assert!(BridgeError::FraudulentEthTransaction("x".to_string()).is_fraud());
        assert!(!BridgeError::TxNotFound.is_fraud());
        assert!(!BridgeError::MemoParseFailure("x".to_string()).is_fraud());
        assert!(!BridgeError::StorageError("x".to_string()).is_fraud());
    }
}
