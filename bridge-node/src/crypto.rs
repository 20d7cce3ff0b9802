// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Authorization digest and recoverable ECDSA signing.
//!
//! The digest is the Keccak-256 of the tightly packed
//! (transfer id, wrapped token, receiver, amount, tx reimbursement) tuple, in
//! that order, with amounts as unsigned big-endian 32-byte words. Signatures
//! are produced over the EIP-191 personal-sign prefix of that digest, which is
//! what the multisig contract recovers against. Every validator therefore
//! produces byte-identical signing input for the same transfer.

use ethers::abi::{encode_packed, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address as EthAddress, RecoveryMessage, Signature, H256, U256};
use ethers::utils::hash_message;

use crate::error::{BridgeError, BridgeResult};

/// Packed signing input for a transfer authorization.
pub fn authorization_digest(
    transfer_id: &str,
    wrapped_token: EthAddress,
    receiver: EthAddress,
    amount: U256,
    tx_reimbursement: U256,
) -> BridgeResult<H256> {
    let packed = encode_packed(&[
        Token::String(transfer_id.to_string()),
        Token::Address(wrapped_token),
        Token::Address(receiver),
        Token::Uint(amount),
        Token::Uint(tx_reimbursement),
    ])
    .map_err(|e| BridgeError::InternalError(format!("packed encoding failed: {}", e)))?;
    Ok(H256::from(ethers::utils::keccak256(packed)))
}

/// The node's authority key. Doubles as the EVM transaction sender for the
/// elected submitter.
#[derive(Debug, Clone)]
pub struct BridgeSigner {
    wallet: LocalWallet,
}

impl BridgeSigner {
    pub fn from_hex(key_hex: &str) -> BridgeResult<Self> {
        let wallet: LocalWallet = key_hex
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| BridgeError::Generic(format!("invalid signer key: {}", e)))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> EthAddress {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }

    /// Sign the authorization digest; returns the 65-byte recoverable
    /// signature as lowercase hex (no 0x prefix), the wire representation
    /// carried in topic messages and stored in the message table.
    pub fn sign_authorization(&self, digest: H256) -> BridgeResult<String> {
        let signature = self
            .wallet
            .sign_hash(hash_message(digest))
            .map_err(|e| BridgeError::Generic(format!("signing failed: {}", e)))?;
        Ok(hex::encode(signature.to_vec()))
    }
}

/// Decode a hex signature into its 65-byte recoverable form, returning both
/// the parsed signature and its normalized (lowercase, unprefixed) hex.
pub fn decode_signature(signature_hex: &str) -> BridgeResult<(Signature, String)> {
    let bytes = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| BridgeError::InvalidSignature(format!("bad hex: {}", e)))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|e| BridgeError::InvalidSignature(e.to_string()))?;
    Ok((signature, hex::encode(bytes)))
}

/// Recover the signer address of an authorization signature.
pub fn recover_signer(digest: H256, signature: &Signature) -> BridgeResult<EthAddress> {
    signature
        .recover(RecoveryMessage::Hash(hash_message(digest)))
        .map_err(|e| BridgeError::InvalidSignature(e.to_string()))
}
