// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Generated binding for the bridge multisig contract. The contract verifies
//! member signatures over the authorization digest, mints the wrapped asset to
//! the receiver net of the reimbursement, and pays the reimbursement to the
//! submitter. Burns in the opposite direction emit the `Burn` event.

use ethers::contract::abigen;
use ethers::types::Address as EthAddress;

use crate::error::{BridgeError, BridgeResult};

abigen!(
    BridgeMultisig,
    r#"[
        function mint(string transferId, address wrappedToken, address receiver, uint256 amount, uint256 txReimbursement, bytes[] signatures)
        function getMembers() view returns (address[])
        function isMember(address member) view returns (bool)
        event Burn(address indexed account, uint256 amount, string receiver)
    ]"#
);

/// Decode mint calldata submitted to the bridge contract. Anything that is
/// not a well-formed mint call is treated as a fraudulent announcement by the
/// authenticity check.
pub fn decode_mint_call(input: &[u8]) -> BridgeResult<MintCall> {
    use ethers::abi::AbiDecode;
    MintCall::decode(input)
        .map_err(|e| BridgeError::FraudulentEthTransaction(format!("not a mint call: {}", e)))
}

/// Arguments of a mint submission, matching the authorization digest fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintParams {
    pub transfer_id: String,
    pub wrapped_token: EthAddress,
    pub receiver: EthAddress,
    pub amount: ethers::types::U256,
    pub tx_reimbursement: ethers::types::U256,
}

impl From<&MintCall> for MintParams {
    fn from(call: &MintCall) -> Self {
        Self {
            transfer_id: call.transfer_id.clone(),
            wrapped_token: call.wrapped_token,
            receiver: call.receiver,
            amount: call.amount,
            tx_reimbursement: call.tx_reimbursement,
        }
    }
}
