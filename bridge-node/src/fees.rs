// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

//! Reimbursement fee policy. The initiator quotes a `tx_reimbursement` in
//! base units of the source asset; it must cover the gas the elected
//! submitter will spend on the mint call at the quoted gas price. Conversion
//! from wei to source-asset base units goes through an injected rate oracle.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::U256;

use crate::error::{BridgeError, BridgeResult};

/// Gas budget of one multisig mint submission. Part of the protocol: all
/// validators must agree on the fee floor for a given gas price.
pub const MINT_GAS_BUDGET: u64 = 250_000;

#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Convert an EVM amount in wei into base units of the source asset.
    async fn native_for_wei(&self, wei: U256) -> BridgeResult<U256>;
}

/// Oracle backed by an operator-configured exchange rate (wei per base unit).
/// Rounds up so a passing local quote can never under-pay the contract.
#[derive(Debug, Clone)]
pub struct FixedRateOracle {
    wei_per_base_unit: U256,
}

impl FixedRateOracle {
    pub fn new(wei_per_base_unit: U256) -> BridgeResult<Self> {
        if wei_per_base_unit.is_zero() {
            return Err(BridgeError::Generic(
                "wei-per-base-unit rate must be non-zero".to_string(),
            ));
        }
        Ok(Self { wei_per_base_unit })
    }
}

#[async_trait]
impl RateOracle for FixedRateOracle {
    async fn native_for_wei(&self, wei: U256) -> BridgeResult<U256> {
        // ceiling division
        Ok((wei + self.wei_per_base_unit - U256::one()) / self.wei_per_base_unit)
    }
}

pub struct FeeCalculator {
    oracle: Arc<dyn RateOracle>,
}

impl FeeCalculator {
    pub fn new(oracle: Arc<dyn RateOracle>) -> Self {
        Self { oracle }
    }

    /// Minimum acceptable reimbursement for a mint at `gas_price_gwei`.
    pub async fn quoted_fee_floor(&self, gas_price_gwei: U256) -> BridgeResult<U256> {
        let wei = gas_price_gwei
            .checked_mul(U256::exp10(9))
            .and_then(|wei_per_gas| wei_per_gas.checked_mul(U256::from(MINT_GAS_BUDGET)))
            .ok_or_else(|| BridgeError::Generic("gas price overflow".to_string()))?;
        self.oracle.native_for_wei(wei).await
    }

    /// Fails with `InsufficientFee` when the quoted reimbursement no longer
    /// covers the floor at the current rate.
    pub async fn verify_fee(&self, quoted: U256, gas_price_gwei: U256) -> BridgeResult<()> {
        let floor = self.quoted_fee_floor(gas_price_gwei).await?;
        if quoted < floor {
            return Err(BridgeError::InsufficientFee {
                quoted: quoted.to_string(),
                floor: floor.to_string(),
            });
        }
        Ok(())
    }
}
