// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::{parse_log, EthEvent};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::signers::Signer;
use ethers::types::{Address as EthAddress, Bytes, Filter, H256, U256};
use tracing::info;

use crate::contracts::{BridgeMultisig, BurnFilter, MintParams};
use crate::crypto::BridgeSigner;
use crate::error::{BridgeError, BridgeResult};
use crate::events::BurnEvent;
use crate::fees::MINT_GAS_BUDGET;
use crate::types::EthTxStatus;

/// A fetched EVM transaction, reduced to what authenticity verification needs.
#[derive(Debug, Clone)]
pub struct EthTransactionData {
    pub to: Option<EthAddress>,
    pub input: Bytes,
}

/// The EVM side of the bridge as the services see it.
#[async_trait]
pub trait EthBridge: Send + Sync {
    /// Address of the multisig bridge contract.
    fn bridge_contract_address(&self) -> EthAddress;

    /// Current member set of the multisig contract.
    async fn members(&self) -> BridgeResult<Vec<EthAddress>>;

    /// Fetch a transaction by hash; `None` while unknown to the node.
    async fn mint_transaction(&self, tx_hash: H256) -> BridgeResult<Option<EthTransactionData>>;

    /// Broadcast the multisig mint call; returns the transaction hash.
    async fn submit_mint(
        &self,
        params: &MintParams,
        signatures: Vec<Bytes>,
        gas_price_wei: U256,
    ) -> BridgeResult<H256>;

    async fn transaction_status(&self, tx_hash: H256) -> BridgeResult<EthTxStatus>;

    async fn burn_events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<BurnEvent>>;

    async fn latest_block(&self) -> BridgeResult<u64>;
}

pub struct EthClient<P: JsonRpcClient> {
    provider: Provider<P>,
    contract: BridgeMultisig<SignerMiddleware<Provider<P>, ethers::signers::LocalWallet>>,
    bridge_address: EthAddress,
    chain_id: u64,
}

impl EthClient<Http> {
    pub async fn connect(
        rpc_url: &str,
        signer: &BridgeSigner,
        bridge_address: EthAddress,
        expected_chain_id: Option<u64>,
    ) -> BridgeResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| BridgeError::Generic(format!("invalid eth rpc url: {}", e)))?;
        let chain_id = provider.get_chainid().await?.as_u64();

        if let Some(expected) = expected_chain_id {
            if chain_id != expected {
                return Err(BridgeError::Generic(format!(
                    "chain id mismatch: expected {}, got {}. This could indicate connecting to the wrong network",
                    expected, chain_id
                )));
            }
        }

        let client = Self::new_with_provider(provider, chain_id, signer, bridge_address);
        client.describe().await?;
        Ok(client)
    }
}

impl<P: JsonRpcClient + Clone + 'static> EthClient<P> {
    pub fn new_with_provider(
        provider: Provider<P>,
        chain_id: u64,
        signer: &BridgeSigner,
        bridge_address: EthAddress,
    ) -> Self {
        let middleware = SignerMiddleware::new(
            provider.clone(),
            signer.wallet().clone().with_chain_id(chain_id),
        );
        let contract = BridgeMultisig::new(bridge_address, Arc::new(middleware));
        Self {
            provider,
            contract,
            bridge_address,
            chain_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn bridge_address(&self) -> EthAddress {
        self.bridge_address
    }

    // Log connection info at startup
    async fn describe(&self) -> BridgeResult<()> {
        let block_number = self.provider.get_block_number().await?;
        info!(
            "EthClient connected to chain {}, bridge contract {:?}, current block: {}",
            self.chain_id, self.bridge_address, block_number
        );
        Ok(())
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> EthBridge for EthClient<P> {
    fn bridge_contract_address(&self) -> EthAddress {
        self.bridge_address
    }

    async fn members(&self) -> BridgeResult<Vec<EthAddress>> {
        self.contract
            .get_members()
            .call()
            .await
            .map_err(|e| BridgeError::TransientProviderError(format!("getMembers failed: {}", e)))
    }

    async fn mint_transaction(&self, tx_hash: H256) -> BridgeResult<Option<EthTransactionData>> {
        let tx = self.provider.get_transaction(tx_hash).await?;
        Ok(tx.map(|tx| EthTransactionData {
            to: tx.to,
            input: tx.input,
        }))
    }

    async fn submit_mint(
        &self,
        params: &MintParams,
        signatures: Vec<Bytes>,
        gas_price_wei: U256,
    ) -> BridgeResult<H256> {
        let call = self
            .contract
            .mint(
                params.transfer_id.clone(),
                params.wrapped_token,
                params.receiver,
                params.amount,
                params.tx_reimbursement,
                signatures,
            )
            .gas(MINT_GAS_BUDGET)
            .gas_price(gas_price_wei);

        let pending = call
            .send()
            .await
            .map_err(|e| BridgeError::ProviderError(format!("mint broadcast failed: {}", e)))?;
        Ok(*pending)
    }

    async fn transaction_status(&self, tx_hash: H256) -> BridgeResult<EthTxStatus> {
        let tx = match self.provider.get_transaction(tx_hash).await? {
            Some(tx) => tx,
            None => return Ok(EthTxStatus::Pending),
        };
        if tx.block_number.is_none() {
            return Ok(EthTxStatus::Pending);
        }
        let receipt = match self.provider.get_transaction_receipt(tx_hash).await? {
            Some(receipt) => receipt,
            None => return Ok(EthTxStatus::Pending),
        };
        match receipt.status.map(|s| s.as_u64()) {
            Some(1) => Ok(EthTxStatus::Mined),
            _ => Ok(EthTxStatus::Reverted),
        }
    }

    async fn burn_events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<BurnEvent>> {
        let filter = Filter::new()
            .address(self.bridge_address)
            .topic0(BurnFilter::signature())
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.provider.get_logs(&filter).await?;

        // Safeguard check that all events are emitted from the bridge contract
        if logs.iter().any(|log| log.address != self.bridge_address) {
            return Err(BridgeError::ProviderError(format!(
                "provider returned logs from an unexpected contract (expected {:?})",
                self.bridge_address
            )));
        }

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let block_number = log
                .block_number
                .ok_or_else(|| {
                    BridgeError::ProviderError("provider returned log without block_number".into())
                })?
                .as_u64();
            let burn: BurnFilter = parse_log(log).map_err(|e| {
                BridgeError::ProviderError(format!("undecodable Burn log: {}", e))
            })?;
            events.push(BurnEvent {
                account: burn.account,
                amount: burn.amount,
                receiver: burn.receiver,
                block_number,
            });
        }
        Ok(events)
    }

    async fn latest_block(&self) -> BridgeResult<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::Token;
    use ethers::providers::MockProvider;
    use ethers::types::{Log, Transaction, TransactionReceipt, U64};

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn mocked_client() -> (EthClient<MockProvider>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let signer = BridgeSigner::from_hex(TEST_KEY).unwrap();
        let client =
            EthClient::new_with_provider(provider, 31337, &signer, EthAddress::repeat_byte(0xbb));
        (client, mock)
    }

    #[tokio::test]
    async fn test_transaction_status_pending_when_unknown() {
        let (client, mock) = mocked_client();
        mock.push(Option::<Transaction>::None).unwrap();
        let status = client
            .transaction_status(H256::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(status, EthTxStatus::Pending);
    }

    #[tokio::test]
    async fn test_transaction_status_pending_while_unmined() {
        let (client, mock) = mocked_client();
        let tx = Transaction {
            hash: H256::repeat_byte(1),
            ..Default::default()
        };
        mock.push(Some(tx)).unwrap();
        let status = client
            .transaction_status(H256::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(status, EthTxStatus::Pending);
    }

    #[tokio::test]
    async fn test_transaction_status_mined_and_reverted() {
        // mock responses are a stack: push the receipt first, the tx second
        let (client, mock) = mocked_client();
        let tx = Transaction {
            hash: H256::repeat_byte(1),
            block_number: Some(U64::from(10)),
            ..Default::default()
        };
        let receipt = TransactionReceipt {
            status: Some(U64::from(1)),
            ..Default::default()
        };
        mock.push(Some(receipt)).unwrap();
        mock.push(Some(tx.clone())).unwrap();
        let status = client
            .transaction_status(H256::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(status, EthTxStatus::Mined);

        let reverted = TransactionReceipt {
            status: Some(U64::from(0)),
            ..Default::default()
        };
        mock.push(Some(reverted)).unwrap();
        mock.push(Some(tx)).unwrap();
        let status = client
            .transaction_status(H256::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(status, EthTxStatus::Reverted);
    }

    // A Burn log exactly as the provider would return it: indexed account in
    // topic 1, (amount, receiver) ABI-encoded in the data section. The
    // receiver is a ledger account id, not an EVM address.
    fn burn_log(contract: EthAddress, account: EthAddress, receiver: &str) -> Log {
        Log {
            address: contract,
            topics: vec![BurnFilter::signature(), H256::from(account)],
            data: ethers::abi::encode(&[
                Token::Uint(U256::from(1000u64)),
                Token::String(receiver.to_string()),
            ])
            .into(),
            block_number: Some(U64::from(120)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_burn_events_in_range_decodes_ledger_receiver() {
        let (client, mock) = mocked_client();
        let account = EthAddress::repeat_byte(5);
        mock.push::<Vec<Log>, _>(vec![burn_log(client.bridge_address(), account, "0.0.77")])
            .unwrap();

        let events = client.burn_events_in_range(100, 200).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].account, account);
        assert_eq!(events[0].amount, U256::from(1000u64));
        assert_eq!(events[0].receiver, "0.0.77");
        assert_eq!(events[0].block_number, 120);
    }

    #[tokio::test]
    async fn test_burn_events_from_unexpected_contract_rejected() {
        let (client, mock) = mocked_client();
        mock.push::<Vec<Log>, _>(vec![burn_log(
            EthAddress::repeat_byte(0xcc),
            EthAddress::repeat_byte(5),
            "0.0.77",
        )])
        .unwrap();

        let err = client.burn_events_in_range(100, 200).await.unwrap_err();
        assert_eq!(err.error_type(), "provider_error");
    }
}
