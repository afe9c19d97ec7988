// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::abi::MirrorAbi;
use crate::error::{ChainError, ChainResult};
use crate::metered_eth_provider::{new_metered_eth_provider, MeteredEthHttpProvider};
use crate::metrics::MirrorMetrics;
use crate::types::{BlockRef, ChainEvent};
use async_trait::async_trait;
use ethers::contract::{Contract, ContractError};
use ethers::providers::{JsonRpcClient, Middleware, Provider, ProviderError};
use ethers::types::{Address, BlockNumber, Filter, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;

/// Read access to one chain. Implementations never retry: callers decide.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> ChainResult<u64>;

    async fn latest_block(&self) -> ChainResult<BlockRef>;

    async fn block_hash(&self, number: u64) -> ChainResult<String>;

    /// Decoded logs of `contract` in `[from_block, to_block]`, ordered by position.
    async fn events(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<ChainEvent>>;

    /// `event_name` logs of `contract` for one token, from `from_block` to the head.
    async fn token_events(
        &self,
        contract: Address,
        event_name: &str,
        token_id: U256,
        from_block: u64,
    ) -> ChainResult<Vec<ChainEvent>>;

    async fn resolver_of(&self, registry: Address, token_id: U256) -> ChainResult<Address>;

    async fn get_many(
        &self,
        resolver: Address,
        keys: Vec<String>,
        token_id: U256,
    ) -> ChainResult<Vec<String>>;

    async fn get(&self, resolver: Address, key: &str, token_id: U256) -> ChainResult<String>;
}

pub struct EthChainClient<P> {
    provider: Arc<Provider<P>>,
    abi: MirrorAbi,
}

impl EthChainClient<MeteredEthHttpProvider> {
    pub fn new(
        provider_url: &str,
        min_request_interval: Duration,
        metrics: Arc<MirrorMetrics>,
    ) -> anyhow::Result<Self> {
        let provider = new_metered_eth_provider(provider_url, min_request_interval, metrics)?;
        Ok(Self::from_provider(provider)?)
    }
}

impl<P> EthChainClient<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn from_provider(provider: Provider<P>) -> ChainResult<Self> {
        Ok(Self {
            provider: Arc::new(provider),
            abi: MirrorAbi::new()?,
        })
    }

    fn contract(&self, address: Address) -> Contract<Provider<P>> {
        Contract::new(address, self.abi.contract().clone(), self.provider.clone())
    }

    async fn decoded_logs(
        &self,
        filter: Filter,
        contract: Address,
    ) -> ChainResult<Vec<ChainEvent>> {
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(provider_error)
            .tap_err(|e| {
                tracing::error!("get_logs failed. Filter: {:?}. Error {:?}", filter, e)
            })?;

        // Safeguard check that all events are emitted from requested contract address
        if logs.iter().any(|log| log.address != contract) {
            return Err(ChainError::Provider(format!(
                "Provider returns logs from different contract address (expected: {:?})",
                contract
            )));
        }

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if let Some(event) = self.abi.decode_log(log)? {
                events.push(event);
            }
        }
        events.sort_by_key(ChainEvent::position);
        Ok(events)
    }
}

#[async_trait]
impl<P> ChainClient for EthChainClient<P>
where
    P: JsonRpcClient + 'static,
{
    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(self
            .provider
            .get_chainid()
            .await
            .map_err(provider_error)?
            .as_u64())
    }

    async fn latest_block(&self) -> ChainResult<BlockRef> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(provider_error)?
            .ok_or_else(|| ChainError::Provider("Provider returns no latest block".into()))?;
        match (block.number, block.hash) {
            (Some(number), Some(hash)) => Ok(BlockRef {
                number: number.as_u64(),
                hash: format!("{:?}", hash),
            }),
            _ => Err(ChainError::Provider(
                "Provider returns latest block without number or hash".into(),
            )),
        }
    }

    async fn block_hash(&self, number: u64) -> ChainResult<String> {
        let block = self
            .provider
            .get_block(BlockNumber::Number(number.into()))
            .await
            .map_err(provider_error)?
            .ok_or(ChainError::BlockNotFound(number))?;
        block
            .hash
            .map(|hash| format!("{:?}", hash))
            .ok_or(ChainError::BlockNotFound(number))
    }

    async fn events(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .address(contract);
        self.decoded_logs(filter, contract).await
    }

    async fn token_events(
        &self,
        contract: Address,
        event_name: &str,
        token_id: U256,
        from_block: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        let mut token_topic = [0u8; 32];
        token_id.to_big_endian(&mut token_topic);
        let filter = Filter::new()
            .from_block(from_block)
            .address(contract)
            .topic0(self.abi.event_topic(event_name)?)
            .topic1(H256(token_topic));
        self.decoded_logs(filter, contract).await
    }

    async fn resolver_of(&self, registry: Address, token_id: U256) -> ChainResult<Address> {
        self.contract(registry)
            .method::<_, Address>("resolverOf", token_id)
            .map_err(|e| ChainError::Provider(format!("resolverOf: {e}")))?
            .call()
            .await
            .map_err(|e| contract_error("resolverOf", e))
    }

    async fn get_many(
        &self,
        resolver: Address,
        keys: Vec<String>,
        token_id: U256,
    ) -> ChainResult<Vec<String>> {
        self.contract(resolver)
            .method::<_, Vec<String>>("getMany", (keys, token_id))
            .map_err(|e| ChainError::Provider(format!("getMany: {e}")))?
            .call()
            .await
            .map_err(|e| contract_error("getMany", e))
    }

    async fn get(&self, resolver: Address, key: &str, token_id: U256) -> ChainResult<String> {
        self.contract(resolver)
            .method::<_, String>("get", (key.to_string(), token_id))
            .map_err(|e| ChainError::Provider(format!("get: {e}")))?
            .call()
            .await
            .map_err(|e| contract_error("get", e))
    }
}

fn provider_error(e: ProviderError) -> ChainError {
    ChainError::Transient(e.to_string())
}

/// Reverts and undecodable return data mean "no value"; everything else is transient.
fn contract_error<M: Middleware>(method: &str, e: ContractError<M>) -> ChainError {
    if e.is_revert() {
        return ChainError::Reverted(format!("{method}: {e}"));
    }
    match e {
        ContractError::DecodingError(_)
        | ContractError::DetokenizationError(_)
        | ContractError::AbiError(_) => {
            ChainError::Reverted(format!("{method} returned invalid values: {e}"))
        }
        other => ChainError::Transient(format!("{method}: {other}")),
    }
}
