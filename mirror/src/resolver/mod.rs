// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Point-in-time reads of a token's records from its resolver contract.

use crate::chain_client::ChainClient;
use crate::config::ChainConfig;
use crate::error::{ChainResult, ResolverError};
use crate::types::Resolution;
use crate::utils::non_zero_address;
use ethers::types::{Address, U256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

mod keys;

pub use keys::{EventDiscoveredKeys, KeyDiscovery, ResolverKeyInfo, ResolverKeys, StaticKeyList};

pub struct RecordResolver {
    client: Arc<dyn ChainClient>,
    legacy_resolvers: HashSet<Address>,
    static_keys: StaticKeyList,
    event_keys: EventDiscoveredKeys,
    key_hashes: HashMap<U256, String>,
    records_per_page: usize,
}

impl RecordResolver {
    pub fn new(client: Arc<dyn ChainClient>, config: &ChainConfig, keys: &ResolverKeys) -> Self {
        let names = Arc::new(keys.names());
        Self {
            client,
            legacy_resolvers: config.legacy_resolvers.iter().copied().collect(),
            static_keys: StaticKeyList::legacy(names.clone()),
            event_keys: EventDiscoveredKeys::new(names, config.key_discovery_start_block()),
            key_hashes: keys.hash_table(),
            records_per_page: config.records_per_page.max(1),
        }
    }

    pub fn is_legacy(&self, resolver: Address) -> bool {
        self.legacy_resolvers.contains(&resolver)
    }

    pub fn key_discovery(&self, resolver: Address) -> &dyn KeyDiscovery {
        if self.is_legacy(resolver) {
            &self.static_keys
        } else {
            &self.event_keys
        }
    }

    /// Current resolver of a token. A revert or the zero address means none.
    pub async fn resolver_of(
        &self,
        registry: Address,
        token_id: U256,
    ) -> ChainResult<Option<Address>> {
        match self.client.resolver_of(registry, token_id).await {
            Ok(resolver) => Ok(non_zero_address(resolver)),
            Err(e) if e.is_revert() => {
                debug!("resolverOf({}) reverted on {:?}: {}", token_id, registry, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Non-empty records of a token. A reverted read yields no records.
    pub async fn records(
        &self,
        resolver: Address,
        token_id: U256,
    ) -> ChainResult<BTreeMap<String, String>> {
        let discovery = self.key_discovery(resolver);
        let keys = discovery
            .discover_keys(self.client.as_ref(), resolver, token_id)
            .await?;
        let result = if discovery.batched_reads() {
            self.read_pages(resolver, keys, token_id).await
        } else {
            self.read_one_by_one(resolver, keys, token_id).await
        };
        match result {
            Err(e) if e.is_revert() => {
                debug!(
                    "Reading records of {} from {:?} reverted: {}",
                    token_id, resolver, e
                );
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    async fn read_pages(
        &self,
        resolver: Address,
        keys: Vec<String>,
        token_id: U256,
    ) -> ChainResult<BTreeMap<String, String>> {
        let mut records = BTreeMap::new();
        for page in keys.chunks(self.records_per_page) {
            let values = self
                .client
                .get_many(resolver, page.to_vec(), token_id)
                .await?;
            records.extend(
                page.iter()
                    .cloned()
                    .zip(values)
                    .filter(|(_, value)| !value.is_empty()),
            );
        }
        Ok(records)
    }

    async fn read_one_by_one(
        &self,
        resolver: Address,
        keys: Vec<String>,
        token_id: U256,
    ) -> ChainResult<BTreeMap<String, String>> {
        let mut records = BTreeMap::new();
        for key in keys {
            let value = self.client.get(resolver, &key, token_id).await?;
            if !value.is_empty() {
                records.insert(key, value);
            }
        }
        Ok(records)
    }

    /// Single record addressed by `keccak256(key)`, as announced by `Sync`.
    pub async fn record_by_key_hash(
        &self,
        resolver: Address,
        key_hash: U256,
        token_id: U256,
    ) -> Result<(String, String), ResolverError> {
        let key = self
            .key_hashes
            .get(&key_hash)
            .ok_or_else(|| ResolverError::UnknownKeyHash(key_hash.to_string()))?;
        let value = self.client.get(resolver, key, token_id).await?;
        Ok((key.clone(), value))
    }

    /// Refresh the resolver of `resolution` from the registry, and its records when
    /// the resolver changed. Returns whether anything changed.
    pub async fn fetch_resolver(
        &self,
        registry: Address,
        token_id: U256,
        resolution: &mut Resolution,
    ) -> ChainResult<bool> {
        let resolver = self.resolver_of(registry, token_id).await?;
        if resolution.resolver == resolver {
            return Ok(false);
        }
        resolution.records = match resolver {
            Some(resolver) => self.records(resolver, token_id).await?,
            None => BTreeMap::new(),
        };
        resolution.resolver = resolver;
        Ok(true)
    }
}
