// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::ChainClient;
use crate::error::ChainResult;
use crate::utils::key_hash;
use anyhow::Context;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

const BUNDLED_RESOLVER_KEYS: &str = include_str!("resolver-keys.json");

/// The well-known record keys.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverKeys {
    pub version: String,
    pub keys: BTreeMap<String, ResolverKeyInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverKeyInfo {
    #[serde(default)]
    pub deprecated_key_name: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub validation_regex: Option<String>,
}

impl ResolverKeys {
    pub fn bundled() -> anyhow::Result<Self> {
        serde_json::from_str(BUNDLED_RESOLVER_KEYS).context("Failed to parse bundled resolver keys")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read resolver keys {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse resolver keys")
    }

    pub fn names(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    /// keccak256(key) -> key, for resolving `Sync` update ids.
    pub fn hash_table(&self) -> HashMap<U256, String> {
        self.keys
            .keys()
            .map(|key| (key_hash(key), key.clone()))
            .collect()
    }
}

/// How the candidate record keys of a token are found on one resolver.
#[async_trait]
pub trait KeyDiscovery: Send + Sync {
    async fn discover_keys(
        &self,
        client: &dyn ChainClient,
        resolver: Address,
        token_id: U256,
    ) -> ChainResult<Vec<String>>;

    /// Whether the resolver serves many keys per call (`getMany`).
    fn batched_reads(&self) -> bool;
}

/// The fixed well-known key list. The only option for legacy resolvers.
#[derive(Debug, Clone)]
pub struct StaticKeyList {
    keys: Arc<Vec<String>>,
    batched: bool,
}

impl StaticKeyList {
    pub fn legacy(keys: Arc<Vec<String>>) -> Self {
        Self {
            keys,
            batched: false,
        }
    }

    pub fn batched(keys: Arc<Vec<String>>) -> Self {
        Self {
            keys,
            batched: true,
        }
    }
}

#[async_trait]
impl KeyDiscovery for StaticKeyList {
    async fn discover_keys(
        &self,
        _client: &dyn ChainClient,
        _resolver: Address,
        _token_id: U256,
    ) -> ChainResult<Vec<String>> {
        Ok(self.keys.as_ref().clone())
    }

    fn batched_reads(&self) -> bool {
        self.batched
    }
}

/// Keys announced by `NewKey` since the token's last `ResetRecords`, falling
/// back to the static list when none were announced.
#[derive(Debug, Clone)]
pub struct EventDiscoveredKeys {
    fallback: StaticKeyList,
    start_block: u64,
}

impl EventDiscoveredKeys {
    pub fn new(keys: Arc<Vec<String>>, start_block: u64) -> Self {
        Self {
            fallback: StaticKeyList::batched(keys),
            start_block,
        }
    }
}

#[async_trait]
impl KeyDiscovery for EventDiscoveredKeys {
    async fn discover_keys(
        &self,
        client: &dyn ChainClient,
        resolver: Address,
        token_id: U256,
    ) -> ChainResult<Vec<String>> {
        let resets = client
            .token_events(resolver, "ResetRecords", token_id, self.start_block)
            .await?;
        let last_reset = resets.iter().map(|event| event.position()).max();
        let from_block = last_reset.map_or(self.start_block, |(block, _)| block);

        let announced = client
            .token_events(resolver, "NewKey", token_id, from_block)
            .await?;
        let mut seen = HashSet::new();
        let keys = announced
            .iter()
            .filter(|event| last_reset.map_or(true, |reset| event.position() > reset))
            .filter_map(|event| event.arg("key"))
            .filter(|key| seen.insert(key.to_string()))
            .map(str::to_string)
            .collect::<Vec<_>>();

        if keys.is_empty() {
            return self
                .fallback
                .discover_keys(client, resolver, token_id)
                .await;
        }
        Ok(keys)
    }

    fn batched_reads(&self) -> bool {
        true
    }
}
