// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mirror configuration, loaded from YAML or JSON.

use crate::types::{Blockchain, ChainId};
use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub trait Config: Serialize + DeserializeOwned {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        // Support both YAML and JSON formats
        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MirrorConfig {
    pub chains: Vec<ChainConfig>,
    /// Webhook receiving reorg and fatal-error alerts. Alerts are only logged when unset.
    #[serde(default)]
    pub alert_webhook_url: Option<String>,
}

impl Config for MirrorConfig {}

impl MirrorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(anyhow!("at least one chain must be configured"));
        }
        let mut seen = std::collections::HashSet::new();
        for chain in &self.chains {
            chain
                .validate()
                .map_err(|e| anyhow!("invalid config for chain {}: {}", chain.chain_id(), e))?;
            if !seen.insert(chain.chain_id()) {
                return Err(anyhow!("chain {} is configured twice", chain.chain_id()));
            }
        }
        Ok(())
    }
}

/// Per-chain sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    pub blockchain: Blockchain,
    pub network_id: u64,
    pub rpc_url: String,
    /// Registry contracts whose events are mirrored.
    pub registries: Vec<Address>,
    /// Resolvers without `getMany` and key events.
    #[serde(default)]
    pub legacy_resolvers: Vec<Address>,

    /// Blocks behind the head that are considered final enough to mirror.
    #[serde(default = "default_confirmation_blocks")]
    pub confirmation_blocks: u64,

    /// Number of recorded blocks inspected when searching for a fork point.
    #[serde(default = "default_max_reorg_depth")]
    pub max_reorg_depth: u64,

    #[serde(default = "default_block_fetch_limit")]
    pub block_fetch_limit: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_records_per_page")]
    pub records_per_page: usize,

    /// First block scanned when the mirror is empty.
    #[serde(default)]
    pub genesis_block: u64,

    /// First block scanned for resolver key events. Defaults to `genesis-block`.
    #[serde(default)]
    pub key_discovery_start_block: Option<u64>,

    #[serde(default)]
    pub min_request_interval_ms: u64,
}

fn default_confirmation_blocks() -> u64 {
    3
}

fn default_max_reorg_depth() -> u64 {
    200
}

fn default_block_fetch_limit() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_records_per_page() -> usize {
    200
}

impl ChainConfig {
    pub fn new(blockchain: Blockchain, network_id: u64, rpc_url: &str) -> Self {
        Self {
            blockchain,
            network_id,
            rpc_url: rpc_url.to_string(),
            registries: vec![],
            legacy_resolvers: vec![],
            confirmation_blocks: default_confirmation_blocks(),
            max_reorg_depth: default_max_reorg_depth(),
            block_fetch_limit: default_block_fetch_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            records_per_page: default_records_per_page(),
            genesis_block: 0,
            key_discovery_start_block: None,
            min_request_interval_ms: 0,
        }
    }

    pub fn with_registries(mut self, registries: Vec<Address>) -> Self {
        self.registries = registries;
        self
    }

    pub fn with_legacy_resolvers(mut self, resolvers: Vec<Address>) -> Self {
        self.legacy_resolvers = resolvers;
        self
    }

    pub fn with_confirmation_blocks(mut self, blocks: u64) -> Self {
        self.confirmation_blocks = blocks;
        self
    }

    pub fn with_max_reorg_depth(mut self, depth: u64) -> Self {
        self.max_reorg_depth = depth;
        self
    }

    pub fn with_block_fetch_limit(mut self, limit: u64) -> Self {
        self.block_fetch_limit = limit;
        self
    }

    pub fn with_records_per_page(mut self, records: usize) -> Self {
        self.records_per_page = records;
        self
    }

    pub fn with_genesis_block(mut self, block: u64) -> Self {
        self.genesis_block = block;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.blockchain, self.network_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn key_discovery_start_block(&self) -> u64 {
        self.key_discovery_start_block.unwrap_or(self.genesis_block)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rpc_url.is_empty() {
            return Err("rpc-url cannot be empty".to_string());
        }
        if self.registries.is_empty() {
            return Err("at least one registry must be configured".to_string());
        }
        if self.block_fetch_limit == 0 {
            return Err("block-fetch-limit must be > 0".to_string());
        }
        if self.max_reorg_depth < 2 {
            return Err("max-reorg-depth must be >= 2".to_string());
        }
        if self.records_per_page == 0 {
            return Err("records-per-page must be > 0".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll-interval-ms must be > 0".to_string());
        }
        Ok(())
    }
}
