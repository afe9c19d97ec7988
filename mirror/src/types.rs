// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::utils::{namehash, node_to_hex};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Blockchain {
    Eth,
    Matic,
}

/// A mirrored chain: blockchain family plus network id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId {
    pub blockchain: Blockchain,
    pub network_id: u64,
}

impl ChainId {
    pub fn new(blockchain: Blockchain, network_id: u64) -> Self {
        Self {
            blockchain,
            network_id,
        }
    }

    /// Key of the chain's sync cursor row.
    pub fn location(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.blockchain, self.network_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub number: u64,
    pub hash: String,
}

/// A registry or resolver log decoded against the compiled-in ABIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub contract_address: Address,
    pub event_name: String,
    pub block_number: u64,
    pub block_hash: String,
    pub log_index: u64,
    pub tx_hash: String,
    pub args: BTreeMap<String, String>,
}

impl ChainEvent {
    /// Total order of events within one chain.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }
}

/// Append-only journal entry of an event that was applied to the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub chain: ChainId,
    pub contract_address: Address,
    pub event_type: String,
    pub block_number: u64,
    pub block_hash: String,
    pub log_index: u64,
    pub tx_hash: String,
    pub return_values: BTreeMap<String, String>,
    pub node: Option<String>,
}

impl RawEvent {
    pub fn from_event(chain: ChainId, event: &ChainEvent, node: Option<String>) -> Self {
        Self {
            chain,
            contract_address: event.contract_address,
            event_type: event.event_name.clone(),
            block_number: event.block_number,
            block_hash: event.block_hash.clone(),
            log_index: event.log_index,
            tx_hash: event.tx_hash.clone(),
            return_values: event.args.clone(),
            node,
        }
    }

    pub fn to_event(&self) -> ChainEvent {
        ChainEvent {
            contract_address: self.contract_address,
            event_name: self.event_type.clone(),
            block_number: self.block_number,
            block_hash: self.block_hash.clone(),
            log_index: self.log_index,
            tx_hash: self.tx_hash.clone(),
            args: self.return_values.clone(),
        }
    }
}

/// A name, keyed by its node. The node is the namehash of the lower-cased name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub node: String,
    pub name: String,
    pub parent_node: Option<String>,
}

impl Domain {
    pub fn new(name: &str) -> Self {
        let name = name.to_lowercase();
        let parent_node = name
            .split_once('.')
            .map(|(_, parent)| node_to_hex(namehash(parent)));
        Self {
            node: node_to_hex(namehash(&name)),
            name,
            parent_node,
        }
    }

    pub fn label(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }

    pub fn extension(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or_default()
    }
}

/// Per-chain projection of a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub node: String,
    pub chain: ChainId,
    pub owner_address: Option<Address>,
    pub resolver: Option<Address>,
    pub registry: Option<Address>,
    pub records: BTreeMap<String, String>,
}

impl Resolution {
    pub fn empty(node: &str, chain: ChainId) -> Self {
        Self {
            node: node.to_string(),
            chain,
            owner_address: None,
            resolver: None,
            registry: None,
            records: BTreeMap::new(),
        }
    }

    /// State of a burned token.
    pub fn clear(&mut self) {
        self.owner_address = None;
        self.resolver = None;
        self.registry = None;
        self.records.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseResolution {
    pub node: String,
    pub chain: ChainId,
    pub reverse_address: Address,
}

/// Everything one chain owns of a domain. Writing a view replaces the chain's
/// resolution and reverse resolution of that domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainView {
    pub domain: Domain,
    pub resolution: Option<Resolution>,
    pub reverse: Option<ReverseResolution>,
}

impl DomainView {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            resolution: None,
            reverse: None,
        }
    }

    pub fn node(&self) -> &str {
        &self.domain.node
    }

    pub fn resolution_mut(&mut self, chain: ChainId) -> &mut Resolution {
        let node = self.domain.node.clone();
        self.resolution
            .get_or_insert_with(|| Resolution::empty(&node, chain))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub chain: ChainId,
    pub block_number: u64,
    pub block_hash: Option<String>,
    pub last_sequence_id: Option<String>,
}

impl SyncCursor {
    pub fn at_block(chain: ChainId, block: &BlockRef) -> Self {
        Self {
            chain,
            block_number: block.number,
            block_hash: Some(block.hash.clone()),
            last_sequence_id: None,
        }
    }
}
