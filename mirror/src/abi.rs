// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ChainError, ChainResult};
use crate::types::ChainEvent;
use crate::utils::address_to_hex;
use ethers::abi::{Abi, Event, RawLog, Token};
use ethers::types::{Log, H256};
use ethers::utils::hex;
use std::collections::{BTreeMap, HashMap};

/// Events emitted by the registries (and by resolvers that index their keys).
pub const REGISTRY_EVENTS: &[&str] = &[
    "event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)",
    "event Approval(address indexed owner, address indexed approved, uint256 indexed tokenId)",
    "event ApprovalForAll(address indexed owner, address indexed operator, bool approved)",
    "event NewURI(uint256 indexed tokenId, string uri)",
    "event NewURIPrefix(string prefix)",
    "event Resolve(uint256 indexed tokenId, address indexed to)",
    "event Sync(address indexed resolver, uint256 indexed updateId, uint256 indexed tokenId)",
    "event Set(uint256 indexed tokenId, string indexed keyIndex, string indexed valueIndex, string key, string value)",
    "event NewKey(uint256 indexed tokenId, string indexed keyIndex, string key)",
    "event ResetRecords(uint256 indexed tokenId)",
    "event SetReverse(address indexed addr, uint256 indexed tokenId)",
    "event RemoveReverse(address indexed addr)",
    "event Upgraded(address indexed implementation)",
    "event AdminChanged(address previousAdmin, address newAdmin)",
];

pub const RESOLVER_FUNCTIONS: &[&str] = &[
    "function resolverOf(uint256 tokenId) view returns (address)",
    "function getMany(string[] keys, uint256 tokenId) view returns (string[])",
    "function get(string key, uint256 tokenId) view returns (string)",
];

#[derive(Debug, Clone)]
pub struct MirrorAbi {
    events_by_topic: HashMap<H256, Event>,
    contract: Abi,
}

impl MirrorAbi {
    pub fn new() -> ChainResult<Self> {
        let signatures = REGISTRY_EVENTS
            .iter()
            .chain(RESOLVER_FUNCTIONS.iter())
            .copied()
            .collect::<Vec<_>>();
        let contract = ethers::abi::parse_abi(&signatures)
            .map_err(|e| ChainError::Provider(format!("failed to parse ABI: {e}")))?;
        let events_by_topic = contract
            .events()
            .map(|event| (event.signature(), event.clone()))
            .collect();
        Ok(Self {
            events_by_topic,
            contract,
        })
    }

    /// Registry events and resolver functions, used for dynamic contract calls.
    pub fn contract(&self) -> &Abi {
        &self.contract
    }

    pub fn event_topic(&self, name: &str) -> ChainResult<H256> {
        self.contract
            .event(name)
            .map(Event::signature)
            .map_err(|e| ChainError::Provider(format!("unknown event {name}: {e}")))
    }

    /// Decode a log. Logs whose topic is not part of the ABI yield `None`.
    pub fn decode_log(&self, log: &Log) -> ChainResult<Option<ChainEvent>> {
        let Some(event) = log
            .topics
            .first()
            .and_then(|topic| self.events_by_topic.get(topic))
        else {
            return Ok(None);
        };
        let raw_log = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        // A log matching the topic but not the layout, e.g. ERC20 Transfer
        let Ok(parsed) = event.parse_log(raw_log) else {
            tracing::debug!(
                "Skipping log with undecodable {} layout: {:?}",
                event.name,
                log.transaction_hash
            );
            return Ok(None);
        };

        let block_number = log
            .block_number
            .ok_or_else(|| {
                ChainError::Provider("Provider returns log without block_number".into())
            })?
            .as_u64();
        let block_hash = log
            .block_hash
            .ok_or_else(|| ChainError::Provider("Provider returns log without block_hash".into()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| ChainError::Provider("Provider returns log without log_index".into()))?
            .as_u64();
        let tx_hash = log.transaction_hash.ok_or_else(|| {
            ChainError::Provider("Provider returns log without transaction_hash".into())
        })?;

        let args = parsed
            .params
            .into_iter()
            .map(|param| (param.name, token_to_string(&param.value)))
            .collect::<BTreeMap<_, _>>();

        Ok(Some(ChainEvent {
            contract_address: log.address,
            event_name: event.name.clone(),
            block_number,
            block_hash: format!("{:?}", block_hash),
            log_index,
            tx_hash: format!("{:?}", tx_hash),
            args,
        }))
    }
}

/// Event arguments are journaled as strings: addresses as lower-case hex, integers in
/// decimal, hashed (indexed) strings as 0x-prefixed hex.
pub fn token_to_string(token: &Token) -> String {
    match token {
        Token::Address(address) => address_to_hex(address),
        Token::Uint(value) | Token::Int(value) => value.to_string(),
        Token::String(value) => value.clone(),
        Token::Bool(value) => value.to_string(),
        Token::FixedBytes(bytes) | Token::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        other => format!("{:?}", other),
    }
}
