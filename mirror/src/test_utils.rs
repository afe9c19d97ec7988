// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::abi::MirrorAbi;
use crate::chain_client::ChainClient;
use crate::error::{ChainError, ChainResult};
use crate::types::{BlockRef, Blockchain, ChainEvent, ChainId, RawEvent};
use crate::utils::{address_to_hex, namehash, node_to_hex, node_to_token_id};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, H160, H256, U256, U64};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

pub const TEST_REGISTRY: Address = H160([0xd1; 20]);
pub const TEST_LEGACY_REGISTRY: Address = H160([0xc1; 20]);
pub const TEST_RESOLVER: Address = H160([0xe1; 20]);
pub const TEST_LEGACY_RESOLVER: Address = H160([0xb6; 20]);

pub fn test_chain() -> ChainId {
    ChainId::new(Blockchain::Eth, 1)
}

pub fn owner(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn node_of(name: &str) -> String {
    node_to_hex(namehash(&name.to_lowercase()))
}

pub fn token_of(name: &str) -> U256 {
    node_to_token_id(&node_of(name)).unwrap()
}

pub fn event(
    contract: Address,
    name: &str,
    block_number: u64,
    log_index: u64,
    args: &[(&str, String)],
) -> ChainEvent {
    ChainEvent {
        contract_address: contract,
        event_name: name.to_string(),
        block_number,
        block_hash: test_block_hash(block_number, 0),
        log_index,
        tx_hash: format!("{:?}", H256::from_low_u64_be(block_number * 1_000 + log_index)),
        args: args
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
    }
}

pub fn raw_event(chain: ChainId, block_number: u64, log_index: u64, node: &str) -> RawEvent {
    RawEvent {
        chain,
        contract_address: TEST_REGISTRY,
        event_type: "Approval".to_string(),
        block_number,
        block_hash: test_block_hash(block_number, 0),
        log_index,
        tx_hash: format!("{:?}", H256::from_low_u64_be(block_number)),
        return_values: BTreeMap::new(),
        node: Some(node.to_string()),
    }
}

/// Hash of `number` on fork `branch`.
pub fn test_block_hash(number: u64, branch: u8) -> String {
    format!("0x{:02x}{:062x}", branch, number)
}

fn address_topic(address: Address) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_bytes());
    H256(bytes)
}

pub fn transfer_log(
    abi: &MirrorAbi,
    from: Address,
    to: Address,
    token_id: U256,
    block_number: u64,
    log_index: u64,
) -> Log {
    let mut token_topic = [0u8; 32];
    token_id.to_big_endian(&mut token_topic);
    Log {
        address: TEST_REGISTRY,
        topics: vec![
            abi.event_topic("Transfer").unwrap(),
            address_topic(from),
            address_topic(to),
            H256(token_topic),
        ],
        data: Bytes::default(),
        block_hash: Some(H256::from_low_u64_be(block_number)),
        block_number: Some(U64::from(block_number)),
        transaction_hash: Some(H256::from_low_u64_be(block_number * 1_000 + log_index)),
        log_index: Some(U256::from(log_index)),
        ..Default::default()
    }
}

#[derive(Debug, Default)]
struct MockChainState {
    branch: u8,
    blocks: BTreeMap<u64, String>,
    events: Vec<ChainEvent>,
    resolvers: HashMap<U256, Address>,
    records: HashMap<(Address, U256), BTreeMap<String, String>>,
    reverting_resolvers: HashSet<Address>,
    failing: bool,
    calls: Vec<String>,
    pending_reorg: Option<(u64, u64)>,
}

impl MockChainState {
    fn reorg(&mut self, fork_block: u64, head: u64) {
        self.branch += 1;
        let branch = self.branch;
        self.blocks.retain(|number, _| *number < fork_block);
        for number in fork_block..=head {
            self.blocks.insert(number, test_block_hash(number, branch));
        }
        self.events.retain(|event| event.block_number < fork_block);
    }
}

/// Scripted chain: blocks, logs and resolver contents set by the test.
#[derive(Debug, Default)]
pub struct MockChainClient {
    chain_id: u64,
    state: Mutex<MockChainState>,
}

impl MockChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::default(),
        }
    }

    /// Extend the current branch up to `head`.
    pub fn advance_to(&self, head: u64) {
        let mut state = self.state.lock().unwrap();
        let from = state.blocks.keys().next_back().map_or(0, |last| last + 1);
        let branch = state.branch;
        for number in from..=head {
            state.blocks.insert(number, test_block_hash(number, branch));
        }
    }

    /// Replace every block from `fork_block` on with a new branch up to `head`,
    /// dropping the logs of the abandoned blocks.
    pub fn reorg(&self, fork_block: u64, head: u64) {
        self.state.lock().unwrap().reorg(fork_block, head);
    }

    /// Reorg right after the next `events` call has read its logs.
    pub fn reorg_after_next_events(&self, fork_block: u64, head: u64) {
        self.state.lock().unwrap().pending_reorg = Some((fork_block, head));
    }

    /// Emit a log in the current branch. The block must exist.
    pub fn emit(&self, mut event: ChainEvent) {
        let mut state = self.state.lock().unwrap();
        event.block_hash = state
            .blocks
            .get(&event.block_number)
            .cloned()
            .expect("emit into an unknown block");
        state.events.push(event);
    }

    pub fn set_resolver(&self, token_id: U256, resolver: Address) {
        self.state
            .lock()
            .unwrap()
            .resolvers
            .insert(token_id, resolver);
    }

    pub fn set_record(&self, resolver: Address, token_id: U256, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .records
            .entry((resolver, token_id))
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_reverting(&self, resolver: Address) {
        self.state
            .lock()
            .unwrap()
            .reverting_resolvers
            .insert(resolver);
    }

    /// Make every call fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn check(&self, call: &str) -> ChainResult<std::sync::MutexGuard<'_, MockChainState>> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(ChainError::Transient(format!("{call}: connection reset")));
        }
        state.calls.push(call.to_string());
        Ok(state)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(self.chain_id)
    }

    async fn latest_block(&self) -> ChainResult<BlockRef> {
        let state = self.check("latest_block")?;
        state
            .blocks
            .iter()
            .next_back()
            .map(|(number, hash)| BlockRef {
                number: *number,
                hash: hash.clone(),
            })
            .ok_or_else(|| ChainError::Provider("no blocks".into()))
    }

    async fn block_hash(&self, number: u64) -> ChainResult<String> {
        let state = self.check("block_hash")?;
        state
            .blocks
            .get(&number)
            .cloned()
            .ok_or(ChainError::BlockNotFound(number))
    }

    async fn events(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        let mut state = self.check("events")?;
        let mut events = state
            .events
            .iter()
            .filter(|event| {
                event.contract_address == contract
                    && (from_block..=to_block).contains(&event.block_number)
            })
            .cloned()
            .collect::<Vec<_>>();
        events.sort_by_key(ChainEvent::position);
        if let Some((fork_block, head)) = state.pending_reorg.take() {
            state.reorg(fork_block, head);
        }
        Ok(events)
    }

    async fn token_events(
        &self,
        contract: Address,
        event_name: &str,
        token_id: U256,
        from_block: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        let state = self.check("token_events")?;
        let token = token_id.to_string();
        let mut events = state
            .events
            .iter()
            .filter(|event| {
                event.contract_address == contract
                    && event.event_name == event_name
                    && event.arg("tokenId") == Some(token.as_str())
                    && event.block_number >= from_block
            })
            .cloned()
            .collect::<Vec<_>>();
        events.sort_by_key(ChainEvent::position);
        Ok(events)
    }

    async fn resolver_of(&self, _registry: Address, token_id: U256) -> ChainResult<Address> {
        let state = self.check("resolver_of")?;
        Ok(state
            .resolvers
            .get(&token_id)
            .copied()
            .unwrap_or_default())
    }

    async fn get_many(
        &self,
        resolver: Address,
        keys: Vec<String>,
        token_id: U256,
    ) -> ChainResult<Vec<String>> {
        let state = self.check("get_many")?;
        if state.reverting_resolvers.contains(&resolver) {
            return Err(ChainError::Reverted("execution reverted".into()));
        }
        let records = state.records.get(&(resolver, token_id));
        Ok(keys
            .iter()
            .map(|key| {
                records
                    .and_then(|records| records.get(key))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect())
    }

    async fn get(&self, resolver: Address, key: &str, token_id: U256) -> ChainResult<String> {
        let state = self.check("get")?;
        if state.reverting_resolvers.contains(&resolver) {
            return Err(ChainError::Reverted("execution reverted".into()));
        }
        Ok(state
            .records
            .get(&(resolver, token_id))
            .and_then(|records| records.get(key))
            .cloned()
            .unwrap_or_default())
    }
}

// Registry event builders keyed by domain name.

pub fn mint_event(
    registry: Address,
    block: u64,
    log_index: u64,
    to: Address,
    name: &str,
) -> ChainEvent {
    transfer_event(registry, block, log_index, Address::zero(), to, name)
}

pub fn transfer_event(
    registry: Address,
    block: u64,
    log_index: u64,
    from: Address,
    to: Address,
    name: &str,
) -> ChainEvent {
    event(
        registry,
        "Transfer",
        block,
        log_index,
        &[
            ("from", address_to_hex(&from)),
            ("to", address_to_hex(&to)),
            ("tokenId", token_of(name).to_string()),
        ],
    )
}

pub fn new_uri_event(registry: Address, block: u64, log_index: u64, name: &str) -> ChainEvent {
    event(
        registry,
        "NewURI",
        block,
        log_index,
        &[
            ("tokenId", token_of(name).to_string()),
            ("uri", name.to_string()),
        ],
    )
}

pub fn set_event(
    registry: Address,
    block: u64,
    log_index: u64,
    name: &str,
    key: &str,
    value: &str,
) -> ChainEvent {
    event(
        registry,
        "Set",
        block,
        log_index,
        &[
            ("tokenId", token_of(name).to_string()),
            ("keyIndex", "0x00".to_string()),
            ("valueIndex", "0x00".to_string()),
            ("key", key.to_string()),
            ("value", value.to_string()),
        ],
    )
}

pub fn new_key_event(
    resolver: Address,
    block: u64,
    log_index: u64,
    name: &str,
    key: &str,
) -> ChainEvent {
    event(
        resolver,
        "NewKey",
        block,
        log_index,
        &[
            ("tokenId", token_of(name).to_string()),
            ("keyIndex", "0x00".to_string()),
            ("key", key.to_string()),
        ],
    )
}

pub fn token_only_event(
    contract: Address,
    event_name: &str,
    block: u64,
    log_index: u64,
    name: &str,
) -> ChainEvent {
    event(
        contract,
        event_name,
        block,
        log_index,
        &[("tokenId", token_of(name).to_string())],
    )
}

pub fn resolve_event(
    registry: Address,
    block: u64,
    log_index: u64,
    name: &str,
    to: Address,
) -> ChainEvent {
    event(
        registry,
        "Resolve",
        block,
        log_index,
        &[
            ("tokenId", token_of(name).to_string()),
            ("to", address_to_hex(&to)),
        ],
    )
}

pub fn sync_event(
    registry: Address,
    block: u64,
    log_index: u64,
    resolver: Address,
    update_id: U256,
    name: &str,
) -> ChainEvent {
    event(
        registry,
        "Sync",
        block,
        log_index,
        &[
            ("resolver", address_to_hex(&resolver)),
            ("updateId", update_id.to_string()),
            ("tokenId", token_of(name).to_string()),
        ],
    )
}

pub fn set_reverse_event(
    registry: Address,
    block: u64,
    log_index: u64,
    address: Address,
    name: &str,
) -> ChainEvent {
    event(
        registry,
        "SetReverse",
        block,
        log_index,
        &[
            ("addr", address_to_hex(&address)),
            ("tokenId", token_of(name).to_string()),
        ],
    )
}

pub fn remove_reverse_event(
    registry: Address,
    block: u64,
    log_index: u64,
    address: Address,
) -> ChainEvent {
    event(
        registry,
        "RemoveReverse",
        block,
        log_index,
        &[("addr", address_to_hex(&address))],
    )
}
