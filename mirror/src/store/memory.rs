// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{ChunkCommit, MirrorStore, Rollback};
use crate::types::{
    BlockRef, ChainId, Domain, DomainView, RawEvent, Resolution, ReverseResolution, SyncCursor,
};
use anyhow::anyhow;
use async_trait::async_trait;
use ethers::types::Address;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

type ProjectionKey = (String, ChainId);

/// Queryable part of the mirror, comparable across stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorSnapshot {
    pub domains: BTreeMap<String, Domain>,
    pub resolutions: BTreeMap<ProjectionKey, Resolution>,
    pub reverse_resolutions: BTreeMap<ProjectionKey, ReverseResolution>,
}

#[derive(Debug, Default)]
struct MemoryState {
    mirror: MirrorSnapshot,
    raw_events: BTreeMap<(ChainId, u64, u64), RawEvent>,
    cursors: BTreeMap<ChainId, SyncCursor>,
    fail_writes: bool,
}

impl MemoryState {
    fn write_view(&mut self, chain: ChainId, view: DomainView) {
        let key = (view.domain.node.clone(), chain);
        match view.resolution {
            Some(resolution) => {
                self.mirror.resolutions.insert(key.clone(), resolution);
            }
            None => {
                self.mirror.resolutions.remove(&key);
            }
        }
        match view.reverse {
            Some(reverse) => {
                self.mirror.reverse_resolutions.insert(key, reverse);
            }
            None => {
                self.mirror.reverse_resolutions.remove(&key);
            }
        }
        self.mirror
            .domains
            .insert(view.domain.node.clone(), view.domain);
    }

    fn remove_projection(&mut self, node: &str, chain: ChainId) {
        let key = (node.to_string(), chain);
        self.mirror.resolutions.remove(&key);
        self.mirror.reverse_resolutions.remove(&key);
        let still_projected = self
            .mirror
            .resolutions
            .keys()
            .chain(self.mirror.reverse_resolutions.keys())
            .any(|(other, _)| other == node);
        if !still_projected {
            self.mirror.domains.remove(node);
        }
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        if self.fail_writes {
            return Err(anyhow!("memory store rejected the write"));
        }
        Ok(())
    }
}

/// In-process store. Each write takes the lock once, so commits are atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MirrorSnapshot {
        self.state.read().await.mirror.clone()
    }

    pub async fn raw_events(&self, chain: ChainId) -> Vec<RawEvent> {
        self.state
            .read()
            .await
            .raw_events
            .values()
            .filter(|event| event.chain == chain)
            .cloned()
            .collect()
    }

    /// Make every following write fail, for exercising aborted chunks.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.write().await.fail_writes = fail;
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn find_domain(&self, node: &str, chain: ChainId) -> anyhow::Result<Option<DomainView>> {
        let state = self.state.read().await;
        let Some(domain) = state.mirror.domains.get(node) else {
            return Ok(None);
        };
        let key = (node.to_string(), chain);
        Ok(Some(DomainView {
            domain: domain.clone(),
            resolution: state.mirror.resolutions.get(&key).cloned(),
            reverse: state.mirror.reverse_resolutions.get(&key).cloned(),
        }))
    }

    async fn find_reverse_node(
        &self,
        chain: ChainId,
        address: Address,
    ) -> anyhow::Result<Option<String>> {
        Ok(self
            .state
            .read()
            .await
            .mirror
            .reverse_resolutions
            .values()
            .find(|reverse| reverse.chain == chain && reverse.reverse_address == address)
            .map(|reverse| reverse.node.clone()))
    }

    async fn get_cursor(&self, chain: ChainId) -> anyhow::Result<Option<SyncCursor>> {
        Ok(self.state.read().await.cursors.get(&chain).cloned())
    }

    async fn set_cursor(&self, cursor: SyncCursor) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        state.check_writable()?;
        state.cursors.insert(cursor.chain, cursor);
        Ok(())
    }

    async fn find_raw_events_by_node(
        &self,
        chain: ChainId,
        node: &str,
        max_block: u64,
    ) -> anyhow::Result<Vec<RawEvent>> {
        Ok(self
            .state
            .read()
            .await
            .raw_events
            .range((chain, 0, 0)..=(chain, max_block, u64::MAX))
            .map(|(_, event)| event)
            .filter(|event| event.node.as_deref() == Some(node))
            .cloned()
            .collect())
    }

    async fn nodes_touched_after(
        &self,
        chain: ChainId,
        block: u64,
    ) -> anyhow::Result<BTreeSet<String>> {
        let Some(from) = block.checked_add(1) else {
            return Ok(BTreeSet::new());
        };
        Ok(self
            .state
            .read()
            .await
            .raw_events
            .range((chain, from, 0)..=(chain, u64::MAX, u64::MAX))
            .filter_map(|(_, event)| event.node.clone())
            .collect())
    }

    async fn reverse_claimants_after(
        &self,
        chain: ChainId,
        block: u64,
    ) -> anyhow::Result<BTreeSet<String>> {
        let state = self.state.read().await;
        let journal = state
            .raw_events
            .range((chain, 0, 0)..=(chain, u64::MAX, u64::MAX))
            .map(|(_, event)| event)
            .collect::<Vec<_>>();
        let addresses = journal
            .iter()
            .filter(|event| {
                event.block_number > block
                    && matches!(event.event_type.as_str(), "SetReverse" | "RemoveReverse")
            })
            .filter_map(|event| event.return_values.get("addr"))
            .collect::<BTreeSet<_>>();
        Ok(journal
            .iter()
            .filter(|event| event.event_type == "SetReverse")
            .filter(|event| {
                event
                    .return_values
                    .get("addr")
                    .is_some_and(|addr| addresses.contains(addr))
            })
            .filter_map(|event| event.node.clone())
            .collect())
    }

    async fn latest_recorded_block_hashes(
        &self,
        chain: ChainId,
        limit: u64,
    ) -> anyhow::Result<Vec<BlockRef>> {
        let state = self.state.read().await;
        let mut blocks: Vec<BlockRef> = vec![];
        for event in state
            .raw_events
            .range((chain, 0, 0)..=(chain, u64::MAX, u64::MAX))
            .rev()
            .map(|(_, event)| event)
        {
            if blocks.last().map(|b| b.number) == Some(event.block_number) {
                continue;
            }
            if blocks.len() as u64 == limit {
                break;
            }
            blocks.push(BlockRef {
                number: event.block_number,
                hash: event.block_hash.clone(),
            });
        }
        blocks.reverse();
        Ok(blocks)
    }

    async fn commit_chunk(&self, commit: ChunkCommit) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        state.check_writable()?;
        for view in commit.views {
            state.write_view(commit.chain, view);
        }
        for event in commit.raw_events {
            state
                .raw_events
                .entry((event.chain, event.block_number, event.log_index))
                .or_insert(event);
        }
        if let Some(cursor) = commit.cursor {
            state.cursors.insert(cursor.chain, cursor);
        }
        Ok(())
    }

    async fn apply_rollback(&self, rollback: Rollback) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        state.check_writable()?;
        if let Some(block) = rollback.delete_raw_events_after {
            let chain = rollback.chain;
            state
                .raw_events
                .retain(|(event_chain, number, _), _| *event_chain != chain || *number <= block);
        }
        for node in &rollback.removed_nodes {
            state.remove_projection(node, rollback.chain);
        }
        for view in rollback.rebuilt {
            state.write_view(rollback.chain, view);
        }
        if let Some(cursor) = rollback.cursor {
            state.cursors.insert(cursor.chain, cursor);
        }
        Ok(())
    }
}
