// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persistence boundary of the mirror.

use crate::types::{BlockRef, ChainId, DomainView, RawEvent, SyncCursor};
use async_trait::async_trait;
use ethers::types::Address;
use std::collections::BTreeSet;

pub mod memory;

pub use memory::MemoryStore;

/// Everything one processed chunk writes, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct ChunkCommit {
    pub chain: ChainId,
    /// Each view replaces the chain's projection of its domain.
    pub views: Vec<DomainView>,
    pub raw_events: Vec<RawEvent>,
    pub cursor: Option<SyncCursor>,
}

/// Rebuild of a set of domains, optionally rolling the journal back, applied in a
/// single transaction.
#[derive(Debug, Clone)]
pub struct Rollback {
    pub chain: ChainId,
    /// Journal entries above this block are deleted.
    pub delete_raw_events_after: Option<u64>,
    /// Domains whose projection on `chain` is dropped before `rebuilt` is written.
    pub removed_nodes: BTreeSet<String>,
    pub rebuilt: Vec<DomainView>,
    pub cursor: Option<SyncCursor>,
}

#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// The domain and its projection on `chain`.
    async fn find_domain(&self, node: &str, chain: ChainId) -> anyhow::Result<Option<DomainView>>;

    /// Node whose reverse record on `chain` points at `address`.
    async fn find_reverse_node(
        &self,
        chain: ChainId,
        address: Address,
    ) -> anyhow::Result<Option<String>>;

    async fn get_cursor(&self, chain: ChainId) -> anyhow::Result<Option<SyncCursor>>;

    async fn set_cursor(&self, cursor: SyncCursor) -> anyhow::Result<()>;

    /// Journal of one domain up to and including `max_block`, oldest first.
    async fn find_raw_events_by_node(
        &self,
        chain: ChainId,
        node: &str,
        max_block: u64,
    ) -> anyhow::Result<Vec<RawEvent>>;

    /// Nodes of journal entries above `block`.
    async fn nodes_touched_after(
        &self,
        chain: ChainId,
        block: u64,
    ) -> anyhow::Result<BTreeSet<String>>;

    /// Nodes with a journaled `SetReverse` for an address whose reverse record changed
    /// above `block`.
    async fn reverse_claimants_after(
        &self,
        chain: ChainId,
        block: u64,
    ) -> anyhow::Result<BTreeSet<String>>;

    /// The most recent `limit` distinct journaled blocks, oldest first.
    async fn latest_recorded_block_hashes(
        &self,
        chain: ChainId,
        limit: u64,
    ) -> anyhow::Result<Vec<BlockRef>>;

    async fn commit_chunk(&self, commit: ChunkCommit) -> anyhow::Result<()>;

    async fn apply_rollback(&self, rollback: Rollback) -> anyhow::Result<()>;
}
