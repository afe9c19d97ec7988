// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Detection and repair of chain reorganizations.
//!
//! The journal of raw events records the hash of every block it has events for. The
//! most recent `max_reorg_depth` of these blocks are compared with the chain to find
//! the fork point, the newest journaled block that is still canonical. Everything
//! above it is dropped and the touched domains are rebuilt from their surviving
//! journal, all in one storage transaction.
//!
//! A reverse record moved between domains is journaled under the new holder only, so
//! every domain that ever claimed an address changed above the fork is rebuilt too.
//! While replaying, the latest change of each address wins.

use crate::chain_client::ChainClient;
use crate::config::ChainConfig;
use crate::error::{ChainError, MirrorError, MirrorResult};
use crate::processor::{ChunkContext, EventProcessor};
use crate::store::{MirrorStore, Rollback};
use crate::types::{BlockRef, ChainId, DomainView, SyncCursor};
use crate::utils::truncate_hash;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgOutcome {
    /// Newest journaled block still on the canonical chain; ingestion resumes above it.
    pub fork_block: BlockRef,
    /// Blocks between the fork point and the previous cursor.
    pub depth: u64,
    pub rebuilt_domains: usize,
}

pub struct ReorgReconciler {
    chain: ChainId,
    client: Arc<dyn ChainClient>,
    store: Arc<dyn MirrorStore>,
    processor: Arc<EventProcessor>,
    max_reorg_depth: u64,
    genesis_block: u64,
}

impl ReorgReconciler {
    pub fn new(
        config: &ChainConfig,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn MirrorStore>,
        processor: Arc<EventProcessor>,
    ) -> Self {
        Self {
            chain: config.chain_id(),
            client,
            store,
            processor,
            max_reorg_depth: config.max_reorg_depth,
            genesis_block: config.genesis_block,
        }
    }

    /// Repair the mirror after its cursor diverged from the chain and move the cursor
    /// to the fork point.
    pub async fn reconcile(&self) -> MirrorResult<ReorgOutcome> {
        let window = self
            .store
            .latest_recorded_block_hashes(self.chain, self.max_reorg_depth)
            .await?;
        let fork_number = self.find_fork(&window).await?;
        let fork_block = BlockRef {
            number: fork_number,
            hash: self.client.block_hash(fork_number).await?,
        };

        let previous = self
            .store
            .get_cursor(self.chain)
            .await?
            .map_or(fork_number, |cursor| cursor.block_number);
        let mut nodes = self
            .store
            .nodes_touched_after(self.chain, fork_number)
            .await?;
        // Domains whose reverse record was taken over above the fork get it back
        nodes.extend(
            self.store
                .reverse_claimants_after(self.chain, fork_number)
                .await?,
        );
        info!(
            "[{}] Rolling back to block {} ({}), rebuilding {} domains",
            self.chain,
            fork_number,
            truncate_hash(&fork_block.hash),
            nodes.len()
        );

        let rebuilt = self.rebuild_nodes(&nodes, fork_number).await?;
        let rebuilt_domains = nodes.len();
        self.store
            .apply_rollback(Rollback {
                chain: self.chain,
                delete_raw_events_after: Some(fork_number),
                removed_nodes: nodes,
                rebuilt,
                cursor: Some(SyncCursor::at_block(self.chain, &fork_block)),
            })
            .await?;

        Ok(ReorgOutcome {
            fork_block,
            depth: previous.saturating_sub(fork_number),
            rebuilt_domains,
        })
    }

    /// Throw away the chain's projection of `node` and replay its whole journal.
    pub async fn rebuild(&self, node: &str) -> MirrorResult<Option<DomainView>> {
        let nodes = BTreeSet::from([node.to_string()]);
        let rebuilt = self.rebuild_nodes(&nodes, u64::MAX).await?;
        let view = rebuilt.first().cloned();
        self.store
            .apply_rollback(Rollback {
                chain: self.chain,
                delete_raw_events_after: None,
                removed_nodes: nodes,
                rebuilt,
                cursor: None,
            })
            .await?;
        Ok(view)
    }

    async fn find_fork(&self, window: &[BlockRef]) -> MirrorResult<u64> {
        let (Some(oldest), Some(newest)) = (window.first(), window.last()) else {
            debug!("[{}] No journaled blocks, resyncing from genesis", self.chain);
            return Ok(self.genesis_block.saturating_sub(1));
        };
        if self.is_canonical(newest).await? {
            return Ok(newest.number);
        }
        if !self.is_canonical(oldest).await? {
            // Needs a manual resync
            return Err(MirrorError::ReorgTooDeep {
                block_number: oldest.number,
                max_reorg_depth: self.max_reorg_depth,
            });
        }

        // window[lo] is canonical, window[hi] is not
        let (mut lo, mut hi) = (0, window.len() - 1);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.is_canonical(&window[mid]).await? {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(window[lo].number)
    }

    async fn is_canonical(&self, block: &BlockRef) -> MirrorResult<bool> {
        match self.client.block_hash(block.number).await {
            Ok(hash) => Ok(hash == block.hash),
            Err(ChainError::BlockNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rebuild_nodes(
        &self,
        nodes: &BTreeSet<String>,
        max_block: u64,
    ) -> MirrorResult<Vec<DomainView>> {
        let mut ctx = ChunkContext::rebuild(self.chain, nodes);
        for node in nodes {
            ctx.reset_sequence();
            let journal = self
                .store
                .find_raw_events_by_node(self.chain, node, max_block)
                .await?;
            for raw in &journal {
                match self.processor.replay(&mut ctx, raw).await {
                    Ok(()) => {}
                    Err(MirrorError::Event(e)) => warn!(
                        "[{}] Skipping journaled {} at ({}, {}) of {}: {}",
                        self.chain, raw.event_type, raw.block_number, raw.log_index, node, e
                    ),
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(ctx.into_views())
    }
}
