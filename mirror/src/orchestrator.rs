// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain sync loop.
//!
//! Each run computes the confirmed block range, reconciles the mirror first when the
//! cursor no longer sits on the canonical chain, then fetches, merges and applies the
//! range in chunks. A chunk's raw events, changed views and cursor are committed
//! together, so a failed run resumes from the last committed chunk.

use crate::alert::{Alert, SharedNotifier};
use crate::chain_client::ChainClient;
use crate::config::ChainConfig;
use crate::error::{ChainError, MirrorError, MirrorResult};
use crate::merge::merge_event_streams;
use crate::metrics::MirrorMetrics;
use crate::processor::{ChunkContext, EventProcessor};
use crate::reconciler::{ReorgOutcome, ReorgReconciler};
use crate::resolver::{RecordResolver, ResolverKeys};
use crate::store::{ChunkCommit, MirrorStore};
use crate::types::{BlockRef, ChainId, RawEvent, SyncCursor};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Last mirrored block before the run (exclusive start of the range).
    pub from_block: u64,
    pub to_block: u64,
    pub chunks: usize,
    pub reorg: Option<ReorgOutcome>,
}

pub struct SyncOrchestrator {
    config: ChainConfig,
    chain: ChainId,
    chain_label: String,
    client: Arc<dyn ChainClient>,
    store: Arc<dyn MirrorStore>,
    processor: Arc<EventProcessor>,
    reconciler: ReorgReconciler,
    metrics: Arc<MirrorMetrics>,
    notifier: SharedNotifier,
    /// Last fatal error alerted, so a halted chain alerts once.
    halted: Mutex<Option<String>>,
}

impl SyncOrchestrator {
    pub fn new(
        config: ChainConfig,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn MirrorStore>,
        keys: &ResolverKeys,
        metrics: Arc<MirrorMetrics>,
        notifier: SharedNotifier,
    ) -> Self {
        let chain = config.chain_id();
        let resolver = Arc::new(RecordResolver::new(client.clone(), &config, keys));
        let processor = Arc::new(EventProcessor::new(chain, resolver, store.clone()));
        let reconciler =
            ReorgReconciler::new(&config, client.clone(), store.clone(), processor.clone());
        Self {
            chain,
            chain_label: chain.to_string(),
            config,
            client,
            store,
            processor,
            reconciler,
            metrics,
            notifier,
            halted: Mutex::new(None),
        }
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn reconciler(&self) -> &ReorgReconciler {
        &self.reconciler
    }

    /// Run until cancelled. The next run is scheduled after the previous one finished.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "[{}] Starting sync of {} registries (confirmations={}, chunk={} blocks)",
            self.chain,
            self.config.registries.len(),
            self.config.confirmation_blocks,
            self.config.block_fetch_limit
        );
        loop {
            match self.sync_once().await {
                Ok(report) => {
                    self.clear_halted();
                    if report.chunks > 0 {
                        debug!(
                            "[{}] Mirrored blocks {}-{} in {} chunks",
                            self.chain,
                            report.from_block + 1,
                            report.to_block,
                            report.chunks
                        );
                    }
                }
                Err(e) => self.report_error(&e).await,
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] Sync cancelled", self.chain);
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }

    pub async fn sync_once(&self) -> MirrorResult<SyncReport> {
        let timer = self
            .metrics
            .sync_run_latency
            .with_label_values(&[self.chain_label.as_str()])
            .start_timer();

        let latest = self.client.latest_block().await?;
        self.metrics
            .latest_network_block
            .with_label_values(&[self.chain_label.as_str()])
            .set(latest.number as i64);
        let to_block = latest.number.saturating_sub(self.config.confirmation_blocks);

        let mut reorg = None;
        let (from_block, strict_range) = match self.store.get_cursor(self.chain).await? {
            None => (self.config.genesis_block.saturating_sub(1), false),
            Some(cursor) if self.cursor_diverged(&cursor, latest.number).await? => {
                warn!(
                    "[{}] Mirrored block {} is no longer canonical, reconciling",
                    self.chain, cursor.block_number
                );
                let outcome = self.repair().await?;
                let from = outcome.fork_block.number;
                reorg = Some(outcome);
                (from, false)
            }
            Some(cursor) => (cursor.block_number, true),
        };

        if to_block < from_block && strict_range {
            return Err(MirrorError::InvalidRange {
                from_block,
                to_block,
            });
        }

        let mut chunks = 0;
        let mut start = from_block + 1;
        while start <= to_block {
            let end = to_block.min(start.saturating_add(self.config.block_fetch_limit - 1));
            self.sync_chunk(start, end).await?;
            chunks += 1;
            start = end + 1;
        }

        timer.observe_duration();
        Ok(SyncReport {
            from_block,
            to_block,
            chunks,
            reorg,
        })
    }

    async fn cursor_diverged(&self, cursor: &SyncCursor, latest: u64) -> MirrorResult<bool> {
        if cursor.block_number > latest {
            return Ok(true);
        }
        let Some(recorded) = cursor.block_hash.as_deref() else {
            return Ok(false);
        };
        match self.client.block_hash(cursor.block_number).await {
            Ok(hash) => Ok(hash != recorded),
            Err(ChainError::BlockNotFound(_)) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn repair(&self) -> MirrorResult<ReorgOutcome> {
        let outcome = self.reconciler.reconcile().await?;
        self.metrics
            .reorgs
            .with_label_values(&[self.chain_label.as_str()])
            .inc();
        self.metrics
            .reorg_depth
            .with_label_values(&[self.chain_label.as_str()])
            .set(outcome.depth as i64);
        self.metrics
            .last_mirrored_block
            .with_label_values(&[self.chain_label.as_str()])
            .set(outcome.fork_block.number as i64);
        self.notifier
            .notify(&Alert::reorg_repaired(
                self.chain,
                outcome.fork_block.number,
                outcome.depth,
                outcome.rebuilt_domains,
                &outcome.fork_block.hash,
            ))
            .await;
        Ok(outcome)
    }

    async fn sync_chunk(&self, start: u64, end: u64) -> MirrorResult<()> {
        // Read before the logs, so a reorg during the fetch shows up as a diverged cursor
        let cursor = BlockRef {
            number: end,
            hash: self.client.block_hash(end).await?,
        };
        let streams = try_join_all(
            self.config
                .registries
                .iter()
                .map(|registry| self.client.events(*registry, start, end)),
        )
        .await?;
        let events = merge_event_streams(streams)?;

        let mut ctx = ChunkContext::live(self.chain);
        let mut raw_events = Vec::with_capacity(events.len());
        for event in &events {
            match self.processor.process(&mut ctx, event).await {
                Ok(node) => raw_events.push(RawEvent::from_event(self.chain, event, node)),
                Err(MirrorError::Event(e)) => {
                    warn!(
                        "[{}] Skipping {} at ({}, {}) in tx {}: {}",
                        self.chain,
                        event.event_name,
                        event.block_number,
                        event.log_index,
                        event.tx_hash,
                        e
                    );
                    self.metrics
                        .skipped_events
                        .with_label_values(&[self.chain_label.as_str(), e.reason()])
                        .inc();
                }
                Err(e) => return Err(e),
            }
        }

        let changed = ctx.dirty_count();
        let applied = raw_events.len();
        let event_types = raw_events
            .iter()
            .map(|event| event.event_type.clone())
            .collect::<Vec<_>>();
        self.store
            .commit_chunk(ChunkCommit {
                chain: self.chain,
                views: ctx.into_views(),
                raw_events,
                cursor: Some(SyncCursor::at_block(self.chain, &cursor)),
            })
            .await?;

        for event_type in &event_types {
            self.metrics
                .processed_events
                .with_label_values(&[self.chain_label.as_str(), event_type.as_str()])
                .inc();
        }
        self.metrics
            .committed_chunks
            .with_label_values(&[self.chain_label.as_str()])
            .inc();
        self.metrics
            .last_mirrored_block
            .with_label_values(&[self.chain_label.as_str()])
            .set(end as i64);
        if applied > 0 {
            info!(
                "[{}] Committed blocks {}-{}: {} events, {} domains changed",
                self.chain, start, end, applied, changed
            );
        }
        Ok(())
    }

    async fn report_error(&self, e: &MirrorError) {
        self.metrics
            .sync_errors
            .with_label_values(&[self.chain_label.as_str(), e.error_type()])
            .inc();
        if !e.is_fatal() {
            warn!("[{}] Sync run failed, retrying on next tick: {}", self.chain, e);
            return;
        }
        error!("[{}] Sync halted: {}", self.chain, e);
        let message = e.to_string();
        let first_report = match self.halted.lock() {
            Ok(mut halted) => halted.replace(message.clone()).as_deref() != Some(message.as_str()),
            Err(_) => true,
        };
        if first_report {
            self.notifier
                .notify(&Alert::sync_halted(self.chain, message))
                .await;
        }
    }

    fn clear_halted(&self) {
        if let Ok(mut halted) = self.halted.lock() {
            halted.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::WebhookNotifier;
    use crate::store::memory::MirrorSnapshot;
    use crate::store::MemoryStore;
    use crate::test_utils::*;
    use crate::types::Blockchain;
    use ethers::types::Address;
    use proptest::prelude::*;
    use std::time::Duration;

    fn chain_config() -> ChainConfig {
        ChainConfig::new(Blockchain::Eth, 1, "http://localhost")
            .with_registries(vec![TEST_REGISTRY, TEST_LEGACY_REGISTRY])
            .with_legacy_resolvers(vec![TEST_LEGACY_RESOLVER])
            .with_genesis_block(90)
            .with_block_fetch_limit(50)
    }

    fn orchestrator(
        config: ChainConfig,
        client: Arc<MockChainClient>,
        store: Arc<MemoryStore>,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(
            config,
            client,
            store,
            &ResolverKeys::bundled().unwrap(),
            Arc::new(MirrorMetrics::new_for_testing()),
            Arc::new(WebhookNotifier::new(None).unwrap()),
        )
    }

    fn setup(head: u64) -> (Arc<MockChainClient>, Arc<MemoryStore>, SyncOrchestrator) {
        let client = Arc::new(MockChainClient::new(1));
        client.advance_to(head);
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(chain_config(), client.clone(), store.clone());
        (client, store, orchestrator)
    }

    fn emit_mint(client: &MockChainClient, registry: Address, block: u64, name: &str, to: Address) {
        client.emit(mint_event(registry, block, 0, to, name));
        client.emit(new_uri_event(registry, block, 1, name));
    }

    #[tokio::test]
    async fn test_sync_mirrors_confirmed_range_in_chunks() {
        let (client, store, orchestrator) = setup(210);
        emit_mint(&client, TEST_REGISTRY, 100, "brad.crypto", owner(1));
        client.emit(set_event(TEST_REGISTRY, 105, 0, "brad.crypto", "crypto.BTC.address", "1BTC"));
        // past the confirmation lag
        client.emit(set_event(TEST_REGISTRY, 209, 0, "brad.crypto", "late", "x"));

        let report = orchestrator.sync_once().await.unwrap();
        assert_eq!(report.from_block, 89);
        assert_eq!(report.to_block, 207);
        assert_eq!(report.chunks, 3);
        assert!(report.reorg.is_none());

        let cursor = store.get_cursor(test_chain()).await.unwrap().unwrap();
        assert_eq!(cursor.block_number, 207);
        assert_eq!(cursor.block_hash, Some(test_block_hash(207, 0)));

        let view = store
            .find_domain(&node_of("brad.crypto"), test_chain())
            .await
            .unwrap()
            .unwrap();
        let resolution = view.resolution.unwrap();
        assert_eq!(resolution.owner_address, Some(owner(1)));
        assert_eq!(resolution.records.len(), 1);
        assert_eq!(store.raw_events(test_chain()).await.len(), 3);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let (client, store, orchestrator) = setup(150);
        emit_mint(&client, TEST_REGISTRY, 100, "brad.crypto", owner(1));
        orchestrator.sync_once().await.unwrap();
        let snapshot = store.snapshot().await;
        let journal = store.raw_events(test_chain()).await;

        let report = orchestrator.sync_once().await.unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(store.snapshot().await, snapshot);
        assert_eq!(store.raw_events(test_chain()).await, journal);
    }

    #[tokio::test]
    async fn test_events_of_all_registries_are_merged() {
        let (client, store, orchestrator) = setup(150);
        client.emit(mint_event(TEST_REGISTRY, 100, 0, owner(1), "brad.crypto"));
        client.emit(new_uri_event(TEST_REGISTRY, 100, 1, "brad.crypto"));
        client.emit(mint_event(TEST_LEGACY_REGISTRY, 100, 2, owner(2), "legacy.crypto"));
        client.emit(new_uri_event(TEST_LEGACY_REGISTRY, 100, 3, "legacy.crypto"));
        orchestrator.sync_once().await.unwrap();

        let legacy = store
            .find_domain(&node_of("legacy.crypto"), test_chain())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(legacy.resolution.unwrap().registry, Some(TEST_LEGACY_REGISTRY));
        let positions = store
            .raw_events(test_chain())
            .await
            .iter()
            .map(|event| (event.block_number, event.log_index))
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![(100, 0), (100, 1), (100, 2), (100, 3)]);
    }

    #[tokio::test]
    async fn test_duplicate_positions_abort_the_run() {
        let (client, store, orchestrator) = setup(150);
        client.emit(mint_event(TEST_REGISTRY, 100, 0, owner(1), "brad.crypto"));
        client.emit(mint_event(TEST_LEGACY_REGISTRY, 100, 0, owner(1), "other.crypto"));

        let err = orchestrator.sync_once().await.unwrap_err();
        assert!(matches!(err, MirrorError::DuplicateEventPosition { .. }));
        assert!(err.is_fatal());
        assert_eq!(store.get_cursor(test_chain()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_events_are_skipped() {
        let (client, store, orchestrator) = setup(150);
        client.emit(new_uri_event(TEST_REGISTRY, 100, 0, "orphan.crypto"));
        client.emit(set_event(TEST_REGISTRY, 101, 0, "orphan.crypto", "a", "1"));
        emit_mint(&client, TEST_REGISTRY, 102, "brad.crypto", owner(1));

        orchestrator.sync_once().await.unwrap();
        assert_eq!(store.raw_events(test_chain()).await.len(), 2);
        assert_eq!(store.snapshot().await.domains.len(), 1);
        assert_eq!(
            store
                .get_cursor(test_chain())
                .await
                .unwrap()
                .unwrap()
                .block_number,
            147
        );
    }

    #[tokio::test]
    async fn test_regressed_range_is_fatal() {
        let (_client, store, orchestrator) = setup(300);
        store
            .set_cursor(SyncCursor::at_block(
                test_chain(),
                &BlockRef {
                    number: 299,
                    hash: test_block_hash(299, 0),
                },
            ))
            .await
            .unwrap();

        let err = orchestrator.sync_once().await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::InvalidRange {
                from_block: 299,
                to_block: 297
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_cursor() {
        let (client, store, orchestrator) = setup(150);
        emit_mint(&client, TEST_REGISTRY, 100, "brad.crypto", owner(1));
        orchestrator.sync_once().await.unwrap();

        client.advance_to(200);
        client.emit(set_event(TEST_REGISTRY, 160, 0, "brad.crypto", "a", "1"));
        store.set_fail_writes(true).await;
        assert!(matches!(
            orchestrator.sync_once().await,
            Err(MirrorError::Storage(_))
        ));
        assert_eq!(
            store
                .get_cursor(test_chain())
                .await
                .unwrap()
                .unwrap()
                .block_number,
            147
        );

        store.set_fail_writes(false).await;
        orchestrator.sync_once().await.unwrap();
        let view = store
            .find_domain(&node_of("brad.crypto"), test_chain())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.resolution.unwrap().records.get("a").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_reorg_converges_to_fresh_replay() {
        let (client, store, orchestrator) = setup(203);
        emit_mint(&client, TEST_REGISTRY, 100, "brad.crypto", owner(1));
        client.emit(set_event(TEST_REGISTRY, 105, 0, "brad.crypto", "crypto.BTC.address", "1BTC"));
        client.emit(set_event(TEST_REGISTRY, 190, 0, "brad.crypto", "a", "1"));
        client.emit(set_event(TEST_REGISTRY, 195, 0, "brad.crypto", "crypto.BTC.address", "gone"));
        client.emit(set_reverse_event(TEST_REGISTRY, 196, 0, owner(1), "brad.crypto"));
        emit_mint(&client, TEST_REGISTRY, 198, "gone.crypto", owner(3));
        let report = orchestrator.sync_once().await.unwrap();
        assert_eq!(report.to_block, 200);

        // blocks from 191 on are replaced by a competing history
        client.reorg(191, 260);
        client.emit(set_event(TEST_REGISTRY, 192, 0, "brad.crypto", "b", "2"));
        client.emit(transfer_event(TEST_REGISTRY, 230, 0, owner(1), owner(2), "brad.crypto"));
        emit_mint(&client, TEST_REGISTRY, 240, "new.crypto", owner(4));

        let report = orchestrator.sync_once().await.unwrap();
        let reorg = report.reorg.unwrap();
        assert_eq!(reorg.fork_block.number, 190);
        assert_eq!(reorg.rebuilt_domains, 2);
        assert_eq!(report.from_block, 190);
        assert_eq!(report.to_block, 257);
        assert!(store
            .raw_events(test_chain())
            .await
            .iter()
            .filter(|event| event.block_number > 190)
            .all(|event| event.block_hash == test_block_hash(event.block_number, 1)));

        let fresh_store = Arc::new(MemoryStore::new());
        let fresh = orchestrator_for(&client, fresh_store.clone());
        fresh.sync_once().await.unwrap();
        assert_eq!(store.snapshot().await, fresh_store.snapshot().await);
        assert_eq!(
            store.raw_events(test_chain()).await,
            fresh_store.raw_events(test_chain()).await
        );
    }

    #[tokio::test]
    async fn test_reorg_during_fetch_is_repaired_on_next_run() {
        let (client, store, orchestrator) = setup(142);
        emit_mint(&client, TEST_REGISTRY, 100, "brad.crypto", owner(1));
        client.emit(set_event(TEST_REGISTRY, 130, 0, "brad.crypto", "a", "orphaned"));

        // logs come from the old branch, the chain moves on before the chunk commits
        client.reorg_after_next_events(125, 142);
        let report = orchestrator.sync_once().await.unwrap();
        assert_eq!(report.chunks, 1);
        let cursor = store.get_cursor(test_chain()).await.unwrap().unwrap();
        assert_eq!(cursor.block_number, 139);
        assert_eq!(cursor.block_hash, Some(test_block_hash(139, 0)));

        let report = orchestrator.sync_once().await.unwrap();
        assert_eq!(report.reorg.unwrap().fork_block.number, 100);
        let view = store
            .find_domain(&node_of("brad.crypto"), test_chain())
            .await
            .unwrap()
            .unwrap();
        assert!(!view.resolution.unwrap().records.contains_key("a"));

        let fresh_store = Arc::new(MemoryStore::new());
        orchestrator_for(&client, fresh_store.clone())
            .sync_once()
            .await
            .unwrap();
        assert_eq!(store.snapshot().await, fresh_store.snapshot().await);
    }

    fn orchestrator_for(
        client: &Arc<MockChainClient>,
        store: Arc<MemoryStore>,
    ) -> SyncOrchestrator {
        orchestrator(chain_config(), client.clone(), store)
    }

    const NAMES: [&str; 3] = ["a.crypto", "b.crypto", "c.crypto"];
    const KEYS: [&str; 3] = ["crypto.BTC.address", "crypto.ETH.address", "ipfs.html.value"];

    #[derive(Debug, Clone)]
    enum Op {
        Mint { name: usize, to: u8 },
        Set { name: usize, key: usize, value: u8 },
        Transfer { name: usize, to: u8 },
        SetReverse { holder: u8, name: usize },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..NAMES.len(), 1u8..5).prop_map(|(name, to)| Op::Mint { name, to }),
            (0..NAMES.len(), 0..KEYS.len(), any::<u8>())
                .prop_map(|(name, key, value)| Op::Set { name, key, value }),
            (0..NAMES.len(), 1u8..5).prop_map(|(name, to)| Op::Transfer { name, to }),
            (1u8..5, 0..NAMES.len()).prop_map(|(holder, name)| Op::SetReverse { holder, name }),
        ]
    }

    fn emit_ops(client: &MockChainClient, ops: &[(u64, Op)]) {
        let mut ops = ops.to_vec();
        ops.sort_by_key(|(block, _)| *block);
        for (index, (block, op)) in ops.into_iter().enumerate() {
            let log_index = index as u64 * 2;
            match op {
                Op::Mint { name, to } => {
                    let name = NAMES[name];
                    client.emit(mint_event(TEST_REGISTRY, block, log_index, owner(to), name));
                    client.emit(new_uri_event(TEST_REGISTRY, block, log_index + 1, name));
                }
                Op::Set { name, key, value } => client.emit(set_event(
                    TEST_REGISTRY,
                    block,
                    log_index,
                    NAMES[name],
                    KEYS[key],
                    &value.to_string(),
                )),
                Op::Transfer { name, to } => client.emit(transfer_event(
                    TEST_REGISTRY,
                    block,
                    log_index,
                    owner(1),
                    owner(to),
                    NAMES[name],
                )),
                Op::SetReverse { holder, name } => client.emit(set_reverse_event(
                    TEST_REGISTRY,
                    block,
                    log_index,
                    owner(holder),
                    NAMES[name],
                )),
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_random_reorg_matches_fresh_sync(
            before in proptest::collection::vec((101u64..=180, op_strategy()), 0..20),
            after in proptest::collection::vec((0u64..60, op_strategy()), 0..20),
            fork in 101u64..=180,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (client, store, orchestrator) = setup(190);
                emit_mint(&client, TEST_REGISTRY, 100, NAMES[0], owner(1));
                emit_ops(&client, &before);
                orchestrator.sync_once().await.unwrap();

                client.reorg(fork, 240);
                let after = after
                    .into_iter()
                    .map(|(offset, op)| (fork + offset, op))
                    .collect::<Vec<_>>();
                emit_ops(&client, &after);
                orchestrator.sync_once().await.unwrap();

                let fresh_store = Arc::new(MemoryStore::new());
                orchestrator_for(&client, fresh_store.clone())
                    .sync_once()
                    .await
                    .unwrap();
                assert_eq!(store.snapshot().await, fresh_store.snapshot().await);
                assert_eq!(
                    store.raw_events(test_chain()).await,
                    fresh_store.raw_events(test_chain()).await
                );
            });
        }
    }

    #[tokio::test]
    async fn test_transient_errors_leave_state_untouched() {
        let (client, store, orchestrator) = setup(150);
        emit_mint(&client, TEST_REGISTRY, 100, "brad.crypto", owner(1));
        client.set_failing(true);
        let err = orchestrator.sync_once().await.unwrap_err();
        assert!(matches!(err, MirrorError::Chain(ChainError::Transient(_))));
        assert!(!err.is_fatal());
        assert_eq!(store.snapshot().await, MirrorSnapshot::default());

        client.set_failing(false);
        orchestrator.sync_once().await.unwrap();
        assert_eq!(store.snapshot().await.domains.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let (client, store, orchestrator) = setup(150);
        emit_mint(&client, TEST_REGISTRY, 100, "brad.crypto", owner(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), orchestrator.run(cancel))
            .await
            .unwrap();
        assert_eq!(store.snapshot().await.domains.len(), 1);
    }
}
