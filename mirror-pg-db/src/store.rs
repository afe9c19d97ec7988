// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL implementation of [`MirrorStore`].
//!
//! Chunk commits and rollbacks each run in one transaction. A chain's resolution and
//! reverse rows of the written views are replaced wholesale, so a reverse record moving
//! between two views of one commit never trips the address uniqueness constraint.

use crate::convert::{
    block_bound, chain_key, cursor_from_row, cursor_row, domain_row, raw_event_from_row,
    raw_event_row, resolution_row, reverse_row, view_from_rows,
};
use crate::Db;
use anyhow::{Context, Result};
use async_trait::async_trait;
use diesel::sql_types::{Array, BigInt, Text};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, QueryableByName, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use domain_mirror::store::{ChunkCommit, MirrorStore, Rollback};
use domain_mirror::types::{BlockRef, ChainId, DomainView, RawEvent, SyncCursor};
use domain_mirror::utils::address_to_hex;
use domain_mirror_schema::models;
use domain_mirror_schema::schema::{
    domains, raw_events, resolutions, reverse_resolutions, worker_status,
};
use ethers::types::Address;
use scoped_futures::ScopedFutureExt;
use std::collections::BTreeSet;
use tracing::debug;

// Keeps multi-row inserts below the bind parameter limit
const INSERT_BATCH_SIZE: usize = 1_000;

#[derive(QueryableByName)]
struct NodeRow {
    #[diesel(sql_type = Text)]
    node: String,
}

#[derive(Clone)]
pub struct PgMirrorStore {
    db: Db,
}

impl PgMirrorStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

async fn write_views(
    conn: &mut AsyncPgConnection,
    chain: ChainId,
    views: &[DomainView],
) -> Result<()> {
    if views.is_empty() {
        return Ok(());
    }
    let (blockchain, network_id) = chain_key(chain);
    let nodes = views
        .iter()
        .map(|view| view.domain.node.clone())
        .collect::<Vec<_>>();

    diesel::delete(
        reverse_resolutions::table
            .filter(reverse_resolutions::blockchain.eq(&blockchain))
            .filter(reverse_resolutions::network_id.eq(network_id))
            .filter(reverse_resolutions::node.eq_any(&nodes)),
    )
    .execute(conn)
    .await?;
    diesel::delete(
        resolutions::table
            .filter(resolutions::blockchain.eq(&blockchain))
            .filter(resolutions::network_id.eq(network_id))
            .filter(resolutions::node.eq_any(&nodes)),
    )
    .execute(conn)
    .await?;

    let domain_rows = views
        .iter()
        .map(|view| domain_row(&view.domain))
        .collect::<Vec<_>>();
    let resolution_rows = views
        .iter()
        .filter_map(|view| view.resolution.as_ref())
        .map(resolution_row)
        .collect::<Result<Vec<_>>>()?;
    let reverse_rows = views
        .iter()
        .filter_map(|view| view.reverse.as_ref())
        .map(reverse_row)
        .collect::<Vec<_>>();

    for batch in domain_rows.chunks(INSERT_BATCH_SIZE) {
        diesel::insert_into(domains::table)
            .values(batch)
            .on_conflict_do_nothing()
            .execute(conn)
            .await
            .context("Failed to insert domains")?;
    }
    for batch in resolution_rows.chunks(INSERT_BATCH_SIZE) {
        diesel::insert_into(resolutions::table)
            .values(batch)
            .execute(conn)
            .await
            .context("Failed to insert resolutions")?;
    }
    for batch in reverse_rows.chunks(INSERT_BATCH_SIZE) {
        diesel::insert_into(reverse_resolutions::table)
            .values(batch)
            .execute(conn)
            .await
            .context("Failed to insert reverse resolutions")?;
    }
    Ok(())
}

async fn write_cursor(conn: &mut AsyncPgConnection, cursor: &SyncCursor) -> Result<()> {
    let row = cursor_row(cursor);
    diesel::insert_into(worker_status::table)
        .values(&row)
        .on_conflict(worker_status::location)
        .do_update()
        .set((
            worker_status::last_mirrored_block.eq(row.last_mirrored_block),
            worker_status::last_mirrored_block_hash.eq(&row.last_mirrored_block_hash),
            worker_status::last_sequence_id.eq(&row.last_sequence_id),
        ))
        .execute(conn)
        .await
        .context("Failed to update worker status")?;
    Ok(())
}

#[async_trait]
impl MirrorStore for PgMirrorStore {
    async fn find_domain(&self, node: &str, chain: ChainId) -> Result<Option<DomainView>> {
        let (blockchain, network_id) = chain_key(chain);
        let mut conn = self.db.connect().await?;

        let Some(domain) = domains::table
            .find(node)
            .select(models::Domain::as_select())
            .first(&mut conn)
            .await
            .optional()?
        else {
            return Ok(None);
        };
        let resolution = resolutions::table
            .find((node, blockchain.as_str(), network_id))
            .select(models::Resolution::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        let reverse = reverse_resolutions::table
            .find((node, blockchain.as_str(), network_id))
            .select(models::ReverseResolution::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        view_from_rows(chain, domain, resolution, reverse).map(Some)
    }

    async fn find_reverse_node(&self, chain: ChainId, address: Address) -> Result<Option<String>> {
        let (blockchain, network_id) = chain_key(chain);
        let mut conn = self.db.connect().await?;
        Ok(reverse_resolutions::table
            .filter(reverse_resolutions::blockchain.eq(blockchain))
            .filter(reverse_resolutions::network_id.eq(network_id))
            .filter(reverse_resolutions::reverse_address.eq(address_to_hex(&address)))
            .select(reverse_resolutions::node)
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn get_cursor(&self, chain: ChainId) -> Result<Option<SyncCursor>> {
        let mut conn = self.db.connect().await?;
        let row = worker_status::table
            .find(chain.location())
            .select(models::WorkerStatus::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(|row| cursor_from_row(chain, row)))
    }

    async fn set_cursor(&self, cursor: SyncCursor) -> Result<()> {
        let mut conn = self.db.connect().await?;
        write_cursor(&mut conn, &cursor).await
    }

    async fn find_raw_events_by_node(
        &self,
        chain: ChainId,
        node: &str,
        max_block: u64,
    ) -> Result<Vec<RawEvent>> {
        let (blockchain, network_id) = chain_key(chain);
        let mut conn = self.db.connect().await?;
        let rows = raw_events::table
            .filter(raw_events::blockchain.eq(blockchain))
            .filter(raw_events::network_id.eq(network_id))
            .filter(raw_events::node.eq(node))
            .filter(raw_events::block_number.le(block_bound(max_block)))
            .order((raw_events::block_number.asc(), raw_events::log_index.asc()))
            .select(models::RawEvent::as_select())
            .load(&mut conn)
            .await?;
        rows.into_iter()
            .map(|row| raw_event_from_row(chain, row))
            .collect()
    }

    async fn nodes_touched_after(&self, chain: ChainId, block: u64) -> Result<BTreeSet<String>> {
        let (blockchain, network_id) = chain_key(chain);
        let mut conn = self.db.connect().await?;
        let nodes: Vec<Option<String>> = raw_events::table
            .filter(raw_events::blockchain.eq(blockchain))
            .filter(raw_events::network_id.eq(network_id))
            .filter(raw_events::block_number.gt(block_bound(block)))
            .filter(raw_events::node.is_not_null())
            .select(raw_events::node)
            .distinct()
            .load(&mut conn)
            .await?;
        Ok(nodes.into_iter().flatten().collect())
    }

    async fn reverse_claimants_after(
        &self,
        chain: ChainId,
        block: u64,
    ) -> Result<BTreeSet<String>> {
        let (blockchain, network_id) = chain_key(chain);
        let mut conn = self.db.connect().await?;
        let rows: Vec<NodeRow> = diesel::sql_query(
            "SELECT DISTINCT node FROM raw_events
             WHERE blockchain = $1 AND network_id = $2
               AND event_type = 'SetReverse' AND node IS NOT NULL
               AND return_values ->> 'addr' IN (
                   SELECT return_values ->> 'addr' FROM raw_events
                   WHERE blockchain = $1 AND network_id = $2 AND block_number > $3
                     AND event_type IN ('SetReverse', 'RemoveReverse'))",
        )
        .bind::<Text, _>(blockchain)
        .bind::<BigInt, _>(network_id)
        .bind::<BigInt, _>(block_bound(block))
        .load(&mut conn)
        .await?;
        Ok(rows.into_iter().map(|row| row.node).collect())
    }

    async fn latest_recorded_block_hashes(
        &self,
        chain: ChainId,
        limit: u64,
    ) -> Result<Vec<BlockRef>> {
        let (blockchain, network_id) = chain_key(chain);
        let mut conn = self.db.connect().await?;
        let mut blocks: Vec<(i64, String)> = raw_events::table
            .filter(raw_events::blockchain.eq(blockchain))
            .filter(raw_events::network_id.eq(network_id))
            .select((raw_events::block_number, raw_events::block_hash))
            .distinct()
            .order(raw_events::block_number.desc())
            .limit(block_bound(limit))
            .load(&mut conn)
            .await?;
        blocks.reverse();
        Ok(blocks
            .into_iter()
            .map(|(number, hash)| BlockRef {
                number: number as u64,
                hash,
            })
            .collect())
    }

    async fn commit_chunk(&self, commit: ChunkCommit) -> Result<()> {
        let raw_rows = commit
            .raw_events
            .iter()
            .map(raw_event_row)
            .collect::<Result<Vec<_>>>()?;
        let mut conn = self.db.connect().await?;
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                write_views(conn, commit.chain, &commit.views).await?;
                for batch in raw_rows.chunks(INSERT_BATCH_SIZE) {
                    diesel::insert_into(raw_events::table)
                        .values(batch)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await
                        .context("Failed to insert raw events")?;
                }
                if let Some(cursor) = &commit.cursor {
                    write_cursor(conn, cursor).await?;
                }
                debug!(
                    "[{}] Committed {} views and {} raw events",
                    commit.chain,
                    commit.views.len(),
                    raw_rows.len()
                );
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn apply_rollback(&self, rollback: Rollback) -> Result<()> {
        let (blockchain, network_id) = chain_key(rollback.chain);
        let removed = rollback.removed_nodes.iter().cloned().collect::<Vec<_>>();
        let mut conn = self.db.connect().await?;
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                if let Some(block) = rollback.delete_raw_events_after {
                    let deleted = diesel::delete(
                        raw_events::table
                            .filter(raw_events::blockchain.eq(&blockchain))
                            .filter(raw_events::network_id.eq(network_id))
                            .filter(raw_events::block_number.gt(block_bound(block))),
                    )
                    .execute(conn)
                    .await
                    .context("Failed to delete raw events")?;
                    debug!(
                        "[{}] Deleted {} raw events after block {}",
                        rollback.chain, deleted, block
                    );
                }

                if !removed.is_empty() {
                    diesel::delete(
                        reverse_resolutions::table
                            .filter(reverse_resolutions::blockchain.eq(&blockchain))
                            .filter(reverse_resolutions::network_id.eq(network_id))
                            .filter(reverse_resolutions::node.eq_any(&removed)),
                    )
                    .execute(conn)
                    .await?;
                    diesel::delete(
                        resolutions::table
                            .filter(resolutions::blockchain.eq(&blockchain))
                            .filter(resolutions::network_id.eq(network_id))
                            .filter(resolutions::node.eq_any(&removed)),
                    )
                    .execute(conn)
                    .await?;
                    // Domains stay while another chain still projects them
                    diesel::sql_query(
                        "DELETE FROM domains d WHERE d.node = ANY($1)
                           AND NOT EXISTS (SELECT 1 FROM resolutions r WHERE r.node = d.node)
                           AND NOT EXISTS (SELECT 1 FROM reverse_resolutions v WHERE v.node = d.node)",
                    )
                    .bind::<Array<Text>, _>(&removed)
                    .execute(conn)
                    .await
                    .context("Failed to delete domains")?;
                }

                write_views(conn, rollback.chain, &rollback.rebuilt).await?;
                if let Some(cursor) = &rollback.cursor {
                    write_cursor(conn, cursor).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }
}
