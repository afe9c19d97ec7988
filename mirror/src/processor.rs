// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! State transitions of registry events.
//!
//! Events are applied to a [`ChunkContext`], the unit of work of one chunk (or one
//! rebuild). Handlers mutate a copy of a domain view and only put it back on
//! success, so a failed event leaves the unit of work untouched.

use crate::error::{EventError, MirrorResult, ResolverError};
use crate::events::RegistryEvent;
use crate::resolver::RecordResolver;
use crate::store::MirrorStore;
use crate::types::{ChainEvent, ChainId, Domain, DomainView, RawEvent, ReverseResolution};
use crate::utils::{non_zero_address, token_id_to_node};
use ethers::types::{Address, U256};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ChunkContext {
    chain: ChainId,
    /// Loaded views; `None` caches a known-absent domain.
    views: HashMap<String, Option<DomainView>>,
    dirty: Vec<String>,
    dirty_set: HashSet<String>,
    /// Domains whose stored projection on `chain` is ignored because they are being rebuilt.
    rebuilding: HashSet<String>,
    replay: bool,
    /// Latest replayed reverse-record change per address, `None` for a removal.
    reverse_claims: HashMap<Address, ((u64, u64), Option<String>)>,
    last_processed: Option<RegistryEvent>,
}

impl ChunkContext {
    pub fn live(chain: ChainId) -> Self {
        Self {
            chain,
            views: HashMap::new(),
            dirty: vec![],
            dirty_set: HashSet::new(),
            rebuilding: HashSet::new(),
            replay: false,
            reverse_claims: HashMap::new(),
            last_processed: None,
        }
    }

    /// Unit of work replaying the journal of `nodes` from an empty state.
    pub fn rebuild(chain: ChainId, nodes: &BTreeSet<String>) -> Self {
        Self {
            rebuilding: nodes.iter().cloned().collect(),
            replay: true,
            ..Self::live(chain)
        }
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Forget the previous event, used between the journals of two domains.
    pub fn reset_sequence(&mut self) {
        self.last_processed = None;
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Changed views in first-write order.
    pub fn into_views(mut self) -> Vec<DomainView> {
        self.dirty
            .iter()
            .filter_map(|node| self.views.remove(node).flatten())
            .collect()
    }

    async fn find(
        &mut self,
        store: &dyn MirrorStore,
        node: &str,
    ) -> anyhow::Result<Option<DomainView>> {
        if let Some(cached) = self.views.get(node) {
            return Ok(cached.clone());
        }
        let mut loaded = store.find_domain(node, self.chain).await?;
        if self.rebuilding.contains(node) {
            // Other chains may still project the domain, only this chain's state is replayed
            loaded = loaded.map(|view| DomainView::new(view.domain));
        }
        self.views.insert(node.to_string(), loaded.clone());
        Ok(loaded)
    }

    fn put(&mut self, view: DomainView) {
        let node = view.node().to_string();
        if self.dirty_set.insert(node.clone()) {
            self.dirty.push(node.clone());
        }
        self.views.insert(node, Some(view));
    }

    async fn find_reverse_node(
        &mut self,
        store: &dyn MirrorStore,
        address: Address,
    ) -> anyhow::Result<Option<String>> {
        let pending = self.views.iter().find_map(|(node, view)| {
            view.as_ref()
                .and_then(|view| view.reverse.as_ref())
                .filter(|reverse| reverse.reverse_address == address)
                .map(|_| node.clone())
        });
        if pending.is_some() {
            return Ok(pending);
        }
        let stored = store.find_reverse_node(self.chain, address).await?;
        // A loaded view already reflects its pending reverse record
        Ok(stored.filter(|node| !self.views.contains_key(node) && !self.rebuilding.contains(node)))
    }
}

pub struct EventProcessor {
    chain: ChainId,
    resolver: Arc<RecordResolver>,
    store: Arc<dyn MirrorStore>,
}

impl EventProcessor {
    pub fn new(chain: ChainId, resolver: Arc<RecordResolver>, store: Arc<dyn MirrorStore>) -> Self {
        Self {
            chain,
            resolver,
            store,
        }
    }

    /// Apply a live event. Returns the node the event is journaled under.
    pub async fn process(
        &self,
        ctx: &mut ChunkContext,
        event: &ChainEvent,
    ) -> MirrorResult<Option<String>> {
        let parsed = RegistryEvent::try_from(event)?;
        let node = self.apply(ctx, event, &parsed, None).await?;
        ctx.last_processed = Some(parsed);
        Ok(node)
    }

    /// Re-apply a journaled event while rebuilding.
    pub async fn replay(&self, ctx: &mut ChunkContext, raw: &RawEvent) -> MirrorResult<()> {
        let event = raw.to_event();
        let parsed = RegistryEvent::try_from(&event)?;
        self.apply(ctx, &event, &parsed, raw.node.as_deref())
            .await?;
        ctx.last_processed = Some(parsed);
        Ok(())
    }

    async fn apply(
        &self,
        ctx: &mut ChunkContext,
        event: &ChainEvent,
        parsed: &RegistryEvent,
        journaled_node: Option<&str>,
    ) -> MirrorResult<Option<String>> {
        debug!(
            "[{}] Applying {} at ({}, {})",
            self.chain, parsed.name(), event.block_number, event.log_index
        );
        match parsed {
            RegistryEvent::Transfer { from, to, token_id } => {
                self.on_transfer(ctx, *from, *to, *token_id).await
            }
            RegistryEvent::NewUri { token_id, uri } => {
                self.on_new_uri(ctx, event.contract_address, *token_id, uri)
                    .await
            }
            RegistryEvent::Set {
                token_id,
                key,
                value,
            } => self.on_set(ctx, *token_id, key, value).await,
            RegistryEvent::ResetRecords { token_id } => self.on_reset_records(ctx, *token_id).await,
            RegistryEvent::Resolve { token_id, .. } => {
                self.on_resolve(ctx, event.contract_address, *token_id)
                    .await
            }
            RegistryEvent::Sync {
                resolver,
                update_id,
                token_id,
            } => self.on_sync(ctx, *resolver, *update_id, *token_id).await,
            RegistryEvent::SetReverse { address, token_id } => {
                self.on_set_reverse(ctx, event.position(), *address, *token_id)
                    .await
            }
            RegistryEvent::RemoveReverse { address } => {
                self.on_remove_reverse(ctx, event.position(), *address, journaled_node)
                    .await
            }
            RegistryEvent::Other { .. } => Ok(parsed.node()),
        }
    }

    async fn require(
        &self,
        ctx: &mut ChunkContext,
        node: &str,
        event: &'static str,
    ) -> MirrorResult<DomainView> {
        ctx.find(self.store.as_ref(), node)
            .await?
            .ok_or_else(|| {
                EventError::DomainNotFound {
                    event,
                    node: node.to_string(),
                }
                .into()
            })
    }

    async fn on_transfer(
        &self,
        ctx: &mut ChunkContext,
        from: Address,
        to: Address,
        token_id: U256,
    ) -> MirrorResult<Option<String>> {
        let node = token_id_to_node(token_id);
        // A mint only takes effect with the NewURI that follows it
        if from.is_zero() {
            return Ok(Some(node));
        }
        let mut view = self.require(ctx, &node, "Transfer").await?;
        let resolution = view.resolution_mut(self.chain);
        if to.is_zero() {
            resolution.clear();
        } else {
            resolution.owner_address = Some(to);
        }
        ctx.put(view);
        Ok(Some(node))
    }

    async fn on_new_uri(
        &self,
        ctx: &mut ChunkContext,
        registry: Address,
        token_id: U256,
        uri: &str,
    ) -> MirrorResult<Option<String>> {
        let node = token_id_to_node(token_id);
        let domain = Domain::new(uri);
        if domain.node != node {
            return Err(EventError::InvalidDomainName {
                name: uri.to_string(),
                node,
            }
            .into());
        }
        let minted_to = match &ctx.last_processed {
            Some(RegistryEvent::Transfer {
                to,
                token_id: minted,
                from,
            }) if from.is_zero() && *minted == token_id => *to,
            previous => {
                return Err(EventError::UnexpectedEventOrder {
                    node,
                    previous: previous
                        .as_ref()
                        .map_or("none".to_string(), |event| event.name().to_string()),
                }
                .into())
            }
        };

        let mut view = ctx
            .find(self.store.as_ref(), &node)
            .await?
            .unwrap_or_else(|| DomainView::new(domain.clone()));
        view.domain = domain;
        let resolution = view.resolution_mut(self.chain);
        resolution.owner_address = non_zero_address(minted_to);
        resolution.registry = Some(registry);
        ctx.put(view);
        Ok(Some(node))
    }

    async fn on_set(
        &self,
        ctx: &mut ChunkContext,
        token_id: U256,
        key: &str,
        value: &str,
    ) -> MirrorResult<Option<String>> {
        let node = token_id_to_node(token_id);
        let mut view = self.require(ctx, &node, "Set").await?;
        let records = &mut view.resolution_mut(self.chain).records;
        if value.is_empty() {
            records.remove(key);
        } else {
            records.insert(key.to_string(), value.to_string());
        }
        ctx.put(view);
        Ok(Some(node))
    }

    async fn on_reset_records(
        &self,
        ctx: &mut ChunkContext,
        token_id: U256,
    ) -> MirrorResult<Option<String>> {
        let node = token_id_to_node(token_id);
        let mut view = self.require(ctx, &node, "ResetRecords").await?;
        view.resolution_mut(self.chain).records.clear();
        ctx.put(view);
        Ok(Some(node))
    }

    async fn on_resolve(
        &self,
        ctx: &mut ChunkContext,
        registry: Address,
        token_id: U256,
    ) -> MirrorResult<Option<String>> {
        let node = token_id_to_node(token_id);
        let mut view = self.require(ctx, &node, "Resolve").await?;
        let changed = self
            .resolver
            .fetch_resolver(registry, token_id, view.resolution_mut(self.chain))
            .await?;
        if changed {
            ctx.put(view);
        }
        Ok(Some(node))
    }

    async fn on_sync(
        &self,
        ctx: &mut ChunkContext,
        resolver: Address,
        update_id: U256,
        token_id: U256,
    ) -> MirrorResult<Option<String>> {
        let node = token_id_to_node(token_id);
        let mut view = self.require(ctx, &node, "Sync").await?;
        if update_id.is_zero() {
            view.resolution_mut(self.chain).records.clear();
            ctx.put(view);
            return Ok(Some(node));
        }
        match self
            .resolver
            .record_by_key_hash(resolver, update_id, token_id)
            .await
        {
            Ok((key, value)) => {
                let records = &mut view.resolution_mut(self.chain).records;
                if value.is_empty() {
                    records.remove(&key);
                } else {
                    records.insert(key, value);
                }
                ctx.put(view);
            }
            Err(ResolverError::UnknownKeyHash(hash)) => {
                warn!("[{}] Sync of {} skipped: unknown key hash {}", self.chain, node, hash);
            }
            Err(ResolverError::Chain(e)) if e.is_revert() => {
                warn!("[{}] Sync of {} skipped: {}", self.chain, node, e);
            }
            Err(ResolverError::Chain(e)) => return Err(e.into()),
        }
        Ok(Some(node))
    }

    async fn on_set_reverse(
        &self,
        ctx: &mut ChunkContext,
        position: (u64, u64),
        address: Address,
        token_id: U256,
    ) -> MirrorResult<Option<String>> {
        let node = token_id_to_node(token_id);
        let mut view = self.require(ctx, &node, "SetReverse").await?;
        let holder = if ctx.replay {
            match ctx.reverse_claims.get(&address).cloned() {
                Some((claimed_at, _)) if claimed_at > position => {
                    debug!(
                        "[{}] Reverse record of {:?} changes later, skipping",
                        self.chain, address
                    );
                    return Ok(Some(node));
                }
                Some((_, holder)) => holder,
                None => {
                    // A domain outside the rebuild holding the address claimed it later
                    let outside = ctx.find_reverse_node(self.store.as_ref(), address).await?;
                    if outside.is_some_and(|outside| outside != node) {
                        return Ok(Some(node));
                    }
                    None
                }
            }
        } else {
            ctx.find_reverse_node(self.store.as_ref(), address).await?
        };

        if let Some(previous) = holder.filter(|previous| *previous != node) {
            if let Some(mut displaced) = ctx.find(self.store.as_ref(), &previous).await? {
                if displaced.reverse.as_ref().map(|r| r.reverse_address) == Some(address) {
                    displaced.reverse = None;
                    ctx.put(displaced);
                }
            }
        }
        if ctx.replay {
            ctx.reverse_claims
                .insert(address, (position, Some(node.clone())));
        }
        view.reverse = Some(ReverseResolution {
            node: node.clone(),
            chain: self.chain,
            reverse_address: address,
        });
        ctx.put(view);
        Ok(Some(node))
    }

    async fn on_remove_reverse(
        &self,
        ctx: &mut ChunkContext,
        position: (u64, u64),
        address: Address,
        journaled_node: Option<&str>,
    ) -> MirrorResult<Option<String>> {
        let node = if ctx.replay {
            if ctx
                .reverse_claims
                .get(&address)
                .is_some_and(|(claimed_at, _)| *claimed_at > position)
            {
                return Ok(journaled_node.map(str::to_string));
            }
            ctx.reverse_claims.insert(address, (position, None));
            journaled_node.map(str::to_string)
        } else {
            ctx.find_reverse_node(self.store.as_ref(), address).await?
        };
        let Some(node) = node else {
            debug!("[{}] No reverse record for {:?}", self.chain, address);
            return Ok(None);
        };
        let Some(mut view) = ctx.find(self.store.as_ref(), &node).await? else {
            return Ok(None);
        };
        if view.reverse.as_ref().map(|r| r.reverse_address) == Some(address) {
            view.reverse = None;
            ctx.put(view);
        }
        Ok(Some(node))
    }
}
