// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mapping between mirror types and table rows.

use anyhow::{Context, Result};
use domain_mirror::types::{
    ChainId, Domain, DomainView, RawEvent, Resolution, ReverseResolution, SyncCursor,
};
use domain_mirror::utils::address_to_hex;
use domain_mirror_schema::models;
use ethers::types::Address;
use std::collections::BTreeMap;
use std::str::FromStr;

pub(crate) fn chain_key(chain: ChainId) -> (String, i64) {
    (chain.blockchain.to_string(), chain.network_id as i64)
}

/// Block numbers above `i64::MAX` cannot be stored; bounds saturate.
pub(crate) fn block_bound(block: u64) -> i64 {
    i64::try_from(block).unwrap_or(i64::MAX)
}

fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value).with_context(|| format!("Invalid address in database: {value}"))
}

fn parse_optional_address(value: Option<String>) -> Result<Option<Address>> {
    value.as_deref().map(parse_address).transpose()
}

pub(crate) fn domain_row(domain: &Domain) -> models::Domain {
    models::Domain {
        node: domain.node.clone(),
        name: domain.name.clone(),
        parent_node: domain.parent_node.clone(),
    }
}

pub(crate) fn resolution_row(resolution: &Resolution) -> Result<models::Resolution> {
    let (blockchain, network_id) = chain_key(resolution.chain);
    Ok(models::Resolution {
        node: resolution.node.clone(),
        blockchain,
        network_id,
        owner_address: resolution.owner_address.as_ref().map(address_to_hex),
        resolver: resolution.resolver.as_ref().map(address_to_hex),
        registry: resolution.registry.as_ref().map(address_to_hex),
        records: serde_json::to_value(&resolution.records)?,
    })
}

pub(crate) fn reverse_row(reverse: &ReverseResolution) -> models::ReverseResolution {
    let (blockchain, network_id) = chain_key(reverse.chain);
    models::ReverseResolution {
        node: reverse.node.clone(),
        blockchain,
        network_id,
        reverse_address: address_to_hex(&reverse.reverse_address),
    }
}

pub(crate) fn view_from_rows(
    chain: ChainId,
    domain: models::Domain,
    resolution: Option<models::Resolution>,
    reverse: Option<models::ReverseResolution>,
) -> Result<DomainView> {
    let resolution = resolution
        .map(|row| -> Result<Resolution> {
            let records: BTreeMap<String, String> = serde_json::from_value(row.records)
                .with_context(|| format!("Invalid records of {}", row.node))?;
            Ok(Resolution {
                node: row.node,
                chain,
                owner_address: parse_optional_address(row.owner_address)?,
                resolver: parse_optional_address(row.resolver)?,
                registry: parse_optional_address(row.registry)?,
                records,
            })
        })
        .transpose()?;
    let reverse = reverse
        .map(|row| -> Result<ReverseResolution> {
            Ok(ReverseResolution {
                reverse_address: parse_address(&row.reverse_address)?,
                node: row.node,
                chain,
            })
        })
        .transpose()?;
    Ok(DomainView {
        domain: Domain {
            node: domain.node,
            name: domain.name,
            parent_node: domain.parent_node,
        },
        resolution,
        reverse,
    })
}

pub(crate) fn raw_event_row(event: &RawEvent) -> Result<models::RawEvent> {
    let (blockchain, network_id) = chain_key(event.chain);
    Ok(models::RawEvent {
        blockchain,
        network_id,
        block_number: block_bound(event.block_number),
        log_index: block_bound(event.log_index),
        block_hash: event.block_hash.clone(),
        contract_address: address_to_hex(&event.contract_address),
        event_type: event.event_type.clone(),
        tx_hash: event.tx_hash.clone(),
        return_values: serde_json::to_value(&event.return_values)?,
        node: event.node.clone(),
    })
}

pub(crate) fn raw_event_from_row(chain: ChainId, row: models::RawEvent) -> Result<RawEvent> {
    Ok(RawEvent {
        chain,
        contract_address: parse_address(&row.contract_address)?,
        event_type: row.event_type,
        block_number: row.block_number as u64,
        block_hash: row.block_hash,
        log_index: row.log_index as u64,
        tx_hash: row.tx_hash,
        return_values: serde_json::from_value(row.return_values)
            .context("Invalid raw event return values")?,
        node: row.node,
    })
}

pub(crate) fn cursor_row(cursor: &SyncCursor) -> models::WorkerStatus {
    models::WorkerStatus {
        location: cursor.chain.location(),
        last_mirrored_block: block_bound(cursor.block_number),
        last_mirrored_block_hash: cursor.block_hash.clone(),
        last_sequence_id: cursor.last_sequence_id.clone(),
    }
}

pub(crate) fn cursor_from_row(chain: ChainId, row: models::WorkerStatus) -> SyncCursor {
    SyncCursor {
        chain,
        block_number: row.last_mirrored_block as u64,
        block_hash: row.last_mirrored_block_hash,
        last_sequence_id: row.last_sequence_id,
    }
}
