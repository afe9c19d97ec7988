// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Row types of the mirror tables.
//!
//! Addresses are stored as `0x`-prefixed lower-case hex, nodes as 32-byte hex and
//! records / event arguments as JSON objects of strings.

use crate::schema::{domains, raw_events, resolutions, reverse_resolutions, worker_status};
use diesel::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = domains)]
pub struct Domain {
    pub node: String,
    pub name: String,
    pub parent_node: Option<String>,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = resolutions)]
pub struct Resolution {
    pub node: String,
    pub blockchain: String,
    pub network_id: i64,
    pub owner_address: Option<String>,
    pub resolver: Option<String>,
    pub registry: Option<String>,
    pub records: serde_json::Value,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = reverse_resolutions)]
pub struct ReverseResolution {
    pub node: String,
    pub blockchain: String,
    pub network_id: i64,
    pub reverse_address: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = raw_events)]
pub struct RawEvent {
    pub blockchain: String,
    pub network_id: i64,
    pub block_number: i64,
    pub log_index: i64,
    pub block_hash: String,
    pub contract_address: String,
    pub event_type: String,
    pub tx_hash: String,
    pub return_values: serde_json::Value,
    pub node: Option<String>,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = worker_status)]
pub struct WorkerStatus {
    /// `<BLOCKCHAIN>:<network id>`, e.g. `ETH:1`.
    pub location: String,
    pub last_mirrored_block: i64,
    pub last_mirrored_block_hash: Option<String>,
    pub last_sequence_id: Option<String>,
}
