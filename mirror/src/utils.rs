// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use std::str::FromStr;

/// EIP-137 namehash. Callers lower-case the name first.
pub fn namehash(name: &str) -> H256 {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return H256(node);
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        node = keccak256([node, label_hash].concat());
    }
    H256(node)
}

pub fn node_to_hex(node: H256) -> String {
    format!("{:?}", node)
}

/// Node of a token: the 32-byte big-endian encoding of its id.
pub fn token_id_to_node(token_id: U256) -> String {
    let mut bytes = [0u8; 32];
    token_id.to_big_endian(&mut bytes);
    node_to_hex(H256(bytes))
}

pub fn node_to_token_id(node: &str) -> Option<U256> {
    H256::from_str(node)
        .ok()
        .map(|hash| U256::from_big_endian(hash.as_bytes()))
}

/// keccak256 of a record key, as the uint256 carried by `Sync` events.
pub fn key_hash(key: &str) -> U256 {
    U256::from_big_endian(&keccak256(key.as_bytes()))
}

/// The zero address means "unset".
pub fn non_zero_address(address: Address) -> Option<Address> {
    if address.is_zero() {
        None
    } else {
        Some(address)
    }
}

pub fn address_to_hex(address: &Address) -> String {
    format!("{:?}", address)
}

/// Truncate hash for logging
pub fn truncate_hash(hash: &str) -> String {
    if hash.len() > 16 {
        format!("{}...{}", &hash[..10], &hash[hash.len() - 6..])
    } else {
        hash.to_string()
    }
}
