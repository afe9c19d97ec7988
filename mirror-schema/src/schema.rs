// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

diesel::table! {
    domains (node) {
        node -> Text,
        name -> Text,
        parent_node -> Nullable<Text>,
    }
}

diesel::table! {
    resolutions (node, blockchain, network_id) {
        node -> Text,
        blockchain -> Text,
        network_id -> Int8,
        owner_address -> Nullable<Text>,
        resolver -> Nullable<Text>,
        registry -> Nullable<Text>,
        records -> Jsonb,
    }
}

diesel::table! {
    reverse_resolutions (node, blockchain, network_id) {
        node -> Text,
        blockchain -> Text,
        network_id -> Int8,
        reverse_address -> Text,
    }
}

diesel::table! {
    raw_events (blockchain, network_id, block_number, log_index) {
        blockchain -> Text,
        network_id -> Int8,
        block_number -> Int8,
        log_index -> Int8,
        block_hash -> Text,
        contract_address -> Text,
        event_type -> Text,
        tx_hash -> Text,
        return_values -> Jsonb,
        node -> Nullable<Text>,
    }
}

diesel::table! {
    worker_status (location) {
        location -> Text,
        last_mirrored_block -> Int8,
        last_mirrored_block_hash -> Nullable<Text>,
        last_sequence_id -> Nullable<Text>,
    }
}

diesel::joinable!(resolutions -> domains (node));
diesel::joinable!(reverse_resolutions -> domains (node));

diesel::allow_tables_to_appear_in_same_query!(
    domains,
    resolutions,
    reverse_resolutions,
    raw_events,
    worker_status,
);
