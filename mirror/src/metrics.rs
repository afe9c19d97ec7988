// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, HistogramVec, IntCounterVec, IntGaugeVec, Registry,
};

const FINE_GRAINED_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.6, 0.7, 0.8, 0.9,
    1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.5, 3.0, 3.5, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10., 15., 20., 25.,
    30., 40., 50., 60., 90., 120.,
];

#[derive(Clone, Debug)]
pub struct MirrorMetrics {
    pub(crate) latest_network_block: IntGaugeVec,
    pub(crate) last_mirrored_block: IntGaugeVec,
    pub(crate) processed_events: IntCounterVec,
    pub(crate) skipped_events: IntCounterVec,
    pub(crate) committed_chunks: IntCounterVec,
    pub(crate) reorgs: IntCounterVec,
    pub(crate) reorg_depth: IntGaugeVec,
    pub(crate) sync_errors: IntCounterVec,
    pub(crate) sync_run_latency: HistogramVec,

    pub(crate) rpc_queries: IntCounterVec,
    pub(crate) rpc_errors: IntCounterVec,
    pub(crate) rpc_queries_latency: HistogramVec,
}

impl MirrorMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            latest_network_block: register_int_gauge_vec_with_registry!(
                "mirror_latest_network_block",
                "Latest block reported by the node, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            last_mirrored_block: register_int_gauge_vec_with_registry!(
                "mirror_last_mirrored_block",
                "Last block committed to the mirror, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            processed_events: register_int_counter_vec_with_registry!(
                "mirror_processed_events",
                "Total number of events applied to the mirror, by chain and event type",
                &["chain", "event"],
                registry,
            )
            .unwrap(),
            skipped_events: register_int_counter_vec_with_registry!(
                "mirror_skipped_events",
                "Total number of events skipped as structurally invalid, by chain and reason",
                &["chain", "reason"],
                registry,
            )
            .unwrap(),
            committed_chunks: register_int_counter_vec_with_registry!(
                "mirror_committed_chunks",
                "Total number of block chunks committed, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            reorgs: register_int_counter_vec_with_registry!(
                "mirror_reorgs",
                "Total number of repaired reorganizations, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            reorg_depth: register_int_gauge_vec_with_registry!(
                "mirror_last_reorg_depth",
                "Blocks rolled back by the last repaired reorganization, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            sync_errors: register_int_counter_vec_with_registry!(
                "mirror_sync_errors",
                "Total number of aborted sync runs, by chain and error type",
                &["chain", "type"],
                registry,
            )
            .unwrap(),
            sync_run_latency: register_histogram_vec_with_registry!(
                "mirror_sync_run_latency",
                "Duration of one sync run, by chain",
                &["chain"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            rpc_queries: register_int_counter_vec_with_registry!(
                "mirror_rpc_queries",
                "Total number of queries issued to the chain provider, by method",
                &["method"],
                registry,
            )
            .unwrap(),
            rpc_errors: register_int_counter_vec_with_registry!(
                "mirror_rpc_errors",
                "Total number of failed queries to the chain provider, by method",
                &["method"],
                registry,
            )
            .unwrap(),
            rpc_queries_latency: register_histogram_vec_with_registry!(
                "mirror_rpc_queries_latency",
                "Latency of queries issued to the chain provider, by method",
                &["method"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
