// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, HistogramVec,
    IntCounterVec, IntGauge, IntGaugeVec, Registry,
};

const RPC_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

#[derive(Clone, Debug)]
pub struct ZetaclientMetrics {
    pub rpc_queries: IntCounterVec,
    pub rpc_queries_latency: HistogramVec,
    pub rpc_node_connected: IntGaugeVec,

    pub last_scanned_block: IntGaugeVec,
    pub last_external_block: IntGaugeVec,

    pub inbound_votes_posted: IntCounterVec,
    pub outbound_votes_posted: IntCounterVec,
    pub gas_price_posted: IntCounterVec,
    pub block_headers_posted: IntCounterVec,

    pub outbound_confirmed: IntCounterVec,
    /// Multiple confirmed hashes for one nonce; needs operator attention.
    pub outbound_multiple_confirmations: IntCounterVec,

    pub outbound_broadcasts: IntCounterVec,
    pub outbound_fee_bumps: IntCounterVec,

    pub task_restarts: IntCounterVec,
    pub uptime_seconds: IntGauge,
}

impl ZetaclientMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            rpc_queries: register_int_counter_vec_with_registry!(
                "zetaclient_rpc_queries",
                "Total external chain RPC queries",
                &["chain", "method"],
                registry,
            )
            .unwrap(),
            rpc_queries_latency: register_histogram_vec_with_registry!(
                "zetaclient_rpc_queries_latency",
                "Latency of external chain RPC queries",
                &["chain", "method"],
                RPC_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            rpc_node_connected: register_int_gauge_vec_with_registry!(
                "zetaclient_rpc_node_connected",
                "1 when the chain RPC endpoint answered the last query",
                &["chain"],
                registry,
            )
            .unwrap(),
            last_scanned_block: register_int_gauge_vec_with_registry!(
                "zetaclient_last_scanned_block",
                "Highest fully processed external block per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            last_external_block: register_int_gauge_vec_with_registry!(
                "zetaclient_last_external_block",
                "Latest observed external tip per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            inbound_votes_posted: register_int_counter_vec_with_registry!(
                "zetaclient_inbound_votes_posted",
                "Inbound observation votes posted to ZetaCore",
                &["chain", "event"],
                registry,
            )
            .unwrap(),
            outbound_votes_posted: register_int_counter_vec_with_registry!(
                "zetaclient_outbound_votes_posted",
                "Outbound observation votes posted to ZetaCore",
                &["chain"],
                registry,
            )
            .unwrap(),
            gas_price_posted: register_int_counter_vec_with_registry!(
                "zetaclient_gas_price_posted",
                "Gas price samples posted to ZetaCore",
                &["chain"],
                registry,
            )
            .unwrap(),
            block_headers_posted: register_int_counter_vec_with_registry!(
                "zetaclient_block_headers_posted",
                "Block headers posted to ZetaCore",
                &["chain"],
                registry,
            )
            .unwrap(),
            outbound_confirmed: register_int_counter_vec_with_registry!(
                "zetaclient_outbound_confirmed",
                "Outbound transactions confirmed on external chains",
                &["chain"],
                registry,
            )
            .unwrap(),
            outbound_multiple_confirmations: register_int_counter_vec_with_registry!(
                "zetaclient_outbound_multiple_confirmations",
                "Nonces with more than one confirmed outbound hash",
                &["chain"],
                registry,
            )
            .unwrap(),
            outbound_broadcasts: register_int_counter_vec_with_registry!(
                "zetaclient_outbound_broadcasts",
                "Signed outbound transactions broadcast",
                &["chain"],
                registry,
            )
            .unwrap(),
            outbound_fee_bumps: register_int_counter_vec_with_registry!(
                "zetaclient_outbound_fee_bumps",
                "Fee-bumped rebroadcasts of pending outbounds",
                &["chain"],
                registry,
            )
            .unwrap(),
            task_restarts: register_int_counter_vec_with_registry!(
                "zetaclient_task_restarts",
                "Chain tasks restarted by the fault boundary",
                &["chain", "task"],
                registry,
            )
            .unwrap(),
            uptime_seconds: register_int_gauge_with_registry!(
                "zetaclient_uptime_seconds",
                "Daemon uptime in seconds",
                registry,
            )
            .unwrap(),
        }
    }

    #[cfg(test)]
    pub fn new_for_testing() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new(&Registry::new()))
    }
}
