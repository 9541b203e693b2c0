// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Local telemetry endpoint: `/ping`, `/metrics` (prometheus text format)
//! and `/status` with the per-chain cursor positions, read lock-free from
//! the observers' atomics.

use crate::observer::evm::EvmObserver;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Registry, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub const PING_PATH: &str = "/ping";
pub const METRICS_PATH: &str = "/metrics";
pub const STATUS_PATH: &str = "/status";

#[derive(Clone)]
struct TelemetryState {
    registry: Registry,
    observers: Vec<Arc<EvmObserver>>,
    version: &'static str,
}

#[derive(Serialize)]
struct ChainStatus {
    chain: String,
    last_scanned_block: u64,
    last_external_block: u64,
}

#[derive(Serialize)]
struct StatusResponse {
    version: &'static str,
    chains: Vec<ChainStatus>,
}

pub fn run_telemetry_server(
    port: u16,
    registry: Registry,
    observers: Vec<Arc<EvmObserver>>,
) -> JoinHandle<()> {
    let state = TelemetryState {
        registry,
        observers,
        version: env!("CARGO_PKG_VERSION"),
    };
    tokio::spawn(async move {
        let address = SocketAddr::from(([0, 0, 0, 0], port));
        let router = make_router(state);
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .expect("telemetry port must be bindable");
        info!(%address, "telemetry server started");
        axum::serve(listener, router.into_make_service())
            .await
            .expect("telemetry server crashed");
    })
}

fn make_router(state: TelemetryState) -> Router {
    Router::new()
        .route(PING_PATH, get(ping))
        .route(METRICS_PATH, get(metrics))
        .route(STATUS_PATH, get(status))
        .with_state(state)
}

async fn ping(State(state): State<TelemetryState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": state.version }))
}

async fn metrics(State(state): State<TelemetryState>) -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&state.registry.gather())
        .unwrap_or_default()
}

async fn status(State(state): State<TelemetryState>) -> Json<StatusResponse> {
    let chains = state
        .observers
        .iter()
        .map(|observer| ChainStatus {
            chain: observer.chain.name.clone(),
            last_scanned_block: observer.get_last_block_scanned(),
            last_external_block: observer.get_last_block(),
        })
        .collect();
    Json(StatusResponse {
        version: state.version,
        chains,
    })
}
