// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::metrics::ZetaclientMetrics;
use ethers::providers::{Http, HttpClientError, JsonRpcClient, Provider};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use url::{ParseError, Url};

/// An HTTP JSON-RPC transport that counts queries and latency per method
/// and flips the connected gauge on failures.
#[derive(Debug, Clone)]
pub struct MeteredEthHttpProvider {
    inner: Http,
    chain_name: String,
    metrics: Arc<ZetaclientMetrics>,
}

#[async_trait::async_trait]
impl JsonRpcClient for MeteredEthHttpProvider {
    type Error = HttpClientError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, HttpClientError> {
        self.metrics
            .rpc_queries
            .with_label_values(&[&self.chain_name, method])
            .inc();
        let _timer = self
            .metrics
            .rpc_queries_latency
            .with_label_values(&[&self.chain_name, method])
            .start_timer();

        let result = self.inner.request(method, params).await;
        let connected = if result.is_ok() { 1 } else { 0 };
        self.metrics
            .rpc_node_connected
            .with_label_values(&[&self.chain_name])
            .set(connected);
        result
    }
}

impl MeteredEthHttpProvider {
    pub fn new(url: impl Into<Url>, chain_name: &str, metrics: Arc<ZetaclientMetrics>) -> Self {
        Self {
            inner: Http::new(url),
            chain_name: chain_name.to_string(),
            metrics,
        }
    }
}

pub fn new_metered_eth_provider(
    url: &str,
    chain_name: &str,
    metrics: Arc<ZetaclientMetrics>,
) -> Result<Provider<MeteredEthHttpProvider>, ParseError> {
    let transport = MeteredEthHttpProvider::new(Url::parse(url)?, chain_name, metrics);
    Ok(Provider::new(transport))
}
