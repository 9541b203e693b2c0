// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! zetaclient: the per-validator observer–signer daemon. Watches external
//! chains for deposits and message-passing events, votes observations into
//! ZetaCore, and signs/broadcasts outbound transactions with the shared TSS
//! key when ZetaCore schedules them.

pub mod btc_client;
pub mod cache;
pub mod compliance;
pub mod config;
pub mod error;
pub mod eth_client;
pub mod interfaces;
pub mod metered_eth_provider;
pub mod metrics;
pub mod node;
pub mod observer;
pub mod outbound;
pub mod signer;
pub mod store;
pub mod telemetry;
pub mod ticker;
pub mod zetacore;

#[cfg(test)]
pub mod test_utils;

#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: std::time::Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                match $func.await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        tracing::debug!("retrying due to error: {:?}", e);
                        Err(backoff::Error::transient(e))
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}
