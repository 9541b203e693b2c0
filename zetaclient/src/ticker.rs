// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A ticker whose interval is re-consulted after every tick, so operators
//! can retune a hot chain's poll cadence through chain params at runtime
//! without restarting the daemon.

use std::time::Duration;
use tracing::info;

pub struct DynamicTicker {
    name: String,
    interval_secs: u64,
}

impl DynamicTicker {
    pub fn new(name: impl Into<String>, interval_secs: u64) -> Self {
        Self {
            name: name.into(),
            interval_secs: interval_secs.max(1),
        }
    }

    pub async fn tick(&self) {
        tokio::time::sleep(Duration::from_secs(self.interval_secs)).await;
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Apply a new interval for the next tick; logs only on change.
    pub fn update_interval(&mut self, interval_secs: u64) {
        let interval_secs = interval_secs.max(1);
        if interval_secs != self.interval_secs {
            info!(
                ticker = self.name,
                old = self.interval_secs,
                new = interval_secs,
                "ticker interval updated"
            );
            self.interval_secs = interval_secs;
        }
    }
}
