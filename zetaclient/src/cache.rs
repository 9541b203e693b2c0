// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded LRU caches for blocks and headers, keyed by height. Entries are
//! invalidated when an inclusion cross-check fails, which is the strongest
//! local signal of a reorg at the observed depth.

use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

pub const BLOCK_CACHE_CAPACITY: usize = 1000;

pub struct BlockCache<V> {
    inner: Mutex<LruCache<u64, V>>,
}

impl<V: Clone> BlockCache<V> {
    pub fn new() -> Self {
        Self::with_capacity(BLOCK_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity must be nonzero"),
            )),
        }
    }

    pub async fn get(&self, number: u64) -> Option<V> {
        self.inner.lock().await.get(&number).cloned()
    }

    pub async fn put(&self, number: u64, value: V) {
        self.inner.lock().await.put(number, value);
    }

    /// Drop a stale entry (inclusion mismatch).
    pub async fn remove(&self, number: u64) {
        self.inner.lock().await.pop(&number);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl<V: Clone> Default for BlockCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
