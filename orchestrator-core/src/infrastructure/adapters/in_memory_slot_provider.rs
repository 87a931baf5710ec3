// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A `SlotProvider` backed by an in-memory pre-warmed pool, for tests and
//! the startup-pool-unavailable degraded mode. `acquire` pulls from the
//! pool if non-empty, otherwise mints a fresh slot immediately (no
//! pre-warming benefit, but never blocks).

use async_trait::async_trait;
use parking_lot::Mutex;
use runner_orchestrator_domain::ids::ContainerId;
use runner_orchestrator_domain::ports::{RuntimeError, SlotProvider};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Default)]
pub struct InMemorySlotProvider {
    pool: Mutex<VecDeque<ContainerId>>,
}

impl InMemorySlotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the pool with pre-warmed slot ids, e.g. at startup.
    pub fn seed(&self, slots: impl IntoIterator<Item = ContainerId>) {
        self.pool.lock().extend(slots);
    }
}

#[async_trait]
impl SlotProvider for InMemorySlotProvider {
    async fn acquire(&self, _hint: Option<&str>, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
        let mut pool = self.pool.lock();
        Ok(pool.pop_front().unwrap_or_else(ContainerId::new))
    }

    async fn release(&self, slot_id: ContainerId, _deadline: Duration) -> Result<(), RuntimeError> {
        self.pool.lock().push_back(slot_id);
        Ok(())
    }

    async fn resize(&self, pool_size: usize, _deadline: Duration) -> Result<(), RuntimeError> {
        let mut pool = self.pool.lock();
        while pool.len() < pool_size {
            pool.push_back(ContainerId::new());
        }
        while pool.len() > pool_size {
            pool.pop_back();
        }
        Ok(())
    }

    async fn available(&self) -> usize {
        self.pool.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_without_pool_mints_fresh_slot() {
        let provider = InMemorySlotProvider::new();
        let slot = provider.acquire(None, Duration::from_secs(1)).await.unwrap();
        assert!(!slot.is_nil());
    }

    #[tokio::test]
    async fn release_then_acquire_reuses_same_slot() {
        let provider = InMemorySlotProvider::new();
        let slot = ContainerId::new();
        provider.release(slot, Duration::from_secs(1)).await.unwrap();

        let reacquired = provider.acquire(None, Duration::from_secs(1)).await.unwrap();
        assert_eq!(reacquired, slot);
    }

    #[tokio::test]
    async fn resize_grows_and_shrinks_pool() {
        let provider = InMemorySlotProvider::new();
        provider.resize(3, Duration::from_secs(1)).await.unwrap();
        assert_eq!(provider.available().await, 3);

        provider.resize(1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(provider.available().await, 1);
    }
}
