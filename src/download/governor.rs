//! Connection concurrency governor.
//!
//! Admission control only — no sleeping, no backoff, no rate limiting
//! beyond two caps: a total in-flight cap and a per-host cap. Replaces a
//! libcurl-multi handle's connection-pool bookkeeping with a pair of
//! `tokio::sync::Semaphore`s.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ConnectionGovernor {
    total: Arc<Semaphore>,
    per_host: DashMap<String, Arc<Semaphore>>,
    max_host_connections: usize,
}

/// Holds both permits for one in-flight attempt; releases them on drop.
pub struct AttemptPermit {
    _host: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

impl ConnectionGovernor {
    pub fn new(max_total_connections: u32, max_host_connections: u32) -> Self {
        Self {
            total: Arc::new(Semaphore::new(max_total_connections.max(1) as usize)),
            per_host: DashMap::new(),
            max_host_connections: max_host_connections.max(1) as usize,
        }
    }

    /// Waits for both a free total-connection slot and a free slot for
    /// `host`, acquiring whichever becomes free last.
    pub async fn acquire(&self, host: &str) -> AttemptPermit {
        let host_semaphore = self
            .per_host
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_host_connections)))
            .clone();

        let total = self
            .total
            .clone()
            .acquire_owned()
            .await
            .expect("total semaphore is never closed");
        let host = host_semaphore
            .acquire_owned()
            .await
            .expect("per-host semaphore is never closed");

        AttemptPermit {
            _host: host,
            _total: total,
        }
    }
}
