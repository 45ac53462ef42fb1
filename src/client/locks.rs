use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::chain::normalize_issuer;

/// One async mutex per issuer, created on first use and never removed.
#[derive(Debug, Default)]
pub struct IssuerLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IssuerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to an issuer's chain.
    pub async fn acquire(&self, issuer: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(issuer);
        lock.lock_owned().await
    }

    fn lock_for(&self, issuer: &str) -> Arc<Mutex<()>> {
        // clone out before awaiting so no shard guard is held across the await
        self.locks
            .entry(normalize_issuer(issuer))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
