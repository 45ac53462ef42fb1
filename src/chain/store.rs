use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::link::ChainCheckpoint;
use super::manager::normalize_issuer;
use crate::core::VerifactuError;

/// Durable home for chain checkpoints.
///
/// The chain manager is storage-agnostic; the client saves the new head
/// through this trait after every commit and loads it when an issuer is
/// first seen.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Load the last saved checkpoint for an issuer, if any.
    async fn load(&self, issuer: &str) -> Result<Option<ChainCheckpoint>, VerifactuError>;

    /// Persist a checkpoint, replacing the previous one for its issuer.
    async fn save(&self, checkpoint: &ChainCheckpoint) -> Result<(), VerifactuError>;
}

/// In-memory store, mainly for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryChainStore {
    checkpoints: RwLock<HashMap<String, ChainCheckpoint>>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

#[async_trait]
impl ChainStore for MemoryChainStore {
    async fn load(&self, issuer: &str) -> Result<Option<ChainCheckpoint>, VerifactuError> {
        Ok(self
            .checkpoints
            .read()
            .get(&normalize_issuer(issuer))
            .cloned())
    }

    async fn save(&self, checkpoint: &ChainCheckpoint) -> Result<(), VerifactuError> {
        let key = normalize_issuer(&checkpoint.issuer);
        let mut checkpoints = self.checkpoints.write();
        if let Some(existing) = checkpoints.get(&key) {
            if existing.sequence_index > checkpoint.sequence_index {
                return Err(VerifactuError::Store(format!(
                    "refusing to overwrite checkpoint {} with older {} for {key}",
                    existing.sequence_index, checkpoint.sequence_index
                )));
            }
        }
        checkpoints.insert(key, checkpoint.clone());
        Ok(())
    }
}
