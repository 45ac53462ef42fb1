use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::chain::{ChainCheckpoint, ChainStore, normalize_issuer};
use crate::core::VerifactuError;

/// Checkpoints as one JSON file per issuer (`<dir>/<NIF>.json`).
///
/// Writes go to a temporary file that is renamed over the old one, so a
/// crash mid-write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct JsonFileChainStore {
    dir: PathBuf,
}

impl JsonFileChainStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, issuer: &str) -> Result<PathBuf, VerifactuError> {
        let key = normalize_issuer(issuer);
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(VerifactuError::Store(format!(
                "issuer '{issuer}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_err(path: &Path, e: std::io::Error) -> VerifactuError {
    VerifactuError::Store(format!("{}: {e}", path.display()))
}

#[async_trait]
impl ChainStore for JsonFileChainStore {
    async fn load(&self, issuer: &str) -> Result<Option<ChainCheckpoint>, VerifactuError> {
        let path = self.path_for(issuer)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        let checkpoint: ChainCheckpoint = serde_json::from_slice(&raw).map_err(|e| {
            VerifactuError::Store(format!("corrupt checkpoint {}: {e}", path.display()))
        })?;
        if normalize_issuer(&checkpoint.issuer) != normalize_issuer(issuer) {
            return Err(VerifactuError::Store(format!(
                "{} holds a checkpoint for {}",
                path.display(),
                checkpoint.issuer
            )));
        }
        Ok(Some(checkpoint))
    }

    async fn save(&self, checkpoint: &ChainCheckpoint) -> Result<(), VerifactuError> {
        let path = self.path_for(&checkpoint.issuer)?;
        if let Some(existing) = self.load(&checkpoint.issuer).await? {
            if existing.sequence_index > checkpoint.sequence_index {
                return Err(VerifactuError::Store(format!(
                    "refusing to overwrite checkpoint {} with older {}",
                    existing.sequence_index, checkpoint.sequence_index
                )));
            }
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| VerifactuError::Store(format!("cannot encode checkpoint: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err(&path, e))?;

        debug!(
            issuer = %checkpoint.issuer,
            sequence = checkpoint.sequence_index,
            path = %path.display(),
            "checkpoint saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Fingerprint;
    use crate::core::RecordId;
    use chrono::NaiveDate;

    fn checkpoint(seq: u64) -> ChainCheckpoint {
        ChainCheckpoint {
            issuer: "B12345674".into(),
            sequence_index: seq,
            fingerprint: Fingerprint::from_hex(&"AB".repeat(32)).unwrap(),
            record: Some(RecordId {
                number: format!("{seq:03}"),
                issue_date: NaiveDate::from_ymd_opt(2024, 11, 4).unwrap(),
            }),
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileChainStore::new(dir.path().join("chains"));
        assert_eq!(store.load("B12345674").await.unwrap(), None);

        store.save(&checkpoint(7)).await.unwrap();
        assert_eq!(store.load("b12345674").await.unwrap(), Some(checkpoint(7)));
        assert!(dir.path().join("chains/B12345674.json").exists());
        assert!(!dir.path().join("chains/B12345674.json.tmp").exists());
    }

    #[tokio::test]
    async fn older_checkpoint_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileChainStore::new(dir.path());
        store.save(&checkpoint(7)).await.unwrap();
        let err = store.save(&checkpoint(6)).await.unwrap_err();
        assert!(matches!(err, VerifactuError::Store(_)));
        store.save(&checkpoint(8)).await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("B12345674.json"), b"{not json").unwrap();
        let store = JsonFileChainStore::new(dir.path());
        assert!(matches!(
            store.load("B12345674").await,
            Err(VerifactuError::Store(_))
        ));
    }

    #[tokio::test]
    async fn path_traversal_refused() {
        let store = JsonFileChainStore::new("/tmp");
        assert!(store.load("../etc/passwd").await.is_err());
    }
}
