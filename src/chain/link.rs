use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::{Record, RecordId, VerifactuError, canonicalize};

/// Uppercase hex SHA-256 binding a record to its predecessor.
///
/// The genesis sentinel is the empty fingerprint: an issuer's first record
/// chains off "nothing" and is flagged as `PrimerRegistro` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The sentinel used as "previous fingerprint" of an issuer's first record.
    pub fn genesis() -> Self {
        Self(String::new())
    }

    /// Parse a 64-character hex digest (case-insensitive).
    pub fn from_hex(hex_digest: &str) -> Result<Self, VerifactuError> {
        let trimmed = hex_digest.trim();
        if trimmed.len() != 64 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(VerifactuError::Config(format!(
                "fingerprint must be 64 hex characters, got '{trimmed}'"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn is_genesis(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Empty is genesis; anything else must be a hex digest.
impl TryFrom<String> for Fingerprint {
    type Error = VerifactuError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Ok(Self::genesis())
        } else {
            Self::from_hex(&value)
        }
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_genesis() {
            f.write_str("<genesis>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Digest `previous || canonical`. Pure: same inputs, same fingerprint.
pub fn compute_fingerprint(previous: &Fingerprint, canonical: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_str().as_bytes());
    hasher.update(canonical);
    Fingerprint(hex::encode_upper(hasher.finalize()))
}

/// One link of an issuer's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// NIF the chain is scoped to.
    pub issuer: String,
    /// 1 for the first record after genesis, +1 per committed link.
    pub sequence_index: u64,
    pub fingerprint: Fingerprint,
    pub previous_fingerprint: Fingerprint,
    /// Generation timestamp of the chained record.
    pub timestamp: DateTime<FixedOffset>,
    /// Which record this link fingerprints.
    pub record: RecordId,
}

impl ChainLink {
    /// Compute the link that would follow `head` for a record.
    pub fn next(
        head: &ChainCheckpoint,
        record: &Record,
        canonical: &[u8],
    ) -> Result<Self, VerifactuError> {
        let sequence_index = head.sequence_index.checked_add(1).ok_or_else(|| {
            VerifactuError::Config(format!(
                "chain for {} is at the last representable index",
                head.issuer
            ))
        })?;
        Ok(Self {
            issuer: head.issuer.clone(),
            sequence_index,
            fingerprint: compute_fingerprint(&head.fingerprint, canonical),
            previous_fingerprint: head.fingerprint.clone(),
            timestamp: record.generated_at(),
            record: record.id(),
        })
    }
}

/// Recoverable state of a chain: the last committed link, or the seed.
///
/// This is what callers persist between process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    pub issuer: String,
    /// 0 at genesis.
    pub sequence_index: u64,
    pub fingerprint: Fingerprint,
    /// Identity of the last committed record; `None` at genesis.
    pub record: Option<RecordId>,
}

impl ChainCheckpoint {
    pub fn genesis(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            sequence_index: 0,
            fingerprint: Fingerprint::genesis(),
            record: None,
        }
    }

    pub fn from_link(link: &ChainLink) -> Self {
        Self {
            issuer: link.issuer.clone(),
            sequence_index: link.sequence_index,
            fingerprint: link.fingerprint.clone(),
            record: Some(link.record.clone()),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.sequence_index == 0 && self.fingerprint.is_genesis()
    }
}

/// A committed link together with the record it fingerprints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub link: ChainLink,
    pub record: Record,
}

/// Outcome of re-verifying a chain from its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    /// Every link recomputed and matched.
    Intact { verified: usize },
    /// First link that failed, by sequence index.
    Broken { index: u64, reason: BreakReason },
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// Link belongs to a different issuer.
    IssuerMismatch,
    /// Sequence index is not predecessor + 1.
    SequenceGap,
    /// `previous_fingerprint` differs from the predecessor's fingerprint.
    PreviousMismatch,
    /// Recomputed fingerprint differs from the stored one.
    FingerprintMismatch,
    /// Link's record id does not match the record supplied with it.
    RecordMismatch,
}

/// Recompute every fingerprint in `history` starting from `origin`.
pub fn verify_links(origin: &ChainCheckpoint, history: &[ChainEntry]) -> ChainVerification {
    let mut expected_index = origin.sequence_index.checked_add(1);
    let mut expected_previous = origin.fingerprint.clone();

    for entry in history {
        let link = &entry.link;
        let broken = |reason| ChainVerification::Broken {
            index: link.sequence_index,
            reason,
        };

        if link.issuer != origin.issuer {
            return broken(BreakReason::IssuerMismatch);
        }
        if Some(link.sequence_index) != expected_index {
            return broken(BreakReason::SequenceGap);
        }
        if link.previous_fingerprint != expected_previous {
            return broken(BreakReason::PreviousMismatch);
        }
        if link.record != entry.record.id() {
            return broken(BreakReason::RecordMismatch);
        }
        let recomputed = compute_fingerprint(&expected_previous, &canonicalize(&entry.record));
        if recomputed != link.fingerprint {
            return broken(BreakReason::FingerprintMismatch);
        }

        expected_index = expected_index.and_then(|i| i.checked_add(1));
        expected_previous = recomputed;
    }

    ChainVerification::Intact {
        verified: history.len(),
    }
}
