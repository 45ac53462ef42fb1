use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::link::{ChainCheckpoint, ChainEntry, ChainLink, ChainVerification, verify_links};
use crate::core::{Record, RecordId, VerifactuError, canonicalize, normalize_tax_id};

/// Where an issuer's chain starts in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSeed {
    /// No record was ever submitted for the issuer.
    Genesis,
    /// Continue from a checkpoint persisted earlier or recovered remotely.
    Resume(ChainCheckpoint),
}

/// A record bound to its tentatively computed link.
///
/// Built once per logical submission and only borrowed afterwards: retries
/// resend the same link, they never recompute it.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    record: Record,
    link: ChainLink,
    canonical: Vec<u8>,
    previous: Option<RecordId>,
}

impl PendingSubmission {
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn link(&self) -> &ChainLink {
        &self.link
    }

    /// Bytes the fingerprint was computed over.
    pub fn canonical(&self) -> &[u8] {
        &self.canonical
    }

    /// Previous record id for the wire's `RegistroAnterior` block;
    /// `None` when this is the issuer's first record.
    pub fn previous_record(&self) -> Option<&RecordId> {
        self.previous.as_ref()
    }

    pub fn into_entry(self) -> ChainEntry {
        ChainEntry {
            link: self.link,
            record: self.record,
        }
    }
}

#[derive(Debug, Clone)]
struct IssuerChain {
    /// Checkpoint the chain was seeded with; verification starts here.
    origin: ChainCheckpoint,
    /// Last committed link.
    head: ChainCheckpoint,
}

/// Owns the committed head of every issuer's chain.
///
/// Heads move forward only through [`ChainManager::commit`], which refuses
/// any pending link whose predecessor is no longer the head. Issuers are
/// independent of each other.
#[derive(Debug, Default)]
pub struct ChainManager {
    chains: RwLock<HashMap<String, IssuerChain>>,
}

/// Canonical map key for an issuer NIF.
pub fn normalize_issuer(tax_id: &str) -> String {
    normalize_tax_id(tax_id)
}

impl ChainManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize an issuer's chain, or fast-forward it to a newer checkpoint.
    ///
    /// Seeding never moves a chain backwards: a checkpoint behind the current
    /// head, or at the same index with a different fingerprint, is a conflict.
    pub fn seed(&self, issuer: &str, seed: ChainSeed) -> Result<ChainCheckpoint, VerifactuError> {
        let key = normalize_issuer(issuer);
        let checkpoint = match seed {
            ChainSeed::Genesis => ChainCheckpoint::genesis(key.clone()),
            ChainSeed::Resume(mut cp) => {
                cp.issuer = normalize_issuer(&cp.issuer);
                check_resumable(&key, &cp)?;
                cp
            }
        };

        let mut chains = self.chains.write();
        if let Some(existing) = chains.get_mut(&key) {
            let head = &existing.head;
            if checkpoint.sequence_index < head.sequence_index
                || (checkpoint.sequence_index == head.sequence_index
                    && checkpoint.fingerprint != head.fingerprint)
            {
                warn!(
                    issuer = %key,
                    head = head.sequence_index,
                    seed = checkpoint.sequence_index,
                    "refusing to reseed chain behind its head"
                );
                return Err(VerifactuError::ChainConflict {
                    issuer: key,
                    expected: head.sequence_index,
                    actual: checkpoint.sequence_index,
                });
            }
            if checkpoint.sequence_index > head.sequence_index {
                info!(
                    issuer = %key,
                    from = head.sequence_index,
                    to = checkpoint.sequence_index,
                    "fast-forwarding chain to newer checkpoint"
                );
                existing.origin = checkpoint.clone();
                existing.head = checkpoint.clone();
            }
            return Ok(existing.head.clone());
        }

        debug!(issuer = %key, sequence = checkpoint.sequence_index, "chain seeded");
        chains.insert(
            key,
            IssuerChain {
                origin: checkpoint.clone(),
                head: checkpoint.clone(),
            },
        );
        Ok(checkpoint)
    }

    pub fn is_initialized(&self, issuer: &str) -> bool {
        self.chains.read().contains_key(&normalize_issuer(issuer))
    }

    /// Last committed state of an issuer's chain, for persistence.
    pub fn checkpoint(&self, issuer: &str) -> Option<ChainCheckpoint> {
        self.chains
            .read()
            .get(&normalize_issuer(issuer))
            .map(|c| c.head.clone())
    }

    /// Issuers with an initialized chain.
    pub fn issuers(&self) -> Vec<String> {
        let mut issuers: Vec<String> = self.chains.read().keys().cloned().collect();
        issuers.sort();
        issuers
    }

    /// Compute the link `record` would get against the committed head.
    pub fn compute_link(&self, record: &Record) -> Result<ChainLink, VerifactuError> {
        let record = record.clone().normalized();
        let canonical = canonicalize(&record);
        let head = self.head(&record.issuer().tax_id)?;
        ChainLink::next(&head, &record, &canonical)
    }

    /// Bind `record` to the next would-be link without mutating committed state.
    ///
    /// The record is [normalized](Record::normalized) first; the pending
    /// submission carries the normalized form.
    pub fn tentative_advance(&self, record: Record) -> Result<PendingSubmission, VerifactuError> {
        let record = record.normalized();
        let canonical = canonicalize(&record);
        let head = self.head(&record.issuer().tax_id)?;
        let link = ChainLink::next(&head, &record, &canonical)?;
        debug!(
            issuer = %link.issuer,
            sequence = link.sequence_index,
            fingerprint = %link.fingerprint,
            previous = %link.previous_fingerprint,
            "tentative link computed"
        );
        Ok(PendingSubmission {
            record,
            link,
            canonical,
            previous: head.record,
        })
    }

    /// Advance the issuer's head to `pending`'s link.
    ///
    /// Fails with [`VerifactuError::ChainConflict`] if the head moved since
    /// the link was computed; the committed state is left untouched.
    pub fn commit(&self, pending: &PendingSubmission) -> Result<ChainCheckpoint, VerifactuError> {
        let link = &pending.link;
        let mut chains = self.chains.write();
        let chain = chains
            .get_mut(&link.issuer)
            .ok_or_else(|| VerifactuError::ChainNotInitialized {
                issuer: link.issuer.clone(),
            })?;

        let head = &chain.head;
        if head.sequence_index.checked_add(1) != Some(link.sequence_index)
            || head.fingerprint != link.previous_fingerprint
        {
            warn!(
                issuer = %link.issuer,
                head = head.sequence_index,
                pending = link.sequence_index,
                "commit refused, chain head moved"
            );
            return Err(VerifactuError::ChainConflict {
                issuer: link.issuer.clone(),
                expected: link.sequence_index.saturating_sub(1),
                actual: head.sequence_index,
            });
        }

        chain.head = ChainCheckpoint::from_link(link);
        info!(
            issuer = %link.issuer,
            sequence = link.sequence_index,
            fingerprint = %link.fingerprint,
            "chain advanced"
        );
        Ok(chain.head.clone())
    }

    /// Recompute `history` from the issuer's origin checkpoint.
    ///
    /// `history` must start with the first link committed after the seed.
    pub fn verify_chain(
        &self,
        issuer: &str,
        history: &[ChainEntry],
    ) -> Result<ChainVerification, VerifactuError> {
        let key = normalize_issuer(issuer);
        let origin = self
            .chains
            .read()
            .get(&key)
            .map(|c| c.origin.clone())
            .ok_or(VerifactuError::ChainNotInitialized { issuer: key })?;
        Ok(verify_links(&origin, history))
    }

    fn head(&self, issuer: &str) -> Result<ChainCheckpoint, VerifactuError> {
        let key = normalize_issuer(issuer);
        self.chains
            .read()
            .get(&key)
            .map(|c| c.head.clone())
            .ok_or(VerifactuError::ChainNotInitialized { issuer: key })
    }
}

fn check_resumable(issuer: &str, cp: &ChainCheckpoint) -> Result<(), VerifactuError> {
    if cp.issuer != issuer {
        return Err(VerifactuError::Config(format!(
            "checkpoint belongs to issuer {}, not {issuer}",
            cp.issuer
        )));
    }
    if cp.sequence_index == 0 && !cp.is_genesis() {
        return Err(VerifactuError::Config(
            "checkpoint at index 0 must carry the genesis fingerprint".into(),
        ));
    }
    if cp.sequence_index == u64::MAX {
        return Err(VerifactuError::Config(
            "checkpoint sequence index leaves no room for another record".into(),
        ));
    }
    if cp.sequence_index > 0 && (cp.fingerprint.is_genesis() || cp.record.is_none()) {
        return Err(VerifactuError::Config(format!(
            "checkpoint at index {} needs a fingerprint and the last record id",
            cp.sequence_index
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BreakReason, Fingerprint, compute_fingerprint};
    use crate::core::{InvoiceRecord, Issuer, TaxLine};
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    const NIF: &str = "B12345674";

    fn invoice(number: &str) -> Record {
        let at = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 4, 10, 0, 0)
            .unwrap();
        InvoiceRecord::new(
            Issuer::new(NIF, "Empresa"),
            number,
            NaiveDate::from_ymd_opt(2024, 11, 4).unwrap(),
            "Venta",
            at,
        )
        .add_line(TaxLine::general(dec!(21), dec!(100), dec!(21)))
        .into()
    }

    #[test]
    fn uninitialized_issuer_is_refused() {
        let chain = ChainManager::new();
        let err = chain.tentative_advance(invoice("001")).unwrap_err();
        assert!(matches!(err, VerifactuError::ChainNotInitialized { .. }));
    }

    #[test]
    fn tentative_advance_does_not_mutate() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();
        let a = chain.tentative_advance(invoice("001")).unwrap();
        let b = chain.tentative_advance(invoice("001")).unwrap();
        assert_eq!(a.link(), b.link());
        assert!(chain.checkpoint(NIF).unwrap().is_genesis());
    }

    #[test]
    fn commit_advances_and_chains() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();

        let first = chain.tentative_advance(invoice("001")).unwrap();
        assert!(first.previous_record().is_none());
        chain.commit(&first).unwrap();

        let second = chain.tentative_advance(invoice("002")).unwrap();
        assert_eq!(second.link().sequence_index, 2);
        assert_eq!(second.link().previous_fingerprint, first.link().fingerprint);
        assert_eq!(second.previous_record(), Some(&first.link().record));
    }

    #[test]
    fn stale_pending_conflicts() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();
        let a = chain.tentative_advance(invoice("001")).unwrap();
        let b = chain.tentative_advance(invoice("002")).unwrap();
        chain.commit(&a).unwrap();

        let err = chain.commit(&b).unwrap_err();
        assert_eq!(
            err,
            VerifactuError::ChainConflict {
                issuer: NIF.into(),
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(chain.checkpoint(NIF).unwrap().fingerprint, a.link().fingerprint);
    }

    #[test]
    fn double_commit_conflicts() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();
        let a = chain.tentative_advance(invoice("001")).unwrap();
        chain.commit(&a).unwrap();
        assert!(chain.commit(&a).is_err());
        assert_eq!(chain.checkpoint(NIF).unwrap().sequence_index, 1);
    }

    #[test]
    fn resume_from_checkpoint() {
        let prev = compute_fingerprint(&Fingerprint::genesis(), b"earlier");
        let cp = ChainCheckpoint {
            issuer: "b12345674".into(),
            sequence_index: 41,
            fingerprint: prev.clone(),
            record: Some(RecordId {
                number: "000".into(),
                issue_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            }),
        };
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Resume(cp)).unwrap();

        let pending = chain.tentative_advance(invoice("001")).unwrap();
        assert_eq!(pending.link().sequence_index, 42);
        assert_eq!(pending.link().previous_fingerprint, prev);
    }

    #[test]
    fn resume_requires_record_id() {
        let cp = ChainCheckpoint {
            issuer: NIF.into(),
            sequence_index: 3,
            fingerprint: compute_fingerprint(&Fingerprint::genesis(), b"x"),
            record: None,
        };
        let chain = ChainManager::new();
        assert!(matches!(
            chain.seed(NIF, ChainSeed::Resume(cp)),
            Err(VerifactuError::Config(_))
        ));
    }

    fn resume_at(sequence_index: u64) -> ChainCheckpoint {
        ChainCheckpoint {
            issuer: NIF.into(),
            sequence_index,
            fingerprint: compute_fingerprint(&Fingerprint::genesis(), b"x"),
            record: Some(RecordId {
                number: "000".into(),
                issue_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            }),
        }
    }

    #[test]
    fn resume_at_last_index_is_refused() {
        let chain = ChainManager::new();
        assert!(matches!(
            chain.seed(NIF, ChainSeed::Resume(resume_at(u64::MAX))),
            Err(VerifactuError::Config(_))
        ));
        assert!(!chain.is_initialized(NIF));
    }

    #[test]
    fn advance_past_last_index_is_an_error() {
        let chain = ChainManager::new();
        chain
            .seed(NIF, ChainSeed::Resume(resume_at(u64::MAX - 1)))
            .unwrap();
        let last = chain.tentative_advance(invoice("001")).unwrap();
        assert_eq!(last.link().sequence_index, u64::MAX);
        chain.commit(&last).unwrap();

        assert!(matches!(
            chain.tentative_advance(invoice("002")),
            Err(VerifactuError::Config(_))
        ));
        assert!(matches!(
            chain.compute_link(&invoice("002")),
            Err(VerifactuError::Config(_))
        ));
        assert_eq!(chain.checkpoint(NIF).unwrap().sequence_index, u64::MAX);
    }

    #[test]
    fn padded_identity_is_normalized_before_hashing() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();
        let first = chain.tentative_advance(invoice("001 ")).unwrap();
        assert_eq!(first.link().record.number, "001");
        chain.commit(&first).unwrap();

        let plain = ChainManager::new();
        plain.seed(NIF, ChainSeed::Genesis).unwrap();
        let reference = plain.tentative_advance(invoice("001")).unwrap();
        assert_eq!(first.link().fingerprint, reference.link().fingerprint);

        let second = chain.tentative_advance(invoice("002")).unwrap();
        assert_eq!(second.previous_record().unwrap().number, "001");
    }

    #[test]
    fn reseed_behind_head_conflicts() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();
        let a = chain.tentative_advance(invoice("001")).unwrap();
        chain.commit(&a).unwrap();

        assert!(chain.seed(NIF, ChainSeed::Genesis).is_err());
        // reseeding with the current head is a no-op
        let head = chain.checkpoint(NIF).unwrap();
        assert_eq!(chain.seed(NIF, ChainSeed::Resume(head.clone())).unwrap(), head);
    }

    #[test]
    fn verify_detects_tampering() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();
        let mut history = Vec::new();
        for n in ["001", "002", "003"] {
            let p = chain.tentative_advance(invoice(n)).unwrap();
            chain.commit(&p).unwrap();
            history.push(p.into_entry());
        }
        assert_eq!(
            chain.verify_chain(NIF, &history).unwrap(),
            ChainVerification::Intact { verified: 3 }
        );

        if let Record::Registration(r) = &mut history[1].record {
            r.total_amount = dec!(999);
        }
        assert_eq!(
            chain.verify_chain(NIF, &history).unwrap(),
            ChainVerification::Broken {
                index: 2,
                reason: BreakReason::FingerprintMismatch
            }
        );
    }

    #[test]
    fn verify_detects_gap() {
        let chain = ChainManager::new();
        chain.seed(NIF, ChainSeed::Genesis).unwrap();
        let mut history = Vec::new();
        for n in ["001", "002", "003"] {
            let p = chain.tentative_advance(invoice(n)).unwrap();
            chain.commit(&p).unwrap();
            history.push(p.into_entry());
        }
        history.remove(1);
        let result = chain.verify_chain(NIF, &history).unwrap();
        assert_eq!(
            result,
            ChainVerification::Broken {
                index: 3,
                reason: BreakReason::SequenceGap
            }
        );
    }
}
