use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::config::ClientConfig;
use super::locks::IssuerLocks;
use crate::chain::{
    ChainCheckpoint, ChainManager, ChainSeed, ChainStore, Fingerprint, PendingSubmission,
    normalize_issuer,
};
use crate::core::*;
use crate::retry::{RetryDecision, RetryState};
use crate::soap::{
    ClientIdentity, DUPLICATE_RECORD_CODE, HttpTransport, RegisteredRecord, SoapEnvelope,
    SoapResponse, StatusQuery, Transport, Verdict, parse_query_response,
    parse_registration_response, query_envelope, registration_envelope,
};

/// Proof of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    /// Código Seguro de Verificación; absent when acceptance was inferred
    /// from a duplicate-record answer.
    pub csv: Option<String>,
    /// The chain head after commit.
    pub checkpoint: ChainCheckpoint,
    /// Whether the configured store persisted `checkpoint`.
    pub checkpoint_saved: bool,
    /// Code and description when the record was accepted with errors.
    pub warning: Option<(String, String)>,
    /// Authority-requested pause before the next submission.
    pub wait_before_next: Option<Duration>,
    /// Acceptance inferred from a duplicate-record rejection on a retry.
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Accepted(Receipt),
    /// Business rejection; the chain did not advance.
    Rejected { code: String, description: String },
    /// Gave up without a verdict; the chain did not advance.
    Failed(VerifactuError),
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReport {
    pub issuer: String,
    pub record: RecordId,
    /// Index the record was (or would have been) committed at.
    pub sequence_index: u64,
    pub fingerprint: Fingerprint,
    pub committed: bool,
    pub attempts: u32,
    pub elapsed: Duration,
    pub outcome: SubmissionOutcome,
}

impl SubmissionReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, SubmissionOutcome::Accepted(_))
    }

    /// Collapse into the receipt, with rejections as [`VerifactuError::Rejected`].
    pub fn into_result(self) -> Result<Receipt, VerifactuError> {
        match self.outcome {
            SubmissionOutcome::Accepted(receipt) => Ok(receipt),
            SubmissionOutcome::Rejected { code, description } => {
                Err(VerifactuError::Rejected { code, description })
            }
            SubmissionOutcome::Failed(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    Found {
        records: Vec<RegisteredRecord>,
        has_more: bool,
    },
    NotFound,
    Failed(VerifactuError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub attempts: u32,
    pub elapsed: Duration,
    pub outcome: StatusOutcome,
}

/// Chains, submits and tracks records for any number of issuers.
pub struct VerifactuClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    chain: Arc<ChainManager>,
    locks: IssuerLocks,
    store: Option<Arc<dyn ChainStore>>,
}

impl VerifactuClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            chain: Arc::new(ChainManager::new()),
            locks: IssuerLocks::new(),
            store: None,
        }
    }

    /// Client over mutual-TLS HTTPS to the configured endpoint.
    ///
    /// To rotate certificates at runtime, build the [`HttpTransport`]
    /// yourself, keep an `Arc` to it and pass it to [`new`](Self::new).
    pub fn connect(config: ClientConfig, identity: &ClientIdentity) -> Result<Self, VerifactuError> {
        config.check()?;
        let transport = HttpTransport::new(config.endpoint.url(), identity)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Persist every committed head to `store` and resume chains from it.
    pub fn with_store(mut self, store: Arc<dyn ChainStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share chain state with another component.
    pub fn with_chain(mut self, chain: Arc<ChainManager>) -> Self {
        self.chain = chain;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn chain(&self) -> &ChainManager {
        &self.chain
    }

    /// Seed an issuer's chain and persist the seed.
    pub async fn seed(&self, issuer: &str, seed: ChainSeed) -> Result<ChainCheckpoint, VerifactuError> {
        let _guard = self.locks.acquire(issuer).await;
        let checkpoint = self.chain.seed(issuer, seed)?;
        if let Some(store) = &self.store {
            store.save(&checkpoint).await?;
        }
        Ok(checkpoint)
    }

    /// Committed head of an issuer, falling back to the store.
    pub async fn checkpoint(&self, issuer: &str) -> Result<Option<ChainCheckpoint>, VerifactuError> {
        if let Some(cp) = self.chain.checkpoint(issuer) {
            return Ok(Some(cp));
        }
        match &self.store {
            Some(store) => store.load(issuer).await,
            None => Ok(None),
        }
    }

    /// Register an invoice.
    ///
    /// Returns `Err` only for failures detected before anything is sent
    /// (validation, unseeded chain, envelope building). Everything after
    /// that is reported in [`SubmissionReport::outcome`].
    #[instrument(skip(self, record), fields(issuer = %record.issuer.tax_id, number = %record.number))]
    pub async fn submit(&self, record: InvoiceRecord) -> Result<SubmissionReport, VerifactuError> {
        self.submit_record(Record::Registration(record)).await
    }

    /// Register the cancellation of a previously registered invoice.
    #[instrument(skip(self, record), fields(issuer = %record.issuer.tax_id, number = %record.number))]
    pub async fn cancel(&self, record: CancellationRecord) -> Result<SubmissionReport, VerifactuError> {
        self.submit_record(Record::Cancellation(record)).await
    }

    async fn submit_record(&self, record: Record) -> Result<SubmissionReport, VerifactuError> {
        let errors = validate_record(&record);
        if !errors.is_empty() {
            warn!(errors = errors.len(), "record failed validation");
            return Err(VerifactuError::Validation(errors));
        }

        let issuer = normalize_issuer(&record.issuer().tax_id);
        let _guard = self.locks.acquire(&issuer).await;
        self.ensure_initialized(&issuer).await?;

        let pending = self.chain.tentative_advance(record)?;
        let envelope = registration_envelope(&pending, &self.config.software)?;

        let started = Instant::now();
        let mut attempts = 0u32;
        let mut retries = RetryState::new();

        let outcome = loop {
            attempts += 1;
            let result = self.attempt(&envelope).await.and_then(|response| {
                let parsed = parse_registration_response(&response.document)?;
                let verdict = parsed.verdict()?;
                Ok((parsed, verdict))
            });

            match result {
                Ok((parsed, Verdict::Accepted { warning })) => {
                    if let Some((code, description)) = &warning {
                        warn!(%code, %description, "record accepted with errors");
                    }
                    break self
                        .accept(&pending, parsed.csv, warning, parsed.wait, false)
                        .await;
                }
                Ok((_, Verdict::Rejected { code, description }))
                    if code == DUPLICATE_RECORD_CODE && attempts > 1 =>
                {
                    info!(attempts, "duplicate on retry, earlier attempt was registered");
                    break self
                        .accept(&pending, None, Some((code, description)), None, true)
                        .await;
                }
                Ok((_, Verdict::Rejected { code, description })) => {
                    warn!(%code, %description, attempts, "record rejected");
                    break SubmissionOutcome::Rejected { code, description };
                }
                Err(err) => {
                    match retries.next(&self.config.retry, &err) {
                        RetryDecision::Retry(delay) => {
                            warn!(
                                error = %err,
                                kind = %err.kind(),
                                attempt = attempts,
                                ?delay,
                                "attempt failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp(err) => {
                            error!(error = %err, kind = %err.kind(), attempts, "giving up");
                            break SubmissionOutcome::Failed(err);
                        }
                    }
                }
            }
        };

        let link = pending.link();
        Ok(SubmissionReport {
            issuer: link.issuer.clone(),
            record: link.record.clone(),
            sequence_index: link.sequence_index,
            fingerprint: link.fingerprint.clone(),
            committed: matches!(outcome, SubmissionOutcome::Accepted(_)),
            attempts,
            elapsed: started.elapsed(),
            outcome,
        })
    }

    async fn accept(
        &self,
        pending: &PendingSubmission,
        csv: Option<String>,
        warning: Option<(String, String)>,
        wait_before_next: Option<Duration>,
        duplicate: bool,
    ) -> SubmissionOutcome {
        let checkpoint = match self.chain.commit(pending) {
            Ok(cp) => cp,
            Err(err) => {
                error!(error = %err, "accepted by the authority but local commit failed");
                return SubmissionOutcome::Failed(err);
            }
        };

        let checkpoint_saved = match &self.store {
            Some(store) => match store.save(&checkpoint).await {
                Ok(()) => true,
                Err(err) => {
                    error!(
                        error = %err,
                        sequence = checkpoint.sequence_index,
                        "checkpoint not persisted"
                    );
                    false
                }
            },
            None => false,
        };

        SubmissionOutcome::Accepted(Receipt {
            csv,
            checkpoint,
            checkpoint_saved,
            warning,
            wait_before_next,
            duplicate,
        })
    }

    /// Query the authority's registry. Never touches chain state.
    #[instrument(skip(self, query), fields(issuer = %query.issuer.tax_id, year = query.year, month = query.month))]
    pub async fn check_status(&self, query: &StatusQuery) -> Result<StatusReport, VerifactuError> {
        let envelope = query_envelope(query)?;
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut retries = RetryState::new();

        let outcome = loop {
            attempts += 1;
            let result = self
                .attempt(&envelope)
                .await
                .and_then(|response| parse_query_response(&response.document));
            match result {
                Ok(resp) if resp.records.is_empty() => break StatusOutcome::NotFound,
                Ok(resp) => {
                    debug!(records = resp.records.len(), has_more = resp.has_more, "query answered");
                    break StatusOutcome::Found {
                        records: resp.records,
                        has_more: resp.has_more,
                    };
                }
                Err(err) => match retries.next(&self.config.retry, &err) {
                    RetryDecision::Retry(delay) => {
                        warn!(error = %err, attempt = attempts, ?delay, "query failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp(err) => {
                        error!(error = %err, attempts, "query failed");
                        break StatusOutcome::Failed(err);
                    }
                },
            }
        };

        Ok(StatusReport {
            attempts,
            elapsed: started.elapsed(),
            outcome,
        })
    }

    /// Seed an unseeded issuer from the newest record the authority holds.
    ///
    /// The authority does not report chain positions, so the caller supplies
    /// the `sequence_index` of that record in its own books.
    #[instrument(skip(self, query), fields(issuer = %query.issuer.tax_id))]
    pub async fn recover_chain(
        &self,
        query: &StatusQuery,
        sequence_index: u64,
    ) -> Result<ChainCheckpoint, VerifactuError> {
        let issuer = normalize_issuer(&query.issuer.tax_id);
        if let Some(cp) = self.chain.checkpoint(&issuer) {
            return Err(VerifactuError::Config(format!(
                "chain for {issuer} already initialized at {}",
                cp.sequence_index
            )));
        }

        let records = match self.check_status(query).await?.outcome {
            StatusOutcome::Found { records, .. } => records,
            StatusOutcome::NotFound => {
                return Err(VerifactuError::Config(format!(
                    "authority holds no records for {issuer} in {}-{:02}",
                    query.year, query.month
                )));
            }
            StatusOutcome::Failed(err) => return Err(err),
        };

        let latest = latest_record(&records)
            .ok_or_else(|| VerifactuError::Xml("no record carries a fingerprint".into()))?;
        let (Some(fingerprint), Some(issue_date)) = (&latest.fingerprint, latest.issue_date) else {
            return Err(VerifactuError::Xml(format!(
                "record {} lacks fingerprint or issue date",
                latest.number
            )));
        };

        let checkpoint = ChainCheckpoint {
            issuer: issuer.clone(),
            sequence_index,
            fingerprint: fingerprint.clone(),
            record: Some(RecordId {
                number: latest.number.clone(),
                issue_date,
            }),
        };
        info!(number = %latest.number, sequence = sequence_index, "chain recovered from authority");
        self.seed(&issuer, ChainSeed::Resume(checkpoint)).await
    }

    async fn ensure_initialized(&self, issuer: &str) -> Result<(), VerifactuError> {
        if self.chain.is_initialized(issuer) {
            return Ok(());
        }
        let stored = match &self.store {
            Some(store) => store.load(issuer).await?,
            None => None,
        };
        match stored {
            Some(cp) => {
                info!(issuer, sequence = cp.sequence_index, "chain resumed from store");
                self.chain.seed(issuer, ChainSeed::Resume(cp))?;
                Ok(())
            }
            None => Err(VerifactuError::ChainNotInitialized {
                issuer: issuer.to_string(),
            }),
        }
    }

    async fn attempt(&self, envelope: &SoapEnvelope) -> Result<SoapResponse, VerifactuError> {
        let deadline = self.config.request_timeout;
        match tokio::time::timeout(deadline, self.transport.send(envelope, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(VerifactuError::Timeout { after: deadline }),
        }
    }
}

/// Newest fingerprinted record: latest generation time, else last listed.
fn latest_record(records: &[RegisteredRecord]) -> Option<&RegisteredRecord> {
    let candidates = records.iter().filter(|r| r.fingerprint.is_some());
    if records.iter().all(|r| r.generated_at.is_some()) {
        candidates.max_by_key(|r| r.generated_at)
    } else {
        candidates.last()
    }
}
