//! Submission orchestrator.
//!
//! [`VerifactuClient`] ties the pieces together for each record:
//!
//! 1. validate the record and make sure the issuer's chain is seeded
//! 2. take the issuer lock and compute the tentative link
//! 3. build the envelope once
//! 4. send it under a hard deadline, retrying per [`RetryPolicy`](crate::retry::RetryPolicy)
//! 5. commit the link on acceptance and persist the checkpoint
//!
//! The issuer lock is held from step 2 until the record is committed or
//! discarded, backoff sleeps included. Submissions for one issuer are
//! strictly serialized; different issuers never wait on each other.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo(invoice: verifactu::InvoiceRecord) -> Result<(), verifactu::VerifactuError> {
//! use std::sync::Arc;
//! use verifactu::chain::ChainSeed;
//! use verifactu::client::{ClientConfig, JsonFileChainStore, SubmissionOutcome, VerifactuClient};
//! use verifactu::soap::ClientIdentity;
//!
//! let identity = ClientIdentity::from_pem_file("certs/representante.pem")?;
//! let client = VerifactuClient::connect(ClientConfig::default(), &identity)?
//!     .with_store(Arc::new(JsonFileChainStore::new("state/chains")));
//!
//! if client.checkpoint(&invoice.issuer.tax_id).await?.is_none() {
//!     client.seed(&invoice.issuer.tax_id, ChainSeed::Genesis).await?;
//! }
//!
//! let report = client.submit(invoice).await?;
//! match report.outcome {
//!     SubmissionOutcome::Accepted(receipt) => println!("CSV {:?}", receipt.csv),
//!     SubmissionOutcome::Rejected { code, description } => eprintln!("{code}: {description}"),
//!     SubmissionOutcome::Failed(err) => eprintln!("gave up after {} attempts: {err}", report.attempts),
//! }
//! # Ok(()) }
//! ```

mod config;
mod file_store;
mod locks;
mod orchestrator;

pub use config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT};
pub use file_store::JsonFileChainStore;
pub use locks::IssuerLocks;
pub use orchestrator::{
    Receipt, StatusOutcome, StatusReport, SubmissionOutcome, SubmissionReport, VerifactuClient,
};
