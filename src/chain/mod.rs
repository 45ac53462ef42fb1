//! Per-issuer cryptographic record chain.
//!
//! Every record an issuer submits is bound to its predecessor by a
//! SHA-256 fingerprint over `previous_fingerprint || canonical(record)`.
//! The [`ChainManager`] owns the last committed link per issuer and only
//! advances it once the authority has accepted the record.
//!
//! # Example
//!
//! ```ignore
//! use verifactu::chain::*;
//!
//! let chain = ChainManager::new();
//! chain.seed("B12345674", ChainSeed::Genesis)?;
//!
//! let pending = chain.tentative_advance(record)?;   // nothing mutated yet
//! // ... send pending, wait for acceptance ...
//! chain.commit(&pending)?;                          // head advances
//!
//! let saved = chain.checkpoint("B12345674");        // persist this
//! ```

mod link;
mod manager;
mod store;

pub use link::{
    BreakReason, ChainCheckpoint, ChainEntry, ChainLink, ChainVerification, Fingerprint,
    compute_fingerprint, verify_links,
};
pub use manager::{ChainManager, ChainSeed, PendingSubmission, normalize_issuer};
pub use store::{ChainStore, MemoryChainStore};
