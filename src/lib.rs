//! # verifactu
//!
//! Client for Spain's Verifactu real-time invoice reporting: builds
//! hash-chained registration and cancellation records, submits them to the
//! AEAT web service over mutual-TLS SOAP, and keeps each issuer's chain in
//! strict sequence across retries, restarts and concurrent callers.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{FixedOffset, NaiveDate, TimeZone};
//! use verifactu::chain::{ChainManager, ChainSeed};
//! use verifactu::core::*;
//! use rust_decimal_macros::dec;
//!
//! let issuer = Issuer::new("B12345674", "Empresa Ejemplo SL");
//! let generated_at = FixedOffset::east_opt(3600).unwrap()
//!     .with_ymd_and_hms(2024, 11, 4, 12, 0, 0).unwrap();
//! let invoice = InvoiceRecord::new(
//!     issuer.clone(),
//!     "001",
//!     NaiveDate::from_ymd_opt(2024, 11, 4).unwrap(),
//!     "Servicios de consultoría",
//!     generated_at,
//! )
//! .recipient("12345678Z", "Cliente SA")
//! .add_line(TaxLine::general(dec!(21), dec!(100), dec!(21)));
//!
//! assert!(validate_record(&Record::Registration(invoice.clone())).is_empty());
//!
//! let chain = ChainManager::new();
//! chain.seed(&issuer.tax_id, ChainSeed::Genesis).unwrap();
//! let pending = chain.tentative_advance(Record::Registration(invoice)).unwrap();
//! assert_eq!(pending.link().sequence_index, 1);
//! chain.commit(&pending).unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Record model, canonical encoding, errors, retry policy, chain state |
//! | `soap` | Envelope building, response parsing, mutual-TLS HTTP transport |
//! | `client` (default) | Submission orchestrator, per-issuer locking, file chain store |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod chain;

#[cfg(feature = "core")]
pub mod retry;

#[cfg(feature = "soap")]
pub mod soap;

#[cfg(feature = "client")]
pub mod client;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
