//! Record model, canonical encoding, and pre-submission validation.
//!
//! These are the pieces every other module consumes: the registration
//! (Alta) and cancellation (Anulación) records, the byte encoding that
//! fingerprints are computed over, the Spanish tax-ID predicate, and the
//! crate-wide error type.

mod canonical;
mod error;
mod tax_id;
mod types;
mod validation;

pub use canonical::{canonicalize, format_amount, format_date, format_timestamp};
pub use error::*;
pub use tax_id::is_valid_tax_id;
pub use types::*;
pub use validation::*;
