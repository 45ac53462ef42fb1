//! Failure classification and retry/backoff decisions.
//!
//! Which failures are retryable is fixed by the protocol; how long to wait
//! and how many times to try again is configurable per retryable kind.
//! Each kind's retry bound is counted on its own within a submission.
//!
//! | Kind | Retryable | Backoff | Max retries |
//! |------|-----------|---------|-------------|
//! | Transient network | yes | 1s | 3 |
//! | Timeout | yes | min(timeout, 5s) | 2 |
//! | TLS / security | no | — | 0 |
//! | SOAP fault | no | — | 0 |
//! | Application rejection | no | — | 0 |
//! | Service unavailable | yes | 30s | 5 |
//! | Authentication failed | no | — | 0 |

mod policy;

pub use policy::{ErrorClass, RetryDecision, RetryPolicy, RetryRule, RetryState, classify};
