use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ErrorKind, VerifactuError};

/// Backoff and bound for one retryable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRule {
    /// Wait before the next attempt. For timeouts this is an upper bound on
    /// the elapsed deadline.
    pub delay: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl RetryRule {
    pub const fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

/// Classification of a failure under a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorClass {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub retry_after: Option<Duration>,
    pub max_retries: u32,
    pub cause: VerifactuError,
}

/// What the orchestrator should do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep this long, then resend the same envelope.
    Retry(Duration),
    /// Stop and surface the error.
    GiveUp(VerifactuError),
}

/// Retry bounds for the retryable failure kinds.
///
/// Non-retryable kinds (TLS, SOAP faults, rejections, authentication,
/// validation, chain and configuration errors) are never retried regardless
/// of configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub transient_network: RetryRule,
    pub timeout: RetryRule,
    pub service_unavailable: RetryRule,
    /// Cap on the summed backoff of one submission; `None` for no cap.
    pub max_total_backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient_network: RetryRule::new(Duration::from_secs(1), 3),
            timeout: RetryRule::new(Duration::from_secs(5), 2),
            service_unavailable: RetryRule::new(Duration::from_secs(30), 5),
            max_total_backoff: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that surfaces every failure on the first attempt.
    pub fn no_retries() -> Self {
        Self {
            transient_network: RetryRule::new(Duration::ZERO, 0),
            timeout: RetryRule::new(Duration::ZERO, 0),
            service_unavailable: RetryRule::new(Duration::ZERO, 0),
            max_total_backoff: None,
        }
    }

    pub fn with_transient_network(mut self, delay: Duration, max_retries: u32) -> Self {
        self.transient_network = RetryRule::new(delay, max_retries);
        self
    }

    pub fn with_timeout(mut self, delay_cap: Duration, max_retries: u32) -> Self {
        self.timeout = RetryRule::new(delay_cap, max_retries);
        self
    }

    pub fn with_service_unavailable(mut self, delay: Duration, max_retries: u32) -> Self {
        self.service_unavailable = RetryRule::new(delay, max_retries);
        self
    }

    /// Give up once the summed backoff of a submission would exceed `budget`.
    pub fn with_max_total_backoff(mut self, budget: Duration) -> Self {
        self.max_total_backoff = Some(budget);
        self
    }

    /// Rule for a kind, or `None` if the kind is not retryable.
    pub fn rule_for(&self, kind: ErrorKind) -> Option<RetryRule> {
        match kind {
            ErrorKind::TransientNetwork => Some(self.transient_network),
            ErrorKind::Timeout => Some(self.timeout),
            ErrorKind::ServiceUnavailable => Some(self.service_unavailable),
            ErrorKind::Tls
            | ErrorKind::ProtocolFault
            | ErrorKind::ApplicationRejected
            | ErrorKind::AuthenticationFailed
            | ErrorKind::Validation
            | ErrorKind::Chain
            | ErrorKind::Configuration
            | ErrorKind::Persistence => None,
        }
    }

    pub fn classify(&self, error: &VerifactuError) -> ErrorClass {
        let kind = error.kind();
        match self.rule_for(kind) {
            Some(rule) => {
                let delay = match error {
                    VerifactuError::Timeout { after } => (*after).min(rule.delay),
                    _ => rule.delay,
                };
                ErrorClass {
                    kind,
                    retryable: true,
                    retry_after: Some(delay),
                    max_retries: rule.max_retries,
                    cause: error.clone(),
                }
            }
            None => ErrorClass {
                kind,
                retryable: false,
                retry_after: None,
                max_retries: 0,
                cause: error.clone(),
            },
        }
    }

    /// Decide after a failure, given how many retries of the same kind
    /// already happened. Each kind's bound is counted separately; use
    /// [`RetryState`] to track counts over a whole submission.
    pub fn decide(&self, error: &VerifactuError, retries_so_far: u32) -> RetryDecision {
        self.decide_within(error, retries_so_far, Duration::ZERO)
    }

    /// Like [`decide`](Self::decide), also honoring `max_total_backoff`
    /// given the backoff already spent on this submission.
    pub fn decide_within(
        &self,
        error: &VerifactuError,
        retries_so_far: u32,
        backoff_spent: Duration,
    ) -> RetryDecision {
        let class = self.classify(error);
        let delay = match class.retry_after {
            Some(delay) if class.retryable && retries_so_far < class.max_retries => delay,
            _ => return RetryDecision::GiveUp(class.cause),
        };
        if let Some(budget) = self.max_total_backoff {
            if backoff_spent + delay > budget {
                return RetryDecision::GiveUp(class.cause);
            }
        }
        RetryDecision::Retry(delay)
    }
}

/// Retries spent by one submission: a count per kind plus summed backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    retries: HashMap<ErrorKind, u32>,
    backoff_spent: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide after `error` and, on [`RetryDecision::Retry`], record the
    /// retry against the error's kind.
    pub fn next(&mut self, policy: &RetryPolicy, error: &VerifactuError) -> RetryDecision {
        let kind = error.kind();
        let decision = policy.decide_within(error, self.retries(kind), self.backoff_spent);
        if let RetryDecision::Retry(delay) = &decision {
            *self.retries.entry(kind).or_insert(0) += 1;
            self.backoff_spent += *delay;
        }
        decision
    }

    /// Retries already spent on `kind`.
    pub fn retries(&self, kind: ErrorKind) -> u32 {
        self.retries.get(&kind).copied().unwrap_or(0)
    }

    pub fn backoff_spent(&self) -> Duration {
        self.backoff_spent
    }
}

/// Classify under the default policy.
pub fn classify(error: &VerifactuError) -> ErrorClass {
    RetryPolicy::default().classify(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_delay_is_capped() {
        let class = classify(&VerifactuError::Timeout {
            after: Duration::from_millis(30_000),
        });
        assert!(class.retryable);
        assert_eq!(class.kind, ErrorKind::Timeout);
        assert_eq!(class.retry_after, Some(Duration::from_millis(5_000)));
        assert_eq!(class.max_retries, 2);
    }

    #[test]
    fn short_timeout_waits_its_own_duration() {
        let class = classify(&VerifactuError::Timeout {
            after: Duration::from_millis(1_500),
        });
        assert_eq!(class.retry_after, Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn tls_is_fatal() {
        let class = classify(&VerifactuError::Tls("bad certificate".into()));
        assert!(!class.retryable);
        assert_eq!(class.retry_after, None);
        assert_eq!(class.max_retries, 0);
    }

    #[test]
    fn default_table() {
        let net = classify(&VerifactuError::Connection("refused".into()));
        assert_eq!(net.retry_after, Some(Duration::from_secs(1)));
        assert_eq!(net.max_retries, 3);

        let unavailable = classify(&VerifactuError::ServiceUnavailable {
            status: 503,
            message: String::new(),
        });
        assert_eq!(unavailable.retry_after, Some(Duration::from_secs(30)));
        assert_eq!(unavailable.max_retries, 5);

        for fatal in [
            VerifactuError::SoapFault {
                code: "soapenv:Server".into(),
                message: "x".into(),
            },
            VerifactuError::Rejected {
                code: "1100".into(),
                description: "x".into(),
            },
            VerifactuError::AuthenticationFailed {
                status: 403,
                message: "x".into(),
            },
        ] {
            assert!(!classify(&fatal).retryable, "{fatal} must not retry");
        }
    }

    #[test]
    fn retry_state_counts_each_kind_separately() {
        let policy = RetryPolicy::default();
        let unavailable = VerifactuError::ServiceUnavailable {
            status: 503,
            message: String::new(),
        };
        let timeout = VerifactuError::Timeout {
            after: Duration::from_secs(30),
        };
        let mut state = RetryState::new();
        for _ in 0..3 {
            assert!(matches!(state.next(&policy, &unavailable), RetryDecision::Retry(_)));
        }
        assert_eq!(state.retries(ErrorKind::ServiceUnavailable), 3);
        assert_eq!(state.retries(ErrorKind::Timeout), 0);

        assert_eq!(
            state.next(&policy, &timeout),
            RetryDecision::Retry(Duration::from_secs(5))
        );
        assert_eq!(
            state.next(&policy, &timeout),
            RetryDecision::Retry(Duration::from_secs(5))
        );
        assert_eq!(state.next(&policy, &timeout), RetryDecision::GiveUp(timeout));
        assert_eq!(state.retries(ErrorKind::Timeout), 2);
        assert_eq!(state.backoff_spent(), Duration::from_secs(100));
    }

    #[test]
    fn decide_stops_at_max_retries() {
        let policy = RetryPolicy::default();
        let err = VerifactuError::Network("reset".into());
        for n in 0..3 {
            assert_eq!(
                policy.decide(&err, n),
                RetryDecision::Retry(Duration::from_secs(1))
            );
        }
        assert_eq!(policy.decide(&err, 3), RetryDecision::GiveUp(err));
    }

    #[test]
    fn overrides_change_bounds_not_retryability() {
        let policy = RetryPolicy::default()
            .with_service_unavailable(Duration::from_secs(2), 1)
            .with_transient_network(Duration::from_millis(10), 10);
        let unavailable = VerifactuError::ServiceUnavailable {
            status: 503,
            message: String::new(),
        };
        assert_eq!(
            policy.decide(&unavailable, 0),
            RetryDecision::Retry(Duration::from_secs(2))
        );
        assert!(matches!(
            policy.decide(&unavailable, 1),
            RetryDecision::GiveUp(_)
        ));
        let tls = VerifactuError::Tls("x".into());
        assert!(matches!(policy.decide(&tls, 0), RetryDecision::GiveUp(_)));
    }

    #[test]
    fn budget_cuts_long_backoff_short() {
        let policy = RetryPolicy::default().with_max_total_backoff(Duration::from_secs(45));
        let err = VerifactuError::ServiceUnavailable {
            status: 503,
            message: String::new(),
        };
        assert_eq!(
            policy.decide_within(&err, 0, Duration::ZERO),
            RetryDecision::Retry(Duration::from_secs(30))
        );
        assert!(matches!(
            policy.decide_within(&err, 1, Duration::from_secs(30)),
            RetryDecision::GiveUp(_)
        ));
    }
}
