//! Retry policy tests.
//!
//! Run with: `cargo test --test retry_tests`

#![cfg(feature = "core")]

use std::time::Duration;

use proptest::prelude::*;
use verifactu::core::*;
use verifactu::retry::*;

fn fatal_errors() -> Vec<VerifactuError> {
    vec![
        VerifactuError::Tls("handshake failure".into()),
        VerifactuError::SoapFault {
            code: "env:Client".into(),
            message: "schema".into(),
        },
        VerifactuError::Rejected {
            code: "1100".into(),
            description: "bad field".into(),
        },
        VerifactuError::AuthenticationFailed {
            status: 403,
            message: "forbidden".into(),
        },
        VerifactuError::Validation(vec![ValidationError::new("number", "empty")]),
        VerifactuError::ChainNotInitialized {
            issuer: "B12345674".into(),
        },
        VerifactuError::Xml("truncated".into()),
    ]
}

#[test]
fn default_table() {
    let policy = RetryPolicy::default();

    let class = policy.classify(&VerifactuError::Connection("refused".into()));
    assert_eq!(class.kind, ErrorKind::TransientNetwork);
    assert_eq!(class.retry_after, Some(Duration::from_secs(1)));
    assert_eq!(class.max_retries, 3);

    let class = policy.classify(&VerifactuError::Timeout {
        after: Duration::from_millis(30_000),
    });
    assert!(class.retryable);
    assert_eq!(class.retry_after, Some(Duration::from_millis(5_000)));
    assert_eq!(class.max_retries, 2);

    let class = policy.classify(&VerifactuError::ServiceUnavailable {
        status: 503,
        message: String::new(),
    });
    assert_eq!(class.retry_after, Some(Duration::from_secs(30)));
    assert_eq!(class.max_retries, 5);
}

#[test]
fn fatal_kinds_are_never_retried() {
    let generous = RetryPolicy::default()
        .with_transient_network(Duration::from_secs(1), 100)
        .with_service_unavailable(Duration::from_secs(1), 100);
    for err in fatal_errors() {
        let class = generous.classify(&err);
        assert!(!class.retryable, "{err} should not be retryable");
        assert_eq!(class.max_retries, 0);
        assert_eq!(generous.decide(&err, 0), RetryDecision::GiveUp(err.clone()));
    }
}

#[test]
fn no_retries_policy_gives_up_immediately() {
    let policy = RetryPolicy::no_retries();
    let err = VerifactuError::Network("reset".into());
    assert_eq!(policy.decide(&err, 0), RetryDecision::GiveUp(err));
}

#[test]
fn policy_from_json() {
    let policy: RetryPolicy = serde_json::from_str(
        r#"{"timeout": {"delay": {"secs": 2, "nanos": 0}, "max_retries": 4},
            "max_total_backoff": {"secs": 120, "nanos": 0}}"#,
    )
    .unwrap();
    assert_eq!(policy.timeout, RetryRule::new(Duration::from_secs(2), 4));
    assert_eq!(policy.transient_network, RetryPolicy::default().transient_network);
    assert_eq!(policy.max_total_backoff, Some(Duration::from_secs(120)));
}

fn retryable_error() -> impl Strategy<Value = VerifactuError> {
    prop_oneof![
        Just(VerifactuError::Connection("refused".into())),
        Just(VerifactuError::Network("reset".into())),
        (1u64..120_000).prop_map(|ms| VerifactuError::Timeout {
            after: Duration::from_millis(ms)
        }),
        prop_oneof![Just(500u16), Just(502), Just(503), Just(504)].prop_map(|status| {
            VerifactuError::ServiceUnavailable {
                status,
                message: String::new(),
            }
        }),
    ]
}

proptest! {
    #[test]
    fn retries_stop_at_the_bound(err in retryable_error(), max in 0u32..8) {
        let policy = RetryPolicy::default()
            .with_transient_network(Duration::from_millis(10), max)
            .with_timeout(Duration::from_millis(10), max)
            .with_service_unavailable(Duration::from_millis(10), max);

        let mut retries = 0;
        while let RetryDecision::Retry(_) = policy.decide(&err, retries) {
            retries += 1;
            prop_assert!(retries <= max);
        }
        prop_assert_eq!(retries, max);
    }

    #[test]
    fn decisions_are_deterministic(err in retryable_error(), n in 0u32..6) {
        let policy = RetryPolicy::default();
        prop_assert_eq!(policy.decide(&err, n), policy.decide(&err, n));
    }

    #[test]
    fn timeout_backoff_never_exceeds_cap(ms in 1u64..600_000) {
        let class = classify(&VerifactuError::Timeout { after: Duration::from_millis(ms) });
        let delay = class.retry_after.unwrap();
        prop_assert!(delay <= Duration::from_secs(5));
        prop_assert!(delay <= Duration::from_millis(ms));
    }

    #[test]
    fn budget_bounds_total_backoff(budget_s in 0u64..300) {
        let budget = Duration::from_secs(budget_s);
        let policy = RetryPolicy::default().with_max_total_backoff(budget);
        let err = VerifactuError::ServiceUnavailable { status: 503, message: String::new() };

        let mut spent = Duration::ZERO;
        let mut retries = 0;
        while let RetryDecision::Retry(delay) = policy.decide_within(&err, retries, spent) {
            spent += delay;
            retries += 1;
        }
        prop_assert!(spent <= budget);
        prop_assert!(retries <= 5);
    }
}
