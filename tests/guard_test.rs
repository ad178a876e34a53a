//! Guard middleware tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{orchestrator, orchestrator_with, request, FailingEmbedder, SlowEmbedder};
use vlayer::domain::models::Config;
use vlayer::services::{Candidate, Guard, Rejection};
use vlayer::{Action, DomainError};

#[tokio::test]
async fn test_safe_output_is_released() {
    let (orchestrator, _) = orchestrator(Config::default());
    let guard = Guard::new(orchestrator);

    let accepted = guard
        .protect("tenant-a", || async {
            Candidate {
                output: "move 10 units".to_string(),
                request: request(&["A", "A", "A"]),
            }
        })
        .await
        .unwrap();

    assert_eq!(accepted.output, "move 10 units");
    assert_eq!(accepted.result.action(), Action::Allow);
    assert!(!accepted.is_caution());
    assert!(!accepted.is_degraded());
}

#[tokio::test]
async fn test_caution_is_released_with_flag() {
    let mut config = Config::default();
    config.budget.sync_ms = 20;
    let (orchestrator, _) = orchestrator_with(
        config,
        Arc::new(SlowEmbedder {
            delay: Duration::from_millis(100),
        }),
    );

    let accepted = Guard::new(orchestrator)
        .protect("tenant-a", || async {
            Candidate {
                output: 42_u32,
                request: request(&["A", "A", "A"]),
            }
        })
        .await
        .unwrap();

    assert_eq!(accepted.output, 42);
    assert!(accepted.is_caution());
    assert!(accepted.is_degraded());
}

#[tokio::test]
async fn test_bypassed_allow_is_degraded_but_not_caution() {
    let (orchestrator, _) = orchestrator_with(Config::default(), Arc::new(FailingEmbedder));
    for _ in 0..5 {
        orchestrator
            .validate("tenant-a", request(&["A", "A", "A"]))
            .await
            .unwrap();
    }

    let accepted = Guard::new(orchestrator)
        .protect("tenant-a", || async {
            Candidate {
                output: "rebalance",
                request: request(&["A", "A", "A"]),
            }
        })
        .await
        .unwrap();

    assert_eq!(accepted.result.action(), Action::Allow);
    assert_eq!(accepted.result.degraded_reason(), Some("circuit_open"));
    assert!(accepted.is_degraded());
    assert!(!accepted.is_caution());
}

#[tokio::test]
async fn test_blocked_output_is_withheld() {
    let (orchestrator, _) = orchestrator(Config::default());

    let rejection = Guard::new(orchestrator)
        .protect("tenant-a", || async {
            Candidate {
                output: "liquidate everything",
                request: request(&["A", "A", "A"]).with_financial(-50_000.0),
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(rejection, Rejection::Blocked(_)));
    assert!(rejection.result().unwrap().has_violation("value_at_risk"));
    assert!(rejection.to_string().contains("1 violation(s)"));
}

#[tokio::test]
async fn test_review_and_invalid_input() {
    let (orchestrator, _) = orchestrator(Config::default());
    let guard = Guard::new(orchestrator);

    let review = guard
        .protect("tenant-a", || async {
            Candidate {
                output: (),
                request: request(&["A", "A", "A"]).with_metric("leverage_ratio", 3.1),
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(review, Rejection::Review(_)));

    let invalid = guard
        .protect("tenant-a", || async {
            Candidate {
                output: (),
                request: request(&["A"]),
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(
        invalid,
        Rejection::InvalidInput(DomainError::InvalidSampleCount { actual: 1, .. })
    ));
    assert!(invalid.result().is_none());
}
