//! Webhook rule tests against mock HTTP servers.
//!
//! Test coverage:
//! - POST and GET wire shapes of a delegated call
//! - Approve / deny verdicts flowing into decisions
//! - Non-2xx and malformed responses treated as unreachable
//! - Hard timeouts failing closed unless the rule is advisory

mod common;

use mockito::{Matcher, Server};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{request, AxisEmbedder};
use vlayer::adapters::webhook::HttpRuleDelegate;
use vlayer::domain::models::{Config, HttpMethod};
use vlayer::domain::ports::{DelegateCall, RuleDelegate};
use vlayer::infrastructure::rules::RuleLoader;
use vlayer::services::{ConstraintEngine, RuleRegistry, RuleSet};
use vlayer::{Action, SeverityTier, ValidationOrchestrator};

fn call(url: String, method: HttpMethod) -> DelegateCall {
    DelegateCall {
        rule: "kyc_check".to_string(),
        agent_id: "trader-7".to_string(),
        fields: BTreeMap::from([("proposed_loss".to_string(), 5000.0)]),
        url,
        method,
    }
}

fn webhook_rules(url: &str, extra: &str) -> RuleSet {
    RuleLoader::new(100)
        .load_from_yaml(&format!(
            "agent_id: trader-7\nrules:\n  - name: kyc_check\n    type: webhook\n    url: {url}\n    fields: [proposed_loss]\n{extra}"
        ))
        .unwrap()
}

/// An endpoint that accepts connections and never answers.
async fn hanging_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/kyc")
}

#[tokio::test]
async fn test_post_sends_rule_agent_and_fields() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/kyc")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(serde_json::json!({
            "rule": "kyc_check",
            "agent_id": "trader-7",
            "fields": {"proposed_loss": 5000.0}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"approved": true}"#)
        .create_async()
        .await;

    let delegate = HttpRuleDelegate::new().unwrap();
    let verdict = delegate
        .evaluate(&call(format!("{}/kyc", server.url()), HttpMethod::Post))
        .await
        .unwrap();

    assert!(verdict.approved);
    assert!(verdict.reason.is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_sends_query_parameters() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/kyc")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("rule".into(), "kyc_check".into()),
            Matcher::UrlEncoded("agent_id".into(), "trader-7".into()),
            Matcher::UrlEncoded("proposed_loss".into(), "5000".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"approved": false, "reason": "sanctioned counterparty"}"#)
        .create_async()
        .await;

    let verdict = HttpRuleDelegate::new()
        .unwrap()
        .evaluate(&call(format!("{}/kyc", server.url()), HttpMethod::Get))
        .await
        .unwrap();

    assert!(!verdict.approved);
    assert_eq!(verdict.reason.as_deref(), Some("sanctioned counterparty"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_status_and_malformed_body_are_unreachable() {
    let mut server = Server::new_async().await;
    let _failing = server
        .mock("POST", "/down")
        .with_status(500)
        .create_async()
        .await;
    let _garbled = server
        .mock("POST", "/garbled")
        .with_status(200)
        .with_body("<html>ok</html>")
        .create_async()
        .await;

    let delegate = HttpRuleDelegate::new().unwrap();

    let err = delegate
        .evaluate(&call(format!("{}/down", server.url()), HttpMethod::Post))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "webhook_unreachable");
    assert!(err.to_string().contains("500"));

    let err = delegate
        .evaluate(&call(format!("{}/garbled", server.url()), HttpMethod::Post))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "webhook_unreachable");
    assert!(err.to_string().contains("malformed"));
}

#[tokio::test]
async fn test_denial_is_a_medium_violation_and_sends_to_review() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/kyc")
        .with_status(200)
        .with_body(r#"{"approved": false, "reason": "kyc incomplete"}"#)
        .create_async()
        .await;

    let rules = RuleRegistry::new();
    rules.insert(webhook_rules(&format!("{}/kyc", server.url()), ""));
    let mut config = Config::default();
    config.budget.sync_ms = 1_000;
    config.budget.async_ms = 2_000;
    let orchestrator = ValidationOrchestrator::builder(config, Arc::new(AxisEmbedder))
        .rules(Arc::new(rules))
        .delegate(Arc::new(HttpRuleDelegate::new().unwrap()))
        .build();

    let result = orchestrator
        .validate(
            "tenant-a",
            request(&["A", "A", "A"]).with_agent("trader-7").with_financial(5000.0),
        )
        .await
        .unwrap();

    assert_eq!(result.action(), Action::Review);
    let violation = &result.violations()[0];
    assert_eq!(violation.rule_name(), "kyc_check");
    assert_eq!(violation.tier(), SeverityTier::Medium);
    assert!(violation.message().contains("kyc incomplete"));
}

#[tokio::test]
async fn test_timeout_fails_closed_unless_advisory() {
    let url = hanging_endpoint().await;
    let engine = ConstraintEngine::new(Config::default().constraints)
        .with_delegate(Arc::new(HttpRuleDelegate::new().unwrap()))
        .with_timeout_cap(Duration::from_millis(100));
    let req = request(&["A", "A", "A"]).with_agent("trader-7").with_financial(5000.0);

    let started = std::time::Instant::now();
    let violations = engine
        .evaluate(&req, &webhook_rules(&url, "    timeout_ms: 40\n"))
        .await;
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message().contains("timed out after 40ms"));

    let advisory = engine
        .evaluate(&req, &webhook_rules(&url, "    timeout_ms: 40\n    advisory: true\n"))
        .await;
    assert!(advisory.is_empty());
}

#[tokio::test]
async fn test_critical_declared_severity_blocks() {
    let url = hanging_endpoint().await;
    let rules = RuleRegistry::new();
    rules.insert(webhook_rules(&url, "    timeout_ms: 20\n    severity: critical\n"));
    let orchestrator = ValidationOrchestrator::builder(Config::default(), Arc::new(AxisEmbedder))
        .rules(Arc::new(rules))
        .delegate(Arc::new(HttpRuleDelegate::new().unwrap()))
        .build();

    let result = orchestrator
        .validate("tenant-a", request(&["A", "A", "A"]).with_agent("trader-7"))
        .await
        .unwrap();

    assert_eq!(result.action(), Action::Block);
    assert!(result.has_violation("kyc_check"));
}
