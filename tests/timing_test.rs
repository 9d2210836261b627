//! Integration tests for blind timing audits

mod common;

use argos_audit::audit::timing::{ProbeState, TimingProbe};
use argos_audit::audit::{AuditOptions, Auditor, Format};
use argos_audit::models::IssueElement;
use argos_audit::page::{Element, ElementKind};
use common::{fetch_page, test_check, test_session};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const SEED: &str = "sleep(__TIME__)";

/// Milliseconds slept per unit of the delay argument
const UNIT_MS: u64 = 100;

/// Sleeps `n * UNIT_MS` for a `t` parameter containing the number `n`
fn proportional(request: &Request) -> ResponseTemplate {
    let units: u64 = request
        .url
        .query_pairs()
        .find(|(name, _)| name == "t")
        .map(|(_, value)| value.chars().filter(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0);

    ResponseTemplate::new(200)
        .set_body_string("ok")
        .set_delay(Duration::from_millis(units * UNIT_MS))
}

fn timing_options() -> AuditOptions {
    // delay argument = 200 / 100 = 2 units = 200ms
    AuditOptions::default()
        .with_elements([ElementKind::Link])
        .with_timeout(200)
        .with_timeout_divider(UNIT_MS)
}

#[tokio::test]
async fn test_proportional_delay_is_confirmed() {
    let server = MockServer::start().await;
    Mock::given(path("/sleep"))
        .respond_with(proportional)
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let page = fetch_page(&session, &format!("{}/sleep?t=0", server.uri())).await;
    let auditor = Auditor::new(page, test_check("timing"), Arc::clone(&session));

    assert_eq!(auditor.audit_timeout(SEED, &timing_options()).expect("queued"), 1);
    assert_eq!(auditor.timeout_audit_run().await, 1);

    let results = session.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].element, IssueElement::Link);
    assert_eq!(results[0].var, "t");
    // Resolved delay of the confirmation pass, not the raw seed
    assert_eq!(results[0].injected, "4");
}

#[tokio::test]
async fn test_probes_wait_for_the_timing_run() {
    let server = MockServer::start().await;
    Mock::given(path("/sleep"))
        .respond_with(proportional)
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let page = fetch_page(&session, &format!("{}/sleep?t=0", server.uri())).await;
    let auditor = Auditor::new(page, test_check("timing"), Arc::clone(&session));

    auditor.audit_timeout(SEED, &timing_options()).expect("queued");
    session.run().await;
    assert_eq!(session.request_count(), 1);
    assert_eq!(session.timing.pending(), 1);

    auditor.timeout_audit_run().await;
    assert_eq!(session.timing.pending(), 0);
    // Probe, liveness control and confirmation
    assert_eq!(session.request_count(), 4);
}

#[tokio::test]
async fn test_fast_target_logs_nothing() {
    let server = MockServer::start().await;
    Mock::given(path("/fast"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let page = fetch_page(&session, &format!("{}/fast?t=0", server.uri())).await;
    let auditor = Auditor::new(page, test_check("timing"), Arc::clone(&session));

    auditor.audit_timeout(SEED, &timing_options()).expect("queued");
    assert_eq!(auditor.timeout_audit_run().await, 0);
    assert!(session.results().is_empty());
    // Rejected after the first measurement
    assert_eq!(session.request_count(), 2);
}

#[tokio::test]
async fn test_uniformly_slow_target_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let page = fetch_page(&session, &format!("{}/slow?t=0", server.uri())).await;
    let auditor = Auditor::new(page, test_check("timing"), Arc::clone(&session));

    auditor.audit_timeout(SEED, &timing_options()).expect("queued");
    assert_eq!(auditor.timeout_audit_run().await, 0);
    assert!(session.results().is_empty());
}

#[tokio::test]
async fn test_single_latency_spike_is_rejected() {
    let server = MockServer::start().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    Mock::given(path("/spike"))
        .respond_with(move |_request: &Request| {
            // The page fetch is hit 0; the first probe is hit 1
            let delay = if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                Duration::from_millis(400)
            } else {
                Duration::ZERO
            };
            ResponseTemplate::new(200).set_body_string("ok").set_delay(delay)
        })
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let page = fetch_page(&session, &format!("{}/spike?t=0", server.uri())).await;
    let auditor = Auditor::new(page, test_check("timing"), Arc::clone(&session));

    auditor.audit_timeout(SEED, &timing_options()).expect("queued");
    assert_eq!(auditor.timeout_audit_run().await, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_probe_state_machine() {
    let server = MockServer::start().await;
    Mock::given(path("/sleep"))
        .respond_with(proportional)
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let element = Element::link(
        format!("{}/sleep", server.uri()),
        vec![("t".to_string(), "0".to_string())],
    );

    let mut confirmed = TimingProbe::new(
        Arc::new(test_check("timing")),
        element.clone(),
        "t",
        Format::Straight,
        SEED,
        200,
        UNIT_MS,
    );
    assert_eq!(confirmed.state(), ProbeState::Queued);
    let issue = confirmed.evaluate(session.client()).await.expect("probe failed");
    assert!(issue.is_some());
    assert_eq!(confirmed.state(), ProbeState::Confirmed);

    // The seed ignores the placeholder, so nothing is delayed
    let mut rejected = TimingProbe::new(
        Arc::new(test_check("timing")),
        element,
        "t",
        Format::Straight,
        "sleep(0)",
        200,
        UNIT_MS,
    );
    assert!(rejected.evaluate(session.client()).await.expect("probe failed").is_none());
    assert_eq!(rejected.state(), ProbeState::Rejected);
}
