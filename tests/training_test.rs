//! Integration tests for training and the orchestrated fixpoint

mod common;

use argos_audit::audit::{AuditOptions, Auditor, Format};
use argos_audit::checks::ReflectionCheck;
use argos_audit::models::IssueElement;
use argos_audit::orchestrator::Orchestrator;
use argos_audit::session::Session;
use common::{echoed_inputs, fetch_page, test_check, test_config, test_session, Echo};
use std::sync::Arc;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const SEED: &str = "my_seed";

/// `/train/action` reveals `/train/next` for its default value and
/// `/train/secret` for anything else.
fn action(request: &Request) -> ResponseTemplate {
    let step = request
        .url
        .query_pairs()
        .find(|(name, _)| name == "step")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    let mut body = if step == "1" {
        r#"<a href="/train/next?next=1">next</a>"#.to_string()
    } else {
        r#"<a href="/train/secret?secret=1">secret</a>"#.to_string()
    };
    for (name, value) in echoed_inputs(request) {
        body.push_str(&format!("\n<p>{name}: {value}</p>"));
    }
    ResponseTemplate::new(200).set_body_string(body)
}

async fn training_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(path("/train"))
        .respond_with(Echo::new(r#"<a href="/train/action?step=1">start</a>"#))
        .mount(&server)
        .await;
    Mock::given(path("/train/action"))
        .respond_with(action)
        .mount(&server)
        .await;
    Mock::given(path("/train/next"))
        .respond_with(Echo::new("<html>next</html>"))
        .mount(&server)
        .await;
    Mock::given(path("/train/secret"))
        .respond_with(Echo::new("<html>secret</html>"))
        .mount(&server)
        .await;

    server
}

async fn flushed_after_audit(options: AuditOptions) -> Vec<String> {
    let server = training_server().await;
    let session = test_session(&server.uri());
    let page = fetch_page(&session, &format!("{}/train", server.uri())).await;
    let auditor = Auditor::new(page, test_check("train"), Arc::clone(&session));

    let options = options.with_format([Format::Straight]);
    auditor.audit_links(SEED, &options, None).expect("audit failed");
    session.run().await;

    let pages = session.trainer.flush_pages();
    assert!(session.trainer.flush_pages().is_empty());

    let mut actions: Vec<String> = pages
        .iter()
        .flat_map(|page| page.elements().iter().map(|e| e.action().to_string()))
        .filter(|action| action.ends_with("/train/next") || action.ends_with("/train/secret"))
        .collect();
    actions.sort();
    actions.dedup();
    actions
}

#[tokio::test]
async fn test_default_training_follows_default_values_only() {
    let actions = flushed_after_audit(AuditOptions::default()).await;
    assert_eq!(actions.len(), 1);
    assert!(actions[0].ends_with("/train/next"));
}

#[tokio::test]
async fn test_forced_training_follows_every_response() {
    let actions = flushed_after_audit(AuditOptions::default().with_train(true)).await;
    assert_eq!(actions.len(), 2);
    assert!(actions[0].ends_with("/train/next"));
    assert!(actions[1].ends_with("/train/secret"));
}

#[tokio::test]
async fn test_disabled_training_buffers_nothing() {
    let actions = flushed_after_audit(AuditOptions::default().with_train(false)).await;
    assert!(actions.is_empty());
}

#[tokio::test]
async fn test_reflected_query_with_cookie_is_not_a_new_page() {
    let server = MockServer::start().await;
    Mock::given(path("/p"))
        .respond_with(Echo::new("<html>p</html>").with_cookie("sid=abc; Path=/"))
        .mount(&server)
        .await;

    let session = test_session(&server.uri());
    let page = fetch_page(&session, &format!("{}/p?input=blah", server.uri())).await;
    let auditor = Auditor::new(page, test_check("train"), Arc::clone(&session));

    let options = AuditOptions::default()
        .with_format([Format::Straight, Format::Append])
        .with_train(true);
    assert_eq!(auditor.audit_links(SEED, &options, None).expect("audit failed"), 3);
    session.run().await;

    assert_eq!(session.request_count(), 4);
    assert!(session.trainer.flush_pages().is_empty());
}

fn link_issue_at(session: &Session, suffix: &str) -> bool {
    session
        .results()
        .iter()
        .any(|i| i.element == IssueElement::Link && i.url.ends_with(suffix))
}

#[tokio::test]
async fn test_orchestrator_reaches_fixpoint() {
    let server = training_server().await;
    let session = Session::new(test_config(&format!("{}/train", server.uri()))).expect("session");
    let mut orchestrator = Orchestrator::new(Arc::clone(&session));
    orchestrator.register(Arc::new(ReflectionCheck::new(SEED)));

    let report = orchestrator.audit_target().await.expect("audit failed");

    assert_eq!(report.pages_audited, 2);
    assert_eq!(report.checks, vec!["reflection".to_string()]);
    assert!(report.finished_at.is_some());
    assert_eq!(report.issues.len(), session.results().len());
    assert!(link_issue_at(&session, "/train/action"));
    assert!(link_issue_at(&session, "/train/next"));
    assert!(!link_issue_at(&session, "/train/secret"));
    assert!(session.trainer.flush_pages().is_empty());
}

#[tokio::test]
async fn test_orchestrator_with_forced_training_finds_hidden_page() {
    let server = training_server().await;
    let session = Session::new(test_config(&format!("{}/train", server.uri()))).expect("session");
    let mut orchestrator = Orchestrator::new(Arc::clone(&session));
    let options = AuditOptions::default()
        .with_format([Format::Straight])
        .with_train(true);
    orchestrator.register(Arc::new(ReflectionCheck::new(SEED).with_options(options)));

    orchestrator.audit_target().await.expect("audit failed");

    assert!(link_issue_at(&session, "/train/next"));
    assert!(link_issue_at(&session, "/train/secret"));
}

#[tokio::test]
async fn test_orchestrator_respects_max_pages() {
    let server = training_server().await;
    let mut config = test_config(&format!("{}/train", server.uri()));
    config.max_pages = 1;
    let session = Session::new(config).expect("session");
    let mut orchestrator = Orchestrator::new(Arc::clone(&session));
    orchestrator.register(Arc::new(ReflectionCheck::new(SEED)));

    let report = orchestrator.audit_target().await.expect("audit failed");

    assert_eq!(report.pages_audited, 1);
    assert!(link_issue_at(&session, "/train/action"));
    assert!(!link_issue_at(&session, "/train/next"));
}
