//! Common test utilities

#![allow(dead_code)]

use argos_audit::models::{CheckInfo, IssueTemplate, SessionConfig, Severity};
use argos_audit::page::Page;
use argos_audit::session::Session;
use std::sync::Arc;
use wiremock::{Request, Respond, ResponseTemplate};

/// Creates a test SessionConfig pointing to a wiremock server
pub fn test_config(target: &str) -> SessionConfig {
    SessionConfig {
        target: target.to_string(),
        timeout_secs: 10,
        user_agent: "Argos-Test/0.1.0".to_string(),
        ..SessionConfig::default()
    }
}

pub fn test_session(target: &str) -> Arc<Session> {
    Session::new(test_config(target)).expect("failed to create session")
}

pub fn test_check(name: &str) -> CheckInfo {
    CheckInfo::new(name, IssueTemplate::new(format!("{name} issue"), Severity::High))
}

/// Fetches `url` through the session's client and parses it into a page
pub async fn fetch_page(session: &Session, url: &str) -> Page {
    let response = session.client().get(url).await.expect("page fetch failed");
    Page::from_response(&response)
}

/// Responder that writes every input it receives back into the body.
///
/// Query parameters, urlencoded form fields, raw cookie pairs and the
/// Referer header are echoed after the static `html`.
pub struct Echo {
    html: String,
    set_cookie: Option<String>,
}

impl Echo {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            set_cookie: None,
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.set_cookie = Some(cookie.into());
        self
    }
}

pub fn echoed_inputs(request: &Request) -> Vec<(String, String)> {
    let mut inputs: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    inputs.extend(
        url::form_urlencoded::parse(&request.body).map(|(k, v)| (k.into_owned(), v.into_owned())),
    );

    if let Some(cookies) = request.headers.get("cookie").and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                inputs.push((name.to_string(), value.to_string()));
            }
        }
    }

    if let Some(referer) = request.headers.get("referer").and_then(|v| v.to_str().ok()) {
        inputs.push(("referer".to_string(), referer.to_string()));
    }
    inputs
}

impl Respond for Echo {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut body = self.html.clone();
        for (name, value) in echoed_inputs(request) {
            body.push_str(&format!("\n<p>{name}: {value}</p>"));
        }

        let mut template = ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_string(body);
        if let Some(ref cookie) = self.set_cookie {
            template = template.insert_header("set-cookie", cookie.as_str());
        }
        template
    }
}
