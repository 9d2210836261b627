//! Audit engine
//!
//! An [`Auditor`] binds a check to a page and a session. Checks call
//! [`Auditor::audit`] with a seed; the auditor expands the page's elements
//! into mutations, skips the ones already dispatched in the session, submits
//! the rest to the request queue and verifies each response as it arrives.
//! `Session::run` is the barrier that waits for all of them.

pub mod existence;
pub mod fingerprint;
pub mod format;
pub mod issues;
pub mod mutation;
pub mod options;
pub mod timing;
pub mod trainer;
pub mod verifier;

pub use format::Format;
pub use mutation::Mutation;
pub use options::{AuditOptions, Train};
pub use verifier::{LogFields, Pattern};

use crate::error::{AuditError, Result};
use crate::http::{Completion, HttpRequest, HttpResponse};
use crate::models::{CheckInfo, Issue, IssueElement};
use crate::page::{ElementKind, Page};
use crate::session::Session;
use fingerprint::{Fingerprint, Variant};
use std::sync::{Arc, Weak};
use timing::TimingProbe;
use tracing::{debug, info};
use url::Url;
use verifier::Criteria;

/// Caller-supplied response handler; replaces built-in verification
pub type Callback = Arc<dyn Fn(&HttpResponse, &Mutation) + Send + Sync>;

/// Per-call state shared by the completions of one `audit`
struct Dispatch {
    session: Weak<Session>,
    page: Arc<Page>,
    check: Arc<CheckInfo>,
    criteria: Criteria,
    callback: Option<Callback>,
    train: Train,
}

impl Dispatch {
    fn completion(self: &Arc<Self>, mutation: Mutation) -> Completion {
        let dispatch = Arc::clone(self);
        Box::new(move |response| {
            // The session was discarded while the request was in flight.
            let Some(session) = dispatch.session.upgrade() else {
                return;
            };
            dispatch.on_response(&session, &mutation, &response);
        })
    }

    fn on_response(&self, session: &Session, mutation: &Mutation, response: &HttpResponse) {
        if self.train.should_train(mutation.is_original()) {
            session.trainer.observe(response);
        }

        if let Some(ref callback) = self.callback {
            callback(response, mutation);
            return;
        }

        let Some(altered) = mutation.altered.as_deref() else {
            return;
        };
        let Some(matched) = self.criteria.find(&response.body) else {
            return;
        };

        let issue = Issue::from_check(
            &self.check,
            mutation.element.action(),
            mutation.element.kind().into(),
        )
        .with_method(mutation.element.method().as_str())
        .with_var(altered)
        .with_injected(&mutation.injected)
        .with_regexp(self.criteria.pattern().to_string())
        .with_match(matched)
        .with_verification(self.criteria.find(&self.page.body).is_some())
        .with_request(response.request.to_string());

        session.issues.register([issue]);
    }
}

/// Check-facing entry point for auditing one page
#[derive(Clone)]
pub struct Auditor {
    page: Arc<Page>,
    check: Arc<CheckInfo>,
    session: Arc<Session>,
}

impl Auditor {
    /// Binds `check` to `page`; the page's elements become known to the trainer
    pub fn new(page: impl Into<Arc<Page>>, check: impl Into<Arc<CheckInfo>>, session: Arc<Session>) -> Self {
        let page = page.into();
        session.trainer.register_page(&page);
        Self {
            page,
            check: check.into(),
            session,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn check(&self) -> &CheckInfo {
        &self.check
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Injects `seed` into every targeted element of the page.
    ///
    /// Without a callback, responses are verified against the criteria in
    /// `options` and hits are logged. With one, the callback receives every
    /// response instead. Returns the number of requests queued.
    pub fn audit(&self, seed: &str, options: &AuditOptions, callback: Option<Callback>) -> Result<usize> {
        let dispatch = Arc::new(Dispatch {
            session: Arc::downgrade(&self.session),
            page: Arc::clone(&self.page),
            check: Arc::clone(&self.check),
            criteria: Criteria::from_options(options, seed)?,
            callback,
            train: options.train,
        });

        let mut queued = 0;
        for kind in options.target_kinds(&self.session.config.enabled_kinds()) {
            for element in self.page.elements_of(kind) {
                let mut jobs: Vec<(HttpRequest, Completion)> = Vec::new();

                for mutation in mutation::mutations(element, seed, &options.format, !options.skip_original) {
                    if !options.redundant
                        && !self
                            .session
                            .tracker
                            .check_and_mark(mutation.fingerprint(&self.check.name, seed))
                    {
                        continue;
                    }
                    let request = mutation.element.to_request()?;
                    jobs.push((request, dispatch.completion(mutation)));
                }

                if jobs.is_empty() {
                    continue;
                }
                debug!(
                    "{}: {} mutation(s) of {} {}",
                    self.check.name,
                    jobs.len(),
                    kind,
                    element.action()
                );
                queued += jobs.len();

                if options.asynchronous {
                    for (request, completion) in jobs {
                        self.session.queue.submit(request, completion);
                    }
                } else {
                    self.session.queue.submit_chain(jobs);
                }
            }
        }
        Ok(queued)
    }

    pub fn audit_links(&self, seed: &str, options: &AuditOptions, callback: Option<Callback>) -> Result<usize> {
        self.audit_kind(ElementKind::Link, seed, options, callback)
    }

    pub fn audit_forms(&self, seed: &str, options: &AuditOptions, callback: Option<Callback>) -> Result<usize> {
        self.audit_kind(ElementKind::Form, seed, options, callback)
    }

    pub fn audit_cookies(&self, seed: &str, options: &AuditOptions, callback: Option<Callback>) -> Result<usize> {
        self.audit_kind(ElementKind::Cookie, seed, options, callback)
    }

    pub fn audit_headers(&self, seed: &str, options: &AuditOptions, callback: Option<Callback>) -> Result<usize> {
        self.audit_kind(ElementKind::Header, seed, options, callback)
    }

    fn audit_kind(
        &self,
        kind: ElementKind,
        seed: &str,
        options: &AuditOptions,
        callback: Option<Callback>,
    ) -> Result<usize> {
        let options = options.clone().with_elements([kind]);
        self.audit(seed, &options, callback)
    }

    /// Queues timing probes for every (element, input) pair.
    ///
    /// `seed` should contain [`timing::TIME_PLACEHOLDER`]. Probes are only
    /// sent by [`Auditor::timeout_audit_run`].
    pub fn audit_timeout(&self, seed: &str, options: &AuditOptions) -> Result<usize> {
        let timeout = options.timeout.ok_or_else(|| {
            AuditError::ConfigError("timing audits require a timeout".to_string())
        })?;
        let format = options.format.first().copied().unwrap_or(Format::Straight);

        let mut queued = 0;
        for kind in options.target_kinds(&self.session.config.enabled_kinds()) {
            for element in self.page.elements_of(kind) {
                for input in element.input_names() {
                    let fingerprint =
                        Fingerprint::new(&self.check.name, element, input, Variant::Timing, seed);
                    if !options.redundant && !self.session.tracker.check_and_mark(fingerprint) {
                        continue;
                    }
                    self.session.timing.enqueue(TimingProbe::new(
                        Arc::clone(&self.check),
                        element.clone(),
                        input,
                        format,
                        seed,
                        timeout,
                        options.timeout_divider,
                    ));
                    queued += 1;
                }
            }
        }
        debug!("{}: {} timing probe(s) queued", self.check.name, queued);
        Ok(queued)
    }

    /// Drains the session's timing queue; returns the number of issues logged
    pub async fn timeout_audit_run(&self) -> usize {
        self.session
            .timing
            .run(self.session.client(), &self.session.issues)
            .await
    }

    /// Logs a body issue if `pattern` matches `body` (the page body by default)
    pub fn match_and_log(&self, pattern: &Pattern, body: Option<&str>) -> bool {
        let body = body.unwrap_or(&self.page.body);
        let Some(matched) = pattern.find(body) else {
            return false;
        };

        let issue = Issue::from_check(&self.check, &self.page.url, IssueElement::Body)
            .with_method(self.page.method.as_str())
            .with_id(matched)
            .with_regexp(pattern.to_string())
            .with_match(matched);
        self.log_issue(issue)
    }

    /// Logs an issue from caller-supplied fields.
    ///
    /// Location and request come from `response` when given, otherwise from
    /// the page.
    pub fn log(&self, fields: LogFields, response: Option<&HttpResponse>) -> bool {
        let (url, method) = match response {
            Some(res) => (res.effective_url.as_str(), res.request.method.as_str()),
            None => (self.page.url.as_str(), self.page.method.as_str()),
        };

        let mut issue = Issue::from_check(&self.check, url, fields.element)
            .with_method(method)
            .with_var(fields.altered)
            .with_id(fields.id)
            .with_injected(fields.injected)
            .with_verification(fields.verification);
        if let Some(regexp) = fields.regexp {
            issue = issue.with_regexp(regexp);
        }
        if let Some(matched) = fields.matched {
            issue = issue.with_match(matched);
        }
        if let Some(res) = response {
            issue = issue.with_request(res.request.to_string());
        }
        self.log_issue(issue)
    }

    /// Logs a prepared issue; returns false for duplicates
    pub fn log_issue(&self, issue: Issue) -> bool {
        self.session.issues.register([issue]) == 1
    }

    /// Logs several issues; returns how many were new
    pub fn register_results(&self, issues: Vec<Issue>) -> usize {
        self.session.issues.register(issues)
    }

    /// Checks `url` for existence once the queue runs; `on_result` receives the verdict
    pub fn remote_file_exists<F>(&self, url: &str, on_result: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let session = Arc::downgrade(&self.session);
        let url = url.to_string();
        self.session.queue.spawn(async move {
            let Some(session) = session.upgrade() else {
                return;
            };
            let exists = match session.existence.exists(session.client(), &url).await {
                Ok(exists) => exists,
                Err(e) => {
                    debug!("Existence check for {url} failed: {e}");
                    false
                }
            };
            on_result(exists);
        });
    }

    /// Logs a path issue for `url` if it exists, once the queue runs
    pub fn log_remote_file_if_exists(&self, url: &str) {
        let session = Arc::downgrade(&self.session);
        let check = Arc::clone(&self.check);
        let url = url.to_string();
        self.session.queue.spawn(async move {
            let Some(session) = session.upgrade() else {
                return;
            };
            match session.existence.probe(session.client(), &url).await {
                Ok(Some(response)) => {
                    info!("Remote file found: {}", response.effective_url);
                    session.issues.register([remote_file_issue(&check, &response)]);
                }
                Ok(None) => {}
                Err(e) => debug!("Existence check for {url} failed: {e}"),
            }
        });
    }

    /// Logs a path issue for a response already known to be a real file
    pub fn log_remote_file(&self, response: &HttpResponse) -> bool {
        self.log_issue(remote_file_issue(&self.check, response))
    }
}

fn remote_file_issue(check: &CheckInfo, response: &HttpResponse) -> Issue {
    let name = Url::parse(&response.effective_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    Issue::from_check(check, &response.effective_url, IssueElement::Path)
        .with_method(response.request.method.as_str())
        .with_id(&name)
        .with_injected(name)
        .with_request(response.request.to_string())
}
