//! Core data models for the audit engine

use crate::page::ElementKind;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Severity level for security issues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Where on the page an issue was found.
///
/// The four auditable kinds mirror [`ElementKind`]; `Body` is used for
/// page-level pattern hits and `Path` for remote files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IssueElement {
    Link,
    Form,
    Cookie,
    Header,
    Body,
    Path,
}

impl IssueElement {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueElement::Link => "link",
            IssueElement::Form => "form",
            IssueElement::Cookie => "cookie",
            IssueElement::Header => "header",
            IssueElement::Body => "body",
            IssueElement::Path => "path",
        }
    }
}

impl fmt::Display for IssueElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ElementKind> for IssueElement {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Link => IssueElement::Link,
            ElementKind::Form => IssueElement::Form,
            ElementKind::Cookie => IssueElement::Cookie,
            ElementKind::Header => IssueElement::Header,
        }
    }
}

/// Static description of the issue a check reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTemplate {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub cwe_id: Option<String>,
    pub remedy: String,
}

impl IssueTemplate {
    pub fn new(name: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            severity,
            cwe_id: None,
            remedy: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cwe(mut self, cwe: impl Into<String>) -> Self {
        self.cwe_id = Some(cwe.into());
        self
    }

    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remedy = remedy.into();
        self
    }
}

/// Identity of a check: its name plus the issue it reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInfo {
    pub name: String,
    pub description: String,
    pub issue: IssueTemplate,
}

impl CheckInfo {
    pub fn new(name: impl Into<String>, issue: IssueTemplate) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            issue,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A confirmed security issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Issue name (from the reporting check's template)
    pub name: String,
    /// Name of the check that logged the issue
    pub check: String,
    pub description: String,
    pub severity: Severity,
    pub cwe_id: Option<String>,
    pub remedy: String,
    /// Kind of element the issue was found in
    pub element: IssueElement,
    /// Affected URL
    pub url: String,
    /// HTTP method of the request that revealed the issue
    pub method: String,
    /// Name of the altered input
    pub var: String,
    /// Free-form identifier (remote file name, input id supplied by a check)
    pub id: String,
    /// Value that was submitted for the altered input
    pub injected: String,
    /// Stringified pattern used for verification
    pub regexp: Option<String>,
    /// Text the pattern matched
    pub regexp_match: Option<String>,
    /// True when the hit needs manual verification
    pub verification: bool,
    /// Auxiliary data: `regexp`, `match`, `element`
    pub opts: BTreeMap<String, String>,
    /// Request line that demonstrates the issue
    pub request: Option<String>,
    pub discovered_at: DateTime<Local>,
}

impl Issue {
    /// Creates an issue with everything but the location left empty
    pub fn new(name: impl Into<String>, url: impl Into<String>, element: IssueElement) -> Self {
        let mut opts = BTreeMap::new();
        opts.insert("element".to_string(), element.to_string());
        Self {
            name: name.into(),
            check: String::new(),
            description: String::new(),
            severity: Severity::Info,
            cwe_id: None,
            remedy: String::new(),
            element,
            url: url.into(),
            method: "GET".to_string(),
            var: String::new(),
            id: String::new(),
            injected: String::new(),
            regexp: None,
            regexp_match: None,
            verification: false,
            opts,
            request: None,
            discovered_at: Local::now(),
        }
    }

    /// Creates an issue carrying a check's identity and template data
    pub fn from_check(
        check: &CheckInfo,
        url: impl Into<String>,
        element: IssueElement,
    ) -> Self {
        let mut issue = Self::new(check.issue.name.clone(), url, element);
        issue.check = check.name.clone();
        issue.description = check.issue.description.clone();
        issue.severity = check.issue.severity;
        issue.cwe_id = check.issue.cwe_id.clone();
        issue.remedy = check.issue.remedy.clone();
        issue
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = var.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_injected(mut self, injected: impl Into<String>) -> Self {
        self.injected = injected.into();
        self
    }

    /// Records the verification pattern, mirrored into `opts["regexp"]`
    pub fn with_regexp(mut self, regexp: impl Into<String>) -> Self {
        let regexp = regexp.into();
        self.opts.insert("regexp".to_string(), regexp.clone());
        self.regexp = Some(regexp);
        self
    }

    /// Records the matched text, mirrored into `opts["match"]`
    pub fn with_match(mut self, matched: impl Into<String>) -> Self {
        let matched = matched.into();
        self.opts.insert("match".to_string(), matched.clone());
        self.regexp_match = Some(matched);
        self
    }

    pub fn with_verification(mut self, verification: bool) -> Self {
        self.verification = verification;
        self
    }

    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.request = Some(request.into());
        self
    }

    /// Key under which the issue log suppresses duplicates
    pub fn dedup_key(&self) -> (String, IssueElement, String, String) {
        let input = if self.var.is_empty() {
            self.id.clone()
        } else {
            self.var.clone()
        };
        (self.url.clone(), self.element, input, self.injected.clone())
    }
}

/// Outcome of an orchestrated audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Target URL
    pub target: String,
    /// Unique audit identifier
    pub audit_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    /// All logged issues
    pub issues: Vec<Issue>,
    /// Names of the checks that ran
    pub checks: Vec<String>,
    /// Pages audited, including the ones found by training
    pub pages_audited: usize,
    /// Total HTTP requests made
    pub total_requests: u64,
}

impl AuditReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            audit_id: uuid::Uuid::new_v4().to_string(),
            started_at: Local::now(),
            finished_at: None,
            issues: Vec::new(),
            checks: Vec::new(),
            pages_audited: 0,
            total_requests: 0,
        }
    }

    /// Returns count of issues by severity
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Marks the audit as finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }
}

/// Which element kinds the session is allowed to audit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditToggles {
    pub links: bool,
    pub forms: bool,
    pub cookies: bool,
    pub headers: bool,
}

impl Default for AuditToggles {
    fn default() -> Self {
        Self {
            links: true,
            forms: true,
            cookies: true,
            headers: true,
        }
    }
}

impl AuditToggles {
    pub fn allows(&self, kind: ElementKind) -> bool {
        match kind {
            ElementKind::Link => self.links,
            ElementKind::Form => self.forms,
            ElementKind::Cookie => self.cookies,
            ElementKind::Header => self.headers,
        }
    }
}

/// Default parameters for timing audits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingDefaults {
    /// Expected delay in milliseconds
    pub timeout_ms: u64,
    /// Divides the timeout into the payload's delay argument
    pub divider: u64,
}

impl Default for TimingDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: 4000,
            divider: 1000,
        }
    }
}

/// Configuration for an audit session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target URL the session starts from
    pub target: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header value
    pub user_agent: String,
    /// Whether to follow HTTP redirects
    pub follow_redirects: bool,
    /// Maximum requests per second (0 = unlimited)
    pub rate_limit: Option<u32>,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
    /// Element kinds enabled for auditing
    #[serde(default)]
    pub audit: AuditToggles,
    /// Upper bound on pages the orchestrator audits
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default)]
    pub timing: TimingDefaults,
}

fn default_max_pages() -> usize {
    250
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            timeout_secs: 30,
            user_agent: "Argos-Audit/0.1.0".to_string(),
            follow_redirects: true,
            rate_limit: None,
            headers: HashMap::new(),
            audit: AuditToggles::default(),
            max_pages: default_max_pages(),
            timing: TimingDefaults::default(),
        }
    }
}

impl SessionConfig {
    /// Element kinds the framework allows to be audited, in audit order
    pub fn enabled_kinds(&self) -> Vec<ElementKind> {
        ElementKind::ALL
            .into_iter()
            .filter(|kind| self.audit.allows(*kind))
            .collect()
    }
}
