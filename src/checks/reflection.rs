//! Reflected input detection

use crate::audit::{AuditOptions, Auditor};
use crate::error::Result;
use crate::models::{CheckInfo, IssueTemplate, Severity};
use crate::orchestrator::Check;
use async_trait::async_trait;
use tracing::debug;

/// Injects a seed into every element and logs responses that echo it
pub struct ReflectionCheck {
    seed: String,
    options: AuditOptions,
}

impl ReflectionCheck {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            options: AuditOptions::default(),
        }
    }

    /// Verifies responses with `regexp` instead of the seed itself
    pub fn with_regexp(mut self, regexp: impl Into<String>) -> Self {
        self.options = self.options.with_regexp(regexp);
        self
    }

    pub fn with_options(mut self, options: AuditOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl Check for ReflectionCheck {
    fn info(&self) -> CheckInfo {
        CheckInfo::new(
            "reflection",
            IssueTemplate::new("Reflected input", Severity::Medium)
                .with_description("A submitted value is echoed back in the response body.")
                .with_cwe("CWE-79")
                .with_remedy("Encode user-supplied data before writing it into responses."),
        )
        .with_description("Injects a marker and looks for it in responses")
    }

    async fn run(&self, auditor: &Auditor) -> Result<()> {
        let queued = auditor.audit(&self.seed, &self.options, None)?;
        debug!("reflection: {} request(s) queued for {}", queued, auditor.page().url);
        Ok(())
    }
}
