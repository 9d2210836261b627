//! Blind, time-based injection detection

use crate::audit::{AuditOptions, Auditor};
use crate::error::Result;
use crate::models::{CheckInfo, IssueTemplate, Severity, TimingDefaults};
use crate::orchestrator::Check;
use async_trait::async_trait;

/// Queues timing probes for a delay-inducing seed.
///
/// The seed must contain `__TIME__`, which is replaced with the delay
/// argument before each measurement.
pub struct BlindTimingCheck {
    seed: String,
    options: AuditOptions,
}

impl BlindTimingCheck {
    pub fn new(seed: impl Into<String>, timing: TimingDefaults) -> Self {
        Self {
            seed: seed.into(),
            options: AuditOptions::default()
                .with_timeout(timing.timeout_ms)
                .with_timeout_divider(timing.divider),
        }
    }
}

#[async_trait]
impl Check for BlindTimingCheck {
    fn info(&self) -> CheckInfo {
        CheckInfo::new(
            "blind_timing",
            IssueTemplate::new("Blind code injection (timing)", Severity::High)
                .with_description("A delay payload measurably slowed the response down.")
                .with_cwe("CWE-94")
                .with_remedy("Never pass user-supplied data to an interpreter."),
        )
    }

    async fn run(&self, auditor: &Auditor) -> Result<()> {
        auditor.audit_timeout(&self.seed, &self.options)?;
        Ok(())
    }
}
