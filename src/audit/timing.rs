//! Blind timing audits
//!
//! Probes are queued by `Auditor::audit_timeout` and drained one at a time by
//! [`TimingQueue::run`], never alongside regular audit traffic. A probe goes
//! through three measurements before it becomes an issue:
//!
//! 1. the payload with `timeout / divider` must take at least `timeout`,
//! 2. the element with its default values must answer faster than `timeout`,
//! 3. the payload with `2 * timeout / divider` must take at least `2 * timeout`.
//!
//! The second step rejects servers that are slow regardless of input, the
//! third rejects one-off latency spikes.

use super::format::Format;
use super::issues::IssueLog;
use crate::error::Result;
use crate::http::{HttpClient, HttpResponse};
use crate::models::{CheckInfo, Issue};
use crate::page::Element;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Placeholder replaced with the delay argument in timing seeds
pub const TIME_PLACEHOLDER: &str = "__TIME__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Queued,
    Dispatched,
    Measured,
    Confirmed,
    Rejected,
}

/// One (element, input) pair awaiting timing analysis
#[derive(Debug, Clone)]
pub struct TimingProbe {
    check: Arc<CheckInfo>,
    element: Element,
    input: String,
    format: Format,
    seed: String,
    /// Milliseconds
    timeout: u64,
    divider: u64,
    state: ProbeState,
}

impl TimingProbe {
    pub fn new(
        check: Arc<CheckInfo>,
        element: Element,
        input: impl Into<String>,
        format: Format,
        seed: impl Into<String>,
        timeout: u64,
        divider: u64,
    ) -> Self {
        Self {
            check,
            element,
            input: input.into(),
            format,
            seed: seed.into(),
            timeout,
            divider: divider.max(1),
            state: ProbeState::Queued,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Delay argument for the given multiple of the timeout
    pub fn delay(&self, factor: u64) -> String {
        (self.timeout * factor / self.divider).to_string()
    }

    /// Minimum latency expected from a payload with the given factor
    pub fn threshold(&self, factor: u64) -> Duration {
        Duration::from_millis(self.timeout * factor)
    }

    /// Element with the seed for the given factor injected into the probed input
    fn payload_element(&self, factor: u64) -> Element {
        let seed = self.seed.replace(TIME_PLACEHOLDER, &self.delay(factor));
        let existing = self.element.value_of(&self.input).unwrap_or_default();
        self.element
            .mutate(&self.input, &self.format.apply(existing, &seed))
    }

    fn transition(&mut self, next: ProbeState) {
        debug!(
            "Timing probe {} '{}': {:?} -> {:?}",
            self.element.action(),
            self.input,
            self.state,
            next
        );
        self.state = next;
    }

    /// Runs all three measurements; returns the issue when confirmed
    pub async fn evaluate(&mut self, client: &HttpClient) -> Result<Option<Issue>> {
        self.transition(ProbeState::Dispatched);
        let first = client.send(&self.payload_element(1).to_request()?).await?;
        self.transition(ProbeState::Measured);

        if first.elapsed < self.threshold(1) {
            self.transition(ProbeState::Rejected);
            return Ok(None);
        }

        let control = client.send(&self.element.to_request()?).await?;
        if control.elapsed >= self.threshold(1) {
            debug!(
                "{} is slow without a payload ({:?}), rejecting",
                self.element.action(),
                control.elapsed
            );
            self.transition(ProbeState::Rejected);
            return Ok(None);
        }

        let confirmation = client.send(&self.payload_element(2).to_request()?).await?;
        if confirmation.elapsed < self.threshold(2) {
            self.transition(ProbeState::Rejected);
            return Ok(None);
        }

        self.transition(ProbeState::Confirmed);
        Ok(Some(self.issue(&confirmation)))
    }

    fn issue(&self, response: &HttpResponse) -> Issue {
        Issue::from_check(&self.check, self.element.action(), self.element.kind().into())
            .with_method(self.element.method().as_str())
            .with_var(&self.input)
            .with_injected(self.delay(2))
            .with_request(response.request.to_string())
    }
}

/// Serialized queue of timing probes for one session
#[derive(Debug, Default)]
pub struct TimingQueue {
    probes: Mutex<VecDeque<TimingProbe>>,
    /// Held while draining so that only one probe is in flight
    gate: tokio::sync::Mutex<()>,
}

impl TimingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, probe: TimingProbe) {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(probe);
    }

    pub fn pending(&self) -> usize {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn reset(&self) {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn pop(&self) -> Option<TimingProbe> {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Drains every queued probe serially; returns the number of issues logged
    pub async fn run(&self, client: &HttpClient, log: &IssueLog) -> usize {
        let _gate = self.gate.lock().await;
        let mut logged = 0;

        while let Some(mut probe) = self.pop() {
            match probe.evaluate(client).await {
                Ok(Some(issue)) => {
                    info!(
                        "Timing attack confirmed at {} in '{}'",
                        probe.element().action(),
                        probe.input()
                    );
                    logged += log.register([issue]);
                }
                Ok(None) => {}
                Err(e) => debug!(
                    "Timing probe for {} '{}' failed: {e}",
                    probe.element().action(),
                    probe.input()
                ),
            }
        }
        logged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueTemplate, Severity};

    fn probe(timeout: u64, divider: u64) -> TimingProbe {
        let check = Arc::new(CheckInfo::new(
            "blind",
            IssueTemplate::new("Blind injection", Severity::High),
        ));
        let element = Element::link(
            "http://example.com/sleep",
            vec![("t".to_string(), "1".to_string())],
        );
        TimingProbe::new(check, element, "t", Format::Straight, "sleep(__TIME__)", timeout, divider)
    }

    #[test]
    fn test_delay_scales_with_divider() {
        let p = probe(2000, 1000);
        assert_eq!(p.delay(1), "2");
        assert_eq!(p.delay(2), "4");
        assert_eq!(p.threshold(2), Duration::from_millis(4000));

        let unscaled = probe(2, 1);
        assert_eq!(unscaled.delay(2), "4");
    }

    #[test]
    fn test_zero_divider_means_unscaled() {
        assert_eq!(probe(300, 0).delay(1), "300");
    }

    #[test]
    fn test_payload_replaces_placeholder() {
        let p = probe(2000, 1000);
        let element = p.payload_element(1);
        assert_eq!(element.value_of("t"), Some("sleep(2)"));
        assert_eq!(p.state(), ProbeState::Queued);
    }

    #[test]
    fn test_queue_pending_and_reset() {
        let queue = TimingQueue::new();
        queue.enqueue(probe(10, 1));
        queue.enqueue(probe(10, 1));
        assert_eq!(queue.pending(), 2);
        queue.reset();
        assert_eq!(queue.pending(), 0);
    }
}
