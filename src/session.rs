//! Scan session: shared state of every auditor working on one target

use crate::audit::existence::ExistenceProber;
use crate::audit::fingerprint::RedundancyTracker;
use crate::audit::issues::IssueLog;
use crate::audit::timing::TimingQueue;
use crate::audit::trainer::Trainer;
use crate::error::Result;
use crate::http::{HttpClient, RequestQueue};
use crate::models::{Issue, SessionConfig};
use std::sync::Arc;
use tracing::info;

/// State shared by the auditors of a scan.
///
/// Auditors hold the session through an `Arc`; request completions only hold
/// a `Weak` reference, so dropping the session turns late completions into
/// no-ops.
pub struct Session {
    pub config: SessionConfig,
    pub queue: RequestQueue,
    pub tracker: RedundancyTracker,
    pub issues: IssueLog,
    pub trainer: Trainer,
    pub timing: TimingQueue,
    pub existence: ExistenceProber,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Arc<Self>> {
        let client = HttpClient::from_config(&config)?;
        Ok(Arc::new(Self {
            config,
            queue: RequestQueue::new(client),
            tracker: RedundancyTracker::new(),
            issues: IssueLog::new(),
            trainer: Trainer::new(),
            timing: TimingQueue::new(),
            existence: ExistenceProber::new(),
        }))
    }

    pub fn client(&self) -> &HttpClient {
        self.queue.client()
    }

    /// Drives every submitted request and its continuations to completion
    pub async fn run(&self) {
        self.queue.run().await;
    }

    /// Snapshot of the issues logged so far
    pub fn results(&self) -> Vec<Issue> {
        self.issues.results()
    }

    /// Total requests performed by this session's client
    pub fn request_count(&self) -> u64 {
        self.client().request_count()
    }

    /// Clears all per-scan state, keeping the configuration and client
    pub fn reset(&self) {
        self.tracker.reset();
        self.issues.reset();
        self.trainer.reset();
        self.timing.reset();
        self.existence.reset();
        info!("Session state reset for {}", self.config.target);
    }
}
