//! Check registry and the training fixpoint driver

use crate::audit::Auditor;
use crate::error::Result;
use crate::models::{AuditReport, CheckInfo};
use crate::page::Page;
use crate::session::Session;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait that all checks must implement
#[async_trait]
pub trait Check: Send + Sync {
    /// Returns the check's identity and issue template
    fn info(&self) -> CheckInfo;

    /// Queues the check's audits against the auditor's page
    async fn run(&self, auditor: &Auditor) -> Result<()>;
}

/// Runs checks against a page and every page training discovers from it
pub struct Orchestrator {
    session: Arc<Session>,
    checks: Vec<Arc<dyn Check>>,
}

impl Orchestrator {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            checks: Vec::new(),
        }
    }

    /// Registers a check
    pub fn register(&mut self, check: Arc<dyn Check>) {
        self.checks.push(check);
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Fetches the session target and audits it
    pub async fn audit_target(&self) -> Result<AuditReport> {
        let target = self.session.config.target.clone();
        info!("Fetching {target}");
        let response = self.session.client().get(&target).await?;
        self.audit_page(Page::from_response(&response)).await
    }

    /// Audits `page`, then keeps auditing trained pages until none are left.
    ///
    /// Each round runs every check, drives the request queue and the timing
    /// queue to completion, then flushes the trainer. The page limit bounds
    /// the loop for sites that keep producing new elements.
    pub async fn audit_page(&self, page: Page) -> Result<AuditReport> {
        let mut report = AuditReport::new(&page.url);
        report.checks = self.checks.iter().map(|c| c.info().name).collect();

        let infos: Vec<Arc<CheckInfo>> = self.checks.iter().map(|c| Arc::new(c.info())).collect();
        let mut pending: VecDeque<Arc<Page>> = VecDeque::from([Arc::new(page)]);

        while let Some(page) = pending.pop_front() {
            if report.pages_audited >= self.session.config.max_pages {
                warn!(
                    "Page limit of {} reached, {} page(s) left unaudited",
                    self.session.config.max_pages,
                    pending.len() + 1
                );
                break;
            }

            info!("Auditing {} ({} element(s))", page.url, page.elements().len());
            for (check, check_info) in self.checks.iter().zip(&infos) {
                let auditor = Auditor::new(Arc::clone(&page), Arc::clone(check_info), Arc::clone(&self.session));
                check.run(&auditor).await?;
            }

            self.session.run().await;
            self.session
                .timing
                .run(self.session.client(), &self.session.issues)
                .await;
            report.pages_audited += 1;

            let discovered = self.session.trainer.flush_pages();
            if !discovered.is_empty() {
                info!("Training discovered {} new page(s)", discovered.len());
            }
            pending.extend(discovered.into_iter().map(Arc::new));
        }

        report.issues = self.session.results();
        report.total_requests = self.session.request_count();
        report.finish();
        Ok(report)
    }
}
