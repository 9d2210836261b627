//! Append-only issue log shared by every auditor of a session

use crate::models::{Issue, IssueElement};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

type IssueKey = (String, IssueElement, String, String);

#[derive(Debug, Default)]
struct LogState {
    issues: Vec<Issue>,
    keys: HashSet<IssueKey>,
}

/// Results sink: keeps one issue per (url, element, input, injected value)
#[derive(Debug, Default)]
pub struct IssueLog {
    state: Mutex<LogState>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends issues, skipping duplicates; returns how many were logged
    pub fn register(&self, issues: impl IntoIterator<Item = Issue>) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut logged = 0;
        for issue in issues {
            if !state.keys.insert(issue.dedup_key()) {
                debug!(
                    "Duplicate issue '{}' at {} ({}/{}) ignored",
                    issue.name, issue.url, issue.element, issue.var
                );
                continue;
            }
            info!(
                "Issue: {} [{}] at {} in {} '{}'",
                issue.name, issue.severity, issue.url, issue.element, issue.var
            );
            state.issues.push(issue);
            logged += 1;
        }
        logged
    }

    /// Snapshot of the logged issues, in logging order
    pub fn results(&self) -> Vec<Issue> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .issues
            .clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .issues
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears issues and the duplicate filter
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.issues.clear();
        state.keys.clear();
    }
}
