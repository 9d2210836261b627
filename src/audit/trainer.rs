//! Training: picks up elements that appear in audit responses

use crate::http::HttpResponse;
use crate::page::{DiscoveryKey, ElementKind, Page};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct TrainerState {
    known: HashSet<DiscoveryKey>,
    pages: Vec<Page>,
}

/// Buffers pages that revealed previously unseen elements.
///
/// Header elements are derived from the request URL rather than the page
/// content, so they never count as discoveries.
#[derive(Debug, Default)]
pub struct Trainer {
    state: Mutex<TrainerState>,
}

impl Trainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a page's elements as already known
    pub fn register_page(&self, page: &Page) {
        let mut state = self.lock();
        for element in page.elements() {
            if element.kind() != ElementKind::Header {
                state.known.insert(element.discovery_key());
            }
        }
    }

    /// Parses a response; buffers it as a page if it exposes new elements.
    ///
    /// Returns whether the page was buffered.
    pub fn observe(&self, response: &HttpResponse) -> bool {
        let page = Page::from_response(response);
        let keys: Vec<DiscoveryKey> = page
            .elements()
            .iter()
            .filter(|e| e.kind() != ElementKind::Header)
            .map(|e| e.discovery_key())
            .collect();

        let mut state = self.lock();
        let fresh = keys.iter().filter(|k| !state.known.contains(*k)).count();
        if fresh == 0 {
            debug!("Trainer: nothing new at {}", page.url);
            return false;
        }

        state.known.extend(keys);
        info!("Trainer: {} new element(s) at {}", fresh, page.url);
        state.pages.push(page);
        true
    }

    /// Takes every buffered page
    pub fn flush_pages(&self) -> Vec<Page> {
        std::mem::take(&mut self.lock().pages)
    }

    /// Number of buffered pages
    pub fn pending(&self) -> usize {
        self.lock().pages.len()
    }

    /// Forgets known elements and buffered pages
    pub fn reset(&self) {
        let mut state = self.lock();
        state.known.clear();
        state.pages.clear();
    }

    fn lock(&self) -> MutexGuard<'_, TrainerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
