//! Completion-driven request queue
//!
//! Requests are submitted without waiting; each carries a continuation that
//! fires when its response has been read. [`RequestQueue::run`] is the barrier
//! that drives every pending request, including the ones submitted by
//! continuations while it runs, to completion.

use super::client::{HttpClient, HttpRequest, HttpResponse};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Continuation invoked with a completed response
pub type Completion = Box<dyn FnOnce(HttpResponse) + Send + 'static>;

/// Shared queue of in-flight requests
#[derive(Clone)]
pub struct RequestQueue {
    client: HttpClient,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl RequestQueue {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Submits a request; `on_complete` fires once the response is read.
    ///
    /// Transport failures are logged and the continuation is dropped.
    pub fn submit(&self, request: HttpRequest, on_complete: Completion) {
        let client = self.client.clone();
        self.spawn(async move {
            match client.send(&request).await {
                Ok(response) => on_complete(response),
                Err(e) => debug!("Dropping completion for {request}: {e}"),
            }
        });
    }

    /// Submits requests that must run one at a time, in order.
    ///
    /// Each continuation runs before the next request is sent.
    pub fn submit_chain(&self, jobs: Vec<(HttpRequest, Completion)>) {
        if jobs.is_empty() {
            return;
        }
        let client = self.client.clone();
        self.spawn(async move {
            for (request, on_complete) in jobs {
                match client.send(&request).await {
                    Ok(response) => on_complete(response),
                    Err(e) => debug!("Dropping completion for {request}: {e}"),
                }
            }
        });
    }

    /// Schedules arbitrary work on the queue so that `run` waits for it
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(task);
    }

    /// Number of tasks not yet collected by `run`
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drives all pending work to exhaustion
    pub async fn run(&self) {
        loop {
            let mut batch = std::mem::take(
                &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if batch.is_empty() {
                break;
            }

            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        warn!("Request task panicked: {e}");
                    }
                }
            }
        }
    }
}
