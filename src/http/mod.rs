//! HTTP collaborator: the client and the completion-driven request queue

pub mod client;
pub mod queue;
pub use client::{HttpClient, HttpRequest, HttpResponse};
pub use queue::{Completion, RequestQueue};
