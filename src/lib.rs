//! Argos Audit - element auditing engine for web security checks
//!
//! Checks bind an [`audit::Auditor`] to a page and hand it a seed. The engine
//! expands the page's links, forms, cookies and headers into mutations,
//! dispatches them without duplicates, verifies the responses by pattern or
//! by timing and feeds pages with new elements back to the caller through
//! training.

pub mod audit;
pub mod checks;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod page;
pub mod session;
