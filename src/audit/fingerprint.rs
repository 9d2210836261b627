//! Audit fingerprints and the redundancy tracker

use super::format::Format;
use crate::page::{Element, ElementKind};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, PoisonError};

/// Which kind of submission a fingerprint describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// The element submitted with its default values
    Original,
    /// The seed injected with a format
    Formatted(Format),
    /// A queued timing probe
    Timing,
}

/// Dedup key for one audit unit.
///
/// The literal payload is reduced to a digest; the original submission does
/// not depend on the seed at all, so its digest is zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    check: String,
    kind: ElementKind,
    method: String,
    action: String,
    inputs: Vec<String>,
    input: String,
    variant: Variant,
    payload: u64,
}

impl Fingerprint {
    pub fn new(check: &str, element: &Element, input: &str, variant: Variant, seed: &str) -> Self {
        let (input, payload) = match variant {
            Variant::Original => (String::new(), 0),
            _ => (input.to_string(), digest(seed)),
        };
        Self {
            check: check.to_string(),
            kind: element.kind(),
            method: element.method().to_string(),
            action: element.action().to_string(),
            inputs: element.discovery_key().inputs,
            input,
            variant,
            payload,
        }
    }

    pub fn original(check: &str, element: &Element) -> Self {
        Self::new(check, element, "", Variant::Original, "")
    }
}

fn digest(seed: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    hasher.finish()
}

/// Remembers which audits were already dispatched in a session
#[derive(Debug, Default)]
pub struct RedundancyTracker {
    seen: Mutex<HashSet<Fingerprint>>,
}

impl RedundancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains(fingerprint)
    }

    pub fn mark_seen(&self, fingerprint: Fingerprint) {
        self.lock().insert(fingerprint);
    }

    /// Marks the fingerprint and reports whether it was new, in one step
    pub fn check_and_mark(&self, fingerprint: Fingerprint) -> bool {
        self.lock().insert(fingerprint)
    }

    /// Forgets every fingerprint
    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Fingerprint>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
