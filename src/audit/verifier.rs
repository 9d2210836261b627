//! Response verification: patterns, match criteria and log fields

use super::options::AuditOptions;
use crate::error::{AuditError, Result};
use crate::models::IssueElement;
use regex::Regex;
use std::fmt;

/// What to look for in a response body
#[derive(Debug, Clone)]
pub enum Pattern {
    Regex(Regex),
    Substring(String),
}

impl Pattern {
    /// Compiles a regular expression; a malformed one is a caller bug
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Pattern::Regex)
            .map_err(|source| AuditError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn substring(needle: impl Into<String>) -> Self {
        Pattern::Substring(needle.into())
    }

    /// First match in `text`
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self {
            Pattern::Regex(re) => re.find(text).map(|m| m.as_str()),
            Pattern::Substring(needle) => text
                .find(needle.as_str())
                .map(|start| &text[start..start + needle.len()]),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Regex(re) => f.write_str(re.as_str()),
            Pattern::Substring(needle) => f.write_str(needle),
        }
    }
}

/// Verification criteria of one audit call
#[derive(Debug, Clone)]
pub struct Criteria {
    pattern: Pattern,
    expected: Option<String>,
}

impl Criteria {
    /// `regexp` (optionally narrowed by `match`), else `substring`, else the seed itself
    pub fn from_options(options: &AuditOptions, seed: &str) -> Result<Self> {
        if let Some(ref regexp) = options.regexp {
            return Ok(Self {
                pattern: Pattern::regex(regexp)?,
                expected: options.match_text.clone(),
            });
        }
        let needle = options.substring.as_deref().unwrap_or(seed);
        Ok(Self {
            pattern: Pattern::substring(needle),
            expected: None,
        })
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// First acceptable match in `body`
    pub fn find<'t>(&self, body: &'t str) -> Option<&'t str> {
        match (&self.pattern, &self.expected) {
            (Pattern::Regex(re), Some(expected)) => re
                .find_iter(body)
                .map(|m| m.as_str())
                .find(|m| *m == expected.as_str()),
            (pattern, Some(expected)) => pattern.find(body).filter(|m| *m == expected.as_str()),
            (pattern, None) => pattern.find(body),
        }
    }
}

/// Caller-supplied issue data for `Auditor::log`
#[derive(Debug, Clone)]
pub struct LogFields {
    pub element: IssueElement,
    /// Name of the altered input
    pub altered: String,
    pub injected: String,
    pub id: String,
    pub regexp: Option<String>,
    pub matched: Option<String>,
    pub verification: bool,
}

impl LogFields {
    pub fn new(element: IssueElement) -> Self {
        Self {
            element,
            altered: String::new(),
            injected: String::new(),
            id: String::new(),
            regexp: None,
            matched: None,
            verification: false,
        }
    }

    pub fn with_altered(mut self, altered: impl Into<String>) -> Self {
        self.altered = altered.into();
        self
    }

    pub fn with_injected(mut self, injected: impl Into<String>) -> Self {
        self.injected = injected.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_regexp(mut self, regexp: impl fmt::Display) -> Self {
        self.regexp = Some(regexp.to_string());
        self
    }

    pub fn with_match(mut self, matched: impl Into<String>) -> Self {
        self.matched = Some(matched.into());
        self
    }

    pub fn with_verification(mut self, verification: bool) -> Self {
        self.verification = verification;
        self
    }
}
