//! Per-call audit options

use super::format::Format;
use crate::page::ElementKind;
use serde::{Deserialize, Serialize};

/// Whether responses are handed to the trainer
///
/// Serialized as an optional boolean: absent, `true` or `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Train {
    /// Train only on submissions that carry the inputs' default values
    #[default]
    Unset,
    /// Train on every response
    Enabled,
    /// Never train
    Disabled,
}

impl Train {
    /// Decides whether a response should be trained on
    pub fn should_train(self, submitted_default: bool) -> bool {
        match self {
            Train::Enabled => true,
            Train::Disabled => false,
            Train::Unset => submitted_default,
        }
    }
}

impl From<Option<bool>> for Train {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Train::Unset,
            Some(true) => Train::Enabled,
            Some(false) => Train::Disabled,
        }
    }
}

/// Options accepted by the audit entry points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditOptions {
    /// Formats to expand the seed with; empty means all four
    pub format: Vec<Format>,
    /// Element kinds to audit; `None` means every kind the session enables
    pub elements: Option<Vec<ElementKind>>,
    /// Regular expression to look for in responses
    pub regexp: Option<String>,
    /// Exact text a `regexp` match must equal
    #[serde(rename = "match")]
    pub match_text: Option<String>,
    /// Fixed substring to look for in responses
    pub substring: Option<String>,
    pub train: Train,
    /// Allow re-dispatching audits that were already performed
    pub redundant: bool,
    /// Fire every request at once instead of one at a time per element
    #[serde(rename = "async")]
    pub asynchronous: bool,
    /// Skip the extra submission with the element's default values
    pub skip_original: bool,
    /// Timing audit threshold in milliseconds
    pub timeout: Option<u64>,
    /// Divides the delay substituted into timing payloads
    pub timeout_divider: u64,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            format: Format::ALL.to_vec(),
            elements: None,
            regexp: None,
            match_text: None,
            substring: None,
            train: Train::Unset,
            redundant: false,
            asynchronous: true,
            skip_original: false,
            timeout: None,
            timeout_divider: 1,
        }
    }
}

impl AuditOptions {
    pub fn with_format(mut self, format: impl IntoIterator<Item = Format>) -> Self {
        self.format = format.into_iter().collect();
        self
    }

    pub fn with_elements(mut self, elements: impl IntoIterator<Item = ElementKind>) -> Self {
        self.elements = Some(elements.into_iter().collect());
        self
    }

    pub fn with_regexp(mut self, regexp: impl Into<String>) -> Self {
        self.regexp = Some(regexp.into());
        self
    }

    pub fn with_match(mut self, match_text: impl Into<String>) -> Self {
        self.match_text = Some(match_text.into());
        self
    }

    pub fn with_substring(mut self, substring: impl Into<String>) -> Self {
        self.substring = Some(substring.into());
        self
    }

    pub fn with_train(mut self, train: impl Into<Train>) -> Self {
        self.train = train.into();
        self
    }

    pub fn with_redundant(mut self, redundant: bool) -> Self {
        self.redundant = redundant;
        self
    }

    pub fn with_async(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_timeout_divider(mut self, divider: u64) -> Self {
        self.timeout_divider = divider;
        self
    }

    /// Element kinds to audit, given what the session enables
    pub fn target_kinds(&self, enabled: &[ElementKind]) -> Vec<ElementKind> {
        match self.elements {
            Some(ref requested) => ElementKind::ALL
                .into_iter()
                .filter(|kind| requested.contains(kind) && enabled.contains(kind))
                .collect(),
            None => enabled.to_vec(),
        }
    }
}

impl From<Train> for Option<bool> {
    fn from(train: Train) -> Self {
        match train {
            Train::Unset => None,
            Train::Enabled => Some(true),
            Train::Disabled => Some(false),
        }
    }
}

impl From<bool> for Train {
    fn from(value: bool) -> Self {
        Train::from(Some(value))
    }
}
