//! Injection formats: how a seed is combined with an input's existing value

use serde::{Deserialize, Serialize};
use std::fmt;

/// Formatting rule applied to a seed before injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Replace the value with the seed
    Straight,
    /// Append the seed to the existing value
    Append,
    /// Terminate the seed with a null byte
    Null,
    /// Prefix the seed with a semicolon
    Semicolon,
}

impl Format {
    /// Default order used when a caller does not pick formats
    pub const ALL: [Format; 4] = [Format::Straight, Format::Append, Format::Null, Format::Semicolon];

    pub fn apply(self, existing: &str, seed: &str) -> String {
        match self {
            Format::Straight => seed.to_string(),
            Format::Append => format!("{existing}{seed}"),
            Format::Null => format!("{seed}\0"),
            Format::Semicolon => format!(";{seed}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Straight => "straight",
            Format::Append => "append",
            Format::Null => "null",
            Format::Semicolon => "semicolon",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lazily expands `seed` into one injected value per format.
///
/// An empty `formats` slice means [`Format::ALL`]. The iterator is `Clone`,
/// so it can be restarted.
pub fn expand<'a>(
    existing: &'a str,
    seed: &'a str,
    formats: &'a [Format],
) -> impl Iterator<Item = (Format, String)> + Clone + 'a {
    let formats: &'a [Format] = if formats.is_empty() {
        &Format::ALL
    } else {
        formats
    };
    formats
        .iter()
        .map(move |format| (*format, format.apply(existing, seed)))
}
