//! Element mutations: one submission per input, format and seed

use super::fingerprint::{Fingerprint, Variant};
use super::format::{expand, Format};
use crate::page::Element;

/// An element variant ready to be submitted
#[derive(Debug, Clone)]
pub struct Mutation {
    pub element: Element,
    /// Input that carries the payload; `None` for the original submission
    pub altered: Option<String>,
    pub format: Option<Format>,
    /// Value submitted for `altered`
    pub injected: String,
}

impl Mutation {
    /// The element submitted with its default values
    pub fn original(element: &Element) -> Self {
        Self {
            element: element.clone(),
            altered: None,
            format: None,
            injected: String::new(),
        }
    }

    pub fn is_original(&self) -> bool {
        self.altered.is_none()
    }

    pub fn fingerprint(&self, check: &str, seed: &str) -> Fingerprint {
        match (&self.altered, self.format) {
            (Some(input), Some(format)) => {
                Fingerprint::new(check, &self.element, input, Variant::Formatted(format), seed)
            }
            _ => Fingerprint::original(check, &self.element),
        }
    }
}

/// Expands an element into its mutations.
///
/// The original submission comes first when requested, followed by every
/// input combined with every format, in input order.
pub fn mutations(
    element: &Element,
    seed: &str,
    formats: &[Format],
    include_original: bool,
) -> Vec<Mutation> {
    if element.inputs().is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    if include_original {
        out.push(Mutation::original(element));
    }

    for (name, existing) in element.inputs() {
        for (format, value) in expand(existing, seed, formats) {
            out.push(Mutation {
                element: element.mutate(name, &value),
                altered: Some(name.clone()),
                format: Some(format),
                injected: value,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> Element {
        Element::form(
            "http://example.com/login",
            reqwest::Method::POST,
            vec![
                ("user".to_string(), "admin".to_string()),
                ("pass".to_string(), "".to_string()),
            ],
        )
    }

    #[test]
    fn test_one_mutation_per_input_and_format() {
        let all = mutations(&form(), "seed", &[], false);
        assert_eq!(all.len(), 2 * Format::ALL.len());

        let straight = mutations(&form(), "seed", &[Format::Straight], true);
        assert_eq!(straight.len(), 3);
        assert!(straight[0].is_original());
        assert_eq!(straight[1].element.value_of("user"), Some("seed"));
        assert_eq!(straight[1].element.value_of("pass"), Some(""));
        assert_eq!(straight[2].altered.as_deref(), Some("pass"));
    }

    #[test]
    fn test_append_keeps_default_value() {
        let appended = mutations(&form(), "seed", &[Format::Append], false);
        assert_eq!(appended[0].injected, "adminseed");
        assert_eq!(appended[0].element.value_of("user"), Some("adminseed"));
    }

    #[test]
    fn test_elements_without_inputs_yield_nothing() {
        let bare = Element::link("http://example.com/", Vec::new());
        assert!(mutations(&bare, "seed", &[], true).is_empty());
    }

    #[test]
    fn test_original_fingerprint_ignores_seed() {
        let original = Mutation::original(&form());
        assert_eq!(
            original.fingerprint("xss", "one"),
            original.fingerprint("xss", "two")
        );
    }
}
