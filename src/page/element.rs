//! Auditable elements: links, forms, cookies and headers

use crate::error::Result;
use crate::http::HttpRequest;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded;
use url::Url;

/// Kind of injectable vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Link,
    Form,
    Cookie,
    Header,
}

impl ElementKind {
    /// Every kind, in the order audits visit them
    pub const ALL: [ElementKind; 4] = [
        ElementKind::Link,
        ElementKind::Form,
        ElementKind::Cookie,
        ElementKind::Header,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Link => "link",
            ElementKind::Form => "form",
            ElementKind::Cookie => "cookie",
            ElementKind::Header => "header",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an element for discovery: kind, action and input names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveryKey {
    pub kind: ElementKind,
    pub action: String,
    pub inputs: Vec<String>,
}

/// An injectable surface unit with named inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    kind: ElementKind,
    action: String,
    method: Method,
    inputs: Vec<(String, String)>,
}

impl Element {
    /// A link: `action` is the URL without its query string
    pub fn link(action: impl Into<String>, inputs: Vec<(String, String)>) -> Self {
        Self {
            kind: ElementKind::Link,
            action: action.into(),
            method: Method::GET,
            inputs,
        }
    }

    pub fn form(action: impl Into<String>, method: Method, inputs: Vec<(String, String)>) -> Self {
        Self {
            kind: ElementKind::Form,
            action: action.into(),
            method,
            inputs,
        }
    }

    /// A cookie sent along with requests for `action`
    pub fn cookie(action: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Cookie,
            action: action.into(),
            method: Method::GET,
            inputs: vec![(name.into(), value.into())],
        }
    }

    /// A request header sent along with requests for `action`
    pub fn header(action: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Header,
            action: action.into(),
            method: Method::GET,
            inputs: vec![(name.into(), value.into())],
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Inputs in document order
    pub fn inputs(&self) -> &[(String, String)] {
        &self.inputs
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|(name, _)| name.as_str())
    }

    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Copy of this element with one input set to `value`
    pub fn mutate(&self, name: &str, value: &str) -> Element {
        let mut copy = self.clone();
        for (k, v) in copy.inputs.iter_mut() {
            if k == name {
                *v = value.to_string();
            }
        }
        copy
    }

    pub fn discovery_key(&self) -> DiscoveryKey {
        let mut inputs: Vec<String> = self.input_names().map(str::to_string).collect();
        inputs.sort();
        DiscoveryKey {
            kind: self.kind,
            action: self.action.clone(),
            inputs,
        }
    }

    /// Builds the request that submits this element's current values
    pub fn to_request(&self) -> Result<HttpRequest> {
        match self.kind {
            ElementKind::Link => Ok(HttpRequest::get(self.url_with_query()?)),
            ElementKind::Form => {
                if self.method == Method::POST {
                    let body = form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(self.inputs.iter())
                        .finish();
                    Ok(HttpRequest::post(self.action.clone(), body))
                } else {
                    Ok(HttpRequest::get(self.url_with_query()?))
                }
            }
            ElementKind::Cookie => {
                let cookie = self
                    .inputs
                    .iter()
                    .map(|(k, v)| format!("{k}={}", encode_cookie_value(v)))
                    .collect::<Vec<_>>()
                    .join("; ");
                Ok(HttpRequest::get(self.action.clone()).with_header("Cookie", cookie))
            }
            ElementKind::Header => {
                let mut request = HttpRequest::get(self.action.clone());
                for (name, value) in &self.inputs {
                    request = request.with_header(name.clone(), encode_header_value(value));
                }
                Ok(request)
            }
        }
    }

    fn url_with_query(&self) -> Result<String> {
        let mut url = Url::parse(&self.action)?;
        if self.inputs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(self.inputs.iter());
        }
        Ok(url.to_string())
    }
}

/// Percent-encodes the bytes that would end or split a cookie pair
fn encode_cookie_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == ';' || c == ',' || c.is_whitespace() || c.is_control() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Percent-encodes the bytes a header value cannot carry
fn encode_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_control() && c != '\t' {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mutate_keeps_other_defaults() {
        let link = Element::link("http://example.com/p", pairs(&[("a", "1"), ("b", "2")]));
        let mutated = link.mutate("a", "x");
        assert_eq!(mutated.value_of("a"), Some("x"));
        assert_eq!(mutated.value_of("b"), Some("2"));
        assert_eq!(link.value_of("a"), Some("1"));
    }

    #[test]
    fn test_link_request_encodes_query() {
        let link = Element::link("http://example.com/p", pairs(&[("q", "a b\0")]));
        let request = link.to_request().expect("request");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url, "http://example.com/p?q=a+b%00");
    }

    #[test]
    fn test_post_form_request_has_body() {
        let form = Element::form(
            "http://example.com/login",
            Method::POST,
            pairs(&[("user", "me"), ("pass", ";x")]),
        );
        let request = form.to_request().expect("request");
        assert_eq!(request.url, "http://example.com/login");
        assert_eq!(request.body.as_deref(), Some("user=me&pass=%3Bx"));
    }

    #[test]
    fn test_cookie_and_header_requests() {
        let cookie = Element::cookie("http://example.com/", "session", "a;b");
        let request = cookie.to_request().expect("request");
        assert!(request
            .headers
            .contains(&("Cookie".to_string(), "session=a%3Bb".to_string())));

        let header = Element::header("http://example.com/", "Referer", "x\0");
        let request = header.to_request().expect("request");
        assert!(request
            .headers
            .contains(&("Referer".to_string(), "x%00".to_string())));
    }

    #[test]
    fn test_cookie_default_is_sent_as_received() {
        let cookie = Element::cookie("http://example.com/", "sid", "abc/def==");
        let request = cookie.to_request().expect("request");
        assert!(request
            .headers
            .contains(&("Cookie".to_string(), "sid=abc/def==".to_string())));

        let appended = cookie.mutate("sid", "abc/def==my_seed+1");
        let request = appended.to_request().expect("request");
        assert!(request
            .headers
            .contains(&("Cookie".to_string(), "sid=abc/def==my_seed+1".to_string())));

        let split = cookie.mutate("sid", "a b,c\0");
        let request = split.to_request().expect("request");
        assert!(request
            .headers
            .contains(&("Cookie".to_string(), "sid=a%20b%2Cc%00".to_string())));
    }

    #[test]
    fn test_discovery_key_ignores_values_and_order() {
        let a = Element::link("http://example.com/p", pairs(&[("a", "1"), ("b", "2")]));
        let b = Element::link("http://example.com/p", pairs(&[("b", "9"), ("a", "8")]));
        assert_eq!(a.discovery_key(), b.discovery_key());

        let form = Element::form("http://example.com/p", Method::GET, pairs(&[("a", "1"), ("b", "2")]));
        assert_ne!(a.discovery_key(), form.discovery_key());
    }
}
