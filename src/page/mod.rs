//! Pages and the elements they expose for auditing

pub mod element;
pub mod extractor;

pub use element::{DiscoveryKey, Element, ElementKind};

use crate::http::HttpResponse;
use reqwest::Method;
use scraper::Html;
use tracing::debug;
use url::Url;

/// A fetched page together with its auditable elements
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
    pub method: Method,
    elements: Vec<Element>,
}

impl Page {
    /// A page with no elements
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            method: Method::GET,
            elements: Vec::new(),
        }
    }

    pub fn with_elements(mut self, elements: Vec<Element>) -> Self {
        self.elements = elements;
        self
    }

    /// Parses a response into a page: links, forms, cookies and the Referer header
    pub fn from_response(response: &HttpResponse) -> Self {
        let url = response.effective_url.clone();
        let mut elements = Vec::new();

        match Url::parse(&url) {
            Ok(base) => {
                let document = Html::parse_document(&response.body);
                elements.extend(extractor::extract_links(&base, &document));
                elements.extend(extractor::extract_forms(&base, &document));
            }
            Err(e) => debug!("Not extracting elements from unparsable URL {url}: {e}"),
        }
        elements.extend(extractor::extract_cookies(
            &url,
            response.header_values("set-cookie"),
        ));
        elements.push(extractor::header_element(&url));

        Self {
            url,
            body: response.body.clone(),
            method: response.request.method.clone(),
            elements,
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn elements_of(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(move |e| e.kind() == kind)
    }
}
