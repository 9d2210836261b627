//! Element extraction from HTML and response headers

use super::element::Element;
use reqwest::Method;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts links that carry query parameters (a[href], plus the page URL itself)
pub fn extract_links(base_url: &Url, document: &Html) -> Vec<Element> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    if let Some(link) = link_from_url(base_url) {
        seen.insert(link.discovery_key());
        links.push(link);
    }

    if let Ok(selector) = Selector::parse("a[href]") {
        for anchor in document.select(&selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(resolved) = resolve_url(base_url, href) else {
                continue;
            };
            if let Some(link) = link_from_url(&resolved) {
                if seen.insert(link.discovery_key()) {
                    links.push(link);
                }
            }
        }
    }

    links
}

/// Extracts forms with their named inputs and default values
pub fn extract_forms(base_url: &Url, document: &Html) -> Vec<Element> {
    let mut forms = Vec::new();

    let Ok(form_selector) = Selector::parse("form") else {
        return forms;
    };
    let Ok(field_selector) = Selector::parse("input[name], textarea[name], select[name]") else {
        return forms;
    };

    for form in document.select(&form_selector) {
        let action = form.value().attr("action").unwrap_or("");
        let action_url = if action.is_empty() || action == "#" {
            Some(base_url.clone())
        } else {
            resolve_url(base_url, action)
        };
        let Some(mut action_url) = action_url else {
            continue;
        };

        let method = match form.value().attr("method") {
            Some(m) if m.eq_ignore_ascii_case("post") => Method::POST,
            _ => Method::GET,
        };

        // GET submissions replace the action's query string with the form fields
        if method == Method::GET {
            action_url.set_query(None);
        }

        let inputs: Vec<(String, String)> = form
            .select(&field_selector)
            .filter_map(|field| {
                let name = field.value().attr("name")?;
                Some((name.to_string(), field_default(&field)))
            })
            .collect();

        if !inputs.is_empty() {
            forms.push(Element::form(action_url.to_string(), method, inputs));
        }
    }

    forms
}

/// One cookie element per `Set-Cookie` header, bound to the page path
pub fn extract_cookies<'a>(url: &str, set_cookie_headers: impl Iterator<Item = &'a str>) -> Vec<Element> {
    let action = strip_query(url);
    let mut cookies = Vec::new();
    for header in set_cookie_headers {
        let Some(name_value) = header.split(';').next() else {
            continue;
        };
        let Some((name, value)) = name_value.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if !name.is_empty() {
            cookies.push(Element::cookie(action.as_str(), name, value.trim()));
        }
    }
    cookies
}

/// The auditable request header of a page: its Referer
pub fn header_element(url: &str) -> Element {
    Element::header(strip_query(url), "Referer", url)
}

/// `url` without query and fragment; unparsable URLs are kept as they are
fn strip_query(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn field_default(field: &ElementRef<'_>) -> String {
    match field.value().name() {
        "textarea" => field.text().collect::<String>(),
        "select" => {
            let options = Selector::parse("option").ok();
            let mut first = None;
            if let Some(ref options) = options {
                for option in field.select(options) {
                    let value = option
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| option.text().collect::<String>());
                    if option.value().attr("selected").is_some() {
                        return value;
                    }
                    first.get_or_insert(value);
                }
            }
            first.unwrap_or_default()
        }
        _ => field.value().attr("value").unwrap_or("").to_string(),
    }
}

fn link_from_url(url: &Url) -> Option<Element> {
    let inputs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if inputs.is_empty() {
        return None;
    }
    let mut action = url.clone();
    action.set_query(None);
    action.set_fragment(None);
    Some(Element::link(action.to_string(), inputs))
}

/// Resolves a potentially relative URL against a base URL, same host only
fn resolve_url(base_url: &Url, raw: &str) -> Option<Url> {
    let trimmed = raw.trim();

    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
        || trimmed.starts_with("javascript:")
        || trimmed.starts_with("data:")
    {
        return None;
    }

    let resolved = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Url::parse(trimmed).ok()?
    } else {
        base_url.join(trimmed).ok()?
    };

    if resolved.host_str() != base_url.host_str() {
        return None;
    }

    let mut clean = resolved;
    clean.set_fragment(None);
    Some(clean)
}
