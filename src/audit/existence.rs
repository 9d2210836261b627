//! Remote file existence checks that survive custom 404 handlers
//!
//! A candidate only counts as existing when its response differs from what
//! the server answers for paths that cannot exist next to it:
//!
//! * a random sibling name,
//! * a syntactically invalid sibling name,
//! * a random sibling sharing the candidate's extension, which is routed to
//!   whatever dynamic handler serves that file type.
//!
//! Every probe is fetched twice; words that differ between the two samples
//! are treated as dynamic and dropped from the signature. Requested names
//! are stripped from bodies before comparison so that error pages echoing the
//! path still match. Signatures are cached per directory and extension and
//! computed once, however many checks race for them.

use crate::error::{AuditError, Result};
use crate::http::{HttpClient, HttpResponse};
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Not-found fingerprint of one probe category
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    status: u16,
    /// Words shared by both samples, in order
    words: Vec<String>,
    /// Words that differed between the samples
    dynamic: usize,
}

impl Signature {
    fn from_samples(a: &Sample, b: &Sample) -> Self {
        let mut pool: HashMap<&str, usize> = HashMap::new();
        for word in &b.words {
            *pool.entry(word.as_str()).or_default() += 1;
        }

        let mut words = Vec::new();
        for word in &a.words {
            if let Some(count) = pool.get_mut(word.as_str()) {
                if *count > 0 {
                    *count -= 1;
                    words.push(word.clone());
                }
            }
        }

        let dynamic = a.words.len().max(b.words.len()) - words.len();
        Self {
            status: a.status,
            words,
            dynamic,
        }
    }

    /// Whether a candidate body is this not-found page with different dynamic parts
    fn matches(&self, candidate: &Sample) -> bool {
        if candidate.status != self.status {
            return false;
        }
        let vocabulary: HashSet<&str> = self.words.iter().map(String::as_str).collect();
        let kept: Vec<&String> = candidate
            .words
            .iter()
            .filter(|w| vocabulary.contains(w.as_str()))
            .collect();

        let extra = candidate.words.len() - kept.len();
        kept.len() == self.words.len()
            && kept.iter().zip(&self.words).all(|(a, b)| *a == b)
            && extra <= self.dynamic
    }
}

/// A response reduced to status and normalized words
#[derive(Debug, Clone)]
struct Sample {
    status: u16,
    words: Vec<String>,
}

impl Sample {
    fn from_response(response: &HttpResponse, requested_name: &str) -> Self {
        Self {
            status: response.status,
            words: normalize(&response.body, requested_name),
        }
    }
}

/// Splits a body into words after removing echoes of the requested name
fn normalize(body: &str, requested_name: &str) -> Vec<String> {
    let mut text = body.to_string();
    if !requested_name.is_empty() {
        text = text.replace(requested_name, " ");
        if let Ok(decoded) = urldecode(requested_name) {
            if !decoded.is_empty() && decoded != requested_name {
                text = text.replace(&decoded, " ");
            }
        }
    }
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn urldecode(value: &str) -> std::result::Result<String, std::str::Utf8Error> {
    let bytes: Vec<u8> = url::form_urlencoded::parse(format!("x={value}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned().into_bytes())
        .unwrap_or_default();
    std::str::from_utf8(&bytes).map(str::to_string)
}

/// Location of a candidate split into directory URL, file name and extension
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    dir: String,
    name: String,
    extension: Option<String>,
}

impl Target {
    fn parse(raw: &str) -> Result<Self> {
        let mut url = Url::parse(raw)?;
        url.set_query(None);
        url.set_fragment(None);
        let path = url.path().to_string();
        let (dir_path, name) = match path.rfind('/') {
            Some(idx) => (path[..=idx].to_string(), path[idx + 1..].to_string()),
            None => ("/".to_string(), path),
        };
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .filter(|ext| !ext.is_empty());
        url.set_path(&dir_path);
        Ok(Self {
            dir: url.to_string(),
            name,
            extension,
        })
    }

    fn cache_key(&self) -> String {
        format!("{}|{}", self.dir, self.extension.as_deref().unwrap_or(""))
    }

    /// Probe names: random sibling, invalid sibling, sibling with our extension
    fn probe_names(&self) -> Vec<String> {
        let random = || uuid::Uuid::new_v4().simple().to_string();
        let mut names = vec![random(), format!("{}%00", random())];
        let ext = self.extension.as_deref().unwrap_or("html");
        names.push(format!("{}.{ext}", random()));
        names
    }
}

/// Soft-404 aware existence prober with a shared signature cache
#[derive(Debug, Default)]
pub struct ExistenceProber {
    signatures: DashMap<String, Arc<OnceCell<Vec<Signature>>>>,
}

impl ExistenceProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `url` exists.
    ///
    /// Fails when the not-found probes cannot be fetched; an unverified
    /// candidate is never reported as existing.
    pub async fn exists(&self, client: &HttpClient, url: &str) -> Result<bool> {
        Ok(self.probe(client, url).await?.is_some())
    }

    /// Fetches `url`; returns its response if it is a real resource
    pub async fn probe(&self, client: &HttpClient, url: &str) -> Result<Option<HttpResponse>> {
        let target = Target::parse(url)?;
        let (candidate, signatures) = tokio::join!(client.get(url), self.signatures(client, &target));
        let candidate = candidate?;

        if !candidate.is_success() {
            debug!("{url} answered {}, treating as missing", candidate.status);
            return Ok(None);
        }
        let signatures = signatures?;

        let sample = Sample::from_response(&candidate, &target.name);
        if signatures.iter().any(|sig| sig.matches(&sample)) {
            debug!("{url} matches a not-found signature");
            return Ok(None);
        }
        Ok(Some(candidate))
    }

    /// Number of computed signature sets
    pub fn cached(&self) -> usize {
        self.signatures
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn reset(&self) {
        self.signatures.clear();
    }

    /// Not-found signatures for the target's directory and extension.
    ///
    /// A failed probe fails the whole set and nothing is cached, so the next
    /// caller retries.
    async fn signatures(&self, client: &HttpClient, target: &Target) -> Result<Vec<Signature>> {
        // Clone the cell out so the map shard is not locked across the await.
        let cell = self
            .signatures
            .entry(target.cache_key())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let signatures = cell.get_or_try_init(|| Self::compute(client, target)).await?;
        Ok(signatures.clone())
    }

    async fn compute(client: &HttpClient, target: &Target) -> Result<Vec<Signature>> {
        let names = target.probe_names();
        let samples = join_all(names.iter().map(|name| async move {
            let first = format!("{}{}", target.dir, name);
            let second_name = Target::sibling_like(name);
            let second = format!("{}{}", target.dir, second_name);
            let (a, b) = tokio::join!(client.get(&first), client.get(&second));
            Ok::<_, AuditError>(Signature::from_samples(
                &Sample::from_response(&a?, name),
                &Sample::from_response(&b?, &second_name),
            ))
        }))
        .await;

        let signatures = samples.into_iter().collect::<Result<Vec<Signature>>>()?;
        debug!(
            "Computed {} not-found signature(s) for {}",
            signatures.len(),
            target.cache_key()
        );
        Ok(signatures)
    }
}

impl Target {
    /// Another random name of the same shape as `name`
    fn sibling_like(name: &str) -> String {
        let random = uuid::Uuid::new_v4().simple().to_string();
        match name.find(|c: char| !c.is_ascii_alphanumeric()) {
            Some(idx) => format!("{random}{}", &name[idx..]),
            None => random,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: u16, body: &str, name: &str) -> Sample {
        Sample {
            status,
            words: normalize(body, name),
        }
    }

    #[test]
    fn test_target_parse() {
        let target = Target::parse("http://example.com/a/b/file.php?x=1").expect("valid");
        assert_eq!(target.dir, "http://example.com/a/b/");
        assert_eq!(target.name, "file.php");
        assert_eq!(target.extension.as_deref(), Some("php"));

        let target = Target::parse("http://example.com/a/").expect("valid");
        assert_eq!(target.name, "");
        assert_eq!(target.extension, None);
    }

    #[test]
    fn test_probe_names_cover_categories() {
        let target = Target::parse("http://example.com/x/config.php").expect("valid");
        let names = target.probe_names();
        assert_eq!(names.len(), 3);
        assert!(names[1].ends_with("%00"));
        assert!(names[2].ends_with(".php"));
        assert!(Target::sibling_like(&names[1]).ends_with("%00"));
    }

    #[test]
    fn test_normalize_strips_echoed_name() {
        let words = normalize("Could not find abc123.php here", "abc123.php");
        assert_eq!(words, vec!["Could", "not", "find", "here"]);
    }

    #[test]
    fn test_signature_ignores_dynamic_words() {
        let a = sample(200, "Not found. Request id 1234", "aaa");
        let b = sample(200, "Not found. Request id 9876", "bbb");
        let sig = Signature::from_samples(&a, &b);
        assert_eq!(sig.words, vec!["Not", "found", "Request", "id"]);
        assert_eq!(sig.dynamic, 1);

        assert!(sig.matches(&sample(200, "Not found. Request id 5555", "ccc")));
        assert!(!sig.matches(&sample(200, "Welcome to the admin panel", "ccc")));
        assert!(!sig.matches(&sample(404, "Not found. Request id 5555", "ccc")));
    }

    #[test]
    fn test_empty_signature_does_not_swallow_real_files() {
        let sig = Signature::from_samples(&sample(200, "", "a"), &sample(200, "", "b"));
        assert!(sig.matches(&sample(200, "", "c")));
        assert!(!sig.matches(&sample(200, "secret=1", "c")));
    }
}
