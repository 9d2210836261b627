//! HTTP client wrapper with rate limiting, retries, and request tracking

use crate::error::{AuditError, Result};
use crate::models::SessionConfig;
use reqwest::{Client, Method, StatusCode};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

/// A request as the audit engine describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Form-encoded POST
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A fully read response together with the request that produced it
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// URL after redirects
    pub effective_url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Time from dispatch until the body was read
    pub elapsed: Duration,
    pub request: HttpRequest,
}

impl HttpResponse {
    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, case-insensitive
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client wrapper with rate limiting and request counting
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_count: Arc<AtomicU64>,
    rate_limiter: Option<Arc<Semaphore>>,
    rate_limit_delay: Option<Duration>,
    extra_headers: Vec<(String, String)>,
}

impl HttpClient {
    /// Creates a new HttpClient from session configuration
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        // No cookie store: cookies are audit inputs and must only be sent
        // when an element carries them.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .danger_accept_invalid_certs(false)
            .build()?;

        let (rate_limiter, rate_limit_delay) = match config.rate_limit {
            Some(rps) if rps > 0 => (
                Some(Arc::new(Semaphore::new(rps as usize))),
                Some(Duration::from_millis(1000 / u64::from(rps))),
            ),
            _ => (None, None),
        };

        Ok(Self {
            client,
            request_count: Arc::new(AtomicU64::new(0)),
            rate_limiter,
            rate_limit_delay,
            extra_headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Sends a GET request
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(&HttpRequest::get(url)).await
    }

    /// Sends a request and reads the whole body
    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let (response, started) = self
            .request_with_retry(|| {
                let mut req = self.client.request(request.method.clone(), &request.url);
                for (key, value) in &request.headers {
                    req = req.header(key.as_str(), value.as_str());
                }
                for (key, value) in &self.extra_headers {
                    if !request.has_header(key) {
                        req = req.header(key.as_str(), value.as_str());
                    }
                }
                if let Some(ref body) = request.body {
                    req = req.body(body.clone());
                }
                req
            })
            .await?;

        let status = response.status().as_u16();
        let effective_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.text().await.unwrap_or_default();

        Ok(HttpResponse {
            status,
            effective_url,
            headers,
            body,
            elapsed: started.elapsed(),
            request: request.clone(),
        })
    }

    /// Returns the total number of requests made
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Executes a request with retry logic and rate limiting.
    ///
    /// Returns the response together with the instant its attempt started.
    async fn request_with_retry<F>(&self, build_request: F) -> Result<(reqwest::Response, Instant)>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        const MAX_RETRIES: u32 = 2;
        const INITIAL_BACKOFF_MS: u64 = 500;

        // Held until the response is returned; bounds requests in flight.
        let _permit = match self.rate_limiter {
            Some(ref limiter) => Some(
                limiter
                    .acquire()
                    .await
                    .map_err(|_| AuditError::RateLimitExceeded)?,
            ),
            None => None,
        };
        if let Some(delay) = self.rate_limit_delay {
            sleep(delay).await;
        }

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                debug!("Retry attempt {attempt}, waiting {backoff:?}");
                sleep(backoff).await;
            }

            self.request_count.fetch_add(1, Ordering::Relaxed);
            let started = Instant::now();

            match build_request().send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!("Response: {status} for {}", response.url());

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        warn!("Rate limited by server, backing off");
                        last_error = Some(AuditError::RateLimitExceeded);
                        continue;
                    }

                    return Ok((response, started));
                }
                Err(e) => {
                    warn!("Request failed (attempt {attempt}): {e}");
                    last_error = Some(AuditError::HttpError(e));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AuditError::RequestFailed("Max retries exceeded".to_string())))
    }
}
