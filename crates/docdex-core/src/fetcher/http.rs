//! HTTP fetching with conditional requests, retry, and redirect control.

use super::{FetchOptions, Fetcher};
use crate::types::{FetchStatus, RawContent};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, ETAG, IF_NONE_MATCH, LAST_MODIFIED, LOCATION};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum fetch attempts for retryable statuses.
const MAX_ATTEMPTS: u32 = 6;

/// Base delay for exponential backoff between attempts.
const RETRY_BASE: Duration = Duration::from_millis(1000);

/// Statuses that are retried with backoff.
const RETRYABLE: &[u16] = &[408, 429, 500, 502, 503, 504, 525];

/// Statuses that are never retried.
const NON_RETRYABLE: &[u16] = &[400, 401, 403, 405, 410];

/// Realistic browser fingerprints rotated across requests.
///
/// Each entry is `(User-Agent, Accept, Accept-Language)`. Sites serving
/// developer documentation occasionally gate plain bot agents, so requests
/// present as an ordinary browser.
const FINGERPRINTS: &[(&str, &str, &str)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        "en-US,en;q=0.9",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        "en-US,en;q=0.8",
    ),
    (
        "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        "en-GB,en;q=0.7",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        "en-US,en;q=0.9",
    ),
];

/// HTTP client for fetching documentation pages with conditional request
/// support.
///
/// Transport compression advertises `gzip, deflate, br` (zstd stays off) via
/// the enabled reqwest features; bodies arrive decompressed.
pub struct HttpFetcher {
    /// Client that follows redirects (the default behavior).
    client: Client,
    /// Client with redirect following disabled, used when a job asks to
    /// surface redirects instead.
    no_redirect_client: Client,
    /// Round-robin cursor into [`FINGERPRINTS`].
    fingerprint: AtomicUsize,
}

impl HttpFetcher {
    /// Creates a new fetcher with configured HTTP clients.
    pub fn new() -> Result<Self> {
        let base = || {
            Client::builder()
                .gzip(true)
                .brotli(true)
                .deflate(true)
                .http2_adaptive_window(true)
        };
        let client = base().build().map_err(Error::Network)?;
        let no_redirect_client = base()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            no_redirect_client,
            fingerprint: AtomicUsize::new(0),
        })
    }

    /// Builds the per-request header set: rotating fingerprint first, then
    /// conditional headers, then caller overrides.
    fn request_headers(&self, options: &FetchOptions) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let idx = self.fingerprint.fetch_add(1, Ordering::Relaxed) % FINGERPRINTS.len();
        let (user_agent, accept, accept_language) = FINGERPRINTS[idx];
        if let Ok(v) = HeaderValue::from_str(user_agent) {
            headers.insert(reqwest::header::USER_AGENT, v);
        }
        if let Ok(v) = HeaderValue::from_str(accept) {
            headers.insert(reqwest::header::ACCEPT, v);
        }
        if let Ok(v) = HeaderValue::from_str(accept_language) {
            headers.insert(reqwest::header::ACCEPT_LANGUAGE, v);
        }

        if let Some(etag) = &options.etag {
            debug!("Setting If-None-Match: {etag}");
            if let Ok(v) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, v);
            }
        }

        for (name, value) in &options.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers
    }

    async fn fetch_once(&self, url: &str, options: &FetchOptions) -> Result<reqwest::Response> {
        let client = if options.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let mut request = client.get(url).headers(self.request_headers(options));
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        tokio::select! {
            () = options.cancel.cancelled() => {
                Err(Error::Cancelled(format!("fetch of '{url}' aborted")))
            },
            response = request.send() => response.map_err(Error::Network),
        }
    }

    async fn read_body(response: reqwest::Response, options: &FetchOptions) -> Result<Vec<u8>> {
        tokio::select! {
            () = options.cancel.cancelled() => {
                Err(Error::Cancelled("fetch body read aborted".to_string()))
            },
            bytes = response.bytes() => Ok(bytes.map_err(Error::Network)?.to_vec()),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn can_fetch(&self, source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }

    async fn fetch(&self, source: &str, options: &FetchOptions) -> Result<RawContent> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if options.cancel.is_cancelled() {
                return Err(Error::Cancelled(format!("fetch of '{source}' aborted")));
            }

            let response = match self.fetch_once(source, options).await {
                Ok(response) => response,
                Err(err) if err.is_recoverable() && attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!("Fetch attempt {attempt} for {source} failed ({err}), retrying in {delay:?}");
                    sleep_or_cancel(delay, options).await?;
                    continue;
                },
                Err(err) => return Err(err),
            };

            let status = response.status();

            if status == StatusCode::NOT_MODIFIED {
                info!("Resource not modified (304) for {source}");
                return Ok(not_modified_content(source, &response));
            }

            if status == StatusCode::NOT_FOUND {
                debug!("Resource not found (404) for {source}");
                return Ok(RawContent {
                    content: Vec::new(),
                    mime_type: String::new(),
                    charset: None,
                    encoding: None,
                    source: response.url().to_string(),
                    etag: None,
                    last_modified: None,
                    status: FetchStatus::NotFound,
                });
            }

            if status.is_redirection() && !options.follow_redirects {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                return Err(Error::Redirect {
                    url: source.to_string(),
                    location,
                    status: status.as_u16(),
                });
            }

            if RETRYABLE.contains(&status.as_u16()) {
                if attempt < MAX_ATTEMPTS {
                    let delay = RETRY_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!("Retryable status {status} for {source}, retrying in {delay:?}");
                    sleep_or_cancel(delay, options).await?;
                    continue;
                }
                // Attempts exhausted; surface the status error.
                return match response.error_for_status() {
                    Ok(_) => Err(Error::Other(format!(
                        "fetch of '{source}' failed with status {status} after {MAX_ATTEMPTS} attempts"
                    ))),
                    Err(err) => Err(Error::Network(err)),
                };
            }

            if NON_RETRYABLE.contains(&status.as_u16()) || !status.is_success() {
                return match response.error_for_status() {
                    Ok(_) => Err(Error::Other(format!(
                        "fetch of '{source}' failed with status {status}"
                    ))),
                    Err(err) => Err(Error::Network(err)),
                };
            }

            let final_url = response.url().to_string();
            let (mime_type, charset) = parse_content_type(&response);
            let encoding = header_string(&response, &CONTENT_ENCODING);
            let etag = header_string(&response, &ETAG);
            let last_modified = header_string(&response, &LAST_MODIFIED);

            let content = Self::read_body(response, options).await?;
            info!("Fetched {} bytes from {final_url}", content.len());

            return Ok(RawContent {
                content,
                mime_type,
                charset,
                encoding,
                source: final_url,
                etag,
                last_modified,
                status: FetchStatus::Success,
            });
        }
    }
}

async fn sleep_or_cancel(delay: Duration, options: &FetchOptions) -> Result<()> {
    tokio::select! {
        () = options.cancel.cancelled() => {
            Err(Error::Cancelled("fetch retry aborted".to_string()))
        },
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn not_modified_content(source: &str, response: &reqwest::Response) -> RawContent {
    RawContent {
        content: Vec::new(),
        mime_type: String::new(),
        charset: None,
        encoding: None,
        source: source.to_string(),
        etag: header_string(response, &ETAG),
        last_modified: header_string(response, &LAST_MODIFIED),
        status: FetchStatus::NotModified,
    }
}

fn header_string(response: &reqwest::Response, name: &HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Splits a `Content-Type` header into MIME type and charset.
fn parse_content_type(response: &reqwest::Response) -> (String, Option<String>) {
    let Some(raw) = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return ("application/octet-stream".to_string(), None);
    };

    let mut parts = raw.split(';');
    let mime_type = parts.next().unwrap_or_default().trim().to_lowercase();
    let charset = parts.find_map(|param| {
        let param = param.trim();
        param
            .strip_prefix("charset=")
            .map(|cs| cs.trim_matches('"').to_lowercase())
    });
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        mime_type
    };
    (mime_type, charset)
}
