//! Content fetching with conditional request support.
//!
//! Two fetcher implementations share the [`Fetcher`] trait: [`HttpFetcher`]
//! for `http(s)://` sources and [`FileFetcher`] for `file://` sources. Both
//! honor conditional requests through etags: a matching etag yields a
//! [`FetchStatus::NotModified`](crate::types::FetchStatus::NotModified)
//! result with empty content, which lets refresh jobs skip unchanged pages
//! without re-processing them.
//!
//! A browser-based fetcher for JS-heavy pages is an external collaborator
//! selected by the per-job scrape mode; its contract matches [`HttpFetcher`].

mod file;
mod http;

pub use file::FileFetcher;
pub use http::HttpFetcher;

use crate::types::RawContent;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-request options threaded through a fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Etag from a previous fetch; triggers a conditional request.
    pub etag: Option<String>,
    /// Follow HTTP redirects. When `false`, a 3xx surfaces
    /// [`Error::Redirect`](crate::Error::Redirect).
    pub follow_redirects: bool,
    /// Extra request headers, applied after the built-in ones.
    pub headers: HashMap<String, String>,
    /// Per-request timeout. `None` means no timeout.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation; checked before and after each I/O.
    pub cancel: CancellationToken,
}

impl FetchOptions {
    /// Options with redirect following enabled and everything else default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            follow_redirects: true,
            ..Self::default()
        }
    }

    /// Sets the conditional-request etag.
    #[must_use]
    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A source of raw content bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Whether this fetcher handles the given source URL.
    fn can_fetch(&self, source: &str) -> bool;

    /// Fetches the source, honoring the conditional etag and cancellation
    /// token in `options`.
    async fn fetch(&self, source: &str, options: &FetchOptions) -> Result<RawContent>;
}

/// Picks the first fetcher that claims the source.
#[must_use]
pub fn select_fetcher<'a>(
    fetchers: &'a [Box<dyn Fetcher>],
    source: &str,
) -> Option<&'a dyn Fetcher> {
    fetchers
        .iter()
        .find(|f| f.can_fetch(source))
        .map(AsRef::as_ref)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_fetcher_prefers_first_match() {
        let fetchers: Vec<Box<dyn Fetcher>> = vec![
            Box::new(HttpFetcher::new().unwrap()),
            Box::new(FileFetcher::new()),
        ];
        assert!(select_fetcher(&fetchers, "https://example.com").is_some());
        assert!(select_fetcher(&fetchers, "file:///tmp/x.md").is_some());
        assert!(select_fetcher(&fetchers, "ftp://example.com").is_none());
    }
}
