//! URL scope and pattern filtering for the crawl frontier.

use crate::types::ScrapeScope;
use crate::{Error, Result};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use url::Url;

/// A single include/exclude pattern: `/.../` is a regular expression,
/// anything else a glob.
enum Pattern {
    Regex(Regex),
    Glob(GlobMatcher),
}

impl Pattern {
    fn parse(raw: &str) -> Result<Self> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let inner = &raw[1..raw.len() - 1];
            return Ok(Self::Regex(Regex::new(inner).map_err(|e| {
                Error::Config(format!("invalid regex pattern '{raw}': {e}"))
            })?));
        }
        Ok(Self::Glob(
            Glob::new(raw)
                .map_err(|e| Error::Config(format!("invalid glob pattern '{raw}': {e}")))?
                .compile_matcher(),
        ))
    }

    fn matches(&self, url: &Url) -> bool {
        let path = url.path();
        let full = url.as_str();
        match self {
            Self::Regex(regex) => regex.is_match(path) || regex.is_match(full),
            Self::Glob(glob) => glob.is_match(path) || glob.is_match(full),
        }
    }
}

/// Compiled URL filter for one job: scope plus include/exclude patterns.
///
/// Exclude patterns take precedence over include patterns; an empty include
/// list admits everything in scope.
pub struct UrlFilter {
    root: Url,
    scope: ScrapeScope,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl UrlFilter {
    /// Compiles the filter for a job rooted at `root_url`.
    pub fn new(
        root_url: &str,
        scope: ScrapeScope,
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self> {
        let root = Url::parse(root_url)
            .map_err(|e| Error::InvalidUrl(format!("invalid root URL '{root_url}': {e}")))?;
        let include = include_patterns
            .iter()
            .map(|p| Pattern::parse(p))
            .collect::<Result<_>>()?;
        let exclude = exclude_patterns
            .iter()
            .map(|p| Pattern::parse(p))
            .collect::<Result<_>>()?;
        Ok(Self {
            root,
            scope,
            include,
            exclude,
        })
    }

    /// Whether a discovered link should enter the frontier.
    #[must_use]
    pub fn admits(&self, candidate: &str) -> bool {
        let Ok(url) = Url::parse(candidate) else {
            return false;
        };
        if !self.in_scope(&url) {
            return false;
        }
        if self.exclude.iter().any(|p| p.matches(&url)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.matches(&url))
    }

    fn in_scope(&self, url: &Url) -> bool {
        if url.scheme() != self.root.scheme() {
            return false;
        }
        // File URLs scope by directory prefix regardless of scope mode.
        if url.scheme() == "file" {
            return url.path().starts_with(parent_dir(self.root.path()));
        }
        match self.scope {
            ScrapeScope::Subpages => {
                url.host_str() == self.root.host_str()
                    && url.path().starts_with(parent_dir(self.root.path()))
            },
            ScrapeScope::Hostname => url.host_str() == self.root.host_str(),
            ScrapeScope::Domain => match (url.host_str(), self.root.host_str()) {
                (Some(host), Some(root_host)) => {
                    let base = registrable_suffix(root_host);
                    host == root_host || host == base || host.ends_with(&format!(".{base}"))
                },
                _ => false,
            },
        }
    }
}

/// The directory portion of a path, trailing slash included.
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..=index],
        None => "/",
    }
}

/// Naive registrable-domain suffix: the last two labels of the host.
fn registrable_suffix(host: &str) -> String {
    let labels: Vec<&str> = host.rsplit('.').take(2).collect();
    labels.into_iter().rev().collect::<Vec<_>>().join(".")
}

/// Canonical frontier key for a URL: resolved, fragment stripped.
#[must_use]
pub fn canonicalize(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn filter(scope: ScrapeScope) -> UrlFilter {
        UrlFilter::new("https://docs.example.com/guide/index.html", scope, &[], &[]).unwrap()
    }

    #[test]
    fn test_subpages_scope() {
        let f = filter(ScrapeScope::Subpages);
        assert!(f.admits("https://docs.example.com/guide/intro.html"));
        assert!(f.admits("https://docs.example.com/guide/advanced/tips.html"));
        assert!(!f.admits("https://docs.example.com/api/index.html"));
        assert!(!f.admits("https://other.example.com/guide/intro.html"));
    }

    #[test]
    fn test_hostname_scope() {
        let f = filter(ScrapeScope::Hostname);
        assert!(f.admits("https://docs.example.com/api/index.html"));
        assert!(!f.admits("https://www.example.com/guide/"));
    }

    #[test]
    fn test_domain_scope() {
        let f = filter(ScrapeScope::Domain);
        assert!(f.admits("https://docs.example.com/x"));
        assert!(f.admits("https://www.example.com/y"));
        assert!(f.admits("https://example.com/z"));
        assert!(!f.admits("https://example.org/z"));
    }

    #[test]
    fn test_scheme_mismatch_rejected() {
        let f = filter(ScrapeScope::Hostname);
        assert!(!f.admits("ftp://docs.example.com/guide/file"));
    }

    #[test]
    fn test_glob_include_and_exclude_precedence() {
        let f = UrlFilter::new(
            "https://docs.example.com/guide/",
            ScrapeScope::Subpages,
            &["**/guide/**".to_string()],
            &["**/deprecated/**".to_string()],
        )
        .unwrap();
        assert!(f.admits("https://docs.example.com/guide/intro.html"));
        // Exclude wins even though include also matches.
        assert!(!f.admits("https://docs.example.com/guide/deprecated/old.html"));
    }

    #[test]
    fn test_regex_pattern_form() {
        let f = UrlFilter::new(
            "https://docs.example.com/guide/",
            ScrapeScope::Subpages,
            &[r"/v\d+\.html$/".to_string()],
            &[],
        )
        .unwrap();
        assert!(f.admits("https://docs.example.com/guide/v2.html"));
        assert!(!f.admits("https://docs.example.com/guide/intro.html"));
    }

    #[test]
    fn test_file_scope_by_directory() {
        let f = UrlFilter::new("file:///docs/index.md", ScrapeScope::Subpages, &[], &[]).unwrap();
        assert!(f.admits("file:///docs/sub.md"));
        assert!(f.admits("file:///docs/nested/deep.md"));
        assert!(!f.admits("file:///other/escape.md"));
    }

    #[test]
    fn test_canonicalize_strips_fragment() {
        assert_eq!(
            canonicalize("https://example.com/a#section").unwrap(),
            "https://example.com/a"
        );
        assert!(canonicalize("not a url").is_none());
    }
}
