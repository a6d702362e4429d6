//! Local file fetching with mtime-derived etags.

use super::{FetchOptions, Fetcher};
use crate::types::{FetchStatus, RawContent};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How many leading bytes are sniffed for null bytes when classifying
/// binary content.
const BINARY_SNIFF_LEN: usize = 8192;

/// Fetcher for `file://` sources.
///
/// The etag is derived from the file's mtime (`md5` over the RFC3339
/// timestamp), so unchanged files short-circuit refreshes exactly like an
/// HTTP 304 without reading the file body.
pub struct FileFetcher;

impl FileFetcher {
    /// Creates a new file fetcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Converts a `file://` URL into a filesystem path.
    ///
    /// Accepts both `file:///absolute/path` and the lenient `file://path`
    /// form, and percent-decodes the result.
    fn to_path(source: &str) -> Result<PathBuf> {
        let rest = source
            .strip_prefix("file://")
            .ok_or_else(|| Error::InvalidUrl(format!("not a file URL: {source}")))?;
        let decoded = percent_decode_str(rest)
            .decode_utf8()
            .map_err(|e| Error::InvalidUrl(format!("invalid percent-encoding in {source}: {e}")))?;
        Ok(PathBuf::from(decoded.as_ref()))
    }

    /// Computes the mtime-derived etag for a path.
    fn mtime_etag(metadata: &std::fs::Metadata) -> Result<String> {
        let modified = metadata.modified()?;
        let stamp: DateTime<Utc> = modified.into();
        Ok(format!("{:x}", md5::compute(stamp.to_rfc3339())))
    }

    /// Derives the MIME type from the extension, demoting to
    /// `application/octet-stream` when the content sniffs as binary.
    fn mime_for(path: &Path, content: &[u8]) -> String {
        let sniff = &content[..content.len().min(BINARY_SNIFF_LEN)];
        if sniff.contains(&0) {
            return "application/octet-stream".to_string();
        }
        // Source-code extensions are mapped explicitly: the generic tables
        // resolve `.ts` to MPEG transport stream.
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("js" | "mjs" | "cjs" | "jsx") => return "text/javascript".to_string(),
            Some("ts" | "mts" | "cts" | "tsx") => return "text/x-typescript".to_string(),
            Some("py" | "pyi") => return "text/x-python".to_string(),
            _ => {},
        }
        mime_guess::from_path(path)
            .first_raw()
            .map_or_else(|| "text/plain".to_string(), |m| m.split(';').next().unwrap_or(m).to_string())
    }
}

impl Default for FileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    fn can_fetch(&self, source: &str) -> bool {
        source.starts_with("file://")
    }

    async fn fetch(&self, source: &str, options: &FetchOptions) -> Result<RawContent> {
        if options.cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("fetch of '{source}' aborted")));
        }

        let path = Self::to_path(source)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("File not found: {}", path.display());
                return Ok(RawContent {
                    content: Vec::new(),
                    mime_type: String::new(),
                    charset: None,
                    encoding: None,
                    source: source.to_string(),
                    etag: None,
                    last_modified: None,
                    status: FetchStatus::NotFound,
                });
            },
            Err(err) => return Err(Error::Io(err)),
        };

        let etag = Self::mtime_etag(&metadata)?;
        let last_modified: Option<String> = metadata
            .modified()
            .ok()
            .map(|m| DateTime::<Utc>::from(m).to_rfc2822());

        if options.etag.as_deref() == Some(etag.as_str()) {
            debug!("File unchanged (etag match): {}", path.display());
            return Ok(RawContent {
                content: Vec::new(),
                mime_type: String::new(),
                charset: None,
                encoding: None,
                source: source.to_string(),
                etag: Some(etag),
                last_modified,
                status: FetchStatus::NotModified,
            });
        }

        let content = tokio::fs::read(&path).await.map_err(Error::Io)?;
        if options.cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("fetch of '{source}' aborted")));
        }

        let mime_type = Self::mime_for(&path, &content);

        Ok(RawContent {
            content,
            mime_type,
            charset: None,
            encoding: None,
            source: source.to_string(),
            etag: Some(etag),
            last_modified,
            status: FetchStatus::Success,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    #[tokio::test]
    async fn test_fetch_reads_file_and_derives_etag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        fs::write(&path, "# Guide\n\nHello.").unwrap();

        let fetcher = FileFetcher::new();
        let raw = fetcher
            .fetch(&file_url(&path), &FetchOptions::new())
            .await
            .unwrap();

        assert_eq!(raw.status, FetchStatus::Success);
        assert_eq!(raw.mime_type, "text/markdown");
        assert_eq!(raw.content, b"# Guide\n\nHello.");
        assert!(raw.etag.is_some());
    }

    #[tokio::test]
    async fn test_fetch_not_modified_on_matching_etag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        fs::write(&path, "# Guide").unwrap();

        let fetcher = FileFetcher::new();
        let url = file_url(&path);
        let first = fetcher.fetch(&url, &FetchOptions::new()).await.unwrap();

        let second = fetcher
            .fetch(&url, &FetchOptions::new().with_etag(first.etag.clone()))
            .await
            .unwrap();
        assert_eq!(second.status, FetchStatus::NotModified);
        assert!(second.content.is_empty());
        assert_eq!(second.etag, first.etag);
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.md");

        let fetcher = FileFetcher::new();
        let raw = fetcher
            .fetch(&file_url(&path), &FetchOptions::new())
            .await
            .unwrap();
        assert_eq!(raw.status, FetchStatus::NotFound);
    }

    #[tokio::test]
    async fn test_fetch_decodes_percent_encoded_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my guide.md");
        fs::write(&path, "content").unwrap();

        let encoded = format!(
            "file://{}/{}",
            dir.path().display(),
            "my%20guide.md"
        );
        let fetcher = FileFetcher::new();
        let raw = fetcher.fetch(&encoded, &FetchOptions::new()).await.unwrap();
        assert_eq!(raw.status, FetchStatus::Success);
        assert_eq!(raw.content, b"content");
    }

    #[tokio::test]
    async fn test_binary_content_maps_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.md");
        fs::write(&path, [0x23u8, 0x00, 0x01, 0x02]).unwrap();

        let fetcher = FileFetcher::new();
        let raw = fetcher
            .fetch(&file_url(&path), &FetchOptions::new())
            .await
            .unwrap();
        assert_eq!(raw.mime_type, "application/octet-stream");
    }

    #[test]
    fn test_to_path_accepts_both_slash_forms() {
        assert_eq!(
            FileFetcher::to_path("file:///tmp/docs/a.md").unwrap(),
            PathBuf::from("/tmp/docs/a.md")
        );
        assert_eq!(
            FileFetcher::to_path("file://relative/a.md").unwrap(),
            PathBuf::from("relative/a.md")
        );
    }
}
