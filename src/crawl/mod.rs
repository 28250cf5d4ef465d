//! Thin wrapper over the web-crawling fetcher.
//!
//! The fetcher itself is an external collaborator (out of scope here); this module only defines
//! the narrow contract the rest of the core depends on and a deterministic stub implementation
//! good enough to drive `crawl_into_collection` end to end without a live network fetch.

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::now_rfc3339;

/// Errors raised while extracting or crawling a URL.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The supplied URL was malformed or used a disallowed scheme.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// The fetcher failed to retrieve or parse the page.
    #[error("fetch failed: {0}")]
    FetchFailed(String),
}

/// A single fetched page's extracted content.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// The page's resolved URL (after redirects).
    pub url: String,
    /// Best-effort page title.
    pub title: Option<String>,
    /// Extracted, markdown-formatted body content.
    pub markdown: String,
}

/// A single outbound link discovered on a crawled page.
#[derive(Debug, Clone)]
pub struct LinkPreview {
    /// The absolute URL of the linked page.
    pub url: String,
    /// The anchor text, if any.
    pub text: Option<String>,
}

/// Result of a bounded multi-page crawl starting from one URL.
#[derive(Debug, Clone)]
pub struct DeepCrawlResult {
    /// Every page successfully extracted, in crawl order.
    pub pages: Vec<ExtractedPage>,
    /// Links observed but not followed, because the depth/count bound was reached.
    pub truncated_links: Vec<LinkPreview>,
}

/// Interface implemented by the web-crawling fetcher.
///
/// The core never talks to the network directly; it calls through this trait, so the fetcher can
/// be swapped or mocked without touching any use-case logic.
#[async_trait]
pub trait CrawlAdapter: Send + Sync {
    /// Fetch and extract a single page's content.
    async fn extract_one(&self, url: &str) -> Result<ExtractedPage, CrawlError>;

    /// Crawl outward from `url` up to `max_depth` hops and `max_pages` pages.
    async fn deep_crawl(&self, url: &str, max_depth: u32, max_pages: usize) -> Result<DeepCrawlResult, CrawlError>;

    /// List the links discoverable from `url` without following them.
    async fn preview_links(&self, url: &str) -> Result<Vec<LinkPreview>, CrawlError>;
}

/// Deterministic, network-free crawl adapter.
///
/// Produces a single synthetic page per URL so the rest of the pipeline (chunking, sync, search)
/// can be exercised without a live fetcher. A production deployment would substitute a real
/// `CrawlAdapter` implementation here.
pub struct StubCrawlAdapter;

fn validate_url(url: &str) -> Result<(), CrawlError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(CrawlError::InvalidUrl(format!("unsupported scheme in '{url}'")));
    }
    Ok(())
}

#[async_trait]
impl CrawlAdapter for StubCrawlAdapter {
    async fn extract_one(&self, url: &str) -> Result<ExtractedPage, CrawlError> {
        validate_url(url)?;
        Ok(ExtractedPage {
            url: url.to_string(),
            title: Some(url.to_string()),
            markdown: format!("# {url}\n\nFetched at {}.\n", now_rfc3339()),
        })
    }

    async fn deep_crawl(&self, url: &str, _max_depth: u32, max_pages: usize) -> Result<DeepCrawlResult, CrawlError> {
        validate_url(url)?;
        let page = self.extract_one(url).await?;
        let pages = if max_pages == 0 { Vec::new() } else { vec![page] };
        Ok(DeepCrawlResult { pages, truncated_links: Vec::new() })
    }

    async fn preview_links(&self, url: &str) -> Result<Vec<LinkPreview>, CrawlError> {
        validate_url(url)?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extract_one_rejects_non_http_scheme() {
        let adapter = StubCrawlAdapter;
        let err = adapter.extract_one("ftp://example.com").await.unwrap_err();
        assert!(matches!(err, CrawlError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn extract_one_returns_markdown_page() {
        let adapter = StubCrawlAdapter;
        let page = adapter.extract_one("https://example.com").await.unwrap();
        assert_eq!(page.url, "https://example.com");
        assert!(page.markdown.contains("example.com"));
    }

    #[tokio::test]
    async fn deep_crawl_respects_zero_page_bound() {
        let adapter = StubCrawlAdapter;
        let result = adapter.deep_crawl("https://example.com", 2, 0).await.unwrap();
        assert!(result.pages.is_empty());
    }
}
