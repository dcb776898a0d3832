//! services/reader/src/adapters/fallback.rs
//!
//! The secondary acquisition path: fetches the public rendering of a page,
//! without the session cookies, and extracts whatever it can.

use archive_reader_core::{
    ChapterExtractor, FallbackPage, HttpRequest, HttpTransport, PageExtractor, PortError,
    PortResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PublicPageExtractor {
    http: Arc<dyn HttpTransport>,
    extractor: ChapterExtractor,
}

impl PublicPageExtractor {
    pub fn new(http: Arc<dyn HttpTransport>, origin: &str) -> Self {
        Self {
            http,
            extractor: ChapterExtractor::new(origin),
        }
    }
}

/// `url` with the adult-content interstitial skipped.
pub fn with_adult_view(url: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    if base.contains("view_adult=true") {
        return url.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    match fragment {
        Some(fragment) => format!("{}{}view_adult=true#{}", base, separator, fragment),
        None => format!("{}{}view_adult=true", base, separator),
    }
}

#[async_trait]
impl PageExtractor for PublicPageExtractor {
    async fn extract_page(&self, url: &str) -> PortResult<FallbackPage> {
        let public_url = with_adult_view(url);
        info!("Fetching public page {}", public_url);
        let response = self.http.send(HttpRequest::get(public_url.as_str())).await?;
        match response.status {
            404 => return Err(PortError::NotFound(public_url)),
            status if !response.is_ok() => {
                return Err(PortError::Network(format!("status {} from {}", status, public_url)))
            }
            _ => {}
        }

        let page = self.extractor.extract_partial(&response.body, url);
        debug!(
            "Public page had body: {}, {} chapter links",
            page.body_html.is_some(),
            page.links.len()
        );
        Ok(page)
    }
}
