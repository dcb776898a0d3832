//! crates/archive_reader_core/src/ports.rs
//!
//! Defines the service contracts (traits) the reader core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the HTTP client, the storage backend, the fallback page
//! renderer and the speech engines.

use crate::domain::FallbackPage;
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Network failure: {0}")]
    Network(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// HTTP
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
            follow_redirects: true,
        }
    }

    /// A form-encoded POST. `body` must already be url-encoded.
    pub fn post_form(url: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(body),
            follow_redirects: true,
        }
    }

    pub fn post_json(url: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
            follow_redirects: true,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every `Set-Cookie` value joined with `, `, the way a browser fetch exposes them.
    pub fn set_cookie(&self) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, v)| v.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request. Transport failures map to `PortError::Network`;
    /// any HTTP status, including 3xx and 4xx, is a successful send.
    async fn send(&self, request: HttpRequest) -> PortResult<HttpResponse>;
}

//=========================================================================================
// Persistence
//=========================================================================================

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
    async fn remove(&self, key: &str) -> PortResult<()>;
}

//=========================================================================================
// Secondary page acquisition
//=========================================================================================

#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Loads `url` through a path independent of the logged-in session and
    /// reports whatever chapter data it could find.
    async fn extract_page(&self, url: &str) -> PortResult<FallbackPage>;
}

//=========================================================================================
// Speech
//=========================================================================================

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Speaks `text`, returning once the utterance has finished or was stopped.
    async fn speak(&self, text: &str) -> PortResult<()>;
    async fn stop(&self) -> PortResult<()>;
    async fn pause(&self) -> PortResult<()>;
    async fn resume(&self) -> PortResult<()>;
    fn is_active(&self) -> bool;
}
