//! Fake ports shared by the integration tests.

#![allow(dead_code)]

use archive_reader_core::{
    CookieStore, FallbackPage, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    KeyValueStore, PageExtractor, PortError, PortResult, SessionClient, Site,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const ORIGIN: &str = "https://archiveofourown.org";

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: Vec::new(),
        body: body.to_string(),
    }
}

pub fn with_set_cookie(mut response: HttpResponse, value: &str) -> HttpResponse {
    response
        .headers
        .push(("Set-Cookie".to_string(), value.to_string()));
    response
}

#[derive(Clone)]
struct Route {
    result: Result<HttpResponse, String>,
    gate: Option<Arc<Notify>>,
}

/// Answers requests from a table keyed by method and url; unknown urls get a 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(HttpMethod, String), Route>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: HttpMethod, url: &str, response: HttpResponse) {
        self.routes.lock().unwrap().insert(
            (method, url.to_string()),
            Route {
                result: Ok(response),
                gate: None,
            },
        );
    }

    pub fn fail(&self, method: HttpMethod, url: &str, message: &str) {
        self.routes.lock().unwrap().insert(
            (method, url.to_string()),
            Route {
                result: Err(message.to_string()),
                gate: None,
            },
        );
    }

    /// Holds the response for `url` until the returned gate is notified.
    pub fn gated(&self, method: HttpMethod, url: &str, response: HttpResponse) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.routes.lock().unwrap().insert(
            (method, url.to_string()),
            Route {
                result: Ok(response),
                gate: Some(gate.clone()),
            },
        );
        gate
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn was_sent(&self, url: &str) -> bool {
        self.sent.lock().unwrap().iter().any(|r| r.url == url)
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> PortResult<HttpResponse> {
        let key = (request.method, request.url.clone());
        self.sent.lock().unwrap().push(request);
        let route = self.routes.lock().unwrap().get(&key).cloned();
        let Some(route) = route else {
            return Ok(response(404, "not found"));
        };
        if let Some(gate) = route.gate {
            gate.notified().await;
        }
        route.result.map_err(PortError::Network)
    }
}

#[derive(Default)]
pub struct MemoryStore(Mutex<HashMap<String, String>>);

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.0
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.0.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Fallback extractor returning a canned page and counting its calls.
#[derive(Default)]
pub struct FakeFallback {
    page: Mutex<Option<Result<FallbackPage, String>>>,
    calls: AtomicUsize,
}

impl FakeFallback {
    pub fn returning(page: FallbackPage) -> Arc<Self> {
        Arc::new(Self {
            page: Mutex::new(Some(Ok(page))),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            page: Mutex::new(Some(Err(message.to_string()))),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageExtractor for FakeFallback {
    async fn extract_page(&self, _url: &str) -> PortResult<FallbackPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.page.lock().unwrap().clone() {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => Err(PortError::Network(message)),
            None => Ok(FallbackPage::default()),
        }
    }
}

pub fn client(transport: Arc<FakeTransport>) -> (Arc<SessionClient>, CookieStore) {
    let cookies = CookieStore::new(Arc::new(MemoryStore::default()));
    let client = SessionClient::new(transport, cookies.clone(), Site::default());
    (Arc::new(client), cookies)
}

pub fn login_page(token: &str) -> String {
    format!(
        r#"<form action="/users/login" method="post"><input type="hidden" name="authenticity_token" value="{}" /></form>"#,
        token
    )
}
