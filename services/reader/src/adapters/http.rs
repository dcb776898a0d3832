//! services/reader/src/adapters/http.rs
//!
//! The `HttpTransport` port over `reqwest`.

use archive_reader_core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, PortError, PortResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tracing::debug;

/// Sends requests with `reqwest`. Cookies are never kept here; the session
/// client attaches them explicitly, so two plain clients suffice: one that
/// follows redirects and one that hands 3xx responses back untouched.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    no_redirect: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        let no_redirect = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client, no_redirect })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> PortResult<HttpResponse> {
        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect
        };
        let mut builder = match request.method {
            HttpMethod::Get => client.get(request.url.as_str()),
            HttpMethod::Post => client.post(request.url.as_str()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;
        debug!("{:?} {} -> {} ({} bytes)", request.method, request.url, status, body.len());

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
