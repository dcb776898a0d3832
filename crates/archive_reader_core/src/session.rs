//! crates/archive_reader_core/src/session.rs
//!
//! The session client: login handshake, identity discovery and authenticated
//! requests against the archive, all through the `HttpTransport` port.

use crate::cookies::{cookie_header, parse_set_cookie, CookieStore};
use crate::error::{ReaderError, ReaderResult};
use crate::ports::{HttpRequest, HttpResponse, HttpTransport};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

pub const DEFAULT_ORIGIN: &str = "https://archiveofourown.org";
pub const DEFAULT_SESSION_COOKIE: &str = "_otwarchive_session";

static AUTHENTICITY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="authenticity_token" value="([^"]+)""#).expect("token pattern is valid")
});

/// Profile-link patterns, most specific first: the greeting menu, the user
/// dropdown toggle, then any `/users/<name>` link at all.
static PROFILE_LINKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?is)id=["']greeting["'][^>]*>.*?href=["'](?:https?://[^/"']+)?/users/([^"'/?#]+)["']"#,
        r#"(?is)<a[^>]*class=["'][^"']*dropdown-toggle[^"']*["'][^>]*href=["'](?:https?://[^/"']+)?/users/([^"'/?#]+)["']"#,
        r#"(?is)<a[^>]*href=["'](?:https?://[^/"']+)?/users/([^"'/?#]+)["'][^>]*class=["'][^"']*dropdown-toggle"#,
        r#"(?i)href=["'](?:https?://[^/"']+)?/users/([^"'/?#]+)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("profile pattern is valid"))
    .collect()
});

/// `/users/<segment>` routes that are not user names.
const RESERVED_USER_SEGMENTS: [&str; 6] =
    ["login", "logout", "password", "new", "sign_up", "registrations"];

/// Where the archive lives and which cookie proves a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub origin: String,
    pub session_cookie: String,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }
}

impl Site {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), path)
    }

    pub fn login_url(&self) -> String {
        self.url("/users/login")
    }

    pub fn home_url(&self) -> String {
        self.url("/")
    }
}

/// The anti-forgery token plus whatever cookies the login page handed out,
/// which the token is bound to.
#[derive(Debug, Clone)]
pub struct LoginForm {
    pub token: String,
    pub cookies: BTreeMap<String, String>,
}

pub fn extract_authenticity_token(html: &str) -> Option<String> {
    AUTHENTICITY_TOKEN
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// The first user name linked from an authenticated page, decoded.
pub fn find_profile_name(html: &str) -> Option<String> {
    PROFILE_LINKS.iter().find_map(|pattern| {
        pattern.captures_iter(html).find_map(|caps| {
            let segment = caps.get(1)?.as_str();
            let name = urlencoding::decode(segment).ok()?.into_owned();
            (!name.is_empty() && !RESERVED_USER_SEGMENTS.contains(&name.as_str())).then_some(name)
        })
    })
}

//=========================================================================================
// The Client
//=========================================================================================

pub struct SessionClient {
    http: Arc<dyn HttpTransport>,
    cookies: CookieStore,
    site: Site,
}

impl SessionClient {
    pub fn new(http: Arc<dyn HttpTransport>, cookies: CookieStore, site: Site) -> Self {
        Self { http, cookies, site }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    /// GETs the login page and pulls out its anti-forgery token.
    pub async fn fetch_login_form(&self) -> ReaderResult<LoginForm> {
        let response = self.http.send(HttpRequest::get(self.site.login_url())).await?;
        let token = extract_authenticity_token(&response.body).ok_or(ReaderError::TokenNotFound)?;
        let cookies = response
            .set_cookie()
            .map(|raw| parse_set_cookie(&raw).into_iter().collect())
            .unwrap_or_default();
        Ok(LoginForm { token, cookies })
    }

    /// Logs in and stores the returned cookies.
    ///
    /// The archive redirects on success and on failure alike, so the only
    /// reliable signal is the session cookie in the response. Rejected
    /// credentials return `Ok(false)`; only transport problems and a missing
    /// token are errors.
    pub async fn login(&self, username: &str, password: &str) -> ReaderResult<bool> {
        let form = self.fetch_login_form().await?;

        let body = [
            ("user[login]", username),
            ("user[password]", password),
            ("authenticity_token", form.token.as_str()),
            ("commit", "Log in"),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

        let mut request = HttpRequest::post_form(self.site.login_url(), body)
            .header("Referer", self.site.login_url())
            .without_redirects();
        if !form.cookies.is_empty() {
            request = request.header("Cookie", cookie_header(&form.cookies));
        }
        let response = self.http.send(request).await?;

        let Some(raw) = response.set_cookie() else {
            warn!("Login response (status {}) set no cookies", response.status);
            return Ok(false);
        };
        let has_session = parse_set_cookie(&raw)
            .iter()
            .any(|(name, _)| *name == self.site.session_cookie);
        if !has_session {
            warn!("Login response (status {}) carried no session cookie", response.status);
            return Ok(false);
        }

        self.cookies.clear().await.map_err(ReaderError::storage)?;
        let saved = self.cookies.save(&raw).await.map_err(ReaderError::storage)?;
        info!("Login succeeded; stored {} cookies", saved);

        match self.resolve_identity().await {
            Ok(Some(name)) => info!("Logged in as {}", name),
            Ok(None) => warn!("Logged in, but no profile link was found"),
            Err(e) => warn!("Logged in, but identity discovery failed: {}", e),
        }
        Ok(true)
    }

    /// Finds the logged-in user name on the homepage and caches it.
    /// A failed or non-OK homepage fetch resolves to `None`.
    pub async fn resolve_identity(&self) -> ReaderResult<Option<String>> {
        let response = match self.authenticated_get(&self.site.home_url()).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Homepage fetch for identity failed: {}", e);
                return Ok(None);
            }
        };
        if !response.is_ok() {
            debug!("Homepage returned status {}", response.status);
            return Ok(None);
        }
        let name = find_profile_name(&response.body);
        if let Some(name) = &name {
            self.cookies.set_identity(name).await.map_err(ReaderError::storage)?;
        }
        Ok(name)
    }

    /// The cached identity, resolving it first if nothing is cached.
    pub async fn identity(&self) -> ReaderResult<Option<String>> {
        match self.cookies.identity().await.map_err(ReaderError::storage)? {
            Some(name) => Ok(Some(name)),
            None => self.resolve_identity().await,
        }
    }

    /// The stored value of the session cookie, if any.
    pub async fn session_token(&self) -> ReaderResult<Option<String>> {
        self.cookies
            .cookie(&self.site.session_cookie)
            .await
            .map_err(ReaderError::storage)
    }

    pub async fn is_authenticated(&self) -> ReaderResult<bool> {
        Ok(self.session_token().await?.is_some())
    }

    /// GET with the stored cookies attached. No retries; the caller interprets the status.
    pub async fn authenticated_get(&self, url: &str) -> ReaderResult<HttpResponse> {
        let cookie = self.cookies.build_cookie_header().await.map_err(ReaderError::storage)?;
        let mut request = HttpRequest::get(url);
        if !cookie.is_empty() {
            request = request.header("Cookie", cookie);
        }
        Ok(self.http.send(request).await?)
    }

    pub async fn logout(&self) -> ReaderResult<()> {
        self.cookies.clear().await.map_err(ReaderError::storage)?;
        info!("Session cleared");
        Ok(())
    }
}
