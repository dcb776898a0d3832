//! crates/archive_reader_core/src/cookies.rs
//!
//! The cookie store: the archive's credentials, persisted through the
//! `KeyValueStore` port as a JSON name/value map plus a cached identity.

use crate::domain::CredentialSession;
use crate::ports::{KeyValueStore, PortError, PortResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const COOKIES_KEY: &str = "archive_session_cookies";
pub const IDENTITY_KEY: &str = "archive_identity";

/// Splits raw `Set-Cookie` text into name/value pairs.
///
/// Several cookies may be joined with commas; a comma only starts a new cookie
/// when it is followed by a `name=` token, so `Expires=Wed, 21 Oct ...` stays
/// intact. Attributes after the first `;` of each cookie are ignored. Anything
/// that does not look like a cookie is skipped.
pub fn parse_set_cookie(raw: &str) -> Vec<(String, String)> {
    split_cookies(raw)
        .into_iter()
        .filter_map(|entry| {
            let pair = entry.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() || !name.chars().all(is_token_char) {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn split_cookies(raw: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    for (pos, ch) in raw.char_indices() {
        if ch == ',' && starts_new_cookie(&raw[pos + 1..]) {
            entries.push(&raw[start..pos]);
            start = pos + 1;
        }
    }
    entries.push(&raw[start..]);
    entries
}

fn starts_new_cookie(rest: &str) -> bool {
    let rest = rest.trim_start();
    let name_len = rest
        .find(|c: char| !is_token_char(c))
        .unwrap_or(rest.len());
    name_len > 0 && rest[name_len..].starts_with('=')
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

//=========================================================================================
// The Store
//=========================================================================================

#[derive(Clone)]
pub struct CookieStore {
    store: Arc<dyn KeyValueStore>,
}

impl CookieStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The stored cookies. A corrupt blob reads as an empty map.
    pub async fn cookies(&self) -> PortResult<BTreeMap<String, String>> {
        let Some(blob) = self.store.get(COOKIES_KEY).await? else {
            return Ok(BTreeMap::new());
        };
        match serde_json::from_str(&blob) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!("Discarding unreadable cookie blob: {}", e);
                Ok(BTreeMap::new())
            }
        }
    }

    pub async fn session(&self) -> PortResult<CredentialSession> {
        Ok(CredentialSession {
            cookies: self.cookies().await?,
            cached_identity: self.identity().await?,
        })
    }

    /// Parses `raw` and merges the pairs into the stored map; later values
    /// replace earlier ones with the same name. Returns how many pairs were found.
    pub async fn save(&self, raw: &str) -> PortResult<usize> {
        let pairs = parse_set_cookie(raw);
        if pairs.is_empty() {
            debug!("No cookies found in Set-Cookie text");
            return Ok(0);
        }
        let mut cookies = self.cookies().await?;
        let count = pairs.len();
        cookies.extend(pairs);
        self.write(&cookies).await?;
        Ok(count)
    }

    /// `name=value` pairs joined with `; `, or an empty string when nothing is stored.
    pub async fn build_cookie_header(&self) -> PortResult<String> {
        Ok(cookie_header(&self.cookies().await?))
    }

    pub async fn cookie(&self, name: &str) -> PortResult<Option<String>> {
        Ok(self.cookies().await?.remove(name))
    }

    pub async fn identity(&self) -> PortResult<Option<String>> {
        self.store.get(IDENTITY_KEY).await
    }

    pub async fn set_identity(&self, identity: &str) -> PortResult<()> {
        self.store.set(IDENTITY_KEY, identity).await
    }

    /// Removes every stored cookie and the cached identity.
    pub async fn clear(&self) -> PortResult<()> {
        self.store.remove(COOKIES_KEY).await?;
        self.store.remove(IDENTITY_KEY).await
    }

    async fn write(&self, cookies: &BTreeMap<String, String>) -> PortResult<()> {
        let blob = serde_json::to_string(cookies)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.store.set(COOKIES_KEY, &blob).await
    }
}

pub fn cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}
