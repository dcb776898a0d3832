//! crates/archive_reader_core/src/reader.rs
//!
//! Reader session state: the current chapter, navigation through a work, and
//! the two ways of getting a chapter's content.

use crate::chapter::{self, ChapterExtractor};
use crate::comments::{self, NestingStrategy};
use crate::domain::{ChapterLink, ChapterPageData, Comment, FallbackPage};
use crate::error::{ReaderError, ReaderResult};
use crate::ports::PageExtractor;
use crate::session::SessionClient;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where a chapter's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Authenticated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Loaded(ContentSource),
    /// A newer navigation started while this one was in flight; its result was discarded.
    Stale,
    /// Already at the first or last chapter.
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct ReaderState {
    pub chapters: Vec<ChapterLink>,
    pub index: usize,
    pub current_url: String,
    pub work_title: String,
    pub chapter_title: String,
    pub body_html: String,
    pub paragraphs: Vec<String>,
    pub speech_index: usize,
    request_token: u64,
}

impl ReaderState {
    pub fn has_next(&self) -> bool {
        self.index + 1 < self.chapters.len()
    }

    pub fn has_prev(&self) -> bool {
        self.index > 0 && !self.chapters.is_empty()
    }

    fn apply_page(&mut self, page: ChapterPageData) {
        self.work_title = page.work_title;
        self.chapter_title = page.chapter_title;
        self.set_links(page.sibling_chapters);
        self.set_body(page.body_html);
    }

    fn apply_fallback(&mut self, page: FallbackPage, body: String) {
        if let Some(title) = page.work_title.filter(|t| !t.is_empty()) {
            self.work_title = title;
        }
        if let Some(title) = page.chapter_title.filter(|t| !t.is_empty()) {
            self.chapter_title = title;
        }
        self.set_links(page.links);
        self.set_body(body);
    }

    fn set_links(&mut self, links: Vec<ChapterLink>) {
        if !links.is_empty() {
            self.chapters = links;
        }
        if let Some(pos) = self.chapters.iter().position(|c| c.url == self.current_url) {
            self.index = pos;
        }
    }

    fn set_body(&mut self, body: String) {
        self.paragraphs = chapter::paragraphs(&body);
        self.body_html = body;
        self.speech_index = 0;
    }
}

/// Drives reading: one instance per open work, cheap to clone.
#[derive(Clone)]
pub struct ReaderSession {
    client: Arc<SessionClient>,
    fallback: Arc<dyn PageExtractor>,
    extractor: ChapterExtractor,
    nesting: NestingStrategy,
    state: Arc<Mutex<ReaderState>>,
}

impl ReaderSession {
    pub fn new(
        client: Arc<SessionClient>,
        fallback: Arc<dyn PageExtractor>,
        nesting: NestingStrategy,
    ) -> Self {
        let extractor = ChapterExtractor::new(client.site().origin.clone());
        Self {
            client,
            fallback,
            extractor,
            nesting,
            state: Arc::new(Mutex::new(ReaderState::default())),
        }
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub async fn snapshot(&self) -> ReaderState {
        self.state.lock().await.clone()
    }

    /// Opens a chapter by url, keeping the known chapter list.
    pub async fn open(&self, url: &str) -> ReaderResult<NavigationOutcome> {
        self.load(url.to_string()).await
    }

    pub async fn next(&self) -> ReaderResult<NavigationOutcome> {
        let target = {
            let state = self.state.lock().await;
            state.has_next().then(|| state.index + 1)
        };
        match target {
            Some(index) => self.go_to(index).await,
            None => Ok(NavigationOutcome::Unchanged),
        }
    }

    pub async fn prev(&self) -> ReaderResult<NavigationOutcome> {
        let target = {
            let state = self.state.lock().await;
            state.has_prev().then(|| state.index - 1)
        };
        match target {
            Some(index) => self.go_to(index).await,
            None => Ok(NavigationOutcome::Unchanged),
        }
    }

    pub async fn go_to(&self, index: usize) -> ReaderResult<NavigationOutcome> {
        let url = {
            let mut state = self.state.lock().await;
            let Some(link) = state.chapters.get(index) else {
                return Ok(NavigationOutcome::Unchanged);
            };
            let url = link.url.clone();
            info!("Navigating from chapter {} to {} ({})", state.index, index, url);
            state.index = index;
            url
        };
        self.load(url).await
    }

    /// Loads `url` with the session first and the fallback second, never both
    /// at once. Results from a navigation that has since been superseded are
    /// dropped.
    async fn load(&self, url: String) -> ReaderResult<NavigationOutcome> {
        let token = {
            let mut state = self.state.lock().await;
            state.request_token += 1;
            state.current_url = url.clone();
            state.set_body(String::new());
            state.request_token
        };

        if let Some(page) = self.fetch_with_session(&url).await {
            let mut state = self.state.lock().await;
            if state.request_token != token {
                debug!("Discarding stale chapter load for {}", url);
                return Ok(NavigationOutcome::Stale);
            }
            state.apply_page(page);
            return Ok(NavigationOutcome::Loaded(ContentSource::Authenticated));
        }

        info!("Falling back to public extraction for {}", url);
        let fallback = self.fallback.extract_page(&url).await;

        let mut state = self.state.lock().await;
        if state.request_token != token {
            debug!("Discarding stale fallback load for {}", url);
            return Ok(NavigationOutcome::Stale);
        }
        let mut page = fallback?;
        match page.body_html.take().filter(|b| !b.trim().is_empty()) {
            Some(body) => {
                state.apply_fallback(page, body);
                Ok(NavigationOutcome::Loaded(ContentSource::Fallback))
            }
            None => Err(ReaderError::ContentNotFound(url)),
        }
    }

    async fn fetch_with_session(&self, url: &str) -> Option<ChapterPageData> {
        let response = match self.client.authenticated_get(url).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Authenticated fetch of {} failed: {}", url, e);
                return None;
            }
        };
        if !response.is_ok() {
            warn!("Authenticated fetch of {} returned {}", url, response.status);
            return None;
        }
        match self.extractor.extract(&response.body, url) {
            Ok(page) => Some(page),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    /// Comments for the current chapter. Never fails: any problem is logged
    /// and yields an empty forest.
    pub async fn load_comments(&self) -> Vec<Comment> {
        let url = self.state.lock().await.current_url.clone();
        match self.try_load_comments(&url).await {
            Ok(forest) => forest,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_load_comments(&self, chapter_url: &str) -> ReaderResult<Vec<Comment>> {
        let url = chapter::comments_url(chapter_url);
        debug!("Fetching comments from {}", url);
        let response = self
            .client
            .authenticated_get(&url)
            .await
            .map_err(|e| ReaderError::CommentsUnavailable(e.to_string()))?;
        if !response.is_ok() {
            return Err(ReaderError::CommentsUnavailable(format!(
                "status {} from {}",
                response.status, url
            )));
        }
        Ok(comments::build_comment_tree(&response.body, self.nesting))
    }

    //=====================================================================================
    // Speech cursor
    //=====================================================================================

    pub async fn set_speech_index(&self, index: usize) -> usize {
        let mut state = self.state.lock().await;
        state.speech_index = index.min(state.paragraphs.len().saturating_sub(1));
        state.speech_index
    }

    /// The paragraph under the cursor, if any.
    pub async fn current_paragraph(&self) -> Option<(usize, String)> {
        let state = self.state.lock().await;
        state
            .paragraphs
            .get(state.speech_index)
            .map(|p| (state.speech_index, p.clone()))
    }

    /// Moves the cursor forward; `false` once the last paragraph was reached.
    pub async fn advance_speech(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.speech_index + 1 < state.paragraphs.len() {
            state.speech_index += 1;
            true
        } else {
            false
        }
    }
}
