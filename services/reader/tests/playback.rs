//! Continuous playback over a loaded chapter.

use archive_reader_core::{
    CookieStore, HttpRequest, HttpResponse, HttpTransport, NestingStrategy, PortResult,
    ReaderSession, SessionClient, Site, SpeechEngine,
};
use async_trait::async_trait;
use reader_lib::adapters::{MemoryStore, PublicPageExtractor};
use reader_lib::playback::speak_chapter;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const CHAPTER: &str = "https://archiveofourown.org/works/1/chapters/2";

struct ChapterSite;

#[async_trait]
impl HttpTransport for ChapterSite {
    async fn send(&self, _request: HttpRequest) -> PortResult<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: r#"<h2 class="title">W</h2><div class="userstuff module"><p>One.</p><p>Two.</p><p>Three.</p></div>"#
                .to_string(),
        })
    }
}

/// Remembers what it was asked to say; cancels `token` after `cancel_after` utterances.
struct RecordingEngine {
    said: Mutex<Vec<String>>,
    stopped: Mutex<bool>,
    cancel: Option<(usize, CancellationToken)>,
}

impl RecordingEngine {
    fn new(cancel: Option<(usize, CancellationToken)>) -> Arc<Self> {
        Arc::new(Self {
            said: Mutex::new(Vec::new()),
            stopped: Mutex::new(false),
            cancel,
        })
    }

    fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechEngine for RecordingEngine {
    async fn speak(&self, text: &str) -> PortResult<()> {
        let count = {
            let mut said = self.said.lock().unwrap();
            said.push(text.to_string());
            said.len()
        };
        if let Some((after, token)) = &self.cancel {
            if count == *after {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn stop(&self) -> PortResult<()> {
        *self.stopped.lock().unwrap() = true;
        Ok(())
    }

    async fn pause(&self) -> PortResult<()> {
        Ok(())
    }

    async fn resume(&self) -> PortResult<()> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }
}

async fn loaded_reader() -> ReaderSession {
    let http: Arc<dyn HttpTransport> = Arc::new(ChapterSite);
    let cookies = CookieStore::new(Arc::new(MemoryStore::default()));
    let client = Arc::new(SessionClient::new(http.clone(), cookies, Site::default()));
    let fallback = Arc::new(PublicPageExtractor::new(http, "https://archiveofourown.org"));
    let reader = ReaderSession::new(client, fallback, NestingStrategy::Markers);
    reader.open(CHAPTER).await.unwrap();
    reader
}

#[tokio::test]
async fn speaks_from_the_cursor_to_the_end() {
    let reader = loaded_reader().await;
    reader.set_speech_index(1).await;
    let engine = RecordingEngine::new(None);

    let spoken = speak_chapter(&reader, engine.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(spoken, 2);
    assert_eq!(engine.said(), vec!["Two.", "Three."]);
    assert_eq!(reader.current_paragraph().await, Some((2, "Three.".to_string())));
}

#[tokio::test]
async fn cancellation_stops_the_engine() {
    let reader = loaded_reader().await;
    let token = CancellationToken::new();
    let engine = RecordingEngine::new(Some((1, token.clone())));

    let spoken = speak_chapter(&reader, engine.clone(), token).await.unwrap();

    assert_eq!(spoken, 1);
    assert_eq!(engine.said(), vec!["One."]);
    assert!(*engine.stopped.lock().unwrap());
    assert_eq!(reader.current_paragraph().await, Some((1, "Two.".to_string())));
}
