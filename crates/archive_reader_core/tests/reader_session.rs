//! Chapter loading, navigation and comments through `ReaderSession`.

mod common;

use archive_reader_core::{
    ChapterLink, ContentSource, FallbackPage, HttpMethod, NavigationOutcome, NestingStrategy,
    ReaderError, ReaderSession,
};
use common::{client, response, FakeFallback, FakeTransport, ORIGIN};
use std::sync::Arc;

fn chapter_url(id: u32) -> String {
    format!("{}/works/1/chapters/{}", ORIGIN, id)
}

fn chapter_page(selected: u32, body: &str) -> String {
    let option = |id: u32, label: &str| {
        let marker = if id == selected { r#" selected="selected""# } else { "" };
        format!(r#"<option value="{id}"{marker}>{label}</option>"#)
    };
    format!(
        r#"<h2 class="title heading">The Work</h2>
           <select id="selected_id" name="selected_id">{}{}</select>
           <div class="userstuff module" role="article">{}</div>"#,
        option(11, "1. Start"),
        option(12, "2. End"),
        body
    )
}

fn session(transport: Arc<FakeTransport>, fallback: Arc<FakeFallback>) -> ReaderSession {
    let (client, _) = client(transport);
    ReaderSession::new(client, fallback, NestingStrategy::TagStack)
}

fn unused_fallback() -> Arc<FakeFallback> {
    FakeFallback::failing("fallback should not run")
}

#[tokio::test]
async fn authenticated_page_is_used_when_it_has_a_body() {
    let transport = FakeTransport::new();
    transport.on(
        HttpMethod::Get,
        &chapter_url(11),
        response(200, &chapter_page(11, "<p>First.</p><p>Second.</p>")),
    );
    let fallback = unused_fallback();
    let reader = session(transport, fallback.clone());

    let outcome = reader.open(&chapter_url(11)).await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Loaded(ContentSource::Authenticated));
    assert_eq!(fallback.calls(), 0);
    let state = reader.snapshot().await;
    assert_eq!(state.work_title, "The Work");
    assert_eq!(state.chapter_title, "1. Start");
    assert_eq!(state.paragraphs, vec!["First.", "Second."]);
    assert_eq!(state.chapters.len(), 2);
    assert_eq!(state.index, 0);
    assert!(state.has_next());
    assert!(!state.has_prev());
}

#[tokio::test]
async fn fallback_runs_when_the_session_page_has_no_body() {
    let transport = FakeTransport::new();
    transport.on(
        HttpMethod::Get,
        &chapter_url(11),
        response(200, "<html><body><p>Please log in</p></body></html>"),
    );
    let fallback = FakeFallback::returning(FallbackPage {
        work_title: Some("Public Work".into()),
        chapter_title: None,
        body_html: Some("<p>Public text.</p>".into()),
        links: vec![ChapterLink {
            url: chapter_url(11),
            label: "1. Start".into(),
        }],
    });
    let reader = session(transport, fallback.clone());

    let outcome = reader.open(&chapter_url(11)).await.unwrap();

    assert_eq!(outcome, NavigationOutcome::Loaded(ContentSource::Fallback));
    assert_eq!(fallback.calls(), 1);
    let state = reader.snapshot().await;
    assert_eq!(state.work_title, "Public Work");
    assert_eq!(state.paragraphs, vec!["Public text."]);
    assert_eq!(state.chapters.len(), 1);
}

#[tokio::test]
async fn fallback_runs_on_an_error_status() {
    let transport = FakeTransport::new();
    transport.on(HttpMethod::Get, &chapter_url(11), response(500, "oops"));
    let fallback = FakeFallback::returning(FallbackPage {
        body_html: Some("<p>Recovered.</p>".into()),
        ..FallbackPage::default()
    });
    let reader = session(transport, fallback);

    assert_eq!(
        reader.open(&chapter_url(11)).await.unwrap(),
        NavigationOutcome::Loaded(ContentSource::Fallback)
    );
}

#[tokio::test]
async fn no_content_anywhere_is_content_not_found() {
    let transport = FakeTransport::new();
    let fallback = FakeFallback::returning(FallbackPage::default());
    let reader = session(transport, fallback);

    let err = reader.open(&chapter_url(11)).await.unwrap_err();

    assert!(matches!(err, ReaderError::ContentNotFound(url) if url == chapter_url(11)));
    assert!(reader.snapshot().await.body_html.is_empty());
}

#[tokio::test]
async fn failing_fallback_is_a_network_error() {
    let transport = FakeTransport::new();
    let reader = session(transport, FakeFallback::failing("timed out"));

    let err = reader.open(&chapter_url(11)).await.unwrap_err();
    assert!(matches!(err, ReaderError::Network(_)));
}

#[tokio::test]
async fn next_and_prev_walk_the_chapter_list() {
    let transport = FakeTransport::new();
    transport.on(
        HttpMethod::Get,
        &chapter_url(11),
        response(200, &chapter_page(11, "<p>One.</p>")),
    );
    transport.on(
        HttpMethod::Get,
        &chapter_url(12),
        response(200, &chapter_page(12, "<p>Two.</p>")),
    );
    let reader = session(transport, unused_fallback());
    reader.open(&chapter_url(11)).await.unwrap();

    assert_eq!(reader.prev().await.unwrap(), NavigationOutcome::Unchanged);

    assert_eq!(
        reader.next().await.unwrap(),
        NavigationOutcome::Loaded(ContentSource::Authenticated)
    );
    let state = reader.snapshot().await;
    assert_eq!(state.index, 1);
    assert_eq!(state.current_url, chapter_url(12));
    assert_eq!(state.chapter_title, "2. End");
    assert_eq!(state.paragraphs, vec!["Two."]);

    assert_eq!(reader.next().await.unwrap(), NavigationOutcome::Unchanged);
    assert_eq!(
        reader.prev().await.unwrap(),
        NavigationOutcome::Loaded(ContentSource::Authenticated)
    );
    assert_eq!(reader.snapshot().await.paragraphs, vec!["One."]);
    assert_eq!(reader.go_to(7).await.unwrap(), NavigationOutcome::Unchanged);
}

#[tokio::test]
async fn superseded_load_is_discarded() {
    let transport = FakeTransport::new();
    let gate = transport.gated(
        HttpMethod::Get,
        &chapter_url(11),
        response(200, &chapter_page(11, "<p>Slow.</p>")),
    );
    transport.on(
        HttpMethod::Get,
        &chapter_url(12),
        response(200, &chapter_page(12, "<p>Fast.</p>")),
    );
    let reader = session(transport.clone(), unused_fallback());

    let slow = {
        let reader = reader.clone();
        tokio::spawn(async move { reader.open(&chapter_url(11)).await })
    };
    while !transport.was_sent(&chapter_url(11)) {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        reader.open(&chapter_url(12)).await.unwrap(),
        NavigationOutcome::Loaded(ContentSource::Authenticated)
    );
    gate.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), NavigationOutcome::Stale);

    let state = reader.snapshot().await;
    assert_eq!(state.current_url, chapter_url(12));
    assert_eq!(state.paragraphs, vec!["Fast."]);
}

#[tokio::test]
async fn comments_come_from_the_expanded_page() {
    let transport = FakeTransport::new();
    transport.on(
        HttpMethod::Get,
        &chapter_url(11),
        response(200, &chapter_page(11, "<p>x</p>")),
    );
    transport.on(
        HttpMethod::Get,
        &format!("{}?show_comments=true#comments", chapter_url(11)),
        response(
            200,
            r#"<ol class="thread"><li class="comment" id="comment_9"><blockquote class="userstuff">Nice</blockquote></li></ol>"#,
        ),
    );
    let reader = session(transport, unused_fallback());
    reader.open(&chapter_url(11)).await.unwrap();

    let forest = reader.load_comments().await;
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].body_text, "Nice");
}

#[tokio::test]
async fn unavailable_comments_are_an_empty_forest() {
    let transport = FakeTransport::new();
    let comments = format!("{}?show_comments=true#comments", chapter_url(11));
    transport.on(HttpMethod::Get, &comments, response(500, ""));
    let reader = session(transport, unused_fallback());

    assert!(matches!(
        reader.try_load_comments(&chapter_url(11)).await,
        Err(ReaderError::CommentsUnavailable(_))
    ));
    // No chapter was opened, so the current url is empty; that must not panic either.
    assert!(reader.load_comments().await.is_empty());
}

#[tokio::test]
async fn speech_cursor_stays_within_the_paragraphs() {
    let transport = FakeTransport::new();
    transport.on(
        HttpMethod::Get,
        &chapter_url(11),
        response(200, &chapter_page(11, "<p>A.</p><p>B.</p><p>C.</p>")),
    );
    let reader = session(transport, unused_fallback());
    reader.open(&chapter_url(11)).await.unwrap();

    assert_eq!(reader.current_paragraph().await, Some((0, "A.".to_string())));
    assert_eq!(reader.set_speech_index(99).await, 2);
    assert!(!reader.advance_speech().await);
    reader.set_speech_index(0).await;
    assert!(reader.advance_speech().await);
    assert_eq!(reader.current_paragraph().await, Some((1, "B.".to_string())));
}
