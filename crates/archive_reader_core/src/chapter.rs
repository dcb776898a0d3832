//! crates/archive_reader_core/src/chapter.rs
//!
//! Pulls the chapter body, titles and the chapter list out of a work page.

use crate::domain::{ChapterLink, ChapterPageData, FallbackPage};
use crate::error::{ReaderError, ReaderResult};
use crate::markup::{self, Tag};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WORK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"works/(\d+)").expect("work id pattern is valid"));

static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").expect("paragraph pattern is valid")
});

/// Chapter body containers, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyContainer {
    /// `div.userstuff.module`
    PrimaryContent,
    /// `div#chapters`
    ChaptersContainer,
    /// `div.workskin`
    WorkSkin,
    /// `div[id^="chapter-"]`
    ChapterId,
}

impl BodyContainer {
    const ORDER: [BodyContainer; 4] = [
        BodyContainer::PrimaryContent,
        BodyContainer::ChaptersContainer,
        BodyContainer::WorkSkin,
        BodyContainer::ChapterId,
    ];

    fn matches(self, tag: &Tag<'_>) -> bool {
        if !tag.opens("div") {
            return false;
        }
        match self {
            BodyContainer::PrimaryContent => tag.has_class("userstuff") && tag.has_class("module"),
            BodyContainer::ChaptersContainer => tag.id() == Some("chapters"),
            BodyContainer::WorkSkin => tag.has_class("workskin"),
            BodyContainer::ChapterId => tag.id().is_some_and(|id| id.starts_with("chapter-")),
        }
    }
}

/// A `<p>` of the chapter body that carries readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphSpan {
    /// Byte offset of the `<p` tag within the body.
    pub start: usize,
    /// Byte offset just past the closing `</p>`.
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ChapterExtractor {
    origin: String,
}

impl ChapterExtractor {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    /// Extracts a chapter from the page at `page_url`.
    ///
    /// Fails with `ContentNotFound` when no container holds a chapter body; the
    /// caller should try another way of getting the page rather than report it.
    pub fn extract(&self, html: &str, page_url: &str) -> ReaderResult<ChapterPageData> {
        let body = body_html(html).ok_or_else(|| ReaderError::ContentNotFound(page_url.to_string()))?;
        let work_title = work_title(html).unwrap_or_default();
        let chapter_title = chapter_title(html).unwrap_or_else(|| work_title.clone());
        Ok(ChapterPageData {
            work_title,
            chapter_title,
            body_html: body.to_string(),
            sibling_chapters: self.chapter_links(html, page_url),
        })
    }

    /// Whatever can be recovered from a page, even without a body.
    pub fn extract_partial(&self, html: &str, page_url: &str) -> FallbackPage {
        let work_title = work_title(html);
        FallbackPage {
            chapter_title: chapter_title(html).or_else(|| work_title.clone()),
            work_title,
            body_html: body_html(html).map(str::to_string),
            links: self.chapter_links(html, page_url),
        }
    }

    /// The chapter list: the chapter picker's options when present, otherwise
    /// the anchors of the known chapter-list containers. Deduplicated by
    /// absolute url, first occurrence wins.
    pub fn chapter_links(&self, html: &str, page_url: &str) -> Vec<ChapterLink> {
        let mut raw: Vec<(String, String)> = chapter_picker(html)
            .into_iter()
            .map(|option| (option.value, option.label))
            .collect();
        if raw.is_empty() {
            raw = list_anchors(html);
        }

        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(|(href, label)| {
                let url = self.absolute_url(&href, page_url)?;
                seen.insert(url.clone()).then_some(ChapterLink { url, label })
            })
            .collect()
    }

    /// Resolves a chapter href against the site origin. A bare numeric id becomes
    /// `/works/{work}/chapters/{id}`, with the work id taken from `page_url`.
    pub fn absolute_url(&self, href: &str, page_url: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(href.to_string());
        }
        if href.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(work_id) = work_id(page_url) {
                return Some(format!("{}/works/{}/chapters/{}", self.origin, work_id, href));
            }
        }
        if href.starts_with('/') {
            Some(format!("{}{}", self.origin, href))
        } else {
            Some(format!("{}/{}", self.origin, href))
        }
    }
}

/// Inner markup of the first non-empty chapter container, untouched.
pub fn body_html(html: &str) -> Option<&str> {
    BodyContainer::ORDER.iter().find_map(|container| {
        markup::tags(html)
            .filter(|tag| container.matches(tag))
            .filter_map(|tag| markup::inner_html(html, &tag))
            .find(|inner| !inner.trim().is_empty())
    })
}

pub fn work_title(html: &str) -> Option<String> {
    let heading = markup::find_open(html, "h2", |t| t.has_class("title"))
        .and_then(|tag| markup::inner_html(html, &tag))
        .map(markup::plain_text)
        .filter(|t| !t.is_empty());
    heading.or_else(|| {
        markup::find_open(html, "title", |_| true)
            .and_then(|tag| markup::inner_html(html, &tag))
            .map(markup::plain_text)
            .filter(|t| !t.is_empty())
    })
}

/// The selected chapter picker option, else the chapter preface heading.
pub fn chapter_title(html: &str) -> Option<String> {
    chapter_picker(html)
        .into_iter()
        .find(|option| option.selected)
        .map(|option| option.label)
        .filter(|label| !label.is_empty())
        .or_else(|| {
            markup::find_open(html, "h3", |t| t.has_class("title"))
                .and_then(|tag| markup::inner_html(html, &tag))
                .map(markup::plain_text)
                .filter(|t| !t.is_empty())
        })
}

pub fn work_id(url: &str) -> Option<&str> {
    WORK_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Readable paragraphs of a chapter body, in order.
pub fn paragraphs(body: &str) -> Vec<String> {
    paragraph_spans(body).into_iter().map(|p| p.text).collect()
}

pub fn paragraph_spans(body: &str) -> Vec<ParagraphSpan> {
    PARAGRAPH
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let text = markup::plain_text(caps.get(1)?.as_str());
            (!text.is_empty()).then_some(ParagraphSpan {
                start: whole.start(),
                end: whole.end(),
                text,
            })
        })
        .collect()
}

/// The url of the chapter page with its comments expanded.
pub fn comments_url(chapter_url: &str) -> String {
    let base = chapter_url.split('#').next().unwrap_or(chapter_url);
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}show_comments=true#comments", base, separator)
}

struct PickerOption {
    value: String,
    label: String,
    selected: bool,
}

fn chapter_picker(html: &str) -> Vec<PickerOption> {
    let Some(select) = markup::find_open(html, "select", |t| t.id() == Some("selected_id")) else {
        return Vec::new();
    };
    let Some(range) = markup::element_inner(html, &select) else {
        return Vec::new();
    };
    let options = &html[range];
    markup::tags(options)
        .filter(|tag| tag.opens("option"))
        .filter_map(|tag| {
            let value = tag.attr("value")?.trim();
            if value.is_empty() {
                return None;
            }
            let label = markup::inner_html(options, &tag)
                .map(markup::plain_text)
                .unwrap_or_default();
            Some(PickerOption {
                value: value.to_string(),
                label,
                selected: tag.has_attr("selected"),
            })
        })
        .collect()
}

fn is_chapter_list(tag: &Tag<'_>) -> bool {
    if tag.closing {
        return false;
    }
    (tag.opens("ol") && tag.has_class("chapter"))
        || tag.id() == Some("chapter_index")
        || tag.has_class("chapter_list")
        || tag.has_class("chapters")
}

fn list_anchors(html: &str) -> Vec<(String, String)> {
    let mut containers: Vec<std::ops::Range<usize>> = Vec::new();
    for tag in markup::tags(html).filter(is_chapter_list) {
        let Some(range) = markup::element_inner(html, &tag) else {
            continue;
        };
        // Containers nested in one already collected add nothing new.
        if containers.last().is_some_and(|prev| prev.end >= range.end) {
            continue;
        }
        containers.push(range);
    }

    let mut anchors = Vec::new();
    for range in containers {
        let section = &html[range];
        for tag in markup::tags(section).filter(|t| t.opens("a")) {
            let Some(href) = tag.attr("href").filter(|h| !h.trim().is_empty()) else {
                continue;
            };
            let label = markup::inner_html(section, &tag)
                .map(markup::plain_text)
                .unwrap_or_default();
            anchors.push((href.to_string(), label));
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://archiveofourown.org/works/68204906/chapters/177910986";

    fn extractor() -> ChapterExtractor {
        ChapterExtractor::new("https://archiveofourown.org")
    }

    #[test]
    fn body_is_byte_identical_to_the_container() {
        let inner = "\n<h3 class=\"landmark\">Chapter Text</h3>\n<p>One &amp; two</p><div class=\"note\"><p>x</p></div>\n";
        let html = format!(
            "<html><body><div class=\"userstuff module\" role=\"article\">{}</div><div>after</div></body></html>",
            inner
        );
        let page = extractor().extract(&html, PAGE_URL).unwrap();
        assert_eq!(page.body_html, inner);
    }

    #[test]
    fn falls_back_through_containers_in_order() {
        let html = "<div class=\"workskin\"><p>skin</p></div><div id=\"chapter-3\"><p>id</p></div>";
        assert_eq!(body_html(html), Some("<p>skin</p>"));

        let html = "<div id=\"chapter-3\"><p>by id</p></div>";
        assert_eq!(body_html(html), Some("<p>by id</p>"));
    }

    #[test]
    fn empty_primary_container_is_skipped() {
        let html = "<div class=\"userstuff module\">  </div><div id=\"chapters\"><p>real</p></div>";
        assert_eq!(body_html(html), Some("<p>real</p>"));
    }

    #[test]
    fn page_without_container_is_content_not_found() {
        let err = extractor()
            .extract("<html><body><p>Log in</p></body></html>", PAGE_URL)
            .unwrap_err();
        assert!(matches!(err, ReaderError::ContentNotFound(_)));
    }

    #[test]
    fn picker_options_become_absolute_links() {
        let html = r#"
            <h2 class="title heading">  My &amp; Work </h2>
            <select name="selected_id" id="selected_id">
              <option value="177910985">1. Start</option>
              <option selected="selected" value="177910986">2. Middle</option>
              <option value="/works/68204906/chapters/177910987">3. End</option>
              <option value="177910985">1. Start again</option>
            </select>
            <div class="userstuff module"><p>text</p></div>"#;
        let page = extractor().extract(html, PAGE_URL).unwrap();

        assert_eq!(page.work_title, "My & Work");
        assert_eq!(page.chapter_title, "2. Middle");
        let urls: Vec<&str> = page.sibling_chapters.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://archiveofourown.org/works/68204906/chapters/177910985",
                "https://archiveofourown.org/works/68204906/chapters/177910986",
                "https://archiveofourown.org/works/68204906/chapters/177910987",
            ]
        );
        assert_eq!(page.sibling_chapters[0].label, "1. Start");
    }

    #[test]
    fn falls_back_to_chapter_list_anchors() {
        let html = r#"
            <ol class="chapter index group">
              <li><a href="/works/1/chapters/10">Chapter 1</a></li>
              <li><a href="/works/1/chapters/11">Chapter 2</a></li>
              <li><a href="https://archiveofourown.org/works/1/chapters/10">dup</a></li>
            </ol>"#;
        let links = extractor().chapter_links(html, "https://archiveofourown.org/works/1/navigate");
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].url, "https://archiveofourown.org/works/1/chapters/11");
        assert_eq!(links[1].label, "Chapter 2");
    }

    #[test]
    fn normalizes_relative_hrefs() {
        let ex = extractor();
        assert_eq!(
            ex.absolute_url("42", PAGE_URL).as_deref(),
            Some("https://archiveofourown.org/works/68204906/chapters/42")
        );
        assert_eq!(
            ex.absolute_url("42", "https://archiveofourown.org/collections/x").as_deref(),
            Some("https://archiveofourown.org/42")
        );
        assert_eq!(
            ex.absolute_url("works/5", PAGE_URL).as_deref(),
            Some("https://archiveofourown.org/works/5")
        );
        assert_eq!(ex.absolute_url("  ", PAGE_URL), None);
    }

    #[test]
    fn origin_trailing_slash_is_dropped() {
        let ex = ChapterExtractor::new("https://archiveofourown.org/");
        assert_eq!(
            ex.absolute_url("/works/5", PAGE_URL).as_deref(),
            Some("https://archiveofourown.org/works/5")
        );
    }

    #[test]
    fn chapter_title_falls_back_to_preface_then_work() {
        let html = r#"<h2 class="title">Work</h2><h3 class="title"><a href="/works/1/chapters/2">Chapter 2</a>: Rain</h3><div id="chapters"><p>x</p></div>"#;
        let page = extractor().extract(html, PAGE_URL).unwrap();
        assert_eq!(page.chapter_title, "Chapter 2: Rain");

        let html = r#"<title>Only Title</title><div id="chapters"><p>x</p></div>"#;
        let page = extractor().extract(html, PAGE_URL).unwrap();
        assert_eq!(page.work_title, "Only Title");
        assert_eq!(page.chapter_title, "Only Title");
    }

    #[test]
    fn paragraphs_skip_empty_ones() {
        let body = "<p>First <em>line</em></p><p> </p><p>&nbsp;</p><P class=\"x\">Second</P>";
        assert_eq!(paragraphs(body), vec!["First line", "Second"]);
    }

    #[test]
    fn comments_url_appends_query() {
        assert_eq!(
            comments_url("https://a.org/works/1/chapters/2"),
            "https://a.org/works/1/chapters/2?show_comments=true#comments"
        );
        assert_eq!(
            comments_url("https://a.org/works/1?view_adult=true#top"),
            "https://a.org/works/1?view_adult=true&show_comments=true#comments"
        );
    }
}
