//! services/reader/src/render.rs
//!
//! Renders a chapter as a standalone HTML document with the reader's
//! typography applied.

use crate::preferences::ReaderPreferences;
use archive_reader_core::chapter::paragraph_spans;
use archive_reader_core::ChapterPageData;
use std::borrow::Cow;

const HIGHLIGHT_CLASS: &str = "speaking";

/// A dark-theme page for `page`. `highlight` is an index into the chapter's
/// readable paragraphs, the same indexing the speech cursor uses; that
/// paragraph is wrapped so it stands out.
pub fn render_chapter_document(
    page: &ChapterPageData,
    prefs: &ReaderPreferences,
    highlight: Option<usize>,
) -> String {
    let body = match highlight {
        Some(index) => highlight_paragraph(&page.body_html, index),
        None => Cow::Borrowed(page.body_html.as_str()),
    };
    let work_title = html_escape::encode_text(&page.work_title);
    let chapter_title = html_escape::encode_text(&page.chapter_title);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{chapter_title} - {work_title}</title>
<style>
  body {{ background: #000; color: #fff; margin: 0; padding: 0 {padding}px; font-size: {font_size}px; line-height: {line_height}px; }}
  header {{ background: #111; margin: 0 -{padding}px; padding: 12px {padding}px; }}
  header h1 {{ font-size: 16px; margin: 0; }}
  header h2 {{ color: #aaa; font-size: 14px; font-weight: normal; margin: 4px 0 0; }}
  article p {{ margin: 0 0 {paragraph_spacing}px; }}
  .{highlight_class} {{ background: #333; border-radius: 4px; }}
</style>
</head>
<body>
<header><h1>{work_title}</h1><h2>{chapter_title}</h2></header>
<article>
{body}
</article>
</body>
</html>
"#,
        padding = prefs.padding,
        font_size = prefs.font_size,
        line_height = prefs.line_height,
        paragraph_spacing = prefs.paragraph_spacing,
        highlight_class = HIGHLIGHT_CLASS,
    )
}

fn highlight_paragraph(body: &str, index: usize) -> Cow<'_, str> {
    let Some(span) = paragraph_spans(body).into_iter().nth(index) else {
        return Cow::Borrowed(body);
    };
    Cow::Owned(format!(
        r#"{}<div class="{}">{}</div>{}"#,
        &body[..span.start],
        HIGHLIGHT_CLASS,
        &body[span.start..span.end],
        &body[span.end..]
    ))
}
