//! crates/archive_reader_core/src/markup.rs
//!
//! Targeted markup scanning helpers shared by the chapter extractor and the
//! comment tree builder. This is not an HTML parser: it finds tags by pattern and
//! balances same-named elements, which is all the archive's regular markup needs.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(/?)([A-Za-z][A-Za-z0-9]*)\b([^>]*)>").expect("tag pattern is valid")
});

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)</?([A-Za-z][A-Za-z0-9]*)?[^>]*>").expect("strip pattern is valid")
});

/// Phrasing elements that sit inside a run of text without breaking it.
const INLINE: &[&str] = &[
    "a", "abbr", "b", "bdi", "cite", "code", "del", "em", "font", "i", "ins", "mark", "q", "s",
    "small", "span", "strike", "strong", "sub", "sup", "u",
];

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// One opening or closing tag found in a document.
#[derive(Debug, Clone, Copy)]
pub struct Tag<'a> {
    pub start: usize,
    pub end: usize,
    pub name: &'a str,
    pub closing: bool,
    pub attrs: &'a str,
}

impl<'a> Tag<'a> {
    pub fn opens(&self, name: &str) -> bool {
        !self.closing && self.name.eq_ignore_ascii_case(name)
    }

    pub fn closes(&self, name: &str) -> bool {
        self.closing && self.name.eq_ignore_ascii_case(name)
    }

    /// Value of an attribute; bare attributes yield an empty string.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        ATTR.captures_iter(self.attrs).find_map(|caps| {
            let key = caps.get(1)?.as_str();
            if !key.eq_ignore_ascii_case(name) {
                return None;
            }
            Some(
                caps.get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map_or("", |m| m.as_str()),
            )
        })
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn id(&self) -> Option<&'a str> {
        self.attr("id")
    }

    /// Whether the `class` attribute contains `class` as a whole token.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|value| value.split_whitespace().any(|c| c == class))
    }

    fn self_closing(&self) -> bool {
        self.attrs.trim_end().ends_with('/')
    }
}

/// Every tag in `html`, in document order.
pub fn tags(html: &str) -> impl Iterator<Item = Tag<'_>> {
    tags_from(html, 0)
}

/// Every tag starting at or after byte `offset`, with absolute positions.
pub fn tags_from(html: &str, offset: usize) -> impl Iterator<Item = Tag<'_>> {
    let rest = html.get(offset..).unwrap_or("");
    TAG.captures_iter(rest).filter_map(move |caps| {
        let whole = caps.get(0)?;
        Some(Tag {
            start: offset + whole.start(),
            end: offset + whole.end(),
            closing: !caps.get(1)?.as_str().is_empty(),
            name: caps.get(2)?.as_str(),
            attrs: caps.get(3).map_or("", |m| m.as_str()),
        })
    })
}

/// First opening tag named `name` that satisfies `pred`.
pub fn find_open<'a>(
    html: &'a str,
    name: &str,
    pred: impl Fn(&Tag<'a>) -> bool,
) -> Option<Tag<'a>> {
    tags(html).find(|t| t.opens(name) && pred(t))
}

/// Byte range of the content between `open` and its matching close tag.
///
/// Same-named elements are balanced. If the markup never balances, the range
/// ends at the first closing tag of that name instead.
pub fn element_inner(html: &str, open: &Tag<'_>) -> Option<Range<usize>> {
    if open.self_closing() {
        return None;
    }
    let mut depth = 0usize;
    let mut first_close = None;
    for tag in tags_from(html, open.end) {
        if tag.opens(open.name) && !tag.self_closing() {
            depth += 1;
        } else if tag.closes(open.name) {
            first_close.get_or_insert(tag.start);
            if depth == 0 {
                return Some(open.end..tag.start);
            }
            depth -= 1;
        }
    }
    first_close.map(|close| open.end..close)
}

/// Convenience wrapper returning the inner markup itself.
pub fn inner_html<'a>(html: &'a str, open: &Tag<'_>) -> Option<&'a str> {
    element_inner(html, open).and_then(|range| html.get(range))
}

/// Removes every tag. Block-level tags become a space, inline tags vanish so
/// `<a>Chapter 2</a>: Rain` reads "Chapter 2: Rain".
pub fn strip_tags(markup: &str) -> String {
    ANY_TAG
        .replace_all(markup, |caps: &regex::Captures<'_>| {
            let inline = caps
                .get(1)
                .is_some_and(|name| INLINE.iter().any(|i| i.eq_ignore_ascii_case(name.as_str())));
            if inline {
                ""
            } else {
                " "
            }
        })
        .into_owned()
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Markup reduced to readable text: tags removed, entities decoded, whitespace collapsed.
pub fn plain_text(markup: &str) -> String {
    let stripped = strip_tags(markup);
    let decoded = html_escape::decode_html_entities(&stripped);
    collapse_whitespace(&decoded)
}
