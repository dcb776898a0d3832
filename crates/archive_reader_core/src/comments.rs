//! crates/archive_reader_core/src/comments.rs
//!
//! Rebuilds the comment/reply forest of a work page from its raw markup.
//!
//! Every comment and reply on the page is an `<li class="comment" id="comment_N">`.
//! Replies live in `<ol class="thread">` lists nested under the comment they answer,
//! but the structure is recovered by scanning tags rather than building a DOM.

use crate::domain::{Author, Comment, Reply};
use crate::markup::{self, Tag};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static COMMENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^comment_(\d+)$").expect("comment id pattern is valid"));

static LI_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</li\s*>").expect("li close pattern is valid"));

static AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]*href=["']/users/([^"'/]+)/pseuds/[^"']*["'][^>]*>([^<]+)</a>"#)
        .expect("author pattern is valid")
});

static CHAPTER_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]*href=["'](?:https?://[^/"']+)?/works/\d+/chapters/\d+["'][^>]*>([^<]+)</a>"#)
        .expect("chapter link pattern is valid")
});

const UNKNOWN_DATE: &str = "Unknown Date";
const UNKNOWN_CHAPTER: &str = "Unknown Chapter";

/// How a comment element's place in the hierarchy is worked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingStrategy {
    /// An element is a reply when a thread list opened after the last comment
    /// item before it; its parent is the nearest preceding comment element.
    #[default]
    Markers,
    /// Tracks open list and `<li>` elements on a stack and gives each thread list
    /// to the comment that owns it.
    TagStack,
}

impl std::str::FromStr for NestingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markers" => Ok(NestingStrategy::Markers),
            "tag_stack" | "stack" => Ok(NestingStrategy::TagStack),
            other => Err(format!("'{}' is not a nesting strategy", other)),
        }
    }
}

//=========================================================================================
// Scanning and classification
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    Root,
    Reply { parent: Option<String> },
}

#[derive(Debug)]
struct ScannedElement<'a> {
    id: String,
    start: usize,
    markup: &'a str,
    placement: Placement,
}

fn comment_id<'a>(tag: &Tag<'a>) -> Option<&'a str> {
    if !tag.opens("li") {
        return None;
    }
    let id = tag.id()?;
    COMMENT_ID.captures(id)?.get(1).map(|m| m.as_str())
}

fn is_comment_item(tag: &Tag<'_>) -> bool {
    tag.opens("li") && tag.has_class("comment")
}

fn is_thread(tag: &Tag<'_>) -> bool {
    tag.opens("ol") && tag.has_class("thread")
}

fn opens_list(tag: &Tag<'_>) -> bool {
    tag.opens("ol") || tag.opens("ul")
}

fn closes_list(tag: &Tag<'_>) -> bool {
    tag.closes("ol") || tag.closes("ul")
}

/// Every comment element, first occurrence per id. A span runs to the
/// element's own balanced `</li>` or to the next comment element, whichever
/// comes first, so lists inside a comment body stay in the span.
fn scan(html: &str) -> Vec<ScannedElement<'_>> {
    let opens: Vec<(Tag<'_>, &str)> = markup::tags(html)
        .filter(is_comment_item)
        .filter_map(|tag| comment_id(&tag).map(|id| (tag, id)))
        .collect();

    let mut seen = HashSet::new();
    let mut elements = Vec::with_capacity(opens.len());
    for (i, (tag, id)) in opens.iter().enumerate() {
        if !seen.insert(*id) {
            continue;
        }
        let close = element_end(html, tag);
        let next = opens.get(i + 1).map_or(html.len(), |(t, _)| t.start);
        elements.push(ScannedElement {
            id: id.to_string(),
            start: tag.start,
            markup: &html[tag.start..close.min(next)],
            placement: Placement::Root,
        });
    }
    elements
}

/// Byte offset just past the closing tag of the `<li>` opened by `open`.
fn element_end(html: &str, open: &Tag<'_>) -> usize {
    markup::element_inner(html, open)
        .and_then(|inner| LI_CLOSE.find_at(html, inner.end))
        .map_or(html.len(), |m| m.end())
}

fn classify_by_markers(html: &str, elements: &mut [ScannedElement<'_>]) {
    let mut pending = elements.iter_mut().peekable();
    let mut thread_count = 0usize;
    let mut last_thread: Option<usize> = None;
    let mut last_item: Option<usize> = None;
    let mut last_id: Option<&str> = None;

    for tag in markup::tags(html) {
        if let Some(element) = pending.next_if(|e| e.start == tag.start) {
            let is_reply = thread_count > 0 && last_thread > last_item;
            element.placement = if is_reply {
                Placement::Reply {
                    parent: last_id.map(str::to_string),
                }
            } else {
                Placement::Root
            };
        }
        if is_thread(&tag) {
            thread_count += 1;
            last_thread = Some(tag.start);
        }
        if is_comment_item(&tag) {
            last_item = Some(tag.start);
        }
        if let Some(id) = comment_id(&tag) {
            last_id = Some(id);
        }
    }
}

enum Frame<'a> {
    List {
        thread: bool,
        owner: Option<&'a str>,
        last_comment: Option<&'a str>,
    },
    Item {
        comment: Option<&'a str>,
    },
}

fn classify_by_stack(html: &str, elements: &mut [ScannedElement<'_>]) {
    let mut pending = elements.iter_mut().peekable();
    let mut stack: Vec<Frame<'_>> = Vec::new();

    for tag in markup::tags(html) {
        if opens_list(&tag) {
            // A thread belongs to the comment it sits in, or, when it sits in a
            // plain item, to the comment that item follows.
            let owner = match stack.as_slice() {
                [.., Frame::Item { comment: Some(id) }] => Some(*id),
                [.., Frame::List { last_comment, .. }, Frame::Item { comment: None }] => *last_comment,
                _ => None,
            };
            stack.push(Frame::List {
                thread: is_thread(&tag),
                owner,
                last_comment: None,
            });
        } else if tag.opens("li") {
            if matches!(stack.last(), Some(Frame::Item { .. })) {
                stack.pop();
            }
            let comment = if is_comment_item(&tag) { comment_id(&tag) } else { None };
            if let Some(element) = pending.next_if(|e| e.start == tag.start) {
                let owner = stack.iter().rev().find_map(|frame| match frame {
                    Frame::List { thread: true, owner, .. } => Some(*owner),
                    _ => None,
                });
                element.placement = match owner.flatten() {
                    Some(parent) => Placement::Reply {
                        parent: Some(parent.to_string()),
                    },
                    None => Placement::Root,
                };
            }
            if let (Some(id), Some(Frame::List { last_comment, .. })) = (comment, stack.last_mut()) {
                *last_comment = Some(id);
            }
            stack.push(Frame::Item { comment });
        } else if tag.closes("li") {
            if stack.iter().any(|f| matches!(f, Frame::Item { .. })) {
                while let Some(frame) = stack.pop() {
                    if matches!(frame, Frame::Item { .. }) {
                        break;
                    }
                }
            }
        } else if closes_list(&tag) && stack.iter().any(|f| matches!(f, Frame::List { .. })) {
            while let Some(frame) = stack.pop() {
                if matches!(frame, Frame::List { .. }) {
                    break;
                }
            }
        }
    }
}

//=========================================================================================
// Field extraction
//=========================================================================================

#[derive(Debug, Clone)]
struct CommentFields {
    author: Author,
    avatar_url: Option<String>,
    date_posted: String,
    body_text: String,
}

/// `None` when the element has no readable body.
fn extract_fields(markup: &str) -> Option<CommentFields> {
    let body_text = markup::find_open(markup, "blockquote", |t| t.has_class("userstuff"))
        .and_then(|tag| markup::inner_html(markup, &tag))
        .map(markup::plain_text)
        .filter(|text| !text.is_empty())?;

    Some(CommentFields {
        author: author(markup),
        avatar_url: avatar_url(markup),
        date_posted: date_posted(markup),
        body_text,
    })
}

fn avatar_url(markup: &str) -> Option<String> {
    let icon = markup::find_open(markup, "div", |t| t.has_class("icon"))?;
    let range = markup::element_inner(markup, &icon)?;
    let inner = &markup[range];
    markup::tags(inner)
        .filter(|t| t.opens("img"))
        .filter_map(|t| t.attr("src"))
        .find(|src| src.contains("active_storage"))
        .map(str::to_string)
}

fn author(markup: &str) -> Author {
    AUTHOR
        .captures(markup)
        .and_then(|caps| {
            let user = caps.get(1)?.as_str();
            let name = html_escape::decode_html_entities(caps.get(2)?.as_str().trim()).into_owned();
            Some(Author {
                display_name: name,
                profile_path: format!("/users/{}", user),
            })
        })
        .unwrap_or_else(Author::anonymous)
}

fn date_posted(markup: &str) -> String {
    let posted = markup::find_open(markup, "span", |t| t.has_class("posted") && t.has_class("datetime"))
        .and_then(|tag| markup::inner_html(markup, &tag))
        .map(markup::plain_text)
        .filter(|text| !text.is_empty());
    posted
        .or_else(|| {
            markup::find_open(markup, "abbr", |t| t.has_class("published"))
                .and_then(|tag| markup::inner_html(markup, &tag))
                .map(markup::plain_text)
                .filter(|text| !text.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

fn chapter_title(markup: &str) -> String {
    CHAPTER_LINK
        .captures(markup)
        .and_then(|caps| caps.get(1))
        .map(|m| markup::plain_text(m.as_str()))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNKNOWN_CHAPTER.to_string())
}

//=========================================================================================
// Tree assembly
//=========================================================================================

/// Parses every comment on the page into a forest of root comments.
///
/// Elements without body text are dropped, and so is any reply whose parent
/// was never built.
pub fn build_comment_tree(html: &str, strategy: NestingStrategy) -> Vec<Comment> {
    let mut elements = scan(html);
    match strategy {
        NestingStrategy::Markers => classify_by_markers(html, &mut elements),
        NestingStrategy::TagStack => classify_by_stack(html, &mut elements),
    }

    // Roots take the first arena slots, replies follow in document order, and a
    // reply's parent always sits at a lower index than the reply itself.
    struct Built {
        id: String,
        fields: CommentFields,
        chapter_title: String,
        children: Vec<usize>,
    }
    let mut arena: Vec<Built> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();

    for element in elements.iter().filter(|e| e.placement == Placement::Root) {
        let Some(fields) = extract_fields(element.markup) else {
            debug!("Dropping comment #{} without body text", element.id);
            continue;
        };
        index_of.insert(element.id.clone(), arena.len());
        arena.push(Built {
            id: element.id.clone(),
            fields,
            chapter_title: chapter_title(element.markup),
            children: Vec::new(),
        });
    }
    let root_count = arena.len();

    for element in &elements {
        let Placement::Reply { parent: Some(parent) } = &element.placement else {
            continue;
        };
        let Some(fields) = extract_fields(element.markup) else {
            debug!("Dropping reply #{} without body text", element.id);
            continue;
        };
        let Some(&parent_index) = index_of.get(parent) else {
            debug!("Dropping reply #{}: parent #{} is unknown", element.id, parent);
            continue;
        };
        let index = arena.len();
        arena[parent_index].children.push(index);
        index_of.insert(element.id.clone(), index);
        arena.push(Built {
            id: element.id.clone(),
            fields,
            chapter_title: String::new(),
            children: Vec::new(),
        });
    }

    // Fold replies into owned subtrees from the back, so every child is
    // finished before its parent needs it.
    let mut finished: Vec<Option<Reply>> = (0..arena.len()).map(|_| None).collect();
    let reply_nodes = arena.split_off(root_count);
    for (offset, node) in reply_nodes.into_iter().enumerate().rev() {
        finished[root_count + offset] = Some(Reply {
            replies: take_children(&node.children, &mut finished),
            id: node.id,
            author: node.fields.author,
            avatar_url: node.fields.avatar_url,
            date_posted: node.fields.date_posted,
            body_text: node.fields.body_text,
        });
    }

    let forest: Vec<Comment> = arena
        .into_iter()
        .map(|node| Comment {
            replies: take_children(&node.children, &mut finished),
            id: node.id,
            author: node.fields.author,
            avatar_url: node.fields.avatar_url,
            date_posted: node.fields.date_posted,
            body_text: node.fields.body_text,
            chapter_title: node.chapter_title,
        })
        .collect();

    debug!(
        "Parsed {} root comments with {} replies",
        forest.len(),
        count_replies(&forest)
    );
    forest
}

fn take_children(children: &[usize], finished: &mut [Option<Reply>]) -> Vec<Reply> {
    children
        .iter()
        .filter_map(|&child| finished[child].take())
        .collect()
}

//=========================================================================================
// Traversal and pagination
//=========================================================================================

/// A borrowed comment or reply, for walking the forest uniformly.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Comment(&'a Comment),
    Reply(&'a Reply),
}

impl<'a> Node<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Node::Comment(c) => &c.id,
            Node::Reply(r) => &r.id,
        }
    }

    pub fn author(&self) -> &'a Author {
        match self {
            Node::Comment(c) => &c.author,
            Node::Reply(r) => &r.author,
        }
    }

    pub fn avatar_url(&self) -> Option<&'a str> {
        match self {
            Node::Comment(c) => c.avatar_url.as_deref(),
            Node::Reply(r) => r.avatar_url.as_deref(),
        }
    }

    pub fn date_posted(&self) -> &'a str {
        match self {
            Node::Comment(c) => &c.date_posted,
            Node::Reply(r) => &r.date_posted,
        }
    }

    pub fn body_text(&self) -> &'a str {
        match self {
            Node::Comment(c) => &c.body_text,
            Node::Reply(r) => &r.body_text,
        }
    }

    pub fn replies(&self) -> &'a [Reply] {
        match self {
            Node::Comment(c) => &c.replies,
            Node::Reply(r) => &r.replies,
        }
    }
}

/// Every comment and reply in display order, paired with its depth
/// (roots are depth 0). Uses an explicit stack, so nesting depth is unbounded.
pub fn walk(comments: &[Comment]) -> Vec<(usize, Node<'_>)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, Node<'_>)> = comments
        .iter()
        .rev()
        .map(|c| (0, Node::Comment(c)))
        .collect();
    while let Some((depth, node)) = stack.pop() {
        stack.extend(node.replies().iter().rev().map(|r| (depth + 1, Node::Reply(r))));
        out.push((depth, node));
    }
    out
}

/// Replies at any depth.
pub fn count_replies(comments: &[Comment]) -> usize {
    walk(comments).iter().filter(|(depth, _)| *depth > 0).count()
}

/// One page of root comments. Replies always come along with their root.
#[derive(Debug, Clone, Copy)]
pub struct CommentPage<'a> {
    pub comments: &'a [Comment],
    pub page: usize,
    pub total_pages: usize,
    pub total_comments: usize,
}

pub fn paginate(comments: &[Comment], page: usize, page_size: usize) -> CommentPage<'_> {
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size).min(comments.len());
    let end = start.saturating_add(page_size).min(comments.len());
    CommentPage {
        comments: &comments[start..end],
        page,
        total_pages: comments.len().div_ceil(page_size),
        total_comments: comments.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, body: &str, nested: &str) -> String {
        format!(
            r#"<li class="comment group" id="comment_{id}">
                 <h4 class="heading byline"><a href="/users/u{id}/pseuds/u{id}">User {id}</a>
                   on <a href="/works/1/chapters/7">Chapter 7</a>
                   <span class="posted datetime"><abbr class="day">Sat</abbr> <span class="date">18</span> <abbr class="month">Oct</abbr> <span class="year">2025</span></span>
                 </h4>
                 <div class="icon"><img src="https://s3.example/active_storage/u{id}.png" alt=""></div>
                 <blockquote class="userstuff"><p>{body}</p></blockquote>
                 {nested}
               </li>"#
        )
    }

    #[test]
    fn extracts_every_field() {
        let html = item("5", "Loved <em>this</em>!", "");
        let forest = build_comment_tree(&html, NestingStrategy::Markers);

        assert_eq!(forest.len(), 1);
        let c = &forest[0];
        assert_eq!(c.id, "5");
        assert_eq!(c.author.display_name, "User 5");
        assert_eq!(c.author.profile_path, "/users/u5");
        assert_eq!(c.avatar_url.as_deref(), Some("https://s3.example/active_storage/u5.png"));
        assert_eq!(c.date_posted, "Sat 18 Oct 2025");
        assert_eq!(c.body_text, "Loved this!");
        assert_eq!(c.chapter_title, "Chapter 7");
    }

    #[test]
    fn missing_fields_get_defaults() {
        let html = r#"<li class="comment" id="comment_9">
            <h4 class="heading byline">Guest</h4>
            <div class="icon"><img src="/images/skins/iconsets/default/icon_user.png"></div>
            <abbr class="published" title="2020-01-01">Wed 01 Jan 2020</abbr>
            <blockquote class="userstuff">hi</blockquote></li>"#;
        let forest = build_comment_tree(html, NestingStrategy::Markers);

        let c = &forest[0];
        assert!(c.author.is_anonymous());
        assert_eq!(c.author.display_name, "Anonymous");
        assert_eq!(c.avatar_url, None);
        assert_eq!(c.date_posted, "Wed 01 Jan 2020");
        assert_eq!(c.chapter_title, "Unknown Chapter");
    }

    #[test]
    fn element_without_body_is_dropped() {
        let html = r#"<li class="comment" id="comment_1"><p>deleted</p></li>"#;
        assert!(build_comment_tree(html, NestingStrategy::Markers).is_empty());
    }

    #[test]
    fn repeated_ids_keep_the_first_element() {
        let html = format!("{}{}", item("3", "first", ""), item("3", "second", ""));
        let forest = build_comment_tree(&html, NestingStrategy::Markers);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].body_text, "first");
    }

    #[test]
    fn strategy_parses_from_config_text() {
        assert_eq!("markers".parse::<NestingStrategy>(), Ok(NestingStrategy::Markers));
        assert_eq!("TAG_STACK".parse::<NestingStrategy>(), Ok(NestingStrategy::TagStack));
        assert!("dom".parse::<NestingStrategy>().is_err());
    }

    #[test]
    fn pagination_slices_roots_only() {
        let html: String = (1..=5)
            .map(|i| item(&i.to_string(), "x", ""))
            .collect();
        let forest = build_comment_tree(&html, NestingStrategy::Markers);

        let page = paginate(&forest, 1, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_comments, 5);
        let ids: Vec<&str> = page.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "4"]);

        assert_eq!(paginate(&forest, 2, 2).comments.len(), 1);
        assert!(paginate(&forest, 9, 2).comments.is_empty());
        assert_eq!(paginate(&[], 0, 30).total_pages, 0);
    }
}
