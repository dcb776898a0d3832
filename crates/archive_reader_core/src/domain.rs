//! crates/archive_reader_core/src/domain.rs
//!
//! Defines the pure, core data structures for the reader.
//! These structs are independent of any transport or storage format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The credentials the archive handed out on login, as held by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSession {
    pub cookies: BTreeMap<String, String>,
    pub cached_identity: Option<String>,
}

/// One entry of a work's chapter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterLink {
    pub url: String,
    pub label: String,
}

/// Everything extracted from a single chapter page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterPageData {
    pub work_title: String,
    pub chapter_title: String,
    /// Inner markup of the chapter container, byte-identical to the source.
    pub body_html: String,
    /// Unique absolute urls, in document order.
    pub sibling_chapters: Vec<ChapterLink>,
}

/// What the secondary acquisition path managed to pull out of a page.
/// Any field may be missing when the page did not render it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPage {
    pub work_title: Option<String>,
    pub chapter_title: Option<String>,
    pub body_html: Option<String>,
    #[serde(default)]
    pub links: Vec<ChapterLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub display_name: String,
    /// Site-relative `/users/<name>` path; empty for anonymous comments.
    pub profile_path: String,
}

impl Author {
    pub fn anonymous() -> Self {
        Self {
            display_name: "Anonymous".to_string(),
            profile_path: String::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.profile_path.is_empty()
    }
}

/// A top-level comment attached directly to a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub author: Author,
    pub avatar_url: Option<String>,
    pub date_posted: String,
    pub body_text: String,
    pub chapter_title: String,
    pub replies: Vec<Reply>,
}

/// A comment nested under another comment or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub id: String,
    pub author: Author,
    pub avatar_url: Option<String>,
    pub date_posted: String,
    pub body_text: String,
    pub replies: Vec<Reply>,
}
