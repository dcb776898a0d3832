pub mod chapter;
pub mod comments;
pub mod cookies;
pub mod domain;
pub mod error;
pub mod markup;
pub mod ports;
pub mod reader;
pub mod session;

pub use chapter::ChapterExtractor;
pub use comments::{build_comment_tree, paginate, walk, CommentPage, NestingStrategy, Node};
pub use cookies::CookieStore;
pub use domain::{
    Author, ChapterLink, ChapterPageData, Comment, CredentialSession, FallbackPage, Reply,
};
pub use error::{ReaderError, ReaderResult};
pub use ports::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, KeyValueStore, PageExtractor,
    PortError, PortResult, SpeechEngine,
};
pub use reader::{ContentSource, NavigationOutcome, ReaderSession, ReaderState};
pub use session::{SessionClient, Site};
