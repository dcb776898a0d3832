pub mod fallback;
pub mod http;
pub mod speech;
pub mod store;

pub use fallback::PublicPageExtractor;
pub use http::ReqwestTransport;
pub use speech::{GeminiSpeechEngine, LocalSpeechEngine};
pub use store::{JsonFileStore, MemoryStore};
