//! services/reader/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use crate::speech::{SpeechProvider, SpeechSettings};
use archive_reader_core::{session, NestingStrategy, Site};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Shown when comments are rebuilt with the `markers` strategy, which reads the
/// archive's top-level `ol.thread` as a reply list and loses its first comment.
pub const MARKERS_NESTING_NOTE: &str =
    "COMMENT_NESTING=markers can drop the first comment of a page; set COMMENT_NESTING=tag_stack to keep it";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub site: Site,
    pub state_path: PathBuf,
    pub log_level: Level,
    pub comments_page_size: usize,
    pub comment_nesting: NestingStrategy,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub speech: SpeechSettings,
    pub gemini_model: String,
    pub audio_out_dir: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Site ---
        let origin = var("ARCHIVE_ORIGIN", session::DEFAULT_ORIGIN);
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "ARCHIVE_ORIGIN".to_string(),
                format!("'{}' is not an http(s) origin", origin),
            ));
        }
        let site = Site {
            origin: origin.trim_end_matches('/').to_string(),
            session_cookie: var("ARCHIVE_SESSION_COOKIE", session::DEFAULT_SESSION_COOKIE),
        };
        let state_path = PathBuf::from(var("READER_STATE_PATH", "./reader_state.json"));

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Comments ---
        let comments_page_size: usize = parse(&lookup, "COMMENTS_PAGE_SIZE", 30)?;
        if comments_page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "COMMENTS_PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let comment_nesting = var("COMMENT_NESTING", "markers")
            .parse::<NestingStrategy>()
            .map_err(|e| ConfigError::InvalidValue("COMMENT_NESTING".to_string(), e))?;

        // --- HTTP ---
        let user_agent = var("HTTP_USER_AGENT", DEFAULT_USER_AGENT);
        let http_timeout = Duration::from_secs(parse(&lookup, "HTTP_TIMEOUT_SECS", 30u64)?);

        // --- Speech ---
        let provider = var("TTS_PROVIDER", "local")
            .parse::<SpeechProvider>()
            .map_err(|e| ConfigError::InvalidValue("TTS_PROVIDER".to_string(), e))?;
        let gemini_api_key = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty());
        if provider == SpeechProvider::Gemini && gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar("GEMINI_API_KEY".to_string()));
        }
        let speech = SpeechSettings {
            provider,
            language: var("TTS_LANGUAGE", "pt-BR"),
            rate: parse(&lookup, "TTS_RATE", 1.0f32)?,
            pitch: parse(&lookup, "TTS_PITCH", 1.0f32)?,
            gemini_api_key,
            gemini_voice: var("GEMINI_VOICE", "Zephyr"),
        };
        let gemini_model = var("GEMINI_TTS_MODEL", "gemini-2.5-flash-preview-tts");
        let audio_out_dir = PathBuf::from(var("AUDIO_OUT_DIR", "./audio"));

        Ok(Self {
            site,
            state_path,
            log_level,
            comments_page_size,
            comment_nesting,
            user_agent,
            http_timeout,
            speech,
            gemini_model,
            audio_out_dir,
        })
    }
}

impl Config {
    /// A warning worth logging before comments are shown, if any.
    pub fn comment_nesting_warning(&self) -> Option<&'static str> {
        match self.comment_nesting {
            NestingStrategy::Markers => Some(MARKERS_NESTING_NOTE),
            NestingStrategy::TagStack => None,
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
