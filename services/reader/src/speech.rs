//! services/reader/src/speech.rs
//!
//! Speech settings and the factory that hands out the engine for the
//! configured provider.

use crate::adapters::speech::{GeminiSpeechEngine, LocalSpeechEngine};
use archive_reader_core::{HttpTransport, SpeechEngine};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const SPEECH_SETTINGS_KEY: &str = "speech_settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    /// Narrates to a local sink.
    #[default]
    Local,
    /// Synthesizes clips with the Gemini API.
    Gemini,
}

impl std::str::FromStr for SpeechProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(SpeechProvider::Local),
            "gemini" => Ok(SpeechProvider::Gemini),
            other => Err(format!("'{}' is not a speech provider", other)),
        }
    }
}

/// Voice settings shared by every provider. The API key is never persisted;
/// it always comes from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub provider: SpeechProvider,
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
    pub gemini_voice: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::Local,
            language: "pt-BR".to_string(),
            rate: 1.0,
            pitch: 1.0,
            gemini_api_key: None,
            gemini_voice: "Zephyr".to_string(),
        }
    }
}

/// A built engine, kept concrete so its settings can be updated in place.
#[derive(Clone)]
pub enum SpeechBackend {
    Local(Arc<LocalSpeechEngine>),
    Gemini(Arc<GeminiSpeechEngine>),
}

impl SpeechBackend {
    pub fn provider(&self) -> SpeechProvider {
        match self {
            SpeechBackend::Local(_) => SpeechProvider::Local,
            SpeechBackend::Gemini(_) => SpeechProvider::Gemini,
        }
    }

    pub fn engine(&self) -> Arc<dyn SpeechEngine> {
        match self {
            SpeechBackend::Local(engine) => engine.clone() as Arc<dyn SpeechEngine>,
            SpeechBackend::Gemini(engine) => engine.clone(),
        }
    }

    fn update_settings(&self, settings: &SpeechSettings) {
        match self {
            SpeechBackend::Local(engine) => engine.update_settings(settings.clone()),
            SpeechBackend::Gemini(engine) => engine.update_settings(settings.clone()),
        }
    }
}

/// Hands out one engine at a time. Owned by the caller; nothing is global.
pub struct SpeechEngineFactory {
    http: Arc<dyn HttpTransport>,
    gemini_model: String,
    audio_out_dir: PathBuf,
    current: Option<SpeechBackend>,
}

impl SpeechEngineFactory {
    pub fn new(http: Arc<dyn HttpTransport>, gemini_model: String, audio_out_dir: PathBuf) -> Self {
        Self {
            http,
            gemini_model,
            audio_out_dir,
            current: None,
        }
    }

    /// The engine for `settings.provider`. The cached engine is reused, with its
    /// settings refreshed, while the provider stays the same; a provider change
    /// stops the old engine and builds a new one.
    pub async fn engine(&mut self, settings: &SpeechSettings) -> SpeechBackend {
        if let Some(current) = &self.current {
            if current.provider() == settings.provider {
                current.update_settings(settings);
                return current.clone();
            }
            if let Err(e) = current.engine().stop().await {
                warn!("Failed to stop the previous speech engine: {}", e);
            }
        }

        info!("Building {:?} speech engine", settings.provider);
        let backend = match settings.provider {
            SpeechProvider::Local => {
                SpeechBackend::Local(Arc::new(LocalSpeechEngine::stdout(settings.clone())))
            }
            SpeechProvider::Gemini => SpeechBackend::Gemini(Arc::new(GeminiSpeechEngine::new(
                self.http.clone(),
                settings.clone(),
                self.gemini_model.clone(),
                self.audio_out_dir.clone(),
            ))),
        };
        self.current = Some(backend.clone());
        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_reader_core::{HttpRequest, HttpResponse, PortResult};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl HttpTransport for Offline {
        async fn send(&self, _request: HttpRequest) -> PortResult<HttpResponse> {
            Err(archive_reader_core::PortError::Network("offline".to_string()))
        }
    }

    fn factory() -> SpeechEngineFactory {
        SpeechEngineFactory::new(Arc::new(Offline), "model".to_string(), PathBuf::from("./audio"))
    }

    #[tokio::test]
    async fn same_provider_reuses_the_engine() {
        let mut factory = factory();
        let first = factory.engine(&SpeechSettings::default()).await;
        let faster = SpeechSettings {
            rate: 1.5,
            ..SpeechSettings::default()
        };
        let second = factory.engine(&faster).await;

        match (&first, &second) {
            (SpeechBackend::Local(a), SpeechBackend::Local(b)) => {
                assert!(Arc::ptr_eq(a, b));
                assert_eq!(b.settings().rate, 1.5);
            }
            _ => panic!("expected the local engine twice"),
        }
    }

    #[tokio::test]
    async fn provider_change_builds_a_new_engine() {
        let mut factory = factory();
        let local = factory.engine(&SpeechSettings::default()).await;
        let gemini = factory
            .engine(&SpeechSettings {
                provider: SpeechProvider::Gemini,
                ..SpeechSettings::default()
            })
            .await;

        assert_eq!(local.provider(), SpeechProvider::Local);
        assert_eq!(gemini.provider(), SpeechProvider::Gemini);
        assert!(!local.engine().is_active());
    }

    #[test]
    fn api_key_is_not_persisted() {
        let settings = SpeechSettings {
            gemini_api_key: Some("secret".to_string()),
            ..SpeechSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("secret"));
        let back: SpeechSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.gemini_api_key, None);
        assert_eq!(back.provider, SpeechProvider::Local);
    }
}
