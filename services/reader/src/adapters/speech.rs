//! services/reader/src/adapters/speech.rs
//!
//! Adapters implementing the `SpeechEngine` port: a local narrator that writes
//! to an output sink, and the Gemini speech API, which returns raw PCM that is
//! stored as WAV clips.

use crate::speech::SpeechSettings;
use archive_reader_core::{HttpRequest, HttpTransport, PortError, PortResult, SpeechEngine};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hound::{WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Gemini speech comes back as 24 kHz mono PCM16.
const GEMINI_SAMPLE_RATE: u32 = 24_000;

//=========================================================================================
// Pausing
//=========================================================================================

/// Holds new utterances back while an engine is paused. An utterance that is
/// already underway runs to completion.
struct PauseGate(watch::Sender<bool>);

impl PauseGate {
    fn new() -> Self {
        Self(watch::channel(false).0)
    }

    fn pause(&self) {
        self.0.send_replace(true);
    }

    fn resume(&self) {
        self.0.send_replace(false);
    }

    async fn wait_until_resumed(&self) -> PortResult<()> {
        let mut rx = self.0.subscribe();
        rx.wait_for(|paused| !*paused)
            .await
            .map(|_| ())
            .map_err(|_| PortError::Unexpected("pause gate closed".to_string()))
    }
}

//=========================================================================================
// Local narration
//=========================================================================================

/// Narrates each utterance as a line on its sink (stdout in the binary).
pub struct LocalSpeechEngine {
    settings: Mutex<SpeechSettings>,
    sink: Mutex<Box<dyn Write + Send>>,
    speaking: AtomicBool,
    paused: PauseGate,
}

impl LocalSpeechEngine {
    pub fn new(settings: SpeechSettings, sink: Box<dyn Write + Send>) -> Self {
        Self {
            settings: Mutex::new(settings),
            sink: Mutex::new(sink),
            speaking: AtomicBool::new(false),
            paused: PauseGate::new(),
        }
    }

    pub fn stdout(settings: SpeechSettings) -> Self {
        Self::new(settings, Box::new(std::io::stdout()))
    }

    pub fn settings(&self) -> SpeechSettings {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update_settings(&self, settings: SpeechSettings) {
        *self
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
    }
}

#[async_trait]
impl SpeechEngine for LocalSpeechEngine {
    async fn speak(&self, text: &str) -> PortResult<()> {
        self.paused.wait_until_resumed().await?;
        let settings = self.settings();
        self.speaking.store(true, Ordering::SeqCst);

        let line = format!("[{} x{:.1}] {}\n", settings.language, settings.rate, text);
        let written = {
            let mut sink = self
                .sink
                .lock()
                .map_err(|_| PortError::Unexpected("speech sink lock poisoned".to_string()))?;
            sink.write_all(line.as_bytes()).and_then(|_| sink.flush())
        };

        self.speaking.store(false, Ordering::SeqCst);
        written.map_err(|e| PortError::Unexpected(format!("Failed to write narration: {}", e)))
    }

    async fn stop(&self) -> PortResult<()> {
        self.speaking.store(false, Ordering::SeqCst);
        self.paused.resume();
        Ok(())
    }

    /// Later calls to `speak` wait until `resume` or `stop`.
    async fn pause(&self) -> PortResult<()> {
        self.paused.pause();
        Ok(())
    }

    async fn resume(&self) -> PortResult<()> {
        self.paused.resume();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

//=========================================================================================
// Gemini wire types
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(text: &'a str, voice: &'a str) -> Self {
        Self {
            contents: [Content {
                parts: [TextPart { text }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
                    },
                },
            },
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

impl GenerateContentResponse {
    /// The first inline audio payload of the first candidate, still base64.
    fn audio(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|part| part.inline_data.as_ref())
            .map(|inline| inline.data.as_str())
    }
}

//=========================================================================================
// Gemini engine
//=========================================================================================

/// Synthesizes speech with Gemini and saves each utterance as a WAV clip.
pub struct GeminiSpeechEngine {
    http: Arc<dyn HttpTransport>,
    settings: Mutex<SpeechSettings>,
    model: String,
    out_dir: PathBuf,
    speaking: AtomicBool,
    paused: PauseGate,
    clips: AtomicUsize,
    last_clip: Mutex<Option<PathBuf>>,
}

impl GeminiSpeechEngine {
    pub fn new(
        http: Arc<dyn HttpTransport>,
        settings: SpeechSettings,
        model: String,
        out_dir: PathBuf,
    ) -> Self {
        Self {
            http,
            settings: Mutex::new(settings),
            model,
            out_dir,
            speaking: AtomicBool::new(false),
            paused: PauseGate::new(),
            clips: AtomicUsize::new(0),
            last_clip: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_MODELS_URL, self.model)
    }

    pub fn settings(&self) -> SpeechSettings {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update_settings(&self, settings: SpeechSettings) {
        *self
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
    }

    /// The most recently written clip.
    pub fn last_clip(&self) -> Option<PathBuf> {
        self.last_clip
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn synthesize(&self, text: &str, api_key: &str, voice: &str) -> PortResult<PathBuf> {
        let body = serde_json::to_string(&GenerateContentRequest::new(text, voice))
            .map_err(|e| PortError::Unexpected(format!("Failed to encode Gemini request: {}", e)))?;
        let request = HttpRequest::post_json(self.endpoint(), body).header("x-goog-api-key", api_key);

        debug!("Requesting {} characters of speech from {}", text.len(), self.model);
        let response = self.http.send(request).await?;
        if !response.is_ok() {
            return Err(PortError::Unexpected(format!(
                "Gemini API error: {} - {}",
                response.status, response.body
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response.body)
            .map_err(|e| PortError::Unexpected(format!("Malformed Gemini response: {}", e)))?;
        let audio = parsed
            .audio()
            .ok_or_else(|| PortError::Unexpected("No audio data in Gemini response".to_string()))?;
        let pcm = STANDARD
            .decode(audio)
            .map_err(|e| PortError::Unexpected(format!("Invalid base64 audio: {}", e)))?;
        let wav = pcm16_to_wav(&pcm, GEMINI_SAMPLE_RATE)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))?;

        let path = self.next_clip_path();
        write_clip(&path, &wav)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    fn next_clip_path(&self) -> PathBuf {
        let n = self.clips.fetch_add(1, Ordering::SeqCst);
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        self.out_dir.join(format!("speech-{}-{:04}.wav", stamp, n))
    }
}

#[async_trait]
impl SpeechEngine for GeminiSpeechEngine {
    async fn speak(&self, text: &str) -> PortResult<()> {
        self.paused.wait_until_resumed().await?;

        let settings = self.settings();
        let Some(api_key) = settings.gemini_api_key.as_deref().filter(|k| !k.is_empty()) else {
            warn!("Gemini API key not configured; skipping speech");
            return Ok(());
        };

        self.speaking.store(true, Ordering::SeqCst);
        let result = self.synthesize(text, api_key, &settings.gemini_voice).await;
        self.speaking.store(false, Ordering::SeqCst);

        let path = result?;
        info!("Wrote speech clip {}", path.display());
        *self
            .last_clip
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path);
        Ok(())
    }

    async fn stop(&self) -> PortResult<()> {
        self.speaking.store(false, Ordering::SeqCst);
        self.paused.resume();
        Ok(())
    }

    /// Later calls to `speak` wait until `resume` or `stop`.
    async fn pause(&self) -> PortResult<()> {
        self.paused.pause();
        Ok(())
    }

    async fn resume(&self) -> PortResult<()> {
        self.paused.resume();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

/// Wraps little-endian PCM16 mono samples in a WAV container.
pub fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for chunk in pcm_data.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

async fn write_clip(path: &Path, wav: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, wav).await
}
