//! services/reader/src/preferences.rs
//!
//! Reader typography and the persisted settings repository.

use crate::speech::{SpeechSettings, SPEECH_SETTINGS_KEY};
use archive_reader_core::{KeyValueStore, PortError, PortResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::warn;

pub const PREFERENCES_KEY: &str = "reader_preferences";

pub const FONT_SIZE: RangeInclusive<u32> = 12..=28;
pub const LINE_HEIGHT: RangeInclusive<u32> = 18..=40;
pub const PADDING: RangeInclusive<u32> = 10..=50;
pub const PARAGRAPH_SPACING: RangeInclusive<u32> = 0..=40;

/// Typography for the chapter view, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderPreferences {
    pub font_size: u32,
    pub line_height: u32,
    pub padding: u32,
    pub paragraph_spacing: u32,
}

impl Default for ReaderPreferences {
    fn default() -> Self {
        Self {
            font_size: 16,
            line_height: 24,
            padding: 20,
            paragraph_spacing: 12,
        }
    }
}

fn clamp(value: u32, range: &RangeInclusive<u32>) -> u32 {
    value.clamp(*range.start(), *range.end())
}

impl ReaderPreferences {
    pub fn set_font_size(&mut self, value: u32) {
        self.font_size = clamp(value, &FONT_SIZE);
    }

    pub fn set_line_height(&mut self, value: u32) {
        self.line_height = clamp(value, &LINE_HEIGHT);
    }

    pub fn set_padding(&mut self, value: u32) {
        self.padding = clamp(value, &PADDING);
    }

    pub fn set_paragraph_spacing(&mut self, value: u32) {
        self.paragraph_spacing = clamp(value, &PARAGRAPH_SPACING);
    }

    /// Every value pulled back into its range; used on anything read from disk.
    pub fn clamped(mut self) -> Self {
        self.set_font_size(self.font_size);
        self.set_line_height(self.line_height);
        self.set_padding(self.padding);
        self.set_paragraph_spacing(self.paragraph_spacing);
        self
    }
}

/// Loads and saves the user's settings through the `KeyValueStore` port.
#[derive(Clone)]
pub struct SettingsRepo {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsRepo {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn preferences(&self) -> PortResult<ReaderPreferences> {
        Ok(self
            .load::<ReaderPreferences>(PREFERENCES_KEY)
            .await?
            .unwrap_or_default()
            .clamped())
    }

    pub async fn save_preferences(&self, prefs: &ReaderPreferences) -> PortResult<()> {
        self.save(PREFERENCES_KEY, &prefs.clamped()).await
    }

    /// Stored speech settings, or `defaults` when none were saved. The API key
    /// always comes from `defaults`.
    pub async fn speech_settings(&self, defaults: &SpeechSettings) -> PortResult<SpeechSettings> {
        Ok(match self.load::<SpeechSettings>(SPEECH_SETTINGS_KEY).await? {
            Some(stored) => SpeechSettings {
                gemini_api_key: defaults.gemini_api_key.clone(),
                ..stored
            },
            None => defaults.clone(),
        })
    }

    pub async fn save_speech_settings(&self, settings: &SpeechSettings) -> PortResult<()> {
        self.save(SPEECH_SETTINGS_KEY, settings).await
    }

    /// A value that no longer parses is logged and treated as absent.
    async fn load<T: DeserializeOwned>(&self, key: &str) -> PortResult<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> PortResult<()> {
        let json = serde_json::to_string(value).map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.store.set(key, &json).await
    }
}
