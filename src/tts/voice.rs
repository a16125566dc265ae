//! Local voices and voice selection

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// A voice offered by the local speech engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP-47 style language tag, e.g. `en-us`
    pub lang: String,
    /// Engine specific identifier passed back when speaking
    pub uri: String,
    /// Flagged by the engine as its default voice
    pub default: bool,
}

impl Voice {
    pub fn is_english(&self) -> bool {
        self.lang.to_ascii_lowercase().starts_with("en")
    }
}

/// Pick a voice for an utterance.
///
/// Order: exact `preferred` name, the engine's default English voice, the
/// first English voice, otherwise `None` (engine default).
pub fn select_voice<'a>(voices: &'a [Voice], preferred: Option<&str>) -> Option<&'a Voice> {
    if let Some(name) = preferred {
        match voices.iter().find(|v| v.name == name) {
            Some(voice) => {
                log::debug!("Using preferred voice from config: {} {}", voice.name, voice.lang);
                return Some(voice);
            }
            None => log::warn!("Preferred voice not found: {}", name),
        }
    }

    let voice = voices
        .iter()
        .find(|v| v.is_english() && v.default)
        .or_else(|| voices.iter().find(|v| v.is_english()));

    if let Some(voice) = voice {
        log::debug!("Using default English voice: {} {}", voice.name, voice.lang);
    }
    voice
}

/// Voice list that may be populated some time after the engine starts.
///
/// Readers call [`VoiceRegistry::wait_ready`] instead of subscribing to change
/// notifications; the wait ends on the first non-empty list.
#[derive(Debug)]
pub struct VoiceRegistry {
    tx: watch::Sender<Vec<Voice>>,
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Registry that is ready from the start
    pub fn with_voices(voices: Vec<Voice>) -> Self {
        let registry = Self::new();
        registry.publish(voices);
        registry
    }

    /// Replace the voice list
    pub fn publish(&self, voices: Vec<Voice>) {
        log::debug!("Voice list updated ({} voices)", voices.len());
        self.tx.send_replace(voices);
    }

    pub fn snapshot(&self) -> Vec<Voice> {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        !self.tx.borrow().is_empty()
    }

    /// Wait until the list is non-empty, for at most `bound`.
    ///
    /// Returns whatever is available when the wait ends, which may be empty.
    pub async fn wait_ready(&self, bound: Duration) -> Vec<Voice> {
        let mut rx = self.tx.subscribe();
        let ready = rx.borrow().clone();
        if !ready.is_empty() {
            return ready;
        }

        log::debug!("Waiting for voices to load...");
        let voices = match tokio::time::timeout(bound, rx.wait_for(|voices| !voices.is_empty())).await {
            Ok(Ok(voices)) => {
                log::debug!("Voices loaded, proceeding with speech");
                voices.clone()
            }
            Ok(Err(_)) | Err(_) => {
                log::warn!("No voices available after {:?}, using engine default", bound);
                self.snapshot()
            }
        };
        voices
    }
}
