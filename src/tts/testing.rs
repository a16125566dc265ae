//! In-process stand-ins for the speech engine and the audio device

use crate::tts::audio::{AudioError, AudioOutput};
use crate::tts::engine::{SpeechEngine, SynthesisError, Utterance, UtteranceEnd};
use crate::tts::voice::{Voice, VoiceRegistry};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

pub fn english_voices() -> Vec<Voice> {
    [
        ("Alex", "en-US", true),
        ("Daniel", "en-GB", false),
        ("Samantha", "en-US", false),
    ]
    .into_iter()
    .map(|(name, lang, default)| Voice {
        name: name.to_string(),
        lang: lang.to_string(),
        uri: name.to_lowercase(),
        default,
    })
    .collect()
}

/// Records utterances; each one "finishes" immediately
pub struct FakeEngine {
    voices: VoiceRegistry,
    spoken: Mutex<Vec<Utterance>>,
    cancels: AtomicUsize,
}

impl FakeEngine {
    pub fn new(voices: VoiceRegistry) -> Self {
        Self {
            voices,
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for FakeEngine {
    fn voices(&self) -> &VoiceRegistry {
        &self.voices
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn speak(&self, utterance: Utterance) -> Result<oneshot::Receiver<UtteranceEnd>, SynthesisError> {
        self.spoken.lock().unwrap().push(utterance);
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(UtteranceEnd::Finished);
        Ok(rx)
    }
}

/// Records audio handed to it, optionally refusing to play
pub struct FakeOutput {
    played: Mutex<Vec<Vec<u8>>>,
    failure: Option<AudioError>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    pub fn failing(error: AudioError) -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }
}

impl AudioOutput for FakeOutput {
    fn play(&self, audio: Vec<u8>) -> BoxFuture<'_, Result<(), AudioError>> {
        Box::pin(async move {
            if let Some(e) = &self.failure {
                return Err(e.clone());
            }
            self.played.lock().unwrap().push(audio);
            Ok(())
        })
    }
}
