//! Local synthesis driver

use crate::config::TtsConfig;
use crate::tts::engine::{SpeechEngine, SynthesisError, Utterance, UtteranceEnd};
use crate::tts::voice::select_voice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Upper bound for waiting on a voice list that loads late
pub const DEFAULT_VOICE_WAIT: Duration = Duration::from_secs(3);

/// Speaks text on the local engine, if there is one
#[derive(Clone)]
pub struct LocalSynthesisDriver {
    engine: Option<Arc<dyn SpeechEngine>>,
    voice_wait: Duration,
    /// Generation of the newest request; older ones must not speak
    latest: Arc<AtomicU64>,
}

impl LocalSynthesisDriver {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine: Some(engine),
            voice_wait: DEFAULT_VOICE_WAIT,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Driver for a host without on-device synthesis
    pub fn unsupported() -> Self {
        Self {
            engine: None,
            voice_wait: DEFAULT_VOICE_WAIT,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_voice_wait(mut self, voice_wait: Duration) -> Self {
        self.voice_wait = voice_wait;
        self
    }

    /// Whether local synthesis is available
    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn voice_wait(&self) -> Duration {
        self.voice_wait
    }

    pub fn engine(&self) -> Option<&Arc<dyn SpeechEngine>> {
        self.engine.as_ref()
    }

    /// Cancel whatever is playing and speak `text` with `config` prosody.
    ///
    /// Returns as soon as the work is scheduled. Voice selection waits for the
    /// voice list in the returned task; failures from there on are only
    /// logged. The task completes when the utterance ends, or right after the
    /// wait if a newer request arrived meanwhile.
    pub fn speak(&self, text: &str, config: Arc<TtsConfig>) -> Result<JoinHandle<()>, SynthesisError> {
        let Some(engine) = self.engine.clone() else {
            log::warn!("Local speech synthesis not supported");
            return Err(SynthesisError::Unsupported);
        };

        log::info!("Using local speech synthesis for: {}", text);
        engine.cancel();
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        let text = text.to_string();
        let voice_wait = self.voice_wait;
        let latest = Arc::clone(&self.latest);

        Ok(tokio::spawn(async move {
            let voices = engine.voices().wait_ready(voice_wait).await;
            if latest.load(Ordering::SeqCst) != generation {
                log::debug!("Local TTS superseded before start: {}", text);
                return;
            }
            log::debug!(
                "Available voices: {:?}",
                voices.iter().map(|v| (&v.name, &v.lang, v.default)).collect::<Vec<_>>()
            );

            let mut utterance = Utterance::new(text.clone(), &config);
            utterance.voice = select_voice(&voices, config.preferred_voice()).cloned();
            let voice_name = utterance
                .voice
                .as_ref()
                .map(|v| v.name.clone())
                .unwrap_or_else(|| "default".to_string());

            log::debug!(
                "Using TTS config: rate={} pitch={} volume={} preferred_voice={:?}",
                utterance.rate,
                utterance.pitch,
                utterance.volume,
                config.preferred_voice
            );

            let ended = match engine.speak(utterance) {
                Ok(ended) => ended,
                Err(e) => {
                    log::error!("Local TTS error: {}", e);
                    return;
                }
            };
            log::info!("Local TTS started for: {} using voice: {}", text, voice_name);

            match ended.await {
                Ok(UtteranceEnd::Finished) => log::info!("Local TTS ended for: {}", text),
                Ok(UtteranceEnd::Cancelled) => log::debug!("Local TTS cancelled for: {}", text),
                Ok(UtteranceEnd::Failed(reason)) => log::error!("Local TTS error: {}", reason),
                Err(_) => log::debug!("Local TTS engine dropped utterance: {}", text),
            }
        }))
    }
}
