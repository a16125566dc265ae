//! On-device speech engine
//!
//! Local synthesis shells out to espeak-ng (or classic espeak) the same way a
//! browser hands an utterance to its built-in synthesizer: one utterance at a
//! time, voices discovered asynchronously after start-up.
//!
//! Env overrides:
//! - ESPEAK_BIN: explicit path to the espeak binary

use crate::config::TtsConfig;
use crate::tts::voice::{Voice, VoiceRegistry};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::oneshot;

/// Language used for every local utterance
pub const UTTERANCE_LANG: &str = "en-US";

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Local speech synthesis not supported")]
    Unsupported,
    #[error("Failed to start speech engine: {0}")]
    SpawnError(String),
}

/// Text plus the prosody applied by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice: Option<Voice>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, config: &TtsConfig) -> Self {
        Self {
            text: text.into(),
            lang: UTTERANCE_LANG.to_string(),
            rate: config.browser_rate,
            pitch: config.browser_pitch,
            volume: config.browser_volume,
            voice: None,
        }
    }
}

/// How an utterance stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceEnd {
    Finished,
    /// Superseded by a newer utterance or an explicit cancel
    Cancelled,
    Failed(String),
}

/// On-device speech synthesizer
pub trait SpeechEngine: Send + Sync {
    /// Voices as they become known
    fn voices(&self) -> &VoiceRegistry;

    /// Stop the utterance currently playing, if any
    fn cancel(&self);

    /// Start speaking. Any utterance still playing is cancelled first.
    ///
    /// Returns once audio has started; the receiver reports how it ended.
    fn speak(&self, utterance: Utterance) -> Result<oneshot::Receiver<UtteranceEnd>, SynthesisError>;
}

/// espeak-ng / espeak command line engine
pub struct EspeakEngine {
    bin: PathBuf,
    voices: Arc<VoiceRegistry>,
    /// Cancel signal of the running utterance
    current: Mutex<Option<oneshot::Sender<()>>>,
}

impl EspeakEngine {
    /// Create the engine and start loading its voice list in the background
    pub fn new(bin: PathBuf) -> Self {
        let voices = Arc::new(VoiceRegistry::new());

        let registry = Arc::clone(&voices);
        let list_bin = bin.clone();
        std::thread::spawn(move || match list_voices(&list_bin) {
            Ok(list) => registry.publish(list),
            Err(e) => log::warn!("Could not list espeak voices: {}", e),
        });

        Self {
            bin,
            voices,
            current: Mutex::new(None),
        }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    fn take_current(&self) -> Option<oneshot::Sender<()>> {
        match self.current.lock() {
            Ok(mut current) => current.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl SpeechEngine for EspeakEngine {
    fn voices(&self) -> &VoiceRegistry {
        &self.voices
    }

    fn cancel(&self) {
        if let Some(cancel) = self.take_current() {
            let _ = cancel.send(());
        }
    }

    fn speak(&self, utterance: Utterance) -> Result<oneshot::Receiver<UtteranceEnd>, SynthesisError> {
        self.cancel();

        let mut child = tokio::process::Command::new(&self.bin)
            .args(espeak_args(&utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SynthesisError::SpawnError(e.to_string()))?;

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let (end_tx, end_rx) = oneshot::channel();

        match self.current.lock() {
            Ok(mut current) => *current = Some(cancel_tx),
            Err(poisoned) => *poisoned.into_inner() = Some(cancel_tx),
        }

        tokio::spawn(async move {
            // A dropped sender counts as a cancel as well
            let status = tokio::select! {
                status = child.wait() => Some(status),
                _ = cancel_rx => None,
            };

            let end = match status {
                Some(Ok(status)) if status.success() => UtteranceEnd::Finished,
                Some(Ok(status)) => UtteranceEnd::Failed(format!("espeak exited with {}", status)),
                Some(Err(e)) => UtteranceEnd::Failed(e.to_string()),
                None => {
                    let _ = child.kill().await;
                    UtteranceEnd::Cancelled
                }
            };
            let _ = end_tx.send(end);
        });

        Ok(end_rx)
    }
}

/// Map an utterance onto espeak flags
fn espeak_args(utterance: &Utterance) -> Vec<String> {
    let wpm = (175.0 * utterance.rate).round().clamp(80.0, 450.0) as i32;
    let pitch = (50.0 * utterance.pitch).round().clamp(0.0, 99.0) as i32;
    let amplitude = (100.0 * utterance.volume).round().clamp(0.0, 200.0) as i32;
    let voice = utterance
        .voice
        .as_ref()
        .map(|v| v.uri.clone())
        .unwrap_or_else(|| utterance.lang.to_ascii_lowercase());

    vec![
        "-v".to_string(),
        voice,
        "-s".to_string(),
        wpm.to_string(),
        "-p".to_string(),
        pitch.to_string(),
        "-a".to_string(),
        amplitude.to_string(),
        // Words such as "-ing" must not be read as flags
        "--".to_string(),
        utterance.text.clone(),
    ]
}

fn list_voices(bin: &Path) -> std::io::Result<Vec<Voice>> {
    let output = std::process::Command::new(bin).arg("--voices").output()?;
    if !output.status.success() {
        return Err(std::io::Error::other(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  2  en-us           --/M      English_(America)  gmw/en-US            (en 2)
/// ```
fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            let lang = fields[1];
            Some(Voice {
                name: fields[3].to_string(),
                lang: lang.to_string(),
                uri: lang.to_string(),
                // espeak falls back to "en" when no voice is given
                default: lang == "en",
            })
        })
        .collect()
}

/// Capability probe: locate a working espeak binary.
///
/// `explicit` (e.g. from ESPEAK_BIN) wins over a PATH search for `espeak-ng`
/// and then `espeak`.
pub fn detect_engine(explicit: Option<&Path>) -> Option<EspeakEngine> {
    let bin = match explicit {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(path) => {
            log::warn!("Configured espeak binary {:?} does not exist", path);
            None
        }
        None => get_from_path("espeak-ng").or_else(|| get_from_path("espeak")),
    }?;

    let responds = std::process::Command::new(&bin)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !responds {
        log::warn!("{:?} did not answer --version, local synthesis disabled", bin);
        return None;
    }

    log::info!("Detected speech engine: {:?}", bin);
    Some(EspeakEngine::new(bin))
}

fn get_from_path(bin: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}
