//! Remote synthesis driver
//!
//! Asks the backend for an audio file, downloads it and starts playback.
//! "Success" means playback began; nothing waits for it to finish.

use crate::api::{ApiError, TtsApi};
use crate::config::TtsConfig;
use crate::tts::audio::{AudioError, AudioOutput};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteTtsError {
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error! status: {0}")]
    Http(StatusCode),
    #[error("Server TTS request failed: {0}")]
    Request(String),
    /// Backend answered but produced no audio
    #[error("{0}")]
    Rejected(String),
    #[error("Audio file load failed: {0}")]
    AudioLoad(String),
    #[error("Audio play error: {0}")]
    Playback(#[from] AudioError),
}

impl From<ApiError> for RemoteTtsError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Status(status) => RemoteTtsError::Http(status),
            other => RemoteTtsError::Request(other.to_string()),
        }
    }
}

/// Playback that has started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlayback {
    pub audio_url: String,
    /// The backend served a previously generated file
    pub cached: bool,
}

#[derive(Clone)]
pub struct RemoteSynthesisDriver {
    api: TtsApi,
    output: Arc<dyn AudioOutput>,
}

impl RemoteSynthesisDriver {
    pub fn new(api: TtsApi, output: Arc<dyn AudioOutput>) -> Self {
        Self { api, output }
    }

    /// Request audio for `text` and start playing it.
    ///
    /// The request is aborted after `config.server_timeout` seconds. The audio
    /// download gets a deadline of the same length.
    pub async fn speak(&self, text: &str, config: &TtsConfig) -> Result<RemotePlayback, RemoteTtsError> {
        log::info!("Trying server TTS for: {}", text);
        let deadline = config.server_deadline();

        let ticket = match tokio::time::timeout(deadline, self.api.request_speech(text)).await {
            Ok(ticket) => ticket?,
            Err(_) => {
                log::warn!("Server TTS request timed out after {:?}", deadline);
                return Err(RemoteTtsError::Timeout(deadline));
            }
        };
        log::debug!("Server TTS response: {:?}", ticket);

        let audio_url = match ticket.audio_url {
            Some(url) if ticket.success && !url.is_empty() => url,
            _ => {
                let reason = ticket
                    .error
                    .unwrap_or_else(|| "Audio generation failed".to_string());
                if ticket.fallback {
                    log::info!("Server suggests local synthesis: {}", reason);
                }
                return Err(RemoteTtsError::Rejected(reason));
            }
        };

        let location = self
            .api
            .resolve(&audio_url)
            .map_err(|e| RemoteTtsError::AudioLoad(e.to_string()))?;
        log::debug!("Loading audio from: {}", location);

        let audio = match tokio::time::timeout(deadline, self.api.fetch_audio(location)).await {
            Ok(Ok(audio)) if !audio.is_empty() => audio,
            Ok(Ok(_)) => return Err(RemoteTtsError::AudioLoad("empty audio file".to_string())),
            Ok(Err(e)) => return Err(RemoteTtsError::AudioLoad(e.to_string())),
            Err(_) => return Err(RemoteTtsError::AudioLoad(format!("timed out after {:?}", deadline))),
        };

        self.output.play(audio).await?;

        log::info!("Server TTS playing successfully");
        if ticket.cached {
            log::info!("Using cached audio file");
        }

        Ok(RemotePlayback {
            audio_url,
            cached: ticket.cached,
        })
    }
}
