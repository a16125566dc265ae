//! HTTP client for the vocabulary trainer backend
//!
//! Endpoints:
//! - `GET  /api/tts-config` -> `{ success, config?, error? }`
//! - `POST /api/tts-config` -> `{ success, config?, message?, error? }`
//! - `GET  /api/tts/{text}` -> `{ success, audio_url?, cached?, error? }`

use crate::config::{ConfigError, TtsConfig, TtsConfigUpdate};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("HTTP error! status: {0}")]
    Status(StatusCode),
}

#[derive(Debug, Deserialize)]
struct ConfigEnvelope {
    success: bool,
    #[serde(default)]
    config: Option<TtsConfig>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ConfigEnvelope {
    fn into_config(self) -> Result<TtsConfig, ConfigError> {
        if !self.success {
            return Err(ConfigError::Rejected(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        if let Some(message) = &self.message {
            log::debug!("Config endpoint says: {}", message);
        }
        let config = self
            .config
            .ok_or_else(|| ConfigError::Malformed("response has no config".to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Answer of `/api/tts/{text}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechTicket {
    pub success: bool,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Set by the backend when it suggests using local synthesis instead
    #[serde(default)]
    pub fallback: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Backend client shared by the config store and the remote driver
#[derive(Debug, Clone)]
pub struct TtsApi {
    client: reqwest::Client,
    base: Url,
}

impl TtsApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a path or absolute URL returned by the backend
    pub fn resolve(&self, location: &str) -> Result<Url, ApiError> {
        self.base
            .join(location)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", location, e)))
    }

    /// URL of the speech endpoint for `text`
    pub fn speech_url(&self, text: &str) -> Result<Url, ApiError> {
        self.resolve(&format!("/api/tts/{}", urlencoding::encode(text)))
    }

    pub async fn fetch_config(&self) -> Result<TtsConfig, ConfigError> {
        let url = self
            .resolve("/api/tts-config")
            .map_err(|e| ConfigError::Fetch(e.to_string()))?;

        let envelope = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConfigError::Fetch(e.to_string()))?
            .json::<ConfigEnvelope>()
            .await
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        envelope.into_config()
    }

    pub async fn update_config(&self, update: &TtsConfigUpdate) -> Result<TtsConfig, ConfigError> {
        let url = self
            .resolve("/api/tts-config")
            .map_err(|e| ConfigError::Fetch(e.to_string()))?;

        let envelope = self
            .client
            .post(url)
            .json(update)
            .send()
            .await
            .map_err(|e| ConfigError::Fetch(e.to_string()))?
            .json::<ConfigEnvelope>()
            .await
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        envelope.into_config()
    }

    /// Ask the backend to generate (or look up) audio for `text`.
    ///
    /// No deadline is applied here; the caller bounds the future.
    pub async fn request_speech(&self, text: &str) -> Result<SpeechTicket, ApiError> {
        let url = self.speech_url(text)?;

        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        log::debug!("Server TTS response status: {}", res.status());
        if !res.status().is_success() {
            return Err(ApiError::Status(res.status()));
        }

        res.json::<SpeechTicket>()
            .await
            .map_err(|e| ApiError::Request(format!("Failed to parse response: {}", e)))
    }

    /// Download an audio resource completely
    pub async fn fetch_audio(&self, url: Url) -> Result<Vec<u8>, ApiError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ApiError::Status(res.status()));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
