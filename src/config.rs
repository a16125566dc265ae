//! TTS configuration record and the process-wide store that holds it
//!
//! The store is populated once at startup from `/api/tts-config`. Any failure
//! during that load falls back to the built-in defaults; a partially valid
//! record is never merged into the defaults.

use crate::api::TtsApi;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to fetch TTS config: {0}")]
    Fetch(String),
    #[error("Server rejected TTS config request: {0}")]
    Rejected(String),
    #[error("Malformed TTS config: {0}")]
    Malformed(String),
}

const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(8);
/// Longest remote deadline accepted from the backend
const MAX_SERVER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Playback selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsMode {
    /// Prefer the local engine, use the server only when it is missing
    #[default]
    Auto,
    /// Always the local engine, never the server
    Browser,
    /// Always the server, never the local engine
    Server,
}

impl TtsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsMode::Auto => "auto",
            TtsMode::Browser => "browser",
            TtsMode::Server => "server",
        }
    }
}

impl std::str::FromStr for TtsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(TtsMode::Auto),
            "browser" | "local" => Ok(TtsMode::Browser),
            "server" | "remote" => Ok(TtsMode::Server),
            other => Err(ConfigError::Malformed(format!("unknown tts_mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for TtsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active TTS configuration, replaced wholesale on every load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    pub tts_mode: TtsMode,
    /// Remote request deadline in seconds
    pub server_timeout: f64,
    pub browser_rate: f32,
    pub browser_pitch: f32,
    /// 0.0 - 1.0
    pub browser_volume: f32,
    /// Exact name of the desired local voice, empty for none
    #[serde(default, deserialize_with = "null_as_empty")]
    pub preferred_voice: String,
}

/// The backend stores an unset preferred voice as NULL
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            tts_mode: TtsMode::Auto,
            server_timeout: 8.0,
            browser_rate: 0.8,
            browser_pitch: 1.0,
            browser_volume: 1.0,
            preferred_voice: String::new(),
        }
    }
}

impl TtsConfig {
    /// Remote deadline as a `Duration`
    ///
    /// Falls back to the default 8 s for values [`TtsConfig::validate`] rejects.
    pub fn server_deadline(&self) -> Duration {
        Duration::try_from_secs_f64(self.server_timeout)
            .ok()
            .filter(|d| !d.is_zero() && *d <= MAX_SERVER_TIMEOUT)
            .unwrap_or(DEFAULT_SERVER_TIMEOUT)
    }

    /// Preferred voice name, `None` when unset.
    ///
    /// The name is matched exactly, so it is not trimmed.
    pub fn preferred_voice(&self) -> Option<&str> {
        (!self.preferred_voice.is_empty()).then_some(self.preferred_voice.as_str())
    }

    /// Check the record invariants before it may become the active config
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = Duration::try_from_secs_f64(self.server_timeout)
            .map(|d| !d.is_zero() && d <= MAX_SERVER_TIMEOUT)
            .unwrap_or(false);
        if !in_range {
            return Err(ConfigError::Malformed(format!(
                "server_timeout must be positive and at most {}s, got {}",
                MAX_SERVER_TIMEOUT.as_secs(),
                self.server_timeout
            )));
        }
        if !(0.0..=1.0).contains(&self.browser_volume) {
            return Err(ConfigError::Malformed(format!(
                "browser_volume must be within 0..=1, got {}",
                self.browser_volume
            )));
        }
        Ok(())
    }
}

/// Partial update posted to `/api/tts-config`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TtsConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_mode: Option<TtsMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_voice: Option<String>,
}

impl TtsConfigUpdate {
    /// Drop fields the backend would silently ignore.
    ///
    /// Accepted ranges: timeout 3-30 s, rate 0.1-10, pitch 0-2, volume 0-1.
    pub fn sanitized(mut self) -> Self {
        if let Some(timeout) = self.server_timeout {
            if !(3..=30).contains(&timeout) {
                log::warn!("Ignoring server_timeout {}s (allowed 3-30)", timeout);
                self.server_timeout = None;
            }
        }
        if let Some(rate) = self.browser_rate {
            if !(0.1..=10.0).contains(&rate) {
                log::warn!("Ignoring browser_rate {} (allowed 0.1-10)", rate);
                self.browser_rate = None;
            }
        }
        if let Some(pitch) = self.browser_pitch {
            if !(0.0..=2.0).contains(&pitch) {
                log::warn!("Ignoring browser_pitch {} (allowed 0-2)", pitch);
                self.browser_pitch = None;
            }
        }
        if let Some(volume) = self.browser_volume {
            if !(0.0..=1.0).contains(&volume) {
                log::warn!("Ignoring browser_volume {} (allowed 0-1)", volume);
                self.browser_volume = None;
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Server,
    Defaults,
}

/// Holder of the single active configuration.
///
/// Empty until the first load completes; readers must tolerate that window
/// and use [`ConfigStore::current_or_default`] instead of waiting.
#[derive(Debug, Default)]
pub struct ConfigStore {
    active: RwLock<Option<Arc<TtsConfig>>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the active config, `None` before the first load
    pub fn current(&self) -> Option<Arc<TtsConfig>> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn current_or_default(&self) -> Arc<TtsConfig> {
        self.current()
            .unwrap_or_else(|| Arc::new(TtsConfig::default()))
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Replace the active config as a whole
    pub fn replace(&self, config: TtsConfig) -> Arc<TtsConfig> {
        let config = Arc::new(config);
        let mut guard = match self.active.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::clone(&config));
        config
    }
}

/// Load the remote configuration into `store`, falling back to defaults.
///
/// Never fails: every error is logged and replaced by [`TtsConfig::default`].
pub async fn load_config(store: &ConfigStore, api: &TtsApi) -> ConfigSource {
    match api.fetch_config().await {
        Ok(config) => {
            log::info!("TTS config loaded: {:?}", config);
            store.replace(config);
            ConfigSource::Server
        }
        Err(ConfigError::Rejected(reason)) => {
            log::warn!("Loading TTS config failed ({}), using defaults", reason);
            store.replace(TtsConfig::default());
            ConfigSource::Defaults
        }
        Err(e) => {
            log::error!("TTS config error: {}", e);
            store.replace(TtsConfig::default());
            ConfigSource::Defaults
        }
    }
}

/// Post `update` to the backend and adopt the config it returns
pub async fn push_update(
    store: &ConfigStore,
    api: &TtsApi,
    update: TtsConfigUpdate,
) -> Result<Arc<TtsConfig>, ConfigError> {
    let update = update.sanitized();
    if update.is_empty() {
        return Ok(store.current_or_default());
    }
    let config = api.update_config(&update).await?;
    log::info!("TTS config updated: {:?}", config);
    Ok(store.replace(config))
}
