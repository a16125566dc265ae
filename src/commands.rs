//! Commands behind the command line front end

use crate::api::TtsApi;
use crate::config::{self, ConfigSource, ConfigStore, TtsConfig, TtsConfigUpdate};
use crate::tts::{
    AudioOutput, LocalSynthesisDriver, PlaybackOrchestrator, PlaybackOutcome, RemotePlayback,
    RemoteSynthesisDriver, Route, Voice,
};
use anyhow::{bail, Context};
use std::sync::Arc;

/// Application state
pub struct AppState {
    pub api: TtsApi,
    pub config: Arc<ConfigStore>,
    pub orchestrator: PlaybackOrchestrator,
    output: Arc<dyn AudioOutput>,
}

impl AppState {
    pub fn new(api: TtsApi, local: LocalSynthesisDriver, output: Arc<dyn AudioOutput>) -> Self {
        let config = Arc::new(ConfigStore::new());
        let remote = RemoteSynthesisDriver::new(api.clone(), Arc::clone(&output));
        let orchestrator = PlaybackOrchestrator::new(Arc::clone(&config), local, remote);
        Self {
            api,
            config,
            orchestrator,
            output,
        }
    }
}

/// How a finished `speak` command produced its audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spoken {
    Local,
    Remote(RemotePlayback),
}

/// Speak text and wait until the audio has ended
pub async fn speak(state: &AppState, text: &str, route: Route) -> anyhow::Result<Spoken> {
    let text = text.trim();
    if text.is_empty() {
        bail!("Nothing to speak");
    }

    match state.orchestrator.play(text, None, route).await {
        PlaybackOutcome::Local(speech) => {
            speech.await.context("Local speech task failed")?;
            Ok(Spoken::Local)
        }
        PlaybackOutcome::Remote(playback) => {
            state.output.wait_until_idle().await;
            Ok(Spoken::Remote(playback))
        }
        PlaybackOutcome::LocalUnavailable => bail!("Local speech synthesis not supported"),
        PlaybackOutcome::RemoteFailed(e) => Err(e.into()),
        PlaybackOutcome::Dropped => bail!("Another playback is in progress"),
    }
}

/// Voices of the local engine, waiting briefly for a list still loading
pub async fn get_voices(state: &AppState) -> anyhow::Result<Vec<Voice>> {
    let local = state.orchestrator.local();
    let Some(engine) = local.engine() else {
        bail!("Local speech synthesis not supported");
    };
    Ok(engine.voices().wait_ready(local.voice_wait()).await)
}

/// Active configuration, or the built-in defaults before the first load
pub fn get_config(state: &AppState) -> Arc<TtsConfig> {
    state.config.current_or_default()
}

/// Fetch the configuration from the server again
pub async fn reload_config(state: &AppState) -> ConfigSource {
    config::load_config(&state.config, &state.api).await
}

/// Change server-side settings and adopt the result
pub async fn set_config(state: &AppState, update: TtsConfigUpdate) -> anyhow::Result<Arc<TtsConfig>> {
    if update.is_empty() {
        bail!("No settings given");
    }
    config::push_update(&state.config, &state.api, update)
        .await
        .context("Updating TTS config failed")
}
