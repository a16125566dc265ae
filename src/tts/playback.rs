//! Playback orchestration
//!
//! Picks the local or remote driver for each request, keeps the trigger
//! control busy while work is in flight and restores it on every exit path.

use crate::config::{ConfigStore, TtsConfig, TtsMode};
use crate::tts::local::LocalSynthesisDriver;
use crate::tts::remote::{RemotePlayback, RemoteSynthesisDriver, RemoteTtsError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const ICON_BUSY: &str = "fas fa-spinner fa-spin";
pub const ICON_SPEAKING: &str = "fas fa-volume-up";

const PAINT_DELAY: Duration = Duration::from_millis(200);
const FORCED_LOCAL_HOLD: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct ControlState {
    disabled: bool,
    icon: String,
}

/// Trigger control shown to the user: a disabled flag plus an icon class
#[derive(Debug, Clone)]
pub struct Control {
    state: Arc<Mutex<ControlState>>,
}

impl Control {
    pub fn new(icon: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState {
                disabled: false,
                icon: icon.into(),
            })),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.lock().disabled
    }

    pub fn icon(&self) -> String {
        self.lock().icon.clone()
    }

    /// Disable the control and show `icon`.
    ///
    /// Returns `None` if the control is already disabled. The guard puts the
    /// original icon back and re-enables the control when dropped.
    pub fn begin_busy(&self, icon: &str) -> Option<BusyGuard> {
        let mut state = self.lock();
        if state.disabled {
            return None;
        }
        let original_icon = std::mem::replace(&mut state.icon, icon.to_string());
        state.disabled = true;
        Some(BusyGuard {
            control: self.clone(),
            original_icon,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Busy state of a [`Control`]; restores it on drop
#[derive(Debug)]
pub struct BusyGuard {
    control: Control,
    original_icon: String,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut state = self.control.lock();
        state.icon = std::mem::take(&mut self.original_icon);
        state.disabled = false;
    }
}

/// Which policy a request follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    /// Follow the configured `tts_mode`
    #[default]
    Configured,
    ForceLocal,
    ForceRemote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Local,
    Remote,
    /// Nothing can speak; just restore the control
    Skip,
}

/// Decide which driver serves a configured-policy request.
///
/// Forced modes never cross over: `browser` without local support skips,
/// `server` always goes remote. `auto` prefers local and only goes remote
/// when the host cannot speak.
pub fn choose_dispatch(mode: TtsMode, local_supported: bool) -> Dispatch {
    match (mode, local_supported) {
        (TtsMode::Browser, true) => Dispatch::Local,
        (TtsMode::Browser, false) => Dispatch::Skip,
        (TtsMode::Server, _) => Dispatch::Remote,
        (TtsMode::Auto, true) => Dispatch::Local,
        (TtsMode::Auto, false) => Dispatch::Remote,
    }
}

/// What a playback request ended up doing
#[derive(Debug)]
pub enum PlaybackOutcome {
    /// The control was busy; nothing happened
    Dropped,
    /// Local speech scheduled; the handle completes when the utterance ends
    Local(JoinHandle<()>),
    LocalUnavailable,
    Remote(RemotePlayback),
    RemoteFailed(RemoteTtsError),
}

impl PlaybackOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, PlaybackOutcome::Dropped)
    }
}

#[derive(Clone)]
pub struct PlaybackOrchestrator {
    config: Arc<ConfigStore>,
    local: LocalSynthesisDriver,
    remote: RemoteSynthesisDriver,
    paint_delay: Duration,
    forced_local_hold: Duration,
}

impl PlaybackOrchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        local: LocalSynthesisDriver,
        remote: RemoteSynthesisDriver,
    ) -> Self {
        Self {
            config,
            local,
            remote,
            paint_delay: PAINT_DELAY,
            forced_local_hold: FORCED_LOCAL_HOLD,
        }
    }

    /// Delay before local speech so the busy state can be painted
    pub fn with_paint_delay(mut self, delay: Duration) -> Self {
        self.paint_delay = delay;
        self
    }

    /// How long forced-local requests keep the control busy
    pub fn with_forced_local_hold(mut self, hold: Duration) -> Self {
        self.forced_local_hold = hold;
        self
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn local(&self) -> &LocalSynthesisDriver {
        &self.local
    }

    pub async fn play(&self, text: &str, control: Option<&Control>, route: Route) -> PlaybackOutcome {
        match route {
            Route::Configured => self.play_audio(text, control).await,
            Route::ForceLocal => self.play_with_local(text, control),
            Route::ForceRemote => self.play_with_remote(text, control).await,
        }
    }

    /// Speak `text` following the configured mode.
    ///
    /// Local speech starts after the paint delay and the control is restored
    /// right after it is scheduled. Remote requests keep the control busy
    /// until playback starts or fails.
    pub async fn play_audio(&self, text: &str, control: Option<&Control>) -> PlaybackOutcome {
        let Some(guard) = claim(control, ICON_BUSY) else {
            return PlaybackOutcome::Dropped;
        };
        log::info!("Playing audio for: {}", text);

        let config = match self.config.current() {
            Some(config) => config,
            None => {
                log::warn!("TTS config not loaded, using defaults");
                Arc::new(TtsConfig::default())
            }
        };

        let dispatch = choose_dispatch(config.tts_mode, self.local.is_supported());
        log::debug!("TTS mode {} dispatches to {:?}", config.tts_mode, dispatch);

        let outcome = match dispatch {
            Dispatch::Local => {
                tokio::time::sleep(self.paint_delay).await;
                self.speak_local(text, config)
            }
            Dispatch::Remote => self.speak_remote(text, &config).await,
            Dispatch::Skip => {
                log::warn!("Local speech synthesis not supported");
                PlaybackOutcome::LocalUnavailable
            }
        };
        drop(guard);
        outcome
    }

    /// Speak `text` on the local engine whatever the configured mode.
    ///
    /// The control shows the speaking icon for a fixed hold, independent of
    /// how long speech lasts. Without a local engine it is restored at once.
    pub fn play_with_local(&self, text: &str, control: Option<&Control>) -> PlaybackOutcome {
        let Some(guard) = claim(control, ICON_SPEAKING) else {
            return PlaybackOutcome::Dropped;
        };
        log::info!("Force using local TTS for: {}", text);

        let outcome = self.speak_local(text, self.config.current_or_default());
        if let (PlaybackOutcome::Local(_), Some(guard)) = (&outcome, guard) {
            let hold = self.forced_local_hold;
            tokio::spawn(async move {
                tokio::time::sleep(hold).await;
                drop(guard);
            });
        }
        outcome
    }

    /// Legacy entry point kept for callers of the old direct-play hook.
    /// Same behavior as [`Self::play_with_local`].
    pub fn play_directly(&self, text: &str, control: Option<&Control>) -> PlaybackOutcome {
        log::debug!("Using legacy direct playback for: {}", text);
        self.play_with_local(text, control)
    }

    /// Speak `text` through the backend whatever the configured mode
    pub async fn play_with_remote(&self, text: &str, control: Option<&Control>) -> PlaybackOutcome {
        let Some(guard) = claim(control, ICON_BUSY) else {
            return PlaybackOutcome::Dropped;
        };
        log::info!("Force using server TTS for: {}", text);

        let config = self.config.current_or_default();
        let outcome = self.speak_remote(text, &config).await;
        drop(guard);
        outcome
    }

    fn speak_local(&self, text: &str, config: Arc<TtsConfig>) -> PlaybackOutcome {
        match self.local.speak(text, config) {
            Ok(handle) => PlaybackOutcome::Local(handle),
            Err(e) => {
                log::warn!("{}", e);
                PlaybackOutcome::LocalUnavailable
            }
        }
    }

    async fn speak_remote(&self, text: &str, config: &TtsConfig) -> PlaybackOutcome {
        match self.remote.speak(text, config).await {
            Ok(playback) => PlaybackOutcome::Remote(playback),
            Err(e) => {
                log::warn!("Server TTS failed: {}", e);
                PlaybackOutcome::RemoteFailed(e)
            }
        }
    }
}

/// Outer `None`: the control is busy and the request must be dropped
fn claim(control: Option<&Control>, icon: &str) -> Option<Option<BusyGuard>> {
    match control {
        Some(control) => match control.begin_busy(icon) {
            Some(guard) => Some(Some(guard)),
            None => {
                log::debug!("Control busy, ignoring request");
                None
            }
        },
        None => Some(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TtsApi;
    use crate::tts::testing::{english_voices, FakeEngine, FakeOutput};
    use crate::tts::voice::VoiceRegistry;
    use httpmock::prelude::*;
    use serde_json::json;

    const IDLE_ICON: &str = "fas fa-headphones";

    fn store_with(config: TtsConfig) -> Arc<ConfigStore> {
        let store = Arc::new(ConfigStore::new());
        store.replace(config);
        store
    }

    fn mode(tts_mode: TtsMode) -> TtsConfig {
        TtsConfig {
            tts_mode,
            ..TtsConfig::default()
        }
    }

    fn remote_for(base: &str, output: Arc<FakeOutput>) -> RemoteSynthesisDriver {
        RemoteSynthesisDriver::new(TtsApi::new(base).unwrap(), output)
    }

    fn offline_remote() -> RemoteSynthesisDriver {
        remote_for("http://127.0.0.1:9", Arc::new(FakeOutput::new()))
    }

    fn local_engine() -> (Arc<FakeEngine>, LocalSynthesisDriver) {
        let engine = Arc::new(FakeEngine::new(VoiceRegistry::with_voices(english_voices())));
        let driver = LocalSynthesisDriver::new(engine.clone());
        (engine, driver)
    }

    async fn mock_speech<'a>(server: &'a MockServer, text: &str) -> httpmock::Mock<'a> {
        let path = format!("/api/tts/{}", text);
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(path.as_str());
                then.status(200)
                    .delay(Duration::from_millis(300))
                    .json_body(json!({ "success": true, "audio_url": "/a.mp3", "cached": true }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/a.mp3");
                then.status(200).body("ID3");
            })
            .await;
        mock
    }

    #[test]
    fn test_choose_dispatch_table() {
        assert_eq!(choose_dispatch(TtsMode::Browser, true), Dispatch::Local);
        assert_eq!(choose_dispatch(TtsMode::Browser, false), Dispatch::Skip);
        assert_eq!(choose_dispatch(TtsMode::Server, true), Dispatch::Remote);
        assert_eq!(choose_dispatch(TtsMode::Server, false), Dispatch::Remote);
        assert_eq!(choose_dispatch(TtsMode::Auto, true), Dispatch::Local);
        assert_eq!(choose_dispatch(TtsMode::Auto, false), Dispatch::Remote);
    }

    #[test]
    fn test_busy_guard_restores_control() {
        let control = Control::new(IDLE_ICON);
        {
            let _guard = control.begin_busy(ICON_BUSY).unwrap();
            assert!(control.is_disabled());
            assert_eq!(control.icon(), ICON_BUSY);
            assert!(control.begin_busy(ICON_BUSY).is_none());
        }
        assert!(!control.is_disabled());
        assert_eq!(control.icon(), IDLE_ICON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_mode_speaks_locally_with_preferred_voice() {
        let (engine, local) = local_engine();
        let store = store_with(TtsConfig {
            preferred_voice: "Samantha".to_string(),
            ..TtsConfig::default()
        });
        let orchestrator = PlaybackOrchestrator::new(store, local, offline_remote());
        let control = Control::new(IDLE_ICON);

        let task = {
            let orchestrator = orchestrator.clone();
            let control = control.clone();
            tokio::spawn(async move { orchestrator.play_audio("hello", Some(&control)).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(control.is_disabled());
        assert_eq!(control.icon(), ICON_BUSY);
        assert!(engine.spoken().is_empty());

        let start = tokio::time::Instant::now();
        let outcome = task.await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!control.is_disabled());
        assert_eq!(control.icon(), IDLE_ICON);

        let PlaybackOutcome::Local(speech) = outcome else {
            panic!("expected local playback");
        };
        speech.await.unwrap();

        let spoken = engine.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "hello");
        assert_eq!(spoken[0].voice.as_ref().unwrap().name, "Samantha");
        assert!((spoken[0].rate - 0.8).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_server_mode_never_uses_local_engine() {
        let server = MockServer::start_async().await;
        let speech = mock_speech(&server, "hello").await;

        let (engine, local) = local_engine();
        let output = Arc::new(FakeOutput::new());
        let orchestrator = PlaybackOrchestrator::new(
            store_with(mode(TtsMode::Server)),
            local,
            remote_for(&server.base_url(), output.clone()),
        );
        let control = Control::new(IDLE_ICON);

        let task = {
            let orchestrator = orchestrator.clone();
            let control = control.clone();
            tokio::spawn(async move { orchestrator.play_audio("hello", Some(&control)).await })
        };

        // Still busy past the local paint delay: remote waits for playback start
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(control.is_disabled());

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Remote(ref p) if p.cached && p.audio_url == "/a.mp3"));
        assert!(!control.is_disabled());
        assert_eq!(control.icon(), IDLE_ICON);
        assert_eq!(output.played().len(), 1);
        assert!(engine.spoken().is_empty());
        assert_eq!(engine.cancel_count(), 0);
        speech.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn test_browser_mode_without_engine_skips_everything() {
        let server = MockServer::start_async().await;
        let speech = server
            .mock_async(|when, then| {
                when.method(GET).path_prefix("/api/tts/");
                then.status(200).json_body(json!({ "success": true, "audio_url": "/a.mp3" }));
            })
            .await;

        let output = Arc::new(FakeOutput::new());
        let orchestrator = PlaybackOrchestrator::new(
            store_with(mode(TtsMode::Browser)),
            LocalSynthesisDriver::unsupported(),
            remote_for(&server.base_url(), output.clone()),
        );
        let control = Control::new(IDLE_ICON);

        let outcome = orchestrator.play_audio("hello", Some(&control)).await;

        assert!(matches!(outcome, PlaybackOutcome::LocalUnavailable));
        assert!(!control.is_disabled());
        assert_eq!(control.icon(), IDLE_ICON);
        assert!(output.played().is_empty());
        speech.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn test_unloaded_config_behaves_as_auto() {
        let server = MockServer::start_async().await;
        let speech = mock_speech(&server, "hello").await;

        let output = Arc::new(FakeOutput::new());
        let orchestrator = PlaybackOrchestrator::new(
            Arc::new(ConfigStore::new()),
            LocalSynthesisDriver::unsupported(),
            remote_for(&server.base_url(), output.clone()),
        );

        let outcome = orchestrator.play_audio("hello", None).await;

        assert!(matches!(outcome, PlaybackOutcome::Remote(_)));
        assert_eq!(output.played().len(), 1);
        speech.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn test_second_request_while_busy_is_dropped() {
        let server = MockServer::start_async().await;
        let speech = mock_speech(&server, "hello").await;

        let (engine, local) = local_engine();
        let orchestrator = PlaybackOrchestrator::new(
            store_with(TtsConfig::default()),
            local,
            remote_for(&server.base_url(), Arc::new(FakeOutput::new())),
        );
        let control = Control::new(IDLE_ICON);

        let first = {
            let orchestrator = orchestrator.clone();
            let control = control.clone();
            tokio::spawn(async move { orchestrator.play_with_remote("hello", Some(&control)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(orchestrator.play_with_remote("hello", Some(&control)).await.is_dropped());
        assert!(orchestrator.play_audio("hello", Some(&control)).await.is_dropped());
        assert!(orchestrator.play_with_local("hello", Some(&control)).is_dropped());

        assert!(matches!(first.await.unwrap(), PlaybackOutcome::Remote(_)));
        assert!(!control.is_disabled());
        speech.assert_calls_async(1).await;
        assert!(engine.spoken().is_empty());
    }

    #[tokio::test]
    async fn test_remote_timeout_restores_control() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tts/hello");
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .json_body(json!({ "success": true, "audio_url": "/a.mp3" }));
            })
            .await;

        let output = Arc::new(FakeOutput::new());
        let orchestrator = PlaybackOrchestrator::new(
            store_with(TtsConfig {
                tts_mode: TtsMode::Server,
                server_timeout: 1.0,
                ..TtsConfig::default()
            }),
            LocalSynthesisDriver::unsupported(),
            remote_for(&server.base_url(), output.clone()),
        );
        let control = Control::new(IDLE_ICON);

        let start = std::time::Instant::now();
        let outcome = orchestrator.play_audio("hello", Some(&control)).await;

        assert!(matches!(outcome, PlaybackOutcome::RemoteFailed(RemoteTtsError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_millis(2500));
        assert!(!control.is_disabled());
        assert_eq!(control.icon(), IDLE_ICON);
        assert!(output.played().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_local_holds_speaking_icon() {
        let (engine, local) = local_engine();
        let orchestrator =
            PlaybackOrchestrator::new(store_with(mode(TtsMode::Server)), local, offline_remote());
        let control = Control::new(IDLE_ICON);

        let outcome = orchestrator.play_with_local("grape", Some(&control));
        assert!(control.is_disabled());
        assert_eq!(control.icon(), ICON_SPEAKING);

        let PlaybackOutcome::Local(speech) = outcome else {
            panic!("expected local playback");
        };
        speech.await.unwrap();
        assert_eq!(engine.spoken()[0].text, "grape");
        assert!(control.is_disabled());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!control.is_disabled());
        assert_eq!(control.icon(), IDLE_ICON);
    }

    #[tokio::test]
    async fn test_forced_local_without_engine_restores_at_once() {
        let orchestrator = PlaybackOrchestrator::new(
            store_with(TtsConfig::default()),
            LocalSynthesisDriver::unsupported(),
            offline_remote(),
        );
        let control = Control::new(IDLE_ICON);

        let outcome = orchestrator.play_directly("grape", Some(&control));

        assert!(matches!(outcome, PlaybackOutcome::LocalUnavailable));
        assert!(!control.is_disabled());
        assert_eq!(control.icon(), IDLE_ICON);
    }

    #[tokio::test]
    async fn test_forced_remote_failure_in_auto_mode_has_no_fallback() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tts/hello");
                then.status(500);
            })
            .await;

        let (engine, local) = local_engine();
        let orchestrator = PlaybackOrchestrator::new(
            store_with(TtsConfig::default()),
            local,
            remote_for(&server.base_url(), Arc::new(FakeOutput::new())),
        );
        let control = Control::new(IDLE_ICON);

        let outcome = orchestrator
            .play("hello", Some(&control), Route::ForceRemote)
            .await;

        assert!(matches!(outcome, PlaybackOutcome::RemoteFailed(RemoteTtsError::Http(_))));
        assert!(!control.is_disabled());
        assert!(engine.spoken().is_empty());
    }
}
