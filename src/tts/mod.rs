//! Speech output: local engine, server-generated audio and the policy
//! that picks between them

mod audio;
mod engine;
mod local;
mod playback;
mod remote;
mod voice;

#[cfg(test)]
mod testing;

pub use audio::{AudioError, AudioOutput, RodioOutput};
pub use engine::{
    detect_engine, EspeakEngine, SpeechEngine, SynthesisError, Utterance, UtteranceEnd, UTTERANCE_LANG,
};
pub use local::{LocalSynthesisDriver, DEFAULT_VOICE_WAIT};
pub use playback::{
    choose_dispatch, BusyGuard, Control, Dispatch, PlaybackOrchestrator, PlaybackOutcome, Route,
    ICON_BUSY, ICON_SPEAKING,
};
pub use remote::{RemotePlayback, RemoteSynthesisDriver, RemoteTtsError};
pub use voice::{select_voice, Voice, VoiceRegistry};
