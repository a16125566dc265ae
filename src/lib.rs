//! Vocab Speaker
//!
//! Pronounces vocabulary words either with an on-device speech engine or with
//! audio generated by the vocabulary server, following a configurable policy.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod tts;

pub use api::{ApiError, SpeechTicket, TtsApi};
pub use config::{ConfigError, ConfigSource, ConfigStore, TtsConfig, TtsConfigUpdate, TtsMode};
