//! Command line front end

use crate::api::TtsApi;
use crate::commands::{self, AppState, Spoken};
use crate::config::{self, TtsConfig, TtsConfigUpdate, TtsMode};
use crate::tts::{detect_engine, LocalSynthesisDriver, RodioOutput, Route};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "vocab-speaker")]
#[command(about = "Speak vocabulary words with a local engine or the vocabulary server", long_about = None)]
pub struct Cli {
    /// Base URL of the vocabulary server
    #[arg(long, env = "VOCAB_SERVER_URL", default_value = "http://127.0.0.1:5000")]
    pub server: String,

    /// Path to the espeak-ng binary (searched on PATH otherwise)
    #[arg(long, env = "ESPEAK_BIN")]
    pub espeak: Option<PathBuf>,

    /// How long to wait for the local voice list, in milliseconds
    #[arg(long, env = "VOCAB_VOICE_WAIT_MS", default_value_t = 3000)]
    pub voice_wait_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Speak text and wait for the audio to end
    Speak {
        text: String,

        /// Follow the configured mode or force one side
        #[arg(long, value_enum, default_value_t = RouteArg::Configured)]
        route: RouteArg,
    },
    /// List the voices of the local engine
    Voices,
    /// Inspect or change the TTS configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Fetch the configuration from the server again
    Reload,
    /// Change settings on the server
    Set {
        /// auto, browser or server
        #[arg(long)]
        mode: Option<TtsMode>,

        /// Server request timeout in seconds (3-30)
        #[arg(long)]
        timeout: Option<u32>,

        /// Local speech rate (0.1-10)
        #[arg(long)]
        rate: Option<f32>,

        /// Local speech pitch (0-2)
        #[arg(long)]
        pitch: Option<f32>,

        /// Local speech volume (0-1)
        #[arg(long)]
        volume: Option<f32>,

        /// Preferred local voice name; empty clears it
        #[arg(long)]
        voice: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteArg {
    Configured,
    Local,
    Remote,
}

impl From<RouteArg> for Route {
    fn from(arg: RouteArg) -> Self {
        match arg {
            RouteArg::Configured => Route::Configured,
            RouteArg::Local => Route::ForceLocal,
            RouteArg::Remote => Route::ForceRemote,
        }
    }
}

/// Build the application state from command line settings
pub fn build_state(cli: &Cli) -> anyhow::Result<AppState> {
    let api = TtsApi::new(&cli.server).context("Invalid server URL")?;

    let local = match detect_engine(cli.espeak.as_deref()) {
        Some(engine) => LocalSynthesisDriver::new(Arc::new(engine)),
        None => {
            log::warn!("No local speech engine found");
            LocalSynthesisDriver::unsupported()
        }
    }
    .with_voice_wait(Duration::from_millis(cli.voice_wait_ms));

    Ok(AppState::new(api, local, Arc::new(RodioOutput::new())))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = build_state(&cli)?;

    match cli.command {
        Command::Speak { text, route } => {
            config::load_config(&state.config, &state.api).await;
            match commands::speak(&state, &text, route.into()).await? {
                Spoken::Local => log::info!("Spoke locally"),
                Spoken::Remote(playback) => {
                    log::info!("Played {} (cached: {})", playback.audio_url, playback.cached)
                }
            }
        }
        Command::Voices => {
            for voice in commands::get_voices(&state).await? {
                let marker = if voice.default { " (default)" } else { "" };
                println!("{:<32} {}{}", voice.name, voice.lang, marker);
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                config::load_config(&state.config, &state.api).await;
                let active = commands::get_config(&state);
                print_config(&active)?;
            }
            ConfigAction::Reload => {
                let source = commands::reload_config(&state).await;
                println!("Loaded from {:?}", source);
                let active = commands::get_config(&state);
                print_config(&active)?;
            }
            ConfigAction::Set {
                mode,
                timeout,
                rate,
                pitch,
                volume,
                voice,
            } => {
                let update = TtsConfigUpdate {
                    tts_mode: mode,
                    server_timeout: timeout,
                    browser_rate: rate,
                    browser_pitch: pitch,
                    browser_volume: volume,
                    preferred_voice: voice,
                };
                let updated = commands::set_config(&state, update).await?;
                print_config(&updated)?;
            }
        },
    }

    Ok(())
}

fn print_config(config: &TtsConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
