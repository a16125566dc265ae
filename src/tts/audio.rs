//! Audio playback for server-generated speech
//!
//! rodio's OutputStream is not Send, so a dedicated audio thread owns the
//! stream and every sink. Callers hand it encoded audio and get told once
//! playback has actually started.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use futures_util::future::BoxFuture;
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Failed to create audio output stream: {0}")]
    StreamError(String),
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),
    #[error("Playback error: {0}")]
    PlaybackError(String),
}

/// Something that can start playing an encoded audio resource
pub trait AudioOutput: Send + Sync {
    /// Resolves once playback has begun; it does not wait for the end
    fn play(&self, audio: Vec<u8>) -> BoxFuture<'_, Result<(), AudioError>>;

    /// Resolves once everything started so far has finished
    fn wait_until_idle(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

struct PlayRequest {
    audio: Vec<u8>,
    started: oneshot::Sender<Result<(), AudioError>>,
}

/// rodio-backed output running on its own thread
#[derive(Clone)]
pub struct RodioOutput {
    tx: Sender<PlayRequest>,
    /// Sinks that still have audio queued
    active: Arc<AtomicUsize>,
}

impl RodioOutput {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<PlayRequest>();
        let active = Arc::new(AtomicUsize::new(0));

        let active_for_thread = Arc::clone(&active);
        thread::spawn(move || audio_thread_main(rx, active_for_thread));

        Self { tx, active }
    }

    /// Check if any audio is currently playing
    pub fn is_playing(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, audio: Vec<u8>) -> BoxFuture<'_, Result<(), AudioError>> {
        Box::pin(async move {
            let (started, started_rx) = oneshot::channel();
            self.tx
                .send(PlayRequest { audio, started })
                .map_err(|_| AudioError::PlaybackError("audio thread stopped".to_string()))?;

            started_rx
                .await
                .map_err(|_| AudioError::PlaybackError("audio thread dropped request".to_string()))?
        })
    }

    fn wait_until_idle(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            while self.is_playing() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    }
}

fn audio_thread_main(rx: Receiver<PlayRequest>, active: Arc<AtomicUsize>) {
    // Create the output stream once for the lifetime of the thread
    let output = OutputStream::try_default().map_err(|e| AudioError::StreamError(e.to_string()));
    if let Err(e) = &output {
        log::error!("{}", e);
    }

    let mut sinks: Vec<Sink> = Vec::new();

    loop {
        // Receive with timeout so finished sinks get pruned
        let request = match rx.recv_timeout(Duration::from_millis(25)) {
            Ok(request) => Some(request),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some(request) = request {
            let result = match &output {
                Ok((_stream, handle)) => start_playback(handle, request.audio),
                Err(e) => Err(e.clone()),
            };

            match result {
                Ok(sink) => {
                    sinks.push(sink);
                    // Publish before acknowledging so is_playing() never lags
                    active.store(sinks.len(), Ordering::SeqCst);
                    let _ = request.started.send(Ok(()));
                }
                Err(e) => {
                    let _ = request.started.send(Err(e));
                }
            }
        }

        sinks.retain(|sink| !sink.empty());
        active.store(sinks.len(), Ordering::SeqCst);
    }
}

fn start_playback(handle: &rodio::OutputStreamHandle, audio: Vec<u8>) -> Result<Sink, AudioError> {
    let source =
        Decoder::new(Cursor::new(audio)).map_err(|e| AudioError::DecodeError(e.to_string()))?;
    let sink = Sink::try_new(handle).map_err(|e| AudioError::PlaybackError(e.to_string()))?;
    sink.append(source);
    sink.play();
    Ok(sink)
}
