//! Audio recorder state machine
//!
//! Idle -> Recording (start), Recording <-> Paused (pause / resume),
//! Recording | Paused -> Stopping -> Idle (stop, once the writer drained
//! its queue and closed the file).

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TrySendError};
use std::sync::{Arc, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{AudioSource, ChunkSink, NoiseGate, SAMPLE_RATE};
use crate::events::EngineEvent;

/// How long the writer waits on its queue before re-checking the state
const WRITER_POLL: Duration = Duration::from_millis(500);

/// Chunks buffered between the capture callback and the writer
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopping,
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderState::Idle => write!(f, "Idle"),
            RecorderState::Recording => write!(f, "Recording"),
            RecorderState::Paused => write!(f, "Paused"),
            RecorderState::Stopping => write!(f, "Stopping"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to open audio input: {0}")]
    Source(String),

    #[error("failed to write recording: {0}")]
    Wav(#[from] hound::Error),

    #[error("failed to spawn writer thread: {0}")]
    ThreadSpawn(String),

    #[error("writer thread panicked")]
    WriterPanicked,
}

type Writer = hound::WavWriter<BufWriter<File>>;

pub struct AudioRecorder {
    state: Arc<RwLock<RecorderState>>,
    source: Box<dyn AudioSource>,
    path: PathBuf,
    writer: Option<JoinHandle<Result<u64, RecorderError>>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl AudioRecorder {
    pub fn new(
        source: Box<dyn AudioSource>,
        path: PathBuf,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(RecorderState::Idle)),
            source,
            path,
            writer: None,
            event_tx,
        }
    }

    pub fn state(&self) -> RecorderState {
        read_state(&self.state)
    }

    /// File the recorder writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set_state(&self, state: RecorderState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*guard, to = %state, "recorder state");
        *guard = state;
    }

    /// Begin a new recording, replacing the previous file.
    ///
    /// No-op while a recording is in progress, paused or not.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.state() != RecorderState::Idle {
            debug!(state = %self.state(), "start ignored, already recording");
            return Ok(());
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let wav = hound::WavWriter::create(&self.path, spec)?;

        // A fresh queue per session, so nothing from an earlier one leaks in
        let (tx, rx) = mpsc::sync_channel::<Vec<i16>>(QUEUE_CAPACITY);
        self.set_state(RecorderState::Recording);

        let weak = Arc::downgrade(&self.state);
        let writer = thread::Builder::new()
            .name("audio-writer".to_string())
            .spawn(move || drain_queue(rx, weak, wav))
            .map_err(|e| {
                self.set_state(RecorderState::Idle);
                RecorderError::ThreadSpawn(e.to_string())
            })?;
        self.writer = Some(writer);

        let callback_state = Arc::downgrade(&self.state);
        let mut dropped: u64 = 0;
        let sink: ChunkSink = Box::new(move |chunk: &[i16]| {
            let Some(state) = callback_state.upgrade() else {
                return;
            };
            // Paused keeps the stream open and discards audio
            if read_state(&state) != RecorderState::Recording {
                return;
            }
            match tx.try_send(chunk.to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    if dropped % 50 == 1 {
                        warn!(dropped, "recording queue full, dropping audio");
                    }
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        });

        if let Err(e) = self.source.start(sink) {
            warn!(error = %e, "audio input failed to start");
            self.set_state(RecorderState::Stopping);
            self.join_writer().ok();
            self.set_state(RecorderState::Idle);
            return Err(RecorderError::Source(e));
        }

        info!(path = ?self.path, "recording started");
        let _ = self.event_tx.send(EngineEvent::RecordingStarted);
        Ok(())
    }

    /// Returns true if the recorder moved to Paused
    pub fn pause(&mut self) -> bool {
        if self.state() != RecorderState::Recording {
            return false;
        }
        self.set_state(RecorderState::Paused);
        true
    }

    /// Returns true if the recorder moved back to Recording
    pub fn resume(&mut self) -> bool {
        if self.state() != RecorderState::Paused {
            return false;
        }
        self.set_state(RecorderState::Recording);
        true
    }

    /// Stop recording and wait for the file to be complete.
    ///
    /// Returns the number of samples written; 0 when already idle.
    pub fn stop(&mut self) -> Result<u64, RecorderError> {
        if self.state() == RecorderState::Idle {
            return Ok(0);
        }

        self.set_state(RecorderState::Stopping);
        self.source.stop();
        let result = self.join_writer();
        self.set_state(RecorderState::Idle);

        let samples = result?;
        info!(samples, path = ?self.path, "recording stopped");
        let _ = self.event_tx.send(EngineEvent::RecordingStopped { samples });
        Ok(samples)
    }

    fn join_writer(&mut self) -> Result<u64, RecorderError> {
        match self.writer.take() {
            Some(handle) => handle.join().map_err(|_| RecorderError::WriterPanicked)?,
            None => Ok(0),
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(?e, "failed to finish recording on drop");
        }
    }
}

fn read_state(state: &RwLock<RecorderState>) -> RecorderState {
    *state.read().unwrap_or_else(|e| e.into_inner())
}

/// Writer loop: denoise and append chunks until the queue closes or the
/// recorder is stopping with nothing left to drain.
fn drain_queue(
    rx: Receiver<Vec<i16>>,
    state: Weak<RwLock<RecorderState>>,
    mut wav: Writer,
) -> Result<u64, RecorderError> {
    let mut gate = NoiseGate::new();
    let mut samples: u64 = 0;

    let mut write = |wav: &mut Writer, mut chunk: Vec<i16>| -> Result<(), RecorderError> {
        gate.process(&mut chunk);
        for sample in &chunk {
            wav.write_sample(*sample)?;
        }
        samples += chunk.len() as u64;
        Ok(())
    };

    loop {
        match rx.recv_timeout(WRITER_POLL) {
            Ok(chunk) => write(&mut wav, chunk)?,
            Err(RecvTimeoutError::Timeout) => {
                let stopping = state
                    .upgrade()
                    .map_or(true, |s| read_state(&s) == RecorderState::Stopping);
                if stopping {
                    while let Ok(chunk) = rx.try_recv() {
                        write(&mut wav, chunk)?;
                    }
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    wav.finalize()?;
    Ok(samples)
}
