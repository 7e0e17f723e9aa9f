//! Audio recording for questions sent to the remote assistant
//!
//! The recorder owns a capture [`AudioSource`] and a background writer
//! thread that drains captured chunks through a [`NoiseGate`] into a WAV
//! file.

mod denoise;
mod recorder;

pub use denoise::NoiseGate;
pub use recorder::{AudioRecorder, RecorderState};

/// Sample rate of captured audio
pub const SAMPLE_RATE: u32 = 16_000;

/// Callback receiving captured 16-bit mono chunks
pub type ChunkSink = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// A microphone stream
pub trait AudioSource: Send {
    /// Open the stream and deliver chunks to `sink` until [`stop`](Self::stop)
    fn start(&mut self, sink: ChunkSink) -> Result<(), String>;

    /// Halt the stream. The sink must be dropped before this returns.
    fn stop(&mut self);
}

#[cfg(test)]
pub use test_source::ManualSource;
