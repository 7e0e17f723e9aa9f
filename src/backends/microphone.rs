//! Microphone capture through the host audio API

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSource, ChunkSink, SAMPLE_RATE};

/// Samples per delivered chunk
const CHUNK_SAMPLES: usize = 1024;

/// Input stream on a dedicated thread.
///
/// A cpal stream cannot cross threads on every platform, so it is built,
/// played and dropped on the capture thread. The source only keeps the
/// handle needed to stop it.
pub struct CpalSource {
    /// Case-insensitive substring of the device name; default device if unset
    device_pattern: Option<String>,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl CpalSource {
    pub fn new(device_pattern: Option<String>) -> Self {
        Self {
            device_pattern,
            worker: None,
        }
    }
}

impl AudioSource for CpalSource {
    fn start(&mut self, sink: ChunkSink) -> Result<(), String> {
        self.stop();

        let pattern = self.device_pattern.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || capture(pattern.as_deref(), sink, &ready_tx, &stop_rx))
            .map_err(|e| format!("failed to spawn capture thread: {e}"))?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err("audio capture thread exited during startup".to_string()));
        match started {
            Ok(()) => {
                self.worker = Some(Worker { stop_tx, handle });
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop_tx.send(());
        // The stream, and with it the sink, is dropped before the thread ends
        if worker.handle.join().is_err() {
            warn!("audio capture thread panicked");
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the capture thread
fn capture(
    pattern: Option<&str>,
    sink: ChunkSink,
    ready: &SyncSender<Result<(), String>>,
    stop: &Receiver<()>,
) {
    let stream = match open_stream(pattern, sink) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    // A stop request and a dropped sender both end the capture
    let _ = stop.recv();
    drop(stream);
    debug!("audio capture stopped");
}

fn open_stream(pattern: Option<&str>, sink: ChunkSink) -> Result<cpal::Stream, String> {
    let (device, config, format) = resolve_device_and_config(pattern)?;
    let name = device.name().unwrap_or_else(|_| "<unknown>".into());
    info!(
        device = %name,
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        ?format,
        "audio capture starting"
    );

    let chunker = MonoChunker::new(config.channels, sink);
    let stream = match format {
        SampleFormat::I16 => build::<i16>(&device, &config, chunker),
        SampleFormat::F32 => build::<f32>(&device, &config, chunker),
        SampleFormat::U16 => build::<u16>(&device, &config, chunker),
        other => return Err(format!("unsupported input sample format {other:?}")),
    }?;

    stream
        .play()
        .map_err(|e| format!("failed to start audio stream: {e}"))?;
    Ok(stream)
}

fn build<T>(
    device: &Device,
    config: &StreamConfig,
    mut chunker: MonoChunker,
) -> Result<cpal::Stream, String>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| chunker.feed(data),
            |err| error!(error = %err, "audio capture error"),
            None,
        )
        .map_err(|e| format!("failed to build audio input stream: {e}"))
}

/// Pick the input device and a 16 kHz stream configuration for it
fn resolve_device_and_config(
    pattern: Option<&str>,
) -> Result<(Device, StreamConfig, SampleFormat), String> {
    let host = cpal::default_host();

    let named = match pattern {
        Some(pattern) => {
            let pattern = pattern.to_lowercase();
            host.input_devices()
                .map_err(|e| format!("failed to enumerate input devices: {e}"))?
                .find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&pattern))
                        .unwrap_or(false)
                })
        }
        None => None,
    };
    if let (Some(pattern), None) = (pattern, named.as_ref()) {
        warn!(pattern, "no input device matches, using the default device");
    }

    let device = named
        .or_else(|| host.default_input_device())
        .ok_or_else(|| "no input audio device found".to_string())?;

    let rate = SampleRate(SAMPLE_RATE);
    let range = device
        .supported_input_configs()
        .map_err(|e| format!("cannot query input configs: {e}"))?
        .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
        .min_by_key(|c| (c.channels(), format_rank(c.sample_format())))
        .ok_or_else(|| format!("input device does not support {SAMPLE_RATE} Hz"))?;

    let supported = range.with_sample_rate(rate);
    Ok((device, supported.config(), supported.sample_format()))
}

/// Preference among sample formats; lower is better
fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        SampleFormat::U16 => 2,
        _ => u8::MAX,
    }
}

/// Downmixes interleaved frames to 16-bit mono and hands out fixed-size chunks
struct MonoChunker {
    channels: usize,
    pending: Vec<i16>,
    sink: ChunkSink,
}

impl MonoChunker {
    fn new(channels: u16, sink: ChunkSink) -> Self {
        Self {
            channels: usize::from(channels.max(1)),
            pending: Vec::with_capacity(CHUNK_SAMPLES * 2),
            sink,
        }
    }

    fn feed<T>(&mut self, data: &[T])
    where
        T: SizedSample,
        i16: FromSample<T>,
    {
        let channels = self.channels;
        if channels == 1 {
            self.pending
                .extend(data.iter().map(|s| i16::from_sample(*s)));
        } else {
            self.pending.extend(data.chunks_exact(channels).map(|frame| {
                let sum: i32 = frame.iter().map(|s| i32::from(i16::from_sample(*s))).sum();
                (sum / channels as i32) as i16
            }));
        }

        while self.pending.len() >= CHUNK_SAMPLES {
            (self.sink)(&self.pending[..CHUNK_SAMPLES]);
            self.pending.drain(..CHUNK_SAMPLES);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collecting_chunker(channels: u16) -> (MonoChunker, Arc<Mutex<Vec<Vec<i16>>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = received.clone();
        let chunker = MonoChunker::new(
            channels,
            Box::new(move |chunk| sink_received.lock().unwrap().push(chunk.to_vec())),
        );
        (chunker, received)
    }

    #[test]
    fn test_mono_input_is_chunked() {
        let (mut chunker, received) = collecting_chunker(1);

        chunker.feed(&vec![7i16; 1500]);
        assert_eq!(received.lock().unwrap().len(), 1);
        assert_eq!(chunker.pending.len(), 1500 - CHUNK_SAMPLES);

        chunker.feed(&vec![7i16; 600]);
        let chunks = received.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == CHUNK_SAMPLES));
        assert!(chunks[1].iter().all(|s| *s == 7));
    }

    #[test]
    fn test_stereo_float_is_downmixed() {
        let (mut chunker, received) = collecting_chunker(2);

        let frames: Vec<f32> = (0..CHUNK_SAMPLES).flat_map(|_| [0.5f32, 0.5]).collect();
        chunker.feed(&frames);
        let chunks = received.lock().unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].iter().all(|s| *s == i16::from_sample(0.5f32)));
    }

    #[test]
    fn test_opposite_channels_cancel() {
        let (mut chunker, received) = collecting_chunker(2);

        let frames: Vec<i16> = (0..CHUNK_SAMPLES).flat_map(|_| [1000i16, -1000]).collect();
        chunker.feed(&frames);
        assert!(received.lock().unwrap()[0].iter().all(|s| *s == 0));
    }

    #[test]
    fn test_prefers_integer_samples() {
        assert!(format_rank(SampleFormat::I16) < format_rank(SampleFormat::F32));
        assert!(format_rank(SampleFormat::F32) < format_rank(SampleFormat::U16));
        assert_eq!(format_rank(SampleFormat::F64), u8::MAX);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut source = CpalSource::new(None);
        source.stop();
        assert!(source.worker.is_none());
    }
}
