//! Microphone level capture via cpal.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated worker
//! thread. The callback appends into a shared buffer; `read` drains it and
//! reduces it to one 0..100 level per sampler tick.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use super::sources::{AudioChunk, AudioLevelSource};

/// Maps typical speech RMS (roughly 0.05–0.3 for a near mic) onto the
/// 0..100 level meter the detectors consume.
const LEVEL_SCALE: f32 = 350.0;

pub struct MicLevelSource {
    buffer: Arc<Mutex<Vec<f32>>>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
    active: bool,
    sample_rate: u32,
}

impl MicLevelSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            stop_tx: None,
            worker: None,
            active: false,
            sample_rate,
        }
    }

    /// RMS of a sample batch mapped to 0..100. Empty input means silence.
    pub fn level_of(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_sq / samples.len() as f32).sqrt();
        (rms * LEVEL_SCALE).clamp(0.0, 100.0)
    }
}

impl AudioLevelSource for MicLevelSource {
    fn start(&mut self) -> Result<()> {
        if self.active {
            return Err(anyhow!("microphone source already capturing"));
        }

        {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.clear();
            buffer.shrink_to_fit();
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let buffer = Arc::clone(&self.buffer);
        let sample_rate = self.sample_rate;

        let worker = thread::Builder::new()
            .name("scrutineer-mic".into())
            .spawn(move || {
                let stream = match build_stream(buffer, sample_rate) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stop; dropping the stream ends capture.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Microphone capture thread exiting");
            })
            .context("Failed to spawn microphone capture thread")?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(anyhow!("microphone capture thread did not report readiness"));
            }
        }

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        self.active = true;

        info!("Microphone level capture started ({} Hz)", self.sample_rate);
        Ok(())
    }

    fn read(&mut self) -> Result<AudioChunk> {
        if !self.active {
            return Err(anyhow!("microphone source not capturing"));
        }

        let samples = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|_| anyhow!("microphone buffer poisoned"))?;
            std::mem::take(&mut *buffer)
        };

        Ok(AudioChunk {
            level: Self::level_of(&samples),
            samples,
            sample_rate: self.sample_rate,
        })
    }

    fn stop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.active = false;
        info!("Microphone level capture stopped");
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MicLevelSource {
    fn drop(&mut self) {
        if self.active {
            debug!("Dropping active MicLevelSource, cleaning up");
            self.stop();
        }
    }
}

fn build_stream(buffer: Arc<Mutex<Vec<f32>>>, sample_rate: u32) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No input device available for session monitoring")?;

    info!(
        "Session microphone using device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err| error!("Session microphone stream error: {}", err);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.extend_from_slice(data);
                }
            },
            err_fn,
            None,
        )
        .context("Failed to build microphone input stream")?;

    stream.play().context("Failed to start microphone stream")?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_of_silence_is_zero() {
        assert_eq!(MicLevelSource::level_of(&[]), 0.0);
        assert_eq!(MicLevelSource::level_of(&[0.0; 128]), 0.0);
    }

    #[test]
    fn test_level_of_full_scale_clamps_to_100() {
        let loud = vec![1.0f32; 256];
        assert_eq!(MicLevelSource::level_of(&loud), 100.0);
    }

    #[test]
    fn test_level_grows_with_amplitude() {
        let quiet = vec![0.02f32; 256];
        let louder = vec![0.1f32; 256];
        assert!(MicLevelSource::level_of(&louder) > MicLevelSource::level_of(&quiet));
    }
}
