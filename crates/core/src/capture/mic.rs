//! cpal-backed microphone input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use crate::{config::CaptureConfig, Result, SoundcheckError};

/// How long one read waits for the device before reporting an empty block.
const READ_DEADLINE: Duration = Duration::from_millis(250);

/// Microphone input stream over the host's default input device.
///
/// cpal delivers samples through a callback; the callback forwards each block
/// over a channel so the capture loop can keep its blocking `read` shape. The
/// device is released when the stream is dropped.
pub struct MicStream {
    stream: cpal::Stream,
    blocks: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    active: Arc<AtomicBool>,
}

impl MicStream {
    /// Opens the default input device at the requested sample rate and
    /// channel count, converting the device's native sample format to signed
    /// 16-bit.
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SoundcheckError::Capture("no input device available".into()))?;

        let format = device
            .default_input_config()
            .map_err(|error| SoundcheckError::Capture(error.to_string()))?
            .sample_format();

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = mpsc::channel::<Vec<i16>>();
        let active = Arc::new(AtomicBool::new(false));

        let failed = active.clone();
        let err_fn = move |error: cpal::StreamError| {
            tracing::warn!(%error, "input stream failed");
            failed.store(false, Ordering::Relaxed);
        };

        let stream = match format {
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(data.to_vec());
                },
                err_fn,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block = data
                        .iter()
                        .map(|sample| (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    let _ = tx.send(block);
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let block = data
                        .iter()
                        .map(|sample| (*sample as i32 - 32_768) as i16)
                        .collect();
                    let _ = tx.send(block);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(SoundcheckError::Capture(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        }
        .map_err(|error| SoundcheckError::Capture(error.to_string()))?;

        stream
            .play()
            .map_err(|error| SoundcheckError::Capture(error.to_string()))?;
        active.store(true, Ordering::Relaxed);

        Ok(Self {
            stream,
            blocks: rx,
            pending: Vec::new(),
            active,
        })
    }
}

impl super::CaptureStream for MicStream {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if self.pending.is_empty() {
            match self.blocks.recv_timeout(READ_DEADLINE) {
                Ok(block) => self.pending = block,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    self.active.store(false, Ordering::Relaxed);
                    return Ok(0);
                }
            }
        }

        let count = self.pending.len().min(buf.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        if let Err(error) = self.stream.pause() {
            tracing::debug!(%error, "pausing input stream");
        }
    }
}
