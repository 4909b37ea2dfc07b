//! Microphone capture loop.
//!
//! A worker thread pulls blocks of 16-bit samples from a [`CaptureStream`],
//! derives one amplitude per read, and publishes it into the shared level
//! vector. The loop is a cancellable task: it exits when the owning
//! [`CaptureTask`] signals stop or when the backend stops recording. Read
//! errors are logged, never propagated, and the stream is stopped and
//! released on every exit path.

pub mod mic;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::{analysis, config::CaptureConfig, visualizer::LevelsHandle, Result};

/// Minimal contract the capture loop needs from an input backend.
pub trait CaptureStream {
    /// Pulls the next block of signed 16-bit samples into `buf` and returns
    /// the number of samples written. Zero means no data arrived before the
    /// backend's internal deadline; the loop simply polls again.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;

    /// Whether the backend still considers itself recording.
    fn is_active(&self) -> bool;

    /// Stops recording. The underlying device is released when the stream is
    /// dropped.
    fn stop(&mut self);
}

/// Handle to a running capture worker.
///
/// Dropping the task signals the worker and waits for it to finish, so the
/// capture device is always released.
pub struct CaptureTask {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureTask {
    /// Spawns the capture worker.
    ///
    /// The stream factory runs on the worker thread itself: capture backends
    /// are generally not `Send`, so the stream must be opened where it is
    /// used.
    pub fn spawn<F, S>(open: F, config: CaptureConfig, levels: LevelsHandle) -> Result<Self>
    where
        F: FnOnce(&CaptureConfig) -> Result<S> + Send + 'static,
        S: CaptureStream,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let worker = thread::Builder::new()
            .name("soundcheck-capture".into())
            .spawn(move || {
                let mut stream = match open(&config) {
                    Ok(stream) => stream,
                    Err(error) => {
                        tracing::error!(%error, "failed to open capture stream");
                        return;
                    }
                };

                let mut buffer = vec![0_i16; config.buffer_size];
                run_loop(&mut stream, &mut buffer, &stop_flag, &levels);
                stream.stop();
            })?;

        Ok(Self {
            stop,
            worker: Some(worker),
        })
    }

    /// Signals the worker to stop and waits for it to release the stream.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("capture worker panicked");
            }
        }
    }

    /// Whether the worker has already exited on its own.
    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<S: CaptureStream>(
    stream: &mut S,
    buffer: &mut [i16],
    stop: &AtomicBool,
    levels: &LevelsHandle,
) {
    while !stop.load(Ordering::Relaxed) && stream.is_active() {
        match stream.read(buffer) {
            Ok(0) => continue,
            Ok(count) => {
                let amplitude = analysis::peak_amplitude(&buffer[..count]);
                if let Err(error) = levels.publish(amplitude) {
                    tracing::warn!(%error, "dropping amplitude update");
                }
            }
            Err(error) => {
                tracing::warn!(%error, "capture read failed, stopping");
                break;
            }
        }
    }
}
