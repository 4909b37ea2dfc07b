//! rodio-backed engine that plays a remote audio URL.
//!
//! `prepare` builds a fresh sink on the reused output stream; `play` hands
//! the fetch-decode-append work to a worker thread so the caller never
//! blocks. The worker reports the lifecycle through the registered listener:
//! `Buffering` when the fetch starts, `Ready` once decoded audio reaches the
//! sink, `Ended` when the sink drains, `Error` if anything fails.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use super::{PlaybackEngine, PlayerEvent, PlayerListener};
use crate::{config::PlaybackConfig, Result, SoundcheckError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct StreamEngine {
    http: reqwest::blocking::Client,
    // Keeps the audio device open for the lifetime of the engine; dropping it
    // silences any sink built from the handle.
    _output: OutputStream,
    output_handle: OutputStreamHandle,
    uri: Option<String>,
    prepared: bool,
    listener: Option<Arc<dyn PlayerListener>>,
    sink: Option<Arc<Sink>>,
    cancelled: Option<Arc<AtomicBool>>,
    worker: Option<JoinHandle<()>>,
}

impl StreamEngine {
    /// Opens the default audio output and builds the HTTP client used for
    /// stream fetches, with the optional bearer token and redirect policy
    /// from the configuration.
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        let redirects = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::blocking::Client::builder()
            .redirect(redirects)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(token) = &config.bearer_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|error| SoundcheckError::Playback(error.to_string()))?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        let http = builder.build()?;
        let (_output, output_handle) = OutputStream::try_default()
            .map_err(|error| SoundcheckError::Playback(error.to_string()))?;

        Ok(Self {
            http,
            _output,
            output_handle,
            uri: None,
            prepared: false,
            listener: None,
            sink: None,
            cancelled: None,
            worker: None,
        })
    }
}

impl PlaybackEngine for StreamEngine {
    fn set_source(&mut self, uri: &str) -> Result<()> {
        self.uri = Some(uri.to_string());
        self.prepared = false;
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        if self.uri.is_none() {
            return Err(SoundcheckError::Playback("no source set".into()));
        }

        // A previous cycle's sink and worker are superseded, not waited for;
        // the cancel flag keeps the old worker from reporting anything.
        if let Some(cancelled) = &self.cancelled {
            cancelled.store(true, Ordering::Relaxed);
        }
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }

        let sink = Sink::try_new(&self.output_handle)
            .map_err(|error| SoundcheckError::Playback(error.to_string()))?;
        self.sink = Some(Arc::new(sink));
        self.prepared = true;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(SoundcheckError::Playback("play before prepare".into()));
        }
        let Some(uri) = self.uri.clone() else {
            return Err(SoundcheckError::Playback("no source set".into()));
        };
        let Some(sink) = self.sink.clone() else {
            return Err(SoundcheckError::Playback("no sink prepared".into()));
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancelled = Some(cancelled.clone());

        let http = self.http.clone();
        let listener = self.listener.clone();
        self.worker = Some(
            thread::Builder::new()
                .name("soundcheck-playback".into())
                .spawn(move || stream_into_sink(http, uri, sink, listener, cancelled))?,
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(cancelled) = &self.cancelled {
            cancelled.store(true, Ordering::Relaxed);
        }
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        self.prepared = false;
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        if sink.empty() {
            return Ok(());
        }
        if let Err(error) = sink.try_seek(position) {
            // Seeking is best effort on streamed sources.
            tracing::debug!(?error, "seek not honoured");
        }
        Ok(())
    }

    fn set_listener(&mut self, listener: Arc<dyn PlayerListener>) {
        self.listener = Some(listener);
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if let Some(cancelled) = &self.cancelled {
            cancelled.store(true, Ordering::Relaxed);
        }
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn stream_into_sink(
    http: reqwest::blocking::Client,
    uri: String,
    sink: Arc<Sink>,
    listener: Option<Arc<dyn PlayerListener>>,
    cancelled: Arc<AtomicBool>,
) {
    let notify = |event: PlayerEvent| {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        if let Some(listener) = &listener {
            listener.on_event(event);
        }
    };

    notify(PlayerEvent::Buffering);

    match fetch_and_append(&http, &uri, &sink) {
        Ok(()) => {
            if cancelled.load(Ordering::Relaxed) {
                return;
            }
            notify(PlayerEvent::Ready);
            sink.sleep_until_end();
            notify(PlayerEvent::Ended);
        }
        Err(error) => {
            tracing::warn!(%error, %uri, "stream playback failed");
            notify(PlayerEvent::Error(error.to_string()));
        }
    }
}

fn fetch_and_append(http: &reqwest::blocking::Client, uri: &str, sink: &Sink) -> Result<()> {
    let response = http.get(uri).send()?.error_for_status()?;
    let body = response.bytes()?;

    let source = Decoder::new(Cursor::new(body.to_vec()))
        .map_err(|error| SoundcheckError::Playback(error.to_string()))?;
    sink.append(source);
    sink.play();
    Ok(())
}
