//! Playback session control.
//!
//! An engine collaborator reports its lifecycle through a fixed set of
//! [`PlayerEvent`]s. The [`PlaybackController`] translates those events into
//! three caller-supplied hooks and keeps the observable session state — one
//! immutable-per-transition record advanced by the pure [`transition`]
//! function.

pub mod stream;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::{Result, SoundcheckError};

/// Lifecycle events a playback engine reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The media pipeline is fetching or decoding ahead of playback.
    Buffering,
    /// Presentable audio is available and playback is running.
    Ready,
    /// The source has been played to completion.
    Ended,
    /// The engine gave up on the current source.
    Error(String),
}

/// Seam between an engine and whoever reacts to its events.
pub trait PlayerListener: Send + Sync {
    fn on_event(&self, event: PlayerEvent);
}

impl<F> PlayerListener for F
where
    F: Fn(PlayerEvent) + Send + Sync,
{
    fn on_event(&self, event: PlayerEvent) {
        self(event)
    }
}

/// Contract for a playback engine collaborator.
///
/// `prepare` then `play` starts playback asynchronously; events are delivered
/// through the registered listener, possibly from another thread.
pub trait PlaybackEngine {
    fn set_source(&mut self, uri: &str) -> Result<()>;
    fn prepare(&mut self) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn seek(&mut self, position: Duration) -> Result<()>;
    fn set_listener(&mut self, listener: Arc<dyn PlayerListener>);
}

/// Phase of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Buffering,
    Ready,
    Ended,
    Failed,
}

/// Observable session state. Every transition produces a fresh record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub uri: Option<String>,
    pub phase: PlaybackPhase,
    pub buffering: bool,
    pub started: bool,
    /// When the caller asked for playback; the anchor for start latency.
    pub clicked_at: Option<Instant>,
    /// Wall-clock delta from the play request to the first ready event,
    /// recomputed fresh on every play.
    pub start_latency: Option<Duration>,
    /// Message of the engine error that failed the session, if any.
    pub error: Option<String>,
}

impl SessionState {
    /// State at the moment a new play cycle begins.
    pub fn begin(uri: &str, clicked_at: Instant) -> Self {
        Self {
            uri: Some(uri.to_string()),
            clicked_at: Some(clicked_at),
            ..Self::default()
        }
    }
}

/// Advances the session state by one engine event observed at `at`.
pub fn transition(state: &SessionState, event: &PlayerEvent, at: Instant) -> SessionState {
    let mut next = state.clone();
    match event {
        PlayerEvent::Buffering => {
            next.phase = PlaybackPhase::Buffering;
            next.buffering = true;
        }
        PlayerEvent::Ready => {
            next.phase = PlaybackPhase::Ready;
            next.buffering = false;
            if !next.started {
                next.started = true;
                next.start_latency = next
                    .clicked_at
                    .map(|clicked| at.saturating_duration_since(clicked));
            }
        }
        PlayerEvent::Ended => {
            next.phase = PlaybackPhase::Ended;
        }
        PlayerEvent::Error(message) => {
            next.phase = PlaybackPhase::Failed;
            next.buffering = false;
            next.error = Some(message.clone());
        }
    }
    next
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Notification hooks handed to [`PlaybackController::play`].
pub struct PlayHooks {
    pub on_buffering_start: Hook,
    pub on_buffering_end: Hook,
    pub on_playback_started: Hook,
}

impl PlayHooks {
    pub fn new(
        on_buffering_start: impl Fn() + Send + Sync + 'static,
        on_buffering_end: impl Fn() + Send + Sync + 'static,
        on_playback_started: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_buffering_start: Box::new(on_buffering_start),
            on_buffering_end: Box::new(on_buffering_end),
            on_playback_started: Box::new(on_playback_started),
        }
    }

    /// Hooks that do nothing; useful when only the session state matters.
    pub fn none() -> Self {
        Self::new(|| {}, || {}, || {})
    }
}

struct SessionShared {
    state: SessionState,
    /// Bumped on every play and stop; events carrying a stale generation are
    /// dropped so a superseded registration can never fire hooks again.
    generation: u64,
    hooks: Option<Arc<PlayHooks>>,
}

/// Drives one playback session over a lazily created, reused engine.
pub struct PlaybackController {
    engine: Option<Box<dyn PlaybackEngine>>,
    build_engine: Box<dyn FnMut() -> Result<Box<dyn PlaybackEngine>>>,
    shared: Arc<Mutex<SessionShared>>,
}

impl PlaybackController {
    pub fn new<F>(build_engine: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn PlaybackEngine>> + 'static,
    {
        Self {
            engine: None,
            build_engine: Box::new(build_engine),
            shared: Arc::new(Mutex::new(SessionShared {
                state: SessionState::default(),
                generation: 0,
                hooks: None,
            })),
        }
    }

    /// Starts playing `url`.
    ///
    /// The engine is created on the first play and reused afterwards. The
    /// call returns as soon as the engine accepts the source; buffering and
    /// start events arrive through the hooks.
    pub fn play(&mut self, url: &str, hooks: PlayHooks) -> Result<()> {
        let generation = {
            let mut shared = self.lock()?;
            shared.generation += 1;
            shared.state = SessionState::begin(url, Instant::now());
            shared.hooks = Some(Arc::new(hooks));
            shared.generation
        };

        if self.engine.is_none() {
            self.engine = Some((self.build_engine)()?);
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(SoundcheckError::Playback("engine unavailable".into()));
        };

        let shared = self.shared.clone();
        engine.set_listener(Arc::new(move |event: PlayerEvent| {
            dispatch_event(&shared, generation, event);
        }));
        engine.set_source(url)?;
        engine.prepare()?;
        engine.play()?;
        Ok(())
    }

    /// Stops playback, rewinds the source, and clears the session state.
    ///
    /// The engine stays registered and is reused by the next play.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop()?;
            engine.seek(Duration::ZERO)?;
        }

        let mut shared = self.lock()?;
        shared.generation += 1;
        shared.hooks = None;
        let uri = shared.state.uri.clone();
        shared.state = SessionState {
            uri,
            ..SessionState::default()
        };
        Ok(())
    }

    /// Returns a copy of the current session state.
    pub fn session(&self) -> Result<SessionState> {
        let shared = self.lock()?;
        Ok(shared.state.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionShared>> {
        self.shared
            .lock()
            .map_err(|_| SoundcheckError::msg("playback session has been poisoned"))
    }
}

fn dispatch_event(shared: &Arc<Mutex<SessionShared>>, generation: u64, event: PlayerEvent) {
    let Ok(mut guard) = shared.lock() else {
        tracing::warn!("playback session has been poisoned");
        return;
    };

    if guard.generation != generation {
        tracing::debug!(?event, "dropping event from a superseded play");
        return;
    }

    let previous = guard.state.clone();
    let next = transition(&previous, &event, Instant::now());
    guard.state = next;
    let hooks = guard.hooks.clone();
    drop(guard);

    match &event {
        PlayerEvent::Buffering => {
            if let Some(hooks) = &hooks {
                (hooks.on_buffering_start)();
            }
        }
        PlayerEvent::Ready => {
            if let Some(hooks) = &hooks {
                (hooks.on_buffering_end)();
                if !previous.started {
                    (hooks.on_playback_started)();
                }
            }
        }
        PlayerEvent::Ended => {
            tracing::debug!("playback ended");
        }
        PlayerEvent::Error(message) => {
            tracing::warn!(%message, "playback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ready_records_latency_from_the_play_click() {
        let t0 = Instant::now();
        let state = SessionState::begin("http://example/stream.wav", t0);

        let state = transition(&state, &PlayerEvent::Buffering, t0);
        assert!(state.buffering);
        assert_eq!(state.phase, PlaybackPhase::Buffering);

        let state = transition(
            &state,
            &PlayerEvent::Ready,
            t0 + Duration::from_millis(120),
        );
        assert!(!state.buffering);
        assert!(state.started);
        assert_eq!(state.start_latency, Some(Duration::from_millis(120)));
    }

    #[test]
    fn only_the_first_ready_sets_the_latency() {
        let t0 = Instant::now();
        let state = SessionState::begin("uri", t0);
        let state = transition(&state, &PlayerEvent::Ready, t0 + Duration::from_millis(80));
        let state = transition(
            &state,
            &PlayerEvent::Ready,
            t0 + Duration::from_millis(900),
        );
        assert_eq!(state.start_latency, Some(Duration::from_millis(80)));
    }

    #[test]
    fn errors_leave_the_buffering_state() {
        let t0 = Instant::now();
        let state = SessionState::begin("uri", t0);
        let state = transition(&state, &PlayerEvent::Buffering, t0);
        let state = transition(&state, &PlayerEvent::Error("timeout".into()), t0);
        assert!(!state.buffering);
        assert_eq!(state.phase, PlaybackPhase::Failed);
        assert_eq!(state.error.as_deref(), Some("timeout"));
    }

    #[derive(Default)]
    struct EngineProbe {
        calls: Mutex<Vec<String>>,
        listener: Mutex<Option<Arc<dyn PlayerListener>>>,
    }

    impl EngineProbe {
        fn emit(&self, event: PlayerEvent) {
            let listener = self
                .listener
                .lock()
                .unwrap()
                .clone()
                .expect("listener registered");
            listener.on_event(event);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeEngine {
        probe: Arc<EngineProbe>,
    }

    impl FakeEngine {
        fn log(&self, call: impl Into<String>) {
            self.probe.calls.lock().unwrap().push(call.into());
        }
    }

    impl PlaybackEngine for FakeEngine {
        fn set_source(&mut self, uri: &str) -> Result<()> {
            self.log(format!("set_source:{uri}"));
            Ok(())
        }

        fn prepare(&mut self) -> Result<()> {
            self.log("prepare");
            Ok(())
        }

        fn play(&mut self) -> Result<()> {
            self.log("play");
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.log("stop");
            Ok(())
        }

        fn seek(&mut self, position: Duration) -> Result<()> {
            self.log(format!("seek:{}", position.as_millis()));
            Ok(())
        }

        fn set_listener(&mut self, listener: Arc<dyn PlayerListener>) {
            *self.probe.listener.lock().unwrap() = Some(listener);
        }
    }

    fn controller_with_probe() -> (PlaybackController, Arc<EngineProbe>, Arc<AtomicUsize>) {
        let probe = Arc::new(EngineProbe::default());
        let engines_built = Arc::new(AtomicUsize::new(0));
        let factory_probe = probe.clone();
        let factory_count = engines_built.clone();
        let controller = PlaybackController::new(move || {
            factory_count.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(FakeEngine {
                probe: factory_probe.clone(),
            }) as Box<dyn PlaybackEngine>)
        });
        (controller, probe, engines_built)
    }

    fn recording_hooks(log: Arc<Mutex<Vec<&'static str>>>) -> PlayHooks {
        let start = log.clone();
        let end = log.clone();
        let started = log;
        PlayHooks::new(
            move || start.lock().unwrap().push("buffering_start"),
            move || end.lock().unwrap().push("buffering_end"),
            move || started.lock().unwrap().push("playback_started"),
        )
    }

    #[test]
    fn hooks_fire_once_each_in_order() {
        let (mut controller, probe, _) = controller_with_probe();
        let log = Arc::new(Mutex::new(Vec::new()));

        controller
            .play("http://example/a.wav", recording_hooks(log.clone()))
            .unwrap();
        probe.emit(PlayerEvent::Buffering);
        probe.emit(PlayerEvent::Ready);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["buffering_start", "buffering_end", "playback_started"]
        );
        let session = controller.session().unwrap();
        assert!(session.started);
        assert!(session.start_latency.is_some());
    }

    #[test]
    fn stop_clears_state_and_silences_the_old_registration() {
        let (mut controller, probe, _) = controller_with_probe();
        let log = Arc::new(Mutex::new(Vec::new()));

        controller
            .play("http://example/a.wav", recording_hooks(log.clone()))
            .unwrap();
        probe.emit(PlayerEvent::Buffering);
        assert!(controller.session().unwrap().buffering);

        controller.stop().unwrap();

        let session = controller.session().unwrap();
        assert!(!session.buffering);
        assert_eq!(session.start_latency, None);
        assert_eq!(session.phase, PlaybackPhase::Idle);

        // Events from the superseded cycle change nothing and fire no hooks.
        probe.emit(PlayerEvent::Ready);
        assert_eq!(*log.lock().unwrap(), vec!["buffering_start"]);
        assert!(!controller.session().unwrap().started);

        let calls = probe.calls();
        assert!(calls.contains(&"stop".to_string()));
        assert!(calls.contains(&"seek:0".to_string()));
    }

    #[test]
    fn the_engine_is_reused_across_plays() {
        let (mut controller, probe, engines_built) = controller_with_probe();

        controller
            .play("http://example/a.wav", PlayHooks::none())
            .unwrap();
        probe.emit(PlayerEvent::Ready);
        controller
            .play("http://example/b.wav", PlayHooks::none())
            .unwrap();

        assert_eq!(engines_built.load(Ordering::Relaxed), 1);
        let calls = probe.calls();
        assert_eq!(
            calls
                .iter()
                .filter(|call| call.starts_with("set_source"))
                .count(),
            2
        );
    }

    #[test]
    fn each_play_measures_latency_fresh() {
        let (mut controller, probe, _) = controller_with_probe();

        controller
            .play("http://example/a.wav", PlayHooks::none())
            .unwrap();
        probe.emit(PlayerEvent::Ready);
        let first = controller.session().unwrap().start_latency;
        assert!(first.is_some());

        controller
            .play("http://example/a.wav", PlayHooks::none())
            .unwrap();
        let session = controller.session().unwrap();
        assert!(!session.started);
        assert_eq!(session.start_latency, None);
    }

    #[test]
    fn engine_errors_surface_in_the_session() {
        let (mut controller, probe, _) = controller_with_probe();

        controller
            .play("http://example/a.wav", PlayHooks::none())
            .unwrap();
        probe.emit(PlayerEvent::Buffering);
        probe.emit(PlayerEvent::Error("connection reset".into()));

        let session = controller.session().unwrap();
        assert!(!session.buffering);
        assert_eq!(session.phase, PlaybackPhase::Failed);
    }
}
