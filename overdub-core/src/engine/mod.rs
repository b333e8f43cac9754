//! The recording engine: orchestrates capture, mixing, metering and
//! playback over the host audio traits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::{select_strategy, CaptureStrategy};
use crate::codec::ChunkCodec;
use crate::graph::MixGraph;
use crate::models::config::EngineConfig;
use crate::models::error::EngineError;
use crate::models::levels::{EngineInfo, LevelSnapshot};
use crate::models::sample_buffer::{RecordingInfo, SampleBuffer};
use crate::models::state::EngineState;
use crate::models::track::{Track, TrackSnapshot};
use crate::monitor::LevelMonitor;
use crate::playback::{PlaybackCoordinator, PlaybackOptions};
use crate::traits::input::{InputDevice, InputDeviceProvider, InputStream, StreamConstraints};
use crate::traits::observer::{EngineObserver, ObserverToken};
use crate::traits::output::AudioOutput;

/// Emission interval for playback progress, on the render clock.
const PLAYBACK_PROGRESS_SECS: f64 = 0.25;

/// One in-flight capture: the acquired stream plus the strategy
/// buffering its chunks.
struct CaptureSession {
    track_id: u32,
    strategy: Arc<dyn CaptureStrategy>,
    stream: Box<dyn InputStream>,
}

/// Multi-track recorder engine.
///
/// Construct with host collaborators, then call [`initialize`] before
/// anything else. All methods are callable from any thread; events
/// arrive on engine-internal threads via [`EngineObserver`].
///
/// [`initialize`]: RecordingEngine::initialize
pub struct RecordingEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    provider: Arc<dyn InputDeviceProvider>,
    codec: Option<Arc<dyn ChunkCodec>>,
    graph: Arc<Mutex<MixGraph>>,
    playback: PlaybackCoordinator,
    monitor: LevelMonitor,
    output: Mutex<Option<Box<dyn AudioOutput>>>,
    tracks: Mutex<Vec<Track>>,
    state: Mutex<EngineState>,
    session: Mutex<Option<CaptureSession>>,
    observers: Mutex<Vec<(u64, Arc<dyn EngineObserver>)>>,
    next_observer_id: AtomicU64,
    initialized: AtomicBool,
    /// Elapsed seconds at the last playback progress emission.
    last_playback_progress: Mutex<f64>,
}

impl RecordingEngine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn InputDeviceProvider>,
        output: Box<dyn AudioOutput>,
        codec: Option<Arc<dyn ChunkCodec>>,
    ) -> Self {
        let graph = Arc::new(Mutex::new(MixGraph::new(config.level_window)));
        let inner = Arc::new(EngineInner {
            playback: PlaybackCoordinator::new(config.sample_rate),
            monitor: LevelMonitor::new(Arc::clone(&graph)),
            config,
            provider,
            codec,
            graph,
            output: Mutex::new(Some(output)),
            tracks: Mutex::new(Vec::new()),
            state: Mutex::new(EngineState::Idle),
            session: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            last_playback_progress: Mutex::new(0.0),
        });
        Self { inner }
    }

    /// Bring the engine up: create tracks and graph nodes, start the
    /// render stream and the level monitor.
    ///
    /// Idempotent; a second call is a no-op.
    pub fn initialize(&self) -> Result<(), EngineError> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner
            .config
            .validate()
            .map_err(EngineError::InitializationFailure)?;

        {
            let mut tracks = self.inner.tracks.lock();
            tracks.clear();
            for id in 1..=self.inner.config.track_count as u32 {
                tracks.push(Track::new(id));
            }
            self.inner
                .graph
                .lock()
                .create_track_nodes(self.inner.config.track_count);
        }

        let inner = Arc::downgrade(&self.inner);
        self.inner.playback.set_on_voice_ended(Arc::new(move |id| {
            if let Some(inner) = inner.upgrade() {
                inner.voice_ended(id);
            }
        }));
        let inner = Arc::downgrade(&self.inner);
        self.inner.playback.set_on_all_ended(Arc::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.playback_finished();
            }
        }));

        let info = {
            let mut output = self.inner.output.lock();
            let output = output
                .as_mut()
                .ok_or_else(|| EngineError::InitializationFailure("output released".into()))?;
            let inner = Arc::downgrade(&self.inner);
            output.start(Arc::new(move |out, _channels| {
                if let Some(inner) = inner.upgrade() {
                    inner.render_block(out);
                } else {
                    out.fill(0.0);
                }
            }))?;
            EngineInfo {
                sample_rate: output.sample_rate(),
                base_latency_secs: output.base_latency_secs(),
            }
        };

        let inner = Arc::downgrade(&self.inner);
        self.inner.monitor.start(Arc::new(move |snapshot| {
            if let Some(inner) = inner.upgrade() {
                inner.levels_updated(snapshot);
            }
        }));

        self.inner.initialized.store(true, Ordering::SeqCst);
        log::info!(
            "engine initialized: {} tracks at {} Hz",
            self.inner.config.track_count,
            info.sample_rate
        );
        self.inner.emit(|o| o.on_initialized(&info));
        Ok(())
    }

    /// Begin recording into `track_id`, optionally from a specific
    /// input device.
    pub fn start_recording(
        &self,
        track_id: u32,
        device_id: Option<String>,
    ) -> Result<(), EngineError> {
        let result = Arc::clone(&self.inner).start_recording(track_id, device_id);
        if let Err(err) = &result {
            self.inner.emit(|o| o.on_error(err));
        }
        result
    }

    /// Stop the in-flight recording. Completion (buffer stored, state
    /// back to `Idle`) arrives via the completion path, which for the
    /// container strategy is asynchronous. A silent no-op when idle.
    pub fn stop_recording(&self) -> Result<(), EngineError> {
        self.inner.require_initialized()?;
        let (track_id, strategy) = {
            let session = self.inner.session.lock();
            match session.as_ref() {
                Some(session) => (session.track_id, Arc::clone(&session.strategy)),
                None => return Ok(()),
            }
        };
        log::info!("stopping recording on track {}", track_id);
        strategy.stop();
        Ok(())
    }

    /// Play every playable track from a shared start instant.
    pub fn start_playback(&self, options: PlaybackOptions) -> Result<(), EngineError> {
        let result = self.inner.start_playback(options);
        if let Err(err) = &result {
            self.inner.emit(|o| o.on_error(err));
        }
        result
    }

    /// Stop playback without the aggregate end signal.
    pub fn stop_playback(&self) -> Result<(), EngineError> {
        self.inner.require_initialized()?;
        self.inner.playback.stop();
        let state = *self.inner.state.lock();
        if matches!(state, EngineState::Playing | EngineState::Paused) {
            self.inner.set_state(EngineState::Stopped);
        }
        Ok(())
    }

    pub fn pause_playback(&self) -> Result<(), EngineError> {
        self.inner.require_initialized()?;
        if !self.inner.state.lock().is_playing() {
            return Ok(());
        }
        self.inner.playback.pause();
        self.inner.set_state(EngineState::Paused);
        Ok(())
    }

    pub fn resume_playback(&self) -> Result<(), EngineError> {
        self.inner.require_initialized()?;
        if *self.inner.state.lock() != EngineState::Paused {
            return Ok(());
        }
        self.inner.playback.resume();
        self.inner.set_state(EngineState::Playing);
        Ok(())
    }

    pub fn set_track_volume(&self, track_id: u32, volume: f32) -> Result<(), EngineError> {
        self.inner.update_track(track_id, |t| t.volume = volume.clamp(0.0, 1.0))
    }

    pub fn set_track_pan(&self, track_id: u32, pan: f32) -> Result<(), EngineError> {
        self.inner.update_track(track_id, |t| t.pan = pan.clamp(-1.0, 1.0))
    }

    pub fn set_track_muted(&self, track_id: u32, muted: bool) -> Result<(), EngineError> {
        self.inner.update_track(track_id, |t| t.is_muted = muted)
    }

    pub fn set_track_soloed(&self, track_id: u32, soloed: bool) -> Result<(), EngineError> {
        self.inner.update_track(track_id, |t| t.is_soloed = soloed)
    }

    pub fn track(&self, track_id: u32) -> Result<TrackSnapshot, EngineError> {
        let tracks = self.inner.tracks.lock();
        tracks
            .iter()
            .find(|t| t.id == track_id)
            .map(Track::snapshot)
            .ok_or(EngineError::InvalidTrack(track_id))
    }

    pub fn tracks(&self) -> Vec<TrackSnapshot> {
        self.inner.tracks.lock().iter().map(Track::snapshot).collect()
    }

    pub fn list_input_devices(&self) -> Result<Vec<InputDevice>, EngineError> {
        self.inner.provider.list_devices()
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.lock()
    }

    /// Register an observer. Works before `initialize`, so the
    /// `on_initialized` event can be received.
    pub fn add_observer(&self, observer: Arc<dyn EngineObserver>) -> ObserverToken {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::SeqCst);
        self.inner.observers.lock().push((id, observer));
        ObserverToken(id)
    }

    pub fn remove_observer(&self, token: ObserverToken) {
        self.inner.observers.lock().retain(|(id, _)| *id != token.0);
    }

    /// Tear the engine down. Force-stops recording and playback,
    /// stops the monitor and the render stream. The engine is
    /// unusable afterwards; every operation fails `NotInitialized`.
    pub fn dispose(&self) {
        if !self.inner.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        log::info!("engine disposing");

        let strategy = {
            let session = self.inner.session.lock();
            session.as_ref().map(|s| Arc::clone(&s.strategy))
        };
        if let Some(strategy) = strategy {
            strategy.stop();
            // Disposal is deferred internally while a container
            // finalize is in flight.
            strategy.dispose();
        }

        self.inner.playback.stop();
        self.inner.monitor.stop();
        if let Some(mut output) = self.inner.output.lock().take() {
            output.stop();
        }
        self.inner.tracks.lock().clear();
        *self.inner.state.lock() = EngineState::Idle;
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl EngineInner {
    fn require_initialized(&self) -> Result<(), EngineError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    fn emit(&self, event: impl Fn(&dyn EngineObserver)) {
        let observers: Vec<Arc<dyn EngineObserver>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            event(observer.as_ref());
        }
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
        self.emit(|o| o.on_state_changed(state));
    }

    fn start_recording(
        self: Arc<Self>,
        track_id: u32,
        device_id: Option<String>,
    ) -> Result<(), EngineError> {
        self.require_initialized()?;
        {
            let state = self.state.lock();
            if state.is_recording() {
                return Err(EngineError::RecordingInProgress);
            }
            if !state.can_start_recording() {
                return Err(EngineError::PlaybackInProgress);
            }
        }
        if !self.tracks.lock().iter().any(|t| t.id == track_id) {
            return Err(EngineError::InvalidTrack(track_id));
        }

        let constraints = StreamConstraints::raw(
            device_id,
            self.config.channel_count,
            self.config.sample_rate,
        );
        let mut stream = self.provider.acquire(&constraints)?;
        let stream_rate = stream.sample_rate();

        let mut strategy = match select_strategy(
            &self.config,
            self.provider.capabilities(),
            self.codec.clone(),
            stream_rate,
        ) {
            Ok(strategy) => strategy,
            Err(err) => {
                stream.stop();
                return Err(err);
            }
        };

        let weak = Arc::downgrade(&self);
        let max_secs = self.config.max_recording_secs;
        strategy.set_on_progress(Arc::new(move |elapsed| {
            if let Some(inner) = weak.upgrade() {
                inner.recording_progress(track_id, elapsed, max_secs);
            }
        }));
        let weak = Arc::downgrade(&self);
        strategy.set_on_complete(Arc::new(move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.finish_recording(track_id, result);
            }
        }));

        if let Err(err) = strategy.start(self.config.channel_count) {
            stream.stop();
            return Err(err);
        }

        let strategy: Arc<dyn CaptureStrategy> = Arc::from(strategy);
        self.graph.lock().attach_input(strategy.input_routing());

        // Fan out each host chunk to the graph's input tap and the
        // strategy buffer.
        let ingest = Arc::clone(&strategy);
        let weak = Arc::downgrade(&self);
        let started = stream.start(Arc::new(move |samples, rate, channels| {
            if let Some(inner) = weak.upgrade() {
                inner.graph.lock().ingest_input(samples);
            }
            ingest.ingest(samples, rate, channels);
        }));
        if let Err(err) = started {
            strategy.stop();
            strategy.dispose();
            stream.stop();
            self.graph.lock().detach_input();
            return Err(err);
        }

        *self.session.lock() = Some(CaptureSession {
            track_id,
            strategy,
            stream,
        });
        if let Some(track) = self.tracks.lock().iter_mut().find(|t| t.id == track_id) {
            track.is_recording = true;
        }
        log::info!("recording started on track {}", track_id);
        self.set_state(EngineState::Recording { track_id });
        Ok(())
    }

    fn recording_progress(&self, track_id: u32, elapsed: f64, max_secs: f64) {
        self.emit(|o| o.on_recording_progress(track_id, elapsed));
        if elapsed >= max_secs {
            log::warn!(
                "recording on track {} hit the {}s limit, stopping",
                track_id,
                max_secs
            );
            let strategy = {
                let session = self.session.lock();
                session.as_ref().map(|s| Arc::clone(&s.strategy))
            };
            if let Some(strategy) = strategy {
                strategy.stop();
            }
        }
    }

    /// Completion path for every capture strategy. Tears the session
    /// down and, on success, installs the new buffer on the track. A
    /// failed capture leaves the previous buffer untouched.
    fn finish_recording(&self, track_id: u32, result: Result<SampleBuffer, EngineError>) {
        let session = self.session.lock().take();
        if let Some(mut session) = session {
            // Completion may arrive on the capture callback thread,
            // and releasing a stream from its own callback deadlocks.
            std::thread::Builder::new()
                .name("capture-teardown".into())
                .spawn(move || {
                    session.stream.stop();
                    session.strategy.dispose();
                })
                .expect("failed to spawn capture-teardown thread");
        }
        self.graph.lock().detach_input();

        let outcome = match result {
            Ok(buffer) => {
                let info = RecordingInfo::new(track_id, &buffer);
                let duration = buffer.duration_secs();
                let mut tracks = self.tracks.lock();
                if let Some(track) = tracks.iter_mut().find(|t| t.id == track_id) {
                    track.buffer = Some(Arc::new(buffer));
                    track.info = Some(info);
                    track.is_recording = false;
                }
                log::info!(
                    "recording complete on track {}: {:.2}s",
                    track_id,
                    duration
                );
                Ok(duration)
            }
            Err(err) => {
                let mut tracks = self.tracks.lock();
                if let Some(track) = tracks.iter_mut().find(|t| t.id == track_id) {
                    track.is_recording = false;
                }
                log::error!("recording failed on track {}: {}", track_id, err);
                Err(err)
            }
        };

        match outcome {
            Ok(duration) => self.emit(|o| o.on_recording_complete(track_id, duration)),
            Err(err) => self.emit(|o| o.on_error(&err)),
        }
        self.set_state(EngineState::Idle);
    }

    fn start_playback(&self, options: PlaybackOptions) -> Result<(), EngineError> {
        self.require_initialized()?;
        {
            let state = self.state.lock();
            if state.is_recording() {
                return Err(EngineError::RecordingInProgress);
            }
            if !state.can_start_playback() {
                return Err(EngineError::PlaybackInProgress);
            }
        }

        // Clear any leftover voices before taking the track lock; the
        // coordinator's end callbacks re-enter through voice_ended.
        self.playback.stop();

        let started = {
            let mut tracks = self.tracks.lock();
            let started = self.playback.start(&tracks, options)?;
            for track in tracks.iter_mut() {
                track.is_playing = started.contains(&track.id);
            }
            self.graph.lock().resolve_effective_gains(&tracks);
            started
        };
        *self.last_playback_progress.lock() = 0.0;
        log::info!("playback started: tracks {:?}", started);
        self.set_state(EngineState::Playing);
        Ok(())
    }

    /// Render-thread entry point. Also paces playback progress on the
    /// render clock.
    fn render_block(&self, out: &mut [f32]) {
        self.playback.render(out, &self.graph);

        if self.playback.is_active() {
            let elapsed = self.playback.elapsed_secs();
            let mut last = self.last_playback_progress.lock();
            if elapsed - *last >= PLAYBACK_PROGRESS_SECS {
                *last = elapsed;
                drop(last);
                self.emit(|o| o.on_playback_progress(elapsed));
            }
        }
    }

    fn voice_ended(&self, track_id: u32) {
        let mut tracks = self.tracks.lock();
        if let Some(track) = tracks.iter_mut().find(|t| t.id == track_id) {
            track.is_playing = false;
        }
    }

    fn playback_finished(&self) {
        self.set_state(EngineState::Stopped);
        self.emit(|o| o.on_playback_finished());
    }

    fn levels_updated(&self, snapshot: LevelSnapshot) {
        {
            let mut tracks = self.tracks.lock();
            for (id, reading) in &snapshot.tracks {
                if let Some(track) = tracks.iter_mut().find(|t| t.id == *id) {
                    track.level = *reading;
                }
            }
        }
        self.emit(|o| o.on_levels_updated(&snapshot));
    }

    fn update_track(&self, track_id: u32, apply: impl FnOnce(&mut Track)) -> Result<(), EngineError> {
        self.require_initialized()?;
        let mut tracks = self.tracks.lock();
        let track = tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or(EngineError::InvalidTrack(track_id))?;
        apply(track);
        let pan = track.pan;
        let mut graph = self.graph.lock();
        graph.set_track_pan(track_id, pan);
        graph.resolve_effective_gains(&tracks);
        Ok(())
    }
}
