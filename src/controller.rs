//! Live/replay state machine.
//!
//! `StreamController` owns the mode, the lifecycle flags, both frame sources and
//! the cache writer. It is driven by `tick()` from a single thread, so none of
//! its state needs locking. User actions (`toggle`, `new_point`) only flip
//! flags and close the outgoing source; the work they request happens on the
//! next tick.
//!
//! Per tick:
//! 1. If `init_stream` is set, open the source for the current mode and close
//!    its companion (the cache sink is released before replay opens).
//! 2. In live mode with a pending cache reset, delete and recreate the cache.
//! 3. Read one frame. Live frames are appended to the cache (unless a reset is
//!    still pending) and presented; replay frames are presented; end of the
//!    replay file restarts it from the first frame. A replay file that ends
//!    (or fails) before its first frame is reported and retried after the
//!    reopen backoff instead of being restarted every tick.
//!
//! Failures never stop the loop. They are kept as faults on the status, one per
//! error kind, until the operation that raised them succeeds again.

use std::fmt;
use std::time::{Duration, Instant};

use crate::cache::CacheWriter;
use crate::config::SbliveConfig;
use crate::ingest::{
    replay::ReplayConfig, CameraSource, ReadOutcome, ReplaySource, SourceSet,
};
use crate::render::RenderSink;
use crate::{ErrorKind, StreamError, StreamMode};

/// Flags consumed at the start of the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleFlags {
    /// The source for the current mode needs (re)opening.
    pub init_stream: bool,
    /// The cache file must be recreated before the next live write.
    pub cache_clear_requested: bool,
    pub shutting_down: bool,
}

impl Default for LifecycleFlags {
    fn default() -> Self {
        Self {
            init_stream: true,
            cache_clear_requested: true,
            shutting_down: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamPhase {
    /// Waiting for the first tick.
    #[default]
    Starting,
    Running,
    Stopped,
}

/// What the window shows besides the image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub mode: StreamMode,
    pub phase: StreamPhase,
    /// At most one fault per error kind.
    pub faults: Vec<StreamError>,
}

impl StreamStatus {
    pub fn running(mode: StreamMode) -> Self {
        Self {
            mode,
            phase: StreamPhase::Running,
            faults: Vec::new(),
        }
    }

    pub fn fault(&self, kind: ErrorKind) -> Option<&StreamError> {
        self.faults.iter().find(|fault| fault.kind == kind)
    }

    pub fn is_healthy(&self) -> bool {
        self.faults.is_empty()
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            StreamPhase::Starting => f.write_str("starting")?,
            StreamPhase::Stopped => f.write_str("stopped")?,
            StreamPhase::Running => match self.mode {
                StreamMode::Live => f.write_str("LIVE")?,
                StreamMode::Replay => f.write_str("REPLAY")?,
            },
        }
        for fault in &self.faults {
            write!(f, " | {}", fault)?;
        }
        Ok(())
    }
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was read and handed to the render sink.
    Rendered,
    /// Nothing to show this tick (source not ready, camera timeout).
    Idle,
    /// The replay reached its end (or failed) and was restarted.
    Looped,
    /// A source failed to open or read.
    Faulted,
    /// The controller has been shut down.
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub ticks: u64,
    pub toggles: u64,
    pub source_opens: u64,
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub frames_cached: u64,
    pub cache_resets: u64,
    pub replay_loops: u64,
}

/// Which handles a shutdown actually released.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub camera_released: bool,
    pub replay_released: bool,
    pub cache_released: bool,
    /// Release failures, logged and otherwise ignored.
    pub errors: Vec<String>,
}

pub struct StreamController {
    mode: StreamMode,
    flags: LifecycleFlags,
    phase: StreamPhase,
    sources: SourceSet,
    cache: CacheWriter,
    faults: Vec<StreamError>,
    reopen_backoff: Duration,
    retry_at: Option<Instant>,
    /// Replay frames read since the replay source was last opened.
    replay_frames: u64,
    stats: ControllerStats,
    released: bool,
}

impl StreamController {
    pub fn new(sources: SourceSet, cache: CacheWriter) -> Self {
        Self {
            mode: StreamMode::Live,
            flags: LifecycleFlags::default(),
            phase: StreamPhase::Starting,
            sources,
            cache,
            faults: Vec::new(),
            reopen_backoff: Duration::from_secs(1),
            retry_at: None,
            replay_frames: 0,
            stats: ControllerStats::default(),
            released: false,
        }
    }

    /// Camera, replay file and cache as configured.
    pub fn from_config(config: &SbliveConfig) -> Self {
        let camera = CameraSource::new(config.camera.clone());
        let replay = ReplaySource::new(ReplayConfig {
            path: config.cache.path.clone(),
        });
        let sources = SourceSet::new(Box::new(camera), Box::new(replay));
        Self::new(sources, CacheWriter::new(config.cache.clone()))
            .with_reopen_backoff(config.reopen_backoff)
    }

    /// Delay before retrying a source that failed to open.
    pub fn with_reopen_backoff(mut self, backoff: Duration) -> Self {
        self.reopen_backoff = backoff;
        self
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn flags(&self) -> LifecycleFlags {
        self.flags
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn cache(&self) -> &CacheWriter {
        &self.cache
    }

    pub fn is_source_open(&self, mode: StreamMode) -> bool {
        self.sources.is_open(mode)
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            mode: self.mode,
            phase: self.phase,
            faults: self.faults.clone(),
        }
    }

    /// Switch between live and replay. Takes effect on the next tick.
    pub fn toggle(&mut self) -> StreamMode {
        log::info!("Toggling replay...");
        let leaving = self.mode;
        self.sources.close(leaving);
        self.mode = leaving.toggled();
        if self.mode == StreamMode::Live {
            self.flags.cache_clear_requested = true;
        }
        self.flags.init_stream = true;
        self.retry_at = None;
        self.clear_fault(ErrorKind::SourceUnavailable);
        self.stats.toggles += 1;
        self.mode
    }

    /// Start a new point: the cache is recreated on the next live tick.
    pub fn new_point(&mut self) {
        log::info!("Clearing cache...");
        self.flags.cache_clear_requested = true;
    }

    /// Surface a fault raised outside the controller (e.g. the helper process).
    pub fn record_fault(&mut self, fault: StreamError) {
        match self.faults.iter_mut().find(|f| f.kind == fault.kind) {
            Some(existing) if *existing == fault => {}
            Some(existing) => {
                log::warn!("{}", fault);
                *existing = fault;
            }
            None => {
                log::warn!("{}", fault);
                self.faults.push(fault);
                self.faults.sort_by_key(|f| f.kind.code());
            }
        }
    }

    fn clear_fault(&mut self, kind: ErrorKind) {
        if let Some(index) = self.faults.iter().position(|f| f.kind == kind) {
            let fault = self.faults.remove(index);
            log::info!("recovered from {}", fault.kind.code());
        }
    }

    /// Run one capture/render cycle and publish the resulting status.
    pub fn tick(&mut self, render: &mut RenderSink) -> TickOutcome {
        let outcome = self.step(render);
        render.report(&self.status());
        outcome
    }

    fn step(&mut self, render: &mut RenderSink) -> TickOutcome {
        if self.released || self.flags.shutting_down {
            return TickOutcome::Stopped;
        }
        self.phase = StreamPhase::Running;
        self.stats.ticks += 1;
        let mode = self.mode;

        if self.flags.init_stream && self.retry_due() && !self.init_stream(mode) {
            return TickOutcome::Faulted;
        }
        if mode == StreamMode::Live && self.flags.cache_clear_requested {
            self.reset_cache();
        }
        if !self.sources.is_open(mode) {
            return TickOutcome::Idle;
        }

        match self.sources.read(mode) {
            Ok(ReadOutcome::Frame(frame)) => {
                self.clear_fault(ErrorKind::SourceUnavailable);
                if mode == StreamMode::Replay {
                    self.replay_frames += 1;
                }
                if mode == StreamMode::Live && !self.flags.cache_clear_requested {
                    match self.cache.write(&frame) {
                        Ok(()) => {
                            self.stats.frames_cached += 1;
                            self.clear_fault(ErrorKind::CacheIo);
                        }
                        Err(err) => {
                            self.record_fault(StreamError::classify(&err, ErrorKind::CacheIo))
                        }
                    }
                }
                match render.present(&frame) {
                    Ok(true) => self.stats.frames_rendered += 1,
                    Ok(false) => self.stats.frames_dropped += 1,
                    Err(err) => log::warn!("render: {:#}", err),
                }
                TickOutcome::Rendered
            }
            Ok(ReadOutcome::EndOfStream) if mode == StreamMode::Replay => {
                if self.replay_frames == 0 {
                    let fault = StreamError::source_unavailable(format!(
                        "{} has no frames yet",
                        self.sources.describe(mode)
                    ));
                    self.hold_replay(fault);
                    return TickOutcome::Faulted;
                }
                self.restart_replay();
                TickOutcome::Looped
            }
            Ok(ReadOutcome::EndOfStream) | Ok(ReadOutcome::Pending) => TickOutcome::Idle,
            Err(err) => match mode {
                StreamMode::Replay if self.replay_frames == 0 => {
                    self.hold_replay(StreamError::classify(&err, ErrorKind::SourceUnavailable));
                    TickOutcome::Faulted
                }
                StreamMode::Replay => {
                    log::debug!("replay read failed, restarting: {:#}", err);
                    self.restart_replay();
                    TickOutcome::Looped
                }
                StreamMode::Live => {
                    self.sources.close(StreamMode::Live);
                    self.record_fault(StreamError::classify(&err, ErrorKind::SourceUnavailable));
                    self.schedule_reopen();
                    TickOutcome::Faulted
                }
            },
        }
    }

    fn retry_due(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    fn schedule_reopen(&mut self) {
        self.flags.init_stream = true;
        self.retry_at = Some(Instant::now() + self.reopen_backoff);
    }

    /// Open the source for `mode`. Returns whether it is now open.
    fn init_stream(&mut self, mode: StreamMode) -> bool {
        log::info!("Starting {} video stream...", mode);
        if mode == StreamMode::Replay {
            if let Err(err) = self.cache.release() {
                self.record_fault(StreamError::classify(&err, ErrorKind::CacheIo));
            }
        }
        match self.sources.open(mode) {
            Ok(()) => {
                self.flags.init_stream = false;
                self.retry_at = None;
                self.replay_frames = 0;
                self.stats.source_opens += 1;
                self.clear_fault(ErrorKind::SourceUnavailable);
                log::info!("{} video stream started ({})", mode, self.sources.describe(mode));
                true
            }
            Err(err) => {
                self.record_fault(StreamError::classify(&err, ErrorKind::SourceUnavailable));
                self.schedule_reopen();
                false
            }
        }
    }

    fn reset_cache(&mut self) {
        match self.cache.reset() {
            Ok(()) => {
                self.flags.cache_clear_requested = false;
                self.stats.cache_resets += 1;
                self.clear_fault(ErrorKind::CacheIo);
            }
            Err(err) => self.record_fault(StreamError::classify(&err, ErrorKind::CacheIo)),
        }
    }

    fn restart_replay(&mut self) {
        self.sources.close(StreamMode::Replay);
        self.replay_frames = 0;
        match self.sources.open(StreamMode::Replay) {
            Ok(()) => self.stats.replay_loops += 1,
            Err(err) => {
                self.record_fault(StreamError::classify(&err, ErrorKind::SourceUnavailable));
                self.schedule_reopen();
            }
        }
    }

    /// Close a replay that produced nothing and wait out the backoff before
    /// opening it again.
    fn hold_replay(&mut self, fault: StreamError) {
        self.sources.close(StreamMode::Replay);
        self.record_fault(fault);
        self.schedule_reopen();
    }

    /// Release camera, replay source and cache. Later calls release nothing.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.released {
            return ShutdownReport::default();
        }
        self.flags.shutting_down = true;
        self.released = true;
        self.phase = StreamPhase::Stopped;

        let mut report = ShutdownReport {
            camera_released: self.sources.close(StreamMode::Live),
            replay_released: self.sources.close(StreamMode::Replay),
            ..ShutdownReport::default()
        };
        match self.cache.release() {
            Ok(released) => report.cache_released = released,
            Err(err) => {
                log::warn!("cache release failed during shutdown: {:#}", err);
                report.cache_released = true;
                report.errors.push(format!("{:#}", err));
            }
        }
        log::info!(
            "released handles: camera={} replay={} cache={}",
            report.camera_released,
            report.replay_released,
            report.cache_released
        );
        report
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{raw, CacheCodec, CacheSettings};
    use crate::frame::{Frame, PixelFormat};
    use crate::ingest::FrameSource;
    use crate::render::{self, DisplayPanel};
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        opens: AtomicU64,
        releases: AtomicU64,
    }

    impl Counters {
        fn opens(&self) -> u64 {
            self.opens.load(Ordering::SeqCst)
        }

        fn releases(&self) -> u64 {
            self.releases.load(Ordering::SeqCst)
        }
    }

    /// Scripted source: `failing_opens` opens fail, then frames flow.
    struct MockSource {
        counters: Arc<Counters>,
        open: bool,
        failing_opens: u32,
        frames_per_open: Option<u64>,
        fail_next_read: bool,
        next: u64,
    }

    impl MockSource {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                open: false,
                failing_opens: 0,
                frames_per_open: None,
                fail_next_read: false,
                next: 0,
            }
        }
    }

    impl FrameSource for MockSource {
        fn open(&mut self) -> Result<()> {
            if self.failing_opens > 0 {
                self.failing_opens -= 1;
                return Err(StreamError::source_unavailable("mock device missing").into());
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            self.open = true;
            self.next = 0;
            Ok(())
        }

        fn read(&mut self) -> Result<ReadOutcome> {
            if self.fail_next_read {
                self.fail_next_read = false;
                return Err(anyhow!("mock read failure"));
            }
            if self.frames_per_open.is_some_and(|limit| self.next >= limit) {
                return Ok(ReadOutcome::EndOfStream);
            }
            let frame = Frame::new(vec![self.next as u8; 12], 2, 2, PixelFormat::Bgr24, self.next)?;
            self.next += 1;
            Ok(ReadOutcome::Frame(frame))
        }

        fn close(&mut self) -> bool {
            if !self.open {
                return false;
            }
            self.open = false;
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn describe(&self) -> String {
            "mock".to_string()
        }
    }

    struct Harness {
        controller: StreamController,
        sink: RenderSink,
        panel: DisplayPanel,
        camera: Arc<Counters>,
        replay: Arc<Counters>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(configure: impl FnOnce(&mut MockSource, &mut MockSource)) -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let camera = Arc::new(Counters::default());
            let replay = Arc::new(Counters::default());
            let mut camera_source = MockSource::new(camera.clone());
            let mut replay_source = MockSource::new(replay.clone());
            replay_source.frames_per_open = Some(3);
            configure(&mut camera_source, &mut replay_source);

            let cache = CacheWriter::new(CacheSettings {
                path: dir.path().join("replay.mov"),
                codec: CacheCodec::Raw,
                fps: 10,
                width: 2,
                height: 2,
            });
            let controller = StreamController::new(
                SourceSet::new(Box::new(camera_source), Box::new(replay_source)),
                cache,
            )
            .with_reopen_backoff(Duration::ZERO);
            let (sink, panel) = render::channel();
            Self {
                controller,
                sink,
                panel,
                camera,
                replay,
                _dir: dir,
            }
        }

        fn tick(&mut self) -> TickOutcome {
            let outcome = self.controller.tick(&mut self.sink);
            self.panel.poll();
            outcome
        }

        fn shown(&self) -> Option<u64> {
            self.panel.current().map(|image| image.sequence)
        }
    }

    #[test]
    fn starts_live_with_init_and_reset_pending() {
        let harness = Harness::new(|_, _| {});
        assert_eq!(harness.controller.mode(), StreamMode::Live);
        let flags = harness.controller.flags();
        assert!(flags.init_stream);
        assert!(flags.cache_clear_requested);
        assert!(!flags.shutting_down);
        assert_eq!(harness.controller.status().phase, StreamPhase::Starting);
    }

    #[test]
    fn toggle_parity_decides_mode() {
        let mut harness = Harness::new(|_, _| {});
        for toggles in 1..=7u32 {
            harness.controller.toggle();
            harness.tick();
            let expected = if toggles % 2 == 0 {
                StreamMode::Live
            } else {
                StreamMode::Replay
            };
            assert_eq!(harness.controller.mode(), expected, "after {} toggles", toggles);
        }
    }

    #[test]
    fn first_live_tick_opens_camera_resets_cache_and_renders() {
        let mut harness = Harness::new(|_, _| {});
        assert_eq!(harness.tick(), TickOutcome::Rendered);
        assert!(harness.controller.is_source_open(StreamMode::Live));
        assert!(!harness.controller.is_source_open(StreamMode::Replay));
        let stats = harness.controller.stats();
        assert_eq!(stats.cache_resets, 1);
        assert_eq!(stats.frames_cached, 1);
        assert_eq!(harness.shown(), Some(0));
        assert!(!harness.controller.flags().init_stream);
        assert!(!harness.controller.flags().cache_clear_requested);
    }

    #[test]
    fn new_point_in_replay_waits_for_live() {
        let mut harness = Harness::new(|_, _| {});
        harness.tick();
        harness.controller.toggle();
        harness.tick();
        harness.controller.new_point();
        for _ in 0..5 {
            harness.tick();
        }
        assert_eq!(harness.controller.stats().cache_resets, 1);
        assert!(harness.controller.flags().cache_clear_requested);

        harness.controller.toggle();
        assert_eq!(harness.controller.stats().cache_resets, 1);
        harness.tick();
        assert_eq!(harness.controller.stats().cache_resets, 2);
        assert!(!harness.controller.flags().cache_clear_requested);
    }

    #[test]
    fn new_point_in_live_recreates_cache_before_next_write() -> Result<()> {
        let mut harness = Harness::new(|_, _| {});
        for _ in 0..3 {
            harness.tick();
        }
        harness.controller.new_point();
        harness.tick();
        harness.tick();
        let path = harness.controller.cache().path().to_path_buf();
        assert_eq!(harness.controller.cache().stats().frames_in_file, 2);
        harness.controller.shutdown();
        assert_eq!(raw::count_frames(&path)?, 2);
        Ok(())
    }

    #[test]
    fn replay_loops_back_to_first_frame() {
        let mut harness = Harness::new(|_, _| {});
        harness.tick();
        harness.controller.toggle();

        let mut shown = Vec::new();
        for _ in 0..3 {
            assert_eq!(harness.tick(), TickOutcome::Rendered);
            shown.push(harness.shown());
        }
        assert_eq!(shown, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(harness.tick(), TickOutcome::Looped);
        assert_eq!(harness.tick(), TickOutcome::Rendered);
        assert_eq!(harness.shown(), Some(0));
        assert_eq!(harness.controller.stats().replay_loops, 1);
    }

    #[test]
    fn entering_replay_releases_cache_and_camera() {
        let mut harness = Harness::new(|_, _| {});
        harness.tick();
        assert!(harness.controller.cache().is_open());
        harness.controller.toggle();
        assert!(!harness.controller.is_source_open(StreamMode::Live));
        harness.tick();
        assert!(!harness.controller.cache().is_open());
        assert!(harness.controller.is_source_open(StreamMode::Replay));
        assert_eq!(harness.camera.releases(), 1);
    }

    #[test]
    fn replay_frames_are_not_cached() {
        let mut harness = Harness::new(|_, _| {});
        harness.tick();
        harness.controller.toggle();
        for _ in 0..4 {
            harness.tick();
        }
        assert_eq!(harness.controller.stats().frames_cached, 1);
    }

    #[test]
    fn unopenable_camera_surfaces_source_unavailable_and_retries() {
        let mut harness = Harness::new(|camera, _| camera.failing_opens = 2);
        assert_eq!(harness.tick(), TickOutcome::Faulted);
        let status = harness.controller.status();
        assert!(status.fault(ErrorKind::SourceUnavailable).is_some());
        assert_eq!(harness.panel.status(), &status);

        assert_eq!(harness.tick(), TickOutcome::Faulted);
        assert_eq!(harness.tick(), TickOutcome::Rendered);
        assert!(harness.controller.status().is_healthy());
        assert_eq!(harness.camera.opens(), 1);
    }

    #[test]
    fn controls_stay_responsive_while_faulted() {
        let mut harness = Harness::new(|camera, _| camera.failing_opens = u32::MAX);
        harness.tick();
        harness.controller.toggle();
        assert_eq!(harness.controller.mode(), StreamMode::Replay);
        assert!(harness
            .controller
            .status()
            .fault(ErrorKind::SourceUnavailable)
            .is_none());
        harness.tick();
        assert!(harness.controller.is_source_open(StreamMode::Replay));
    }

    #[test]
    fn live_read_failure_closes_camera_and_reopens() {
        let mut harness = Harness::new(|camera, _| camera.fail_next_read = true);
        assert_eq!(harness.tick(), TickOutcome::Faulted);
        assert!(!harness.controller.is_source_open(StreamMode::Live));
        assert!(harness.controller.flags().init_stream);
        assert_eq!(harness.tick(), TickOutcome::Rendered);
        assert_eq!(harness.camera.opens(), 2);
        assert_eq!(harness.camera.releases(), 1);
    }

    #[test]
    fn replay_failing_before_first_frame_is_reported_then_reopened() {
        let mut harness = Harness::new(|_, replay| replay.fail_next_read = true);
        harness.tick();
        harness.controller.toggle();
        assert_eq!(harness.tick(), TickOutcome::Faulted);
        assert!(!harness.controller.is_source_open(StreamMode::Replay));
        assert!(harness
            .controller
            .status()
            .fault(ErrorKind::SourceUnavailable)
            .is_some());

        assert_eq!(harness.tick(), TickOutcome::Rendered);
        assert_eq!(harness.shown(), Some(0));
        assert!(harness.controller.status().is_healthy());
        assert_eq!(harness.replay.opens(), 2);
        assert_eq!(harness.controller.stats().replay_loops, 0);
    }

    #[test]
    fn empty_replay_waits_for_backoff_instead_of_looping() {
        let mut harness = Harness::new(|_, replay| replay.frames_per_open = Some(0));
        harness.controller = harness
            .controller
            .with_reopen_backoff(Duration::from_secs(60));
        harness.tick();
        harness.controller.toggle();

        assert_eq!(harness.tick(), TickOutcome::Faulted);
        let status = harness.controller.status();
        let fault = status
            .fault(ErrorKind::SourceUnavailable)
            .expect("empty replay fault");
        assert!(fault.message.contains("no frames"), "{}", fault.message);
        assert_eq!(harness.panel.status(), &status);

        for _ in 0..5 {
            assert_eq!(harness.tick(), TickOutcome::Idle);
        }
        assert_eq!(harness.replay.opens(), 1);
        assert_eq!(harness.controller.stats().replay_loops, 0);
        assert_eq!(harness.shown(), Some(0));

        // Toggling retries at once and clears the note.
        harness.controller.toggle();
        assert!(harness.controller.status().is_healthy());
    }

    #[test]
    fn shutdown_releases_each_open_handle_once() {
        for toggles in 0..2 {
            let mut harness = Harness::new(|_, _| {});
            harness.tick();
            for _ in 0..toggles {
                harness.controller.toggle();
                harness.tick();
            }
            let report = harness.controller.shutdown();
            let again = harness.controller.shutdown();
            assert_eq!(again, ShutdownReport::default());
            assert_eq!(harness.tick(), TickOutcome::Stopped);

            assert_eq!(harness.camera.opens(), harness.camera.releases());
            assert_eq!(harness.replay.opens(), harness.replay.releases());
            assert_eq!(report.camera_released, toggles == 0);
            assert_eq!(report.replay_released, toggles == 1);
            assert_eq!(report.cache_released, toggles == 0);
            assert!(report.errors.is_empty());
            assert_eq!(harness.controller.status().phase, StreamPhase::Stopped);
        }
    }

    #[test]
    fn dropping_controller_releases_handles() {
        let mut harness = Harness::new(|_, _| {});
        let camera = harness.camera.clone();
        harness.tick();
        drop(harness);
        assert_eq!(camera.opens(), 1);
        assert_eq!(camera.releases(), 1);
    }

    #[test]
    fn status_display_lists_faults() {
        let mut status = StreamStatus::running(StreamMode::Replay);
        assert_eq!(status.to_string(), "REPLAY");
        status.faults.push(StreamError::cache_io("disk full"));
        assert_eq!(status.to_string(), "REPLAY | CACHE_IO_ERROR: disk full");
    }
}
