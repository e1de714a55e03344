//! Frame sources.
//!
//! This module provides the two sources the display can be fed from:
//! - The camera (V4L2 devices with feature: ingest-v4l2, `stub://` otherwise)
//! - The replay file, i.e. the cache written during live mode
//!
//! Both implement `FrameSource`. `SourceSet` owns one of each and enforces that
//! at most one of them is open for reading at any time.

pub mod camera;
pub(crate) mod normalize;
pub mod replay;
#[cfg(feature = "codec-ffmpeg")]
pub(crate) mod replay_ffmpeg;

use anyhow::Result;

use crate::frame::Frame;
use crate::StreamMode;

pub use camera::CameraSource;
pub use replay::ReplaySource;

/// Result of a single read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    /// The replay file has no more frames.
    EndOfStream,
    /// Nothing available right now (camera timeout, source not open).
    Pending,
}

/// A source of frames the tick loop can open, poll and close.
///
/// Reads must return promptly. Sources that can block enforce their own
/// timeout and report it as `ReadOutcome::Pending`.
pub trait FrameSource: Send {
    /// Open the underlying device or file. Fails with `SourceUnavailable`.
    fn open(&mut self) -> Result<()>;

    /// Produce the next frame, end of stream, or nothing for now.
    fn read(&mut self) -> Result<ReadOutcome>;

    /// Release the device or file handle. Idempotent; returns whether a handle
    /// was actually released.
    fn close(&mut self) -> bool;

    fn is_open(&self) -> bool;

    /// Human readable name for logs.
    fn describe(&self) -> String;
}

/// The camera and the replay file, selected by mode.
pub struct SourceSet {
    camera: Box<dyn FrameSource>,
    replay: Box<dyn FrameSource>,
}

impl SourceSet {
    pub fn new(camera: Box<dyn FrameSource>, replay: Box<dyn FrameSource>) -> Self {
        Self { camera, replay }
    }

    /// Open the source for `mode`, closing its companion first.
    pub fn open(&mut self, mode: StreamMode) -> Result<()> {
        self.companion_mut(mode).close();
        let source = self.get_mut(mode);
        source.close();
        source.open()
    }

    pub fn read(&mut self, mode: StreamMode) -> Result<ReadOutcome> {
        let source = self.get_mut(mode);
        if !source.is_open() {
            return Ok(ReadOutcome::Pending);
        }
        source.read()
    }

    pub fn close(&mut self, mode: StreamMode) -> bool {
        self.get_mut(mode).close()
    }

    pub fn is_open(&self, mode: StreamMode) -> bool {
        match mode {
            StreamMode::Live => self.camera.is_open(),
            StreamMode::Replay => self.replay.is_open(),
        }
    }

    pub fn describe(&self, mode: StreamMode) -> String {
        match mode {
            StreamMode::Live => self.camera.describe(),
            StreamMode::Replay => self.replay.describe(),
        }
    }

    fn get_mut(&mut self, mode: StreamMode) -> &mut dyn FrameSource {
        match mode {
            StreamMode::Live => self.camera.as_mut(),
            StreamMode::Replay => self.replay.as_mut(),
        }
    }

    fn companion_mut(&mut self, mode: StreamMode) -> &mut dyn FrameSource {
        self.get_mut(mode.toggled())
    }
}
