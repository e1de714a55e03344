//! SpikeBall Live (sblive)
//!
//! Shows a live camera feed and keeps a rolling replay of it on disk so the
//! last point can be watched again on demand.
//!
//! # Architecture
//!
//! Everything that touches the camera, the cache file or the replay file runs
//! on one tick thread, driven by a fixed-delay scheduler:
//!
//! 1. **Live**: frames come from the camera, are appended to the cache file and
//!    are presented to the display.
//! 2. **Replay**: frames come from the cache file, looping at end of stream.
//! 3. **New point**: the cache file is deleted and recreated before the next
//!    live write.
//!
//! The window never shares mutable state with the tick thread. It sends
//! commands in and receives converted images and status updates out.
//!
//! # Module Structure
//!
//! - `frame`: owned video frames and displayable RGBA images
//! - `ingest`: frame sources (camera, replay file)
//! - `cache`: the rolling cache writer and its on-disk codecs
//! - `controller`: the live/replay state machine
//! - `render`: the decoupled display hand-off
//! - `scheduler`: the fixed-period tick thread and its shutdown handle
//! - `helper`: the helper process that gates the first tick
//! - `config`: file + env configuration
//! - `gui`: the eframe window (feature: gui)

use std::fmt;

pub mod cache;
pub mod config;
pub mod controller;
pub mod frame;
#[cfg(feature = "gui")]
pub mod gui;
pub mod helper;
pub mod ingest;
pub mod render;
pub mod scheduler;

pub use cache::{CacheCodec, CacheSettings, CacheStats, CacheWriter};
pub use config::{HelperSettings, SbliveConfig};
pub use controller::{
    ControllerStats, LifecycleFlags, ShutdownReport, StreamController, StreamPhase,
    StreamStatus, TickOutcome,
};
pub use frame::{DisplayImage, Frame, PixelFormat};
pub use helper::{HelperHandle, HelperProcess, StartGate, StartSignal};
pub use ingest::{
    camera::CameraConfig, replay::ReplayConfig, CameraSource, FrameSource, ReadOutcome,
    ReplaySource, SourceSet,
};
pub use render::{DisplayPanel, RenderSink};
pub use scheduler::{Command, CommandSender, SchedulerExit, SchedulerHandle, TickScheduler};

/// Fixed delay between two ticks of the capture/render loop.
pub const DEFAULT_TICK_MS: u64 = 30;

/// Cache file written in live mode and read back in replay mode.
pub const DEFAULT_CACHE_PATH: &str = "sblive/cache/replay.mov";

/// Frame rate the cache file is encoded at.
pub const DEFAULT_CACHE_FPS: u32 = 10;

/// Resolution requested from the camera and used for the cache file.
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

// -------------------- Stream mode --------------------

/// Which source currently feeds the display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StreamMode {
    #[default]
    Live,
    Replay,
}

impl StreamMode {
    pub fn toggled(self) -> Self {
        match self {
            StreamMode::Live => StreamMode::Replay,
            StreamMode::Replay => StreamMode::Live,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamMode::Live => "live",
            StreamMode::Replay => "replay",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Error taxonomy --------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Camera or replay file cannot be opened or read.
    SourceUnavailable,
    /// Cache file cannot be deleted, created or written.
    CacheIo,
    /// Helper process failed to launch or ended before producing output.
    HelperProcess,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ErrorKind::CacheIo => "CACHE_IO_ERROR",
            ErrorKind::HelperProcess => "HELPER_PROCESS_ERROR",
        }
    }
}

/// Error surfaced to the UI as a non-fatal status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceUnavailable, message)
    }

    pub fn cache_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CacheIo, message)
    }

    pub fn helper_process(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HelperProcess, message)
    }

    /// Classify an arbitrary error chain, falling back to `fallback` when no
    /// `StreamError` is found in it.
    pub fn classify(err: &anyhow::Error, fallback: ErrorKind) -> Self {
        match err.chain().find_map(|cause| cause.downcast_ref::<StreamError>()) {
            Some(stream_err) => stream_err.clone(),
            None => StreamError::new(fallback, format!("{:#}", err)),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for StreamError {}
