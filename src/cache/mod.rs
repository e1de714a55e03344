//! Rolling replay cache.
//!
//! `CacheWriter` owns the video sink bound to the cache path. In live mode every
//! frame is appended to it; on a new point the sink is released, the file is
//! deleted and a fresh, empty sink is opened at the same path before any further
//! frame is written.
//!
//! Two codecs are available:
//! - `mp4v`: MPEG-4 Part 2 in a QuickTime container (feature: codec-ffmpeg)
//! - `raw`: a length-prefixed frame log readable without native codecs

#[cfg(feature = "codec-ffmpeg")]
pub(crate) mod ffmpeg;
pub mod raw;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::frame::Frame;
use crate::{StreamError, DEFAULT_CACHE_FPS, DEFAULT_CACHE_PATH, DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Encoding used for the cache file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheCodec {
    Mp4v,
    Raw,
}

impl Default for CacheCodec {
    fn default() -> Self {
        if cfg!(feature = "codec-ffmpeg") {
            CacheCodec::Mp4v
        } else {
            CacheCodec::Raw
        }
    }
}

impl CacheCodec {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp4v" => Ok(CacheCodec::Mp4v),
            "raw" => Ok(CacheCodec::Raw),
            other => Err(anyhow!("unknown cache codec '{}' (expected mp4v or raw)", other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheCodec::Mp4v => "mp4v",
            CacheCodec::Raw => "raw",
        }
    }

    fn open_sink(self, settings: &CacheSettings) -> Result<Box<dyn VideoSink>> {
        match self {
            CacheCodec::Raw => Ok(Box::new(raw::RawFrameWriter::create(
                &settings.path,
                settings.fps,
            )?)),
            #[cfg(feature = "codec-ffmpeg")]
            CacheCodec::Mp4v => Ok(Box::new(ffmpeg::Mp4vWriter::create(settings)?)),
            #[cfg(not(feature = "codec-ffmpeg"))]
            CacheCodec::Mp4v => Err(anyhow!("mp4v cache requires the codec-ffmpeg feature")),
        }
    }
}

/// Where and how the cache file is written.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub path: PathBuf,
    pub codec: CacheCodec,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            codec: CacheCodec::default(),
            fps: DEFAULT_CACHE_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// An open video file accepting frames in order.
pub trait VideoSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the file.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Counters for the cache writer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub resets: u64,
    pub releases: u64,
    /// Frames written over the writer's lifetime.
    pub frames_written: u64,
    /// Frames written since the last reset.
    pub frames_in_file: u64,
}

/// Video sink bound to the cache path.
pub struct CacheWriter {
    settings: CacheSettings,
    sink: Option<Box<dyn VideoSink>>,
    stats: CacheStats,
}

impl CacheWriter {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            sink: None,
            stats: CacheStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Release the current sink, delete the file and open an empty one.
    ///
    /// Fails with `CacheIo`; the writer is left closed on failure.
    pub fn reset(&mut self) -> Result<()> {
        if let Err(err) = self.release() {
            log::warn!("cache: releasing previous sink failed: {:#}", err);
        }

        let path = self.settings.path.clone();
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(StreamError::cache_io(format!(
                    "delete {}: {}",
                    path.display(),
                    err
                ))
                .into())
            }
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StreamError::cache_io(format!("create {}: {}", parent.display(), err))
            })?;
        }

        let sink = self.settings.codec.open_sink(&self.settings).map_err(|err| {
            StreamError::cache_io(format!(
                "open {} cache {}: {:#}",
                self.settings.codec.as_str(),
                path.display(),
                err
            ))
        })?;
        self.sink = Some(sink);
        self.stats.resets += 1;
        self.stats.frames_in_file = 0;
        log::info!(
            "cache: reset {} ({}, {} fps, {}x{})",
            path.display(),
            self.settings.codec.as_str(),
            self.settings.fps,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    /// Append one frame. Writing to a closed cache is an error, not a no-op.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(StreamError::cache_io(format!(
                "cache {} is not open",
                self.settings.path.display()
            ))
            .into());
        };
        sink.write(frame).map_err(|err| {
            StreamError::cache_io(format!(
                "write frame {} to {}: {:#}",
                frame.sequence,
                self.settings.path.display(),
                err
            ))
        })?;
        self.stats.frames_written += 1;
        self.stats.frames_in_file += 1;
        Ok(())
    }

    /// Close the sink if one is open. Returns whether a sink was released.
    pub fn release(&mut self) -> Result<bool> {
        let Some(sink) = self.sink.take() else {
            return Ok(false);
        };
        self.stats.releases += 1;
        sink.finish().map_err(|err| {
            StreamError::cache_io(format!(
                "finalize {}: {:#}",
                self.settings.path.display(),
                err
            ))
        })?;
        log::debug!("cache: released {}", self.settings.path.display());
        Ok(true)
    }
}
