//! Replay file frame source.
//!
//! This module provides `ReplaySource`, which reads the cache file back for
//! replay mode. The replay source is responsible for:
//! - Opening the cache path and picking a decoder from the file contents
//! - Yielding frames in file order from the first frame
//! - Reporting end of stream so the controller can loop the replay
//!
//! Raw frame logs are decoded natively. Anything else is handed to FFmpeg
//! (feature: codec-ffmpeg).

use anyhow::Result;
use std::path::PathBuf;

#[cfg(feature = "codec-ffmpeg")]
use super::replay_ffmpeg::FfmpegReplayDecoder;
use super::{FrameSource, ReadOutcome};
use crate::cache::raw::{self, RawFrameReader};
use crate::{StreamError, DEFAULT_CACHE_PATH};

/// Configuration for the replay source.
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Path of the cache file to replay.
    pub path: PathBuf,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CACHE_PATH),
        }
    }
}

/// Replay file source.
pub struct ReplaySource {
    config: ReplayConfig,
    decoder: Option<ReplayDecoder>,
    opens: u64,
    frames_decoded: u64,
}

enum ReplayDecoder {
    Raw(RawFrameReader),
    #[cfg(feature = "codec-ffmpeg")]
    Ffmpeg(FfmpegReplayDecoder),
}

impl ReplaySource {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            decoder: None,
            opens: 0,
            frames_decoded: 0,
        }
    }

    /// Number of successful opens, i.e. one more than the number of loops.
    pub fn opens(&self) -> u64 {
        self.opens
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    fn open_decoder(&self) -> Result<ReplayDecoder> {
        let path = &self.config.path;
        if raw::is_raw_log(path)? {
            return Ok(ReplayDecoder::Raw(RawFrameReader::open(path)?));
        }
        #[cfg(feature = "codec-ffmpeg")]
        {
            Ok(ReplayDecoder::Ffmpeg(FfmpegReplayDecoder::open(path)?))
        }
        #[cfg(not(feature = "codec-ffmpeg"))]
        {
            Err(anyhow::anyhow!(
                "{} is not a raw frame log; decoding it requires the codec-ffmpeg feature",
                path.display()
            ))
        }
    }
}

impl FrameSource for ReplaySource {
    fn open(&mut self) -> Result<()> {
        if self.decoder.is_some() {
            return Ok(());
        }
        let decoder = self.open_decoder().map_err(|err| {
            anyhow::Error::new(StreamError::source_unavailable(format!(
                "open replay {}: {:#}",
                self.config.path.display(),
                err
            )))
        })?;
        self.decoder = Some(decoder);
        self.opens += 1;
        log::debug!("ReplaySource: opened {}", self.config.path.display());
        Ok(())
    }

    fn read(&mut self) -> Result<ReadOutcome> {
        let frame = match self.decoder.as_mut() {
            None => return Ok(ReadOutcome::Pending),
            Some(ReplayDecoder::Raw(reader)) => reader.next_frame()?,
            #[cfg(feature = "codec-ffmpeg")]
            Some(ReplayDecoder::Ffmpeg(decoder)) => decoder.next_frame()?,
        };
        match frame {
            Some(frame) => {
                self.frames_decoded += 1;
                Ok(ReadOutcome::Frame(frame))
            }
            None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn close(&mut self) -> bool {
        self.decoder.take().is_some()
    }

    fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    fn describe(&self) -> String {
        format!("replay {}", self.config.path.display())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
