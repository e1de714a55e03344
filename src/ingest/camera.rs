//! Camera frame source.
//!
//! This module provides `CameraSource` for the live stream. The camera source is
//! responsible for:
//! - Resolving the configured device (index, device node or `stub://` name)
//! - Requesting the configured resolution with minimal driver-side buffering
//! - Bounding every read with a timeout so a tick never blocks on the device
//!
//! Real devices go through libv4l (feature: ingest-v4l2). `stub://` devices
//! produce synthetic frames whose first eight bytes carry the little-endian
//! frame sequence, which keeps ordering observable in tests.

use anyhow::Result;
#[cfg(feature = "ingest-v4l2")]
use anyhow::{anyhow, Context};
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;
use std::time::Duration;

use super::{FrameSource, ReadOutcome};
use crate::frame::{Frame, PixelFormat};
use crate::StreamError;
use crate::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Configuration for the camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device index ("0"), device node ("/dev/video0") or "stub://name".
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Number of driver buffers. Kept small to bound latency.
    pub buffer_frames: u32,
    /// Longest a single read may wait before reporting `Pending`.
    pub read_timeout: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            buffer_frames: 2,
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl CameraConfig {
    /// Device node for the configured device. Bare integers map to `/dev/videoN`.
    pub fn device_path(&self) -> String {
        let device = self.device.trim();
        match device.parse::<u32>() {
            Ok(index) => format!("/dev/video{}", index),
            Err(_) => device.to_string(),
        }
    }

    fn is_stub(&self) -> bool {
        self.device.starts_with("stub://")
    }
}

/// Live camera source.
pub struct CameraSource {
    config: CameraConfig,
    backend: Option<CameraBackend>,
    frames_captured: u64,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            backend: None,
            frames_captured: 0,
        }
    }

    /// Frames captured across every open of this source.
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    fn open_backend(&self) -> Result<CameraBackend> {
        if self.config.is_stub() {
            return Ok(CameraBackend::Synthetic(SyntheticCamera::new(
                self.config.clone(),
            )));
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(CameraBackend::Device(DeviceCamera::open(&self.config)?))
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(StreamError::source_unavailable(format!(
                "camera {} requires the ingest-v4l2 feature",
                self.config.device_path()
            ))
            .into())
        }
    }
}

impl FrameSource for CameraSource {
    fn open(&mut self) -> Result<()> {
        if self.backend.is_some() {
            return Ok(());
        }
        let backend = self.open_backend().map_err(|err| {
            anyhow::Error::new(StreamError::source_unavailable(format!(
                "open camera {}: {:#}",
                self.config.device_path(),
                err
            )))
        })?;
        self.backend = Some(backend);
        log::info!("CameraSource: opened {}", self.describe());
        Ok(())
    }

    fn read(&mut self) -> Result<ReadOutcome> {
        let outcome = match self.backend.as_mut() {
            None => return Ok(ReadOutcome::Pending),
            Some(CameraBackend::Synthetic(camera)) => camera.next_frame()?,
            #[cfg(feature = "ingest-v4l2")]
            Some(CameraBackend::Device(camera)) => camera.next_frame()?,
        };
        if matches!(outcome, ReadOutcome::Frame(_)) {
            self.frames_captured += 1;
        }
        Ok(outcome)
    }

    fn close(&mut self) -> bool {
        match self.backend.take() {
            Some(_) => {
                log::debug!("CameraSource: released {}", self.config.device_path());
                true
            }
            None => false,
        }
    }

    fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "camera {} ({}x{})",
            self.config.device_path(),
            self.config.width,
            self.config.height
        )
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    sequence: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            sequence: 0,
        }
    }

    fn next_frame(&mut self) -> Result<ReadOutcome> {
        let pixels = synthetic_pixels(self.config.width, self.config.height, self.sequence);
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Bgr24,
            self.sequence,
        )?;
        self.sequence += 1;
        Ok(ReadOutcome::Frame(frame))
    }
}

/// BGR24 test pattern with the sequence number stamped into the first bytes.
pub fn synthetic_pixels(width: u32, height: u32, sequence: u64) -> Vec<u8> {
    let len = width as usize * height as usize * 3;
    let mut pixels: Vec<u8> = (0..len)
        .map(|i| ((i as u64 + sequence) % 256) as u8)
        .collect();
    let stamp = sequence.to_le_bytes();
    let n = stamp.len().min(pixels.len());
    pixels[..n].copy_from_slice(&stamp[..n]);
    pixels
}

/// Read back the sequence stamped by `synthetic_pixels`.
pub fn synthetic_sequence(frame: &Frame) -> Option<u64> {
    let bytes: [u8; 8] = frame.data().get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

// ----------------------------------------------------------------------------
// V4L2 camera using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceCamera {
    path: String,
    state: DeviceCameraState,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u64,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceCameraState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCamera {
    fn open(config: &CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = config.device_path();
        let mut device =
            v4l::Device::with_path(&path).with_context(|| format!("open v4l2 device {}", path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"BGR3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("CameraSource: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = pixel_format_for(&format.fourcc)?;

        let buffers = config.buffer_frames.max(1);
        let timeout = config.read_timeout;
        let state = DeviceCameraStateBuilder {
            device,
            stream_builder: |device| {
                let mut stream =
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, buffers)
                        .map_err(|err| {
                            anyhow::Error::new(err).context("create v4l2 buffer stream")
                        })?;
                stream.set_timeout(timeout);
                Ok(stream)
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: connected to {} ({}x{} {:?}, {} buffers)",
            path,
            format.width,
            format.height,
            pixel_format,
            buffers
        );
        Ok(Self {
            path,
            state,
            width: format.width,
            height: format.height,
            format: pixel_format,
            sequence: 0,
        })
    }

    fn next_frame(&mut self) -> Result<ReadOutcome> {
        use v4l::io::traits::CaptureStream;

        let captured = self
            .state
            .with_mut(|fields| match fields.stream.next() {
                Ok((buf, meta)) => {
                    let used = (meta.bytesused as usize).min(buf.len());
                    Ok(Some(buf[..used].to_vec()))
                }
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => Ok(None),
                Err(err) => Err(err),
            })
            .map_err(|err| {
                anyhow::Error::new(StreamError::source_unavailable(format!(
                    "capture from {}: {}",
                    self.path, err
                )))
            })?;

        let Some(mut pixels) = captured else {
            log::debug!("CameraSource: read timed out on {}", self.path);
            return Ok(ReadOutcome::Pending);
        };

        let expected = super::normalize::expected_len(self.width, self.height, self.format)?;
        if pixels.len() < expected {
            return Err(anyhow!(
                "short v4l2 frame from {}: expected {}, got {}",
                self.path,
                expected,
                pixels.len()
            ));
        }
        pixels.truncate(expected);

        let frame = Frame::new(pixels, self.width, self.height, self.format, self.sequence)?;
        self.sequence += 1;
        Ok(ReadOutcome::Frame(frame))
    }
}

#[cfg(feature = "ingest-v4l2")]
fn pixel_format_for(fourcc: &v4l::FourCC) -> Result<PixelFormat> {
    match &fourcc.repr {
        b"BGR3" => Ok(PixelFormat::Bgr24),
        b"RGB3" => Ok(PixelFormat::Rgb24),
        b"YUYV" => Ok(PixelFormat::Yuyv),
        b"NV12" => Ok(PixelFormat::Nv12),
        other => Err(anyhow!(
            "unsupported v4l2 pixel format {}",
            String::from_utf8_lossy(other)
        )),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
