//! Raw frame log.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! header:  "SBRF" | version u8 | fps u32
//! record:  width u32 | height u32 | pixel format u8 | len u32 | len bytes
//! ```
//!
//! Records carry their own geometry, so frames of any size can be appended.
//! A truncated trailing record is treated as end of stream.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::VideoSink;
use crate::frame::{Frame, PixelFormat};

pub const RAW_MAGIC: &[u8; 4] = b"SBRF";
const RAW_VERSION: u8 = 1;
const HEADER_LEN: usize = 9;
const RECORD_HEADER_LEN: usize = 13;

/// Upper bound on a single record (8K RGB), to reject corrupt lengths early.
const MAX_RECORD_LEN: usize = 7680 * 4320 * 3;

pub struct RawFrameWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl RawFrameWriter {
    pub fn create(path: &Path, fps: u32) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(RAW_MAGIC);
        header.push(RAW_VERSION);
        header.extend_from_slice(&fps.to_le_bytes());
        out.write_all(&header)?;
        out.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
        })
    }
}

impl VideoSink for RawFrameWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let data = frame.data();
        let len = u32::try_from(data.len()).map_err(|_| anyhow!("frame too large"))?;
        let mut record = [0u8; RECORD_HEADER_LEN];
        record[0..4].copy_from_slice(&frame.width.to_le_bytes());
        record[4..8].copy_from_slice(&frame.height.to_le_bytes());
        record[8] = frame.format.to_tag();
        record[9..13].copy_from_slice(&len.to_le_bytes());
        self.out.write_all(&record)?;
        self.out.write_all(data)?;
        self.out.flush()?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        self.out
            .get_ref()
            .sync_all()
            .with_context(|| format!("sync {}", self.path.display()))?;
        Ok(())
    }
}

pub struct RawFrameReader {
    input: BufReader<File>,
    pub fps: u32,
    sequence: u64,
}

impl RawFrameReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut input = BufReader::new(file);
        let mut header = [0u8; HEADER_LEN];
        input
            .read_exact(&mut header)
            .with_context(|| format!("read header of {}", path.display()))?;
        if &header[0..4] != RAW_MAGIC {
            return Err(anyhow!("{} is not a raw frame log", path.display()));
        }
        if header[4] != RAW_VERSION {
            return Err(anyhow!(
                "unsupported raw frame log version {} in {}",
                header[4],
                path.display()
            ));
        }
        let fps = u32::from_le_bytes([header[5], header[6], header[7], header[8]]);
        Ok(Self {
            input,
            fps,
            sequence: 0,
        })
    }

    /// Next frame, or `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut record = [0u8; RECORD_HEADER_LEN];
        if !read_full(&mut self.input, &mut record)? {
            return Ok(None);
        }
        let width = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let height = u32::from_le_bytes([record[4], record[5], record[6], record[7]]);
        let format = PixelFormat::from_tag(record[8])?;
        let len = u32::from_le_bytes([record[9], record[10], record[11], record[12]]) as usize;
        if len > MAX_RECORD_LEN {
            return Err(anyhow!("raw frame record of {} bytes exceeds limit", len));
        }

        let mut data = vec![0u8; len];
        if !read_full(&mut self.input, &mut data)? {
            log::debug!("raw frame log: truncated record at frame {}", self.sequence);
            return Ok(None);
        }
        let frame = Frame::new(data, width, height, format, self.sequence)?;
        self.sequence += 1;
        Ok(Some(frame))
    }
}

/// Fill `buf` completely. Returns `false` on end of file, including a partial read.
fn read_full(input: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Whether `path` starts with the raw frame log magic.
pub fn is_raw_log(path: &Path) -> Result<bool> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut magic = [0u8; 4];
    read_full(&mut file, &mut magic).map(|complete| complete && &magic == RAW_MAGIC)
}

/// Number of complete frames in a raw frame log.
pub fn count_frames(path: &Path) -> Result<u64> {
    let mut reader = RawFrameReader::open(path)?;
    let mut count = 0;
    while reader.next_frame()?.is_some() {
        count += 1;
    }
    Ok(count)
}
