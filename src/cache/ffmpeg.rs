//! mp4v cache encoding using FFmpeg.
//!
//! Frames are scaled to the configured cache geometry, converted to YUV420P and
//! encoded as MPEG-4 Part 2 into a QuickTime container (codec tag `mp4v`).

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::{CacheSettings, VideoSink};
use crate::frame::{Frame, PixelFormat};

pub(crate) struct Mp4vWriter {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: Option<ScalerFor>,
    width: u32,
    height: u32,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    next_pts: i64,
}

/// Scaler bound to one input geometry; rebuilt when the input changes.
struct ScalerFor {
    width: u32,
    height: u32,
    format: PixelFormat,
    context: ffmpeg::software::scaling::Context,
}

impl Mp4vWriter {
    pub(crate) fn create(settings: &CacheSettings) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let mut output = ffmpeg::format::output_as(&settings.path, "mov")
            .with_context(|| format!("open {} for writing", settings.path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg was built without an MPEG-4 encoder"))?;
        let mut stream = output.add_stream(codec).context("add video stream")?;

        let fps = settings.fps.max(1) as i32;
        let encoder_time_base = ffmpeg::Rational(1, fps);
        let mut video = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create mpeg4 encoder")?;
        video.set_width(settings.width);
        video.set_height(settings.height);
        video.set_format(ffmpeg::format::Pixel::YUV420P);
        video.set_time_base(encoder_time_base);
        video.set_frame_rate(Some(ffmpeg::Rational(fps, 1)));
        if global_header {
            video.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = video.open_as(codec).context("open mpeg4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output.write_header().context("write container header")?;
        let stream_time_base = output
            .stream(0)
            .map(|stream| stream.time_base())
            .ok_or_else(|| anyhow!("video stream missing after header"))?;

        Ok(Self {
            output,
            encoder,
            scaler: None,
            width: settings.width,
            height: settings.height,
            encoder_time_base,
            stream_time_base,
            next_pts: 0,
        })
    }

    fn scaler_for(&mut self, frame: &Frame) -> Result<&mut ffmpeg::software::scaling::Context> {
        let stale = match &self.scaler {
            Some(scaler) => {
                scaler.width != frame.width
                    || scaler.height != frame.height
                    || scaler.format != frame.format
            }
            None => true,
        };
        if stale {
            let context = ffmpeg::software::scaling::Context::get(
                ffmpeg_pixel(frame.format),
                frame.width,
                frame.height,
                ffmpeg::format::Pixel::YUV420P,
                self.width,
                self.height,
                ffmpeg::software::scaling::flag::Flags::BILINEAR,
            )
            .context("create ffmpeg scaler")?;
            self.scaler = Some(ScalerFor {
                width: frame.width,
                height: frame.height,
                format: frame.format,
                context,
            });
        }
        self.scaler
            .as_mut()
            .map(|scaler| &mut scaler.context)
            .ok_or_else(|| anyhow!("scaler unavailable"))
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl VideoSink for Mp4vWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let mut input = ffmpeg::frame::Video::new(ffmpeg_pixel(frame.format), frame.width, frame.height);
        copy_into_planes(frame, &mut input)?;

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler_for(frame)?
            .run(&input, &mut yuv)
            .context("scale frame to YUV420P")?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .context("send frame to mpeg4 encoder")?;
        self.drain_packets()
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.encoder.send_eof().context("flush mpeg4 encoder")?;
        self.drain_packets()?;
        self.output.write_trailer().context("write container trailer")?;
        Ok(())
    }
}

fn ffmpeg_pixel(format: PixelFormat) -> ffmpeg::format::Pixel {
    match format {
        PixelFormat::Bgr24 => ffmpeg::format::Pixel::BGR24,
        PixelFormat::Rgb24 => ffmpeg::format::Pixel::RGB24,
        PixelFormat::Yuyv => ffmpeg::format::Pixel::YUYV422,
        PixelFormat::Nv12 => ffmpeg::format::Pixel::NV12,
    }
}

/// Copy tightly packed frame bytes into ffmpeg's strided planes.
fn copy_into_planes(frame: &Frame, target: &mut ffmpeg::frame::Video) -> Result<()> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let data = frame.data();
    // (row bytes, rows) per plane
    let planes: Vec<(usize, usize)> = match frame.format {
        PixelFormat::Bgr24 | PixelFormat::Rgb24 => vec![(width * 3, height)],
        PixelFormat::Yuyv => vec![(width * 2, height)],
        PixelFormat::Nv12 => vec![(width, height), (width.div_ceil(2) * 2, height.div_ceil(2))],
    };

    let mut offset = 0;
    for (index, (row_bytes, rows)) in planes.into_iter().enumerate() {
        let stride = target.stride(index);
        let plane = target.data_mut(index);
        for row in 0..rows {
            let src = data
                .get(offset..offset + row_bytes)
                .context("frame row is out of bounds")?;
            plane
                .get_mut(row * stride..row * stride + row_bytes)
                .context("ffmpeg plane row is out of bounds")?
                .copy_from_slice(src);
            offset += row_bytes;
        }
    }
    Ok(())
}
