#![cfg(feature = "codec-ffmpeg")]

use anyhow::Result;

use sblive::{
    CacheCodec, CacheSettings, CacheWriter, Frame, FrameSource, PixelFormat, ReadOutcome,
    ReplayConfig, ReplaySource,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAMES: u64 = 5;

/// BGR gradient that shifts with `sequence`, so every frame encodes differently.
fn court_frame(sequence: u64) -> Result<Frame> {
    let mut pixels = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let shift = sequence as u32 * 16;
            pixels.push(((x + shift) % 256) as u8);
            pixels.push(((y + shift) % 256) as u8);
            pixels.push(((x + y) % 256) as u8);
        }
    }
    Ok(Frame::new(pixels, WIDTH, HEIGHT, PixelFormat::Bgr24, sequence)?)
}

fn next_frame(source: &mut ReplaySource) -> Result<Frame> {
    match source.read()? {
        ReadOutcome::Frame(frame) => Ok(frame),
        other => anyhow::bail!("expected a frame, got {:?}", other),
    }
}

#[test]
fn mp4v_cache_replays_every_frame_then_loops() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cache").join("replay.mov");
    let mut cache = CacheWriter::new(CacheSettings {
        path: path.clone(),
        codec: CacheCodec::Mp4v,
        fps: 10,
        width: WIDTH,
        height: HEIGHT,
    });
    cache.reset()?;
    for sequence in 0..FRAMES {
        cache.write(&court_frame(sequence)?)?;
    }
    assert!(cache.release()?);
    assert_eq!(cache.stats().frames_in_file, FRAMES);

    let mut source = ReplaySource::new(ReplayConfig { path });
    source.open()?;
    for expected in 0..FRAMES {
        let frame = next_frame(&mut source)?;
        assert_eq!((frame.width, frame.height), (WIDTH, HEIGHT));
        assert_eq!(frame.format, PixelFormat::Bgr24);
        assert_eq!(frame.sequence, expected);
    }
    assert!(matches!(source.read()?, ReadOutcome::EndOfStream));

    assert!(source.close());
    source.open()?;
    let first = next_frame(&mut source)?;
    assert_eq!(first.sequence, 0);
    assert_eq!((first.width, first.height), (WIDTH, HEIGHT));
    assert_eq!(source.opens(), 2);
    Ok(())
}

#[test]
fn mp4v_cache_scales_frames_to_the_configured_size() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("replay.mov");
    let mut cache = CacheWriter::new(CacheSettings {
        path: path.clone(),
        codec: CacheCodec::Mp4v,
        fps: 10,
        width: 320,
        height: 180,
    });
    cache.reset()?;
    cache.write(&court_frame(0)?)?;
    cache.release()?;

    let mut source = ReplaySource::new(ReplayConfig { path });
    source.open()?;
    let frame = next_frame(&mut source)?;
    assert_eq!((frame.width, frame.height), (320, 180));
    assert!(matches!(source.read()?, ReadOutcome::EndOfStream));
    Ok(())
}
