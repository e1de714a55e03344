use anyhow::{anyhow, Result};

use crate::frame::PixelFormat;

/// Byte length of a tightly packed frame in `format`.
pub(crate) fn expected_len(width: u32, height: u32, format: PixelFormat) -> Result<usize> {
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let len = match format {
        PixelFormat::Bgr24 | PixelFormat::Rgb24 => pixels.checked_mul(3),
        PixelFormat::Yuyv => {
            if width % 2 != 0 {
                return Err(anyhow!("YUYV frame width {} is not even", width));
            }
            pixels.checked_mul(2)
        }
        PixelFormat::Nv12 => chroma_len(width, height).and_then(|chroma| pixels.checked_add(chroma)),
    };
    len.ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// Interleaved UV plane of an NV12 frame. Odd dimensions round up.
fn chroma_len(width: u32, height: u32) -> Option<usize> {
    let cw = (width as usize).div_ceil(2);
    let ch = (height as usize).div_ceil(2);
    cw.checked_mul(ch)?.checked_mul(2)
}

/// Convert a packed frame into RGBA8 for display.
pub(crate) fn to_rgba(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    let expected = expected_len(width, height, format)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    match format {
        PixelFormat::Bgr24 => Ok(packed_to_rgba(pixels, [2, 1, 0])),
        PixelFormat::Rgb24 => Ok(packed_to_rgba(pixels, [0, 1, 2])),
        PixelFormat::Yuyv => Ok(yuyv_to_rgba(pixels, width, height)),
        PixelFormat::Nv12 => nv12_to_rgba(pixels, width, height),
    }
}

fn packed_to_rgba(pixels: &[u8], order: [usize; 3]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(pixels.len() / 3 * 4);
    for px in pixels.chunks_exact(3) {
        rgba.extend_from_slice(&[px[order[0]], px[order[1]], px[order[2]], 255]);
    }
    rgba
}

fn yuyv_to_rgba(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    // Each 4-byte group carries two pixels sharing one chroma pair.
    for group in pixels.chunks_exact(4) {
        let u = group[1] as f32 - 128.0;
        let v = group[3] as f32 - 128.0;
        for y in [group[0], group[2]] {
            let [r, g, b] = yuv_to_rgb(y as f32, u, v);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    rgba
}

fn nv12_to_rgba(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;
    let uv_stride = w.div_ceil(2) * 2;

    let mut rgba = vec![0u8; y_plane * 4];
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * uv_stride + (i / 2) * 2;
            let (Some(&y), Some(&u), Some(&v)) = (
                pixels.get(j * w + i),
                pixels.get(uv_index),
                pixels.get(uv_index + 1),
            ) else {
                return Err(anyhow!("NV12 frame {}x{} is truncated", width, height));
            };

            let [r, g, b] = yuv_to_rgb(y as f32, u as f32 - 128.0, v as f32 - 128.0);
            let offset = (j * w + i) * 4;
            rgba[offset..offset + 4].copy_from_slice(&[r, g, b, 255]);
        }
    }
    Ok(rgba)
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
