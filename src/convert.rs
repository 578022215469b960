//! Format conversion: any supported capture format to an 8-bit luma plane.
//!
//! Planar formats already carry luma in their first plane, which is copied row
//! by row (dropping stride padding). Packed RGB formats are reduced with the
//! BT.601 integer weights `(77 R + 150 G + 29 B + 128) >> 8`.

use crate::buffer::IntensityBuffer;
use crate::frame::{PixelFormat, RawFrame};
use crate::FrameError;

/// BT.601 luma weights in 8.8 fixed point. They sum to 256.
const LUMA_R: u32 = 77;
const LUMA_G: u32 = 150;
const LUMA_B: u32 = 29;

/// Fill `out` with the luma of `frame`, resizing it to the frame dimensions.
pub fn to_intensity(frame: &RawFrame, out: &mut IntensityBuffer) -> Result<(), FrameError> {
    let width = frame.width;
    let height = frame.height;
    if width == 0 || height == 0 {
        return Err(FrameError::dimension(format!(
            "frame has zero dimension {}x{}",
            width, height
        )));
    }

    let format = frame.format;
    let min_stride = format
        .min_row_stride(width)
        .ok_or_else(|| FrameError::format(format!("{} frame dimensions overflow", format)))?;
    let stride = frame.row_stride();
    if stride < min_stride {
        return Err(FrameError::format(format!(
            "{} row stride {} is narrower than a {}-pixel row ({} bytes)",
            format, stride, width, min_stride
        )));
    }
    let expected = format
        .expected_len(stride, height)
        .ok_or_else(|| FrameError::format(format!("{} frame dimensions overflow", format)))?;
    let pixels = frame.data();
    if pixels.len() != expected {
        return Err(FrameError::format(format!(
            "{} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        )));
    }

    out.ensure_dimensions(width, height);
    let w = width as usize;
    let rows = pixels.chunks(stride).zip(out.as_mut_slice().chunks_exact_mut(w));

    match format {
        PixelFormat::Gray8 | PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::I420 => {
            for (src, dst) in rows {
                dst.copy_from_slice(&src[..w]);
            }
        }
        PixelFormat::Rgb24 => packed_rows_to_luma::<3>(rows, [0, 1, 2]),
        PixelFormat::Rgba32 => packed_rows_to_luma::<4>(rows, [0, 1, 2]),
        PixelFormat::Bgra32 => packed_rows_to_luma::<4>(rows, [2, 1, 0]),
    }
    Ok(())
}

/// `order` gives the byte offsets of R, G and B inside one pixel.
fn packed_rows_to_luma<'s, 'd, const BPP: usize>(
    rows: impl Iterator<Item = (&'s [u8], &'d mut [u8])>,
    order: [usize; 3],
) {
    let [ri, gi, bi] = order;
    for (src, dst) in rows {
        for (px, y) in src.chunks_exact(BPP).zip(dst.iter_mut()) {
            *y = luma(px[ri], px[gi], px[bi]);
        }
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32 + 128) >> 8) as u8
}
