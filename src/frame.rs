//! Raw frame container.
//!
//! - `RawFrame`: one captured camera image. Bytes are private to the crate.
//! - `PixelFormat`: closed set of capture formats the converter understands.
//! - `FrameTimestamp`: monotonic capture time in microseconds.
//!
//! A `RawFrame` has no `Clone`. Ownership moves from the capture callback into
//! the queue slot and from there into exactly one processing step, so no frame
//! can be processed twice:
//!
//! ```compile_fail
//! use edge_pipeline::{FrameTimestamp, PixelFormat, RawFrame};
//!
//! let frame = RawFrame::new(vec![0u8; 4], 2, 2, PixelFormat::Gray8, FrameTimestamp::ZERO);
//! let copy = frame.clone();
//! ```

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::FrameError;

// ----------------------------------------------------------------------------
// FrameTimestamp
// ----------------------------------------------------------------------------

/// Monotonic capture time, microseconds since the session epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FrameTimestamp(u64);

impl FrameTimestamp {
    pub const ZERO: FrameTimestamp = FrameTimestamp(0);

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1000))
    }

    /// Time elapsed since `epoch`, saturating at zero for instants before it.
    pub fn since(epoch: Instant) -> Self {
        let elapsed = Instant::now().saturating_duration_since(epoch);
        Self(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    pub fn as_millis(self) -> u64 {
        self.0 / 1000
    }
}

// ----------------------------------------------------------------------------
// PixelFormat
// ----------------------------------------------------------------------------

/// Capture pixel formats.
///
/// `row_stride` below always means the byte stride of the first plane (luma for
/// planar formats, the packed plane otherwise).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Single 8-bit luma plane.
    Gray8,
    /// Luma plane followed by interleaved U/V at quarter resolution.
    Nv12,
    /// Luma plane followed by interleaved V/U at quarter resolution.
    Nv21,
    /// Luma plane followed by separate U and V quarter planes.
    I420,
    Rgb24,
    Rgba32,
    Bgra32,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::Gray8,
        PixelFormat::Nv12,
        PixelFormat::Nv21,
        PixelFormat::I420,
        PixelFormat::Rgb24,
        PixelFormat::Rgba32,
        PixelFormat::Bgra32,
    ];

    /// Bytes per pixel in the first plane.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::I420 => 1,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => 4,
        }
    }

    /// Tight row stride for `width` pixels.
    pub fn min_row_stride(self, width: u32) -> Option<usize> {
        (width as usize).checked_mul(self.bytes_per_pixel())
    }

    /// Exact buffer length for a frame of this format.
    ///
    /// 4:2:0 chroma planes use `ceil(row_stride / 2)` bytes per component per row
    /// and `ceil(height / 2)` rows.
    pub fn expected_len(self, row_stride: usize, height: u32) -> Option<usize> {
        let h = height as usize;
        let first_plane = row_stride.checked_mul(h)?;
        match self {
            PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::I420 => {
                let chroma = row_stride
                    .div_ceil(2)
                    .checked_mul(2)?
                    .checked_mul(h.div_ceil(2))?;
                first_plane.checked_add(chroma)
            }
            _ => Some(first_plane),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Nv21 => "nv21",
            PixelFormat::I420 => "i420",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgba32 => "rgba32",
            PixelFormat::Bgra32 => "bgra32",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = FrameError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let normalized = tag.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "gray8" | "gray" | "y8" => Ok(PixelFormat::Gray8),
            "nv12" => Ok(PixelFormat::Nv12),
            "nv21" => Ok(PixelFormat::Nv21),
            // Android's YUV_420_888 arrives here as three tightly packed planes.
            "i420" | "yuv420p" | "yuv_420_888" => Ok(PixelFormat::I420),
            "rgb24" | "rgb" => Ok(PixelFormat::Rgb24),
            "rgba32" | "rgba" => Ok(PixelFormat::Rgba32),
            "bgra32" | "bgra" => Ok(PixelFormat::Bgra32),
            _ => Err(FrameError::format(format!(
                "unrecognized pixel format '{}'",
                tag
            ))),
        }
    }
}

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// One captured camera image before any processing.
///
/// Immutable once built. Explicitly NOT implementing `Clone`.
pub struct RawFrame {
    /// Pixel data in `format` layout. Read only by the converter.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,

    /// Monotonic capture time.
    pub timestamp: FrameTimestamp,

    /// Bytes per row of the first plane. May exceed the tight stride.
    row_stride: usize,

    /// Assigned by the queue on acceptance.
    sequence: u64,
}

impl RawFrame {
    /// Build a frame with a tight row stride.
    ///
    /// Nothing is validated here. The converter rejects inconsistent frames with
    /// `FrameError`, which keeps this call cheap on the capture lane.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: FrameTimestamp,
    ) -> Self {
        let row_stride = format.min_row_stride(width).unwrap_or(usize::MAX);
        Self {
            data,
            width,
            height,
            format,
            timestamp,
            row_stride,
            sequence: 0,
        }
    }

    /// Declare a padded row stride (camera HALs commonly align rows).
    pub fn with_row_stride(mut self, row_stride: usize) -> Self {
        self.row_stride = row_stride;
        self
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Queue sequence number (0 until the frame has been queued).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pixel bytes stay out of logs.
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("timestamp", &self.timestamp)
            .field("row_stride", &self.row_stride)
            .field("sequence", &self.sequence)
            .field("byte_len", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_len_matches_common_layouts() {
        assert_eq!(PixelFormat::Gray8.expected_len(640, 480), Some(640 * 480));
        assert_eq!(PixelFormat::Nv12.expected_len(640, 480), Some(640 * 480 * 3 / 2));
        assert_eq!(PixelFormat::I420.expected_len(640, 480), Some(640 * 480 * 3 / 2));
        assert_eq!(PixelFormat::Rgb24.expected_len(640 * 3, 480), Some(640 * 480 * 3));
        assert_eq!(PixelFormat::Bgra32.expected_len(640 * 4, 480), Some(640 * 480 * 4));
    }

    #[test]
    fn expected_len_rounds_odd_chroma_up() {
        // 3x3 luma, chroma is 2x2 samples of 2 bytes.
        assert_eq!(PixelFormat::Nv21.expected_len(3, 3), Some(9 + 8));
    }

    #[test]
    fn pixel_format_parses_tags() {
        assert_eq!("NV12".parse::<PixelFormat>(), Ok(PixelFormat::Nv12));
        assert_eq!(" rgba ".parse::<PixelFormat>(), Ok(PixelFormat::Rgba32));
        assert_eq!("yuv_420_888".parse::<PixelFormat>(), Ok(PixelFormat::I420));
        for format in PixelFormat::ALL {
            assert_eq!(format.as_str().parse::<PixelFormat>(), Ok(format));
        }
    }

    #[test]
    fn unknown_tag_is_format_error() {
        let err = "yuyv".parse::<PixelFormat>().unwrap_err();
        assert_eq!(err.code(), "FORMAT_ERROR");
    }

    #[test]
    fn raw_frame_defaults_to_tight_stride() {
        let frame = RawFrame::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb24, FrameTimestamp::ZERO);
        assert_eq!(frame.row_stride(), 6);
        assert_eq!(frame.sequence(), 0);

        let padded = RawFrame::new(vec![0u8; 16], 2, 2, PixelFormat::Gray8, FrameTimestamp::ZERO)
            .with_row_stride(8);
        assert_eq!(padded.row_stride(), 8);
    }

    #[test]
    fn debug_omits_pixel_bytes() {
        let frame = RawFrame::new(vec![7u8; 4], 2, 2, PixelFormat::Gray8, FrameTimestamp::ZERO);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("byte_len: 4"));
        assert!(!rendered.contains("[7, 7"));
    }

    #[test]
    fn timestamp_conversions() {
        let ts = FrameTimestamp::from_millis(33);
        assert_eq!(ts.as_micros(), 33_000);
        assert_eq!(ts.as_millis(), 33);
        assert!(FrameTimestamp::from_micros(1) > FrameTimestamp::ZERO);
    }
}
