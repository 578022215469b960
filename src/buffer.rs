//! Per-frame working buffers.
//!
//! `IntensityBuffer` and `EdgeMap` are single-channel, tightly packed, one byte
//! per pixel. `FrameArena` owns one of each plus the gradient scratch, and only
//! reallocates when the frame dimensions change.

use crate::detect::GradientScratch;
use crate::FrameError;

/// Single-channel 8-bit luma, same dimensions as its source frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntensityBuffer {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl IntensityBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let mut buffer = Self::default();
        buffer.ensure_dimensions(width, height);
        buffer
    }

    /// Wrap existing luma bytes. The length is checked when a detector runs.
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Resize to `width` x `height`. Returns true when the storage was rebuilt.
    pub fn ensure_dimensions(&mut self, width: u32, height: u32) -> bool {
        resize_plane(&mut self.data, &mut self.width, &mut self.height, width, height)
    }

    /// Reject zero-sized buffers and buffers whose length disagrees with their dimensions.
    pub fn check_dimensions(&self) -> Result<(), FrameError> {
        check_plane("intensity buffer", self.width, self.height, self.data.len())
    }

    pub(crate) fn release(&mut self) {
        self.data = Vec::new();
        self.width = 0;
        self.height = 0;
    }
}

/// Detector output: 255 marks an edge pixel, 0 background.
///
/// In passthrough mode the map carries the luma values instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeMap {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl EdgeMap {
    pub const EDGE: u8 = 255;
    pub const BACKGROUND: u8 = 0;

    pub fn new(width: u32, height: u32) -> Self {
        let mut map = Self::default();
        map.ensure_dimensions(width, height);
        map
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Number of non-background pixels.
    pub fn edge_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != Self::BACKGROUND).count()
    }

    pub fn ensure_dimensions(&mut self, width: u32, height: u32) -> bool {
        resize_plane(&mut self.data, &mut self.width, &mut self.height, width, height)
    }

    pub fn check_dimensions(&self) -> Result<(), FrameError> {
        check_plane("edge map", self.width, self.height, self.data.len())
    }

    pub(crate) fn release(&mut self) {
        self.data = Vec::new();
        self.width = 0;
        self.height = 0;
    }
}

fn resize_plane(
    data: &mut Vec<u8>,
    cur_width: &mut u32,
    cur_height: &mut u32,
    width: u32,
    height: u32,
) -> bool {
    let len = width as usize * height as usize;
    if *cur_width == width && *cur_height == height && data.len() == len {
        return false;
    }
    data.clear();
    data.resize(len, 0);
    *cur_width = width;
    *cur_height = height;
    true
}

fn check_plane(what: &str, width: u32, height: u32, len: usize) -> Result<(), FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::dimension(format!(
            "{} has zero dimension {}x{}",
            what, width, height
        )));
    }
    let expected = width as usize * height as usize;
    if len != expected {
        return Err(FrameError::dimension(format!(
            "{} length mismatch: {}x{} needs {}, got {}",
            what, width, height, expected, len
        )));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// FrameArena
// ----------------------------------------------------------------------------

/// Pre-sized buffers reused across frames of the same size.
///
/// Owned exclusively by the processing lane.
#[derive(Debug, Default)]
pub struct FrameArena {
    pub intensity: IntensityBuffer,
    pub edges: EdgeMap,
    pub scratch: GradientScratch,
    reallocations: u64,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size every buffer for a `width` x `height` frame.
    pub fn prepare(&mut self, width: u32, height: u32) {
        let rebuilt_intensity = self.intensity.ensure_dimensions(width, height);
        let rebuilt_edges = self.edges.ensure_dimensions(width, height);
        let rebuilt_scratch = self.scratch.ensure_len(width as usize * height as usize);
        if rebuilt_intensity || rebuilt_edges || rebuilt_scratch {
            self.reallocations += 1;
            log::debug!("frame arena resized to {}x{}", width, height);
        }
    }

    /// How many times `prepare` had to rebuild storage.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Free all storage (pipeline teardown).
    pub fn release(&mut self) {
        self.intensity.release();
        self.edges.release();
        self.scratch.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_reuses_storage_for_same_dimensions() {
        let mut arena = FrameArena::new();
        arena.prepare(64, 48);
        arena.prepare(64, 48);
        arena.prepare(64, 48);
        assert_eq!(arena.reallocations(), 1);

        arena.prepare(32, 24);
        assert_eq!(arena.reallocations(), 2);
        assert_eq!(arena.intensity.as_slice().len(), 32 * 24);
        assert_eq!(arena.edges.as_bytes().len(), 32 * 24);
    }

    #[test]
    fn release_frees_storage() {
        let mut arena = FrameArena::new();
        arena.prepare(16, 16);
        arena.release();
        assert!(arena.intensity.as_slice().is_empty());
        assert_eq!(arena.edges.width, 0);
    }

    #[test]
    fn check_dimensions_rejects_zero_and_mismatch() {
        let zero = IntensityBuffer::from_vec(0, 4, vec![]);
        assert_eq!(zero.check_dimensions().unwrap_err().code(), "DIMENSION_ERROR");

        let short = IntensityBuffer::from_vec(4, 4, vec![0u8; 15]);
        assert!(short.check_dimensions().is_err());

        let ok = IntensityBuffer::from_vec(4, 4, vec![0u8; 16]);
        assert!(ok.check_dimensions().is_ok());
    }

    #[test]
    fn edge_map_accessors() {
        let mut map = EdgeMap::new(3, 2);
        map.as_mut_slice()[4] = EdgeMap::EDGE;
        assert_eq!(map.get(1, 1), Some(EdgeMap::EDGE));
        assert_eq!(map.get(3, 0), None);
        assert_eq!(map.edge_count(), 1);
    }
}
