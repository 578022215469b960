use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::frame::{FrameTimestamp, PixelFormat, RawFrame};

const BACKGROUND_LUMA: u8 = 32;
const BAR_LUMA: u8 = 224;
const NEUTRAL_CHROMA: u8 = 128;
/// Horizontal bar movement per frame, in pixels.
const BAR_STEP: u32 = 4;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Peak luma noise added per pixel (0 disables noise).
    pub noise: u8,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Nv12,
            noise: 0,
            seed: 0x5eed,
        }
    }
}

/// A bright vertical bar sliding over a dark background.
///
/// Every frame has exactly two vertical luma steps (the bar's edges), which
/// makes the detector output easy to check by eye and in tests.
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    luma: Vec<u8>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source needs non-zero dimensions"));
        }
        let len = config.width as usize * config.height as usize;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            luma: vec![0; len],
            config,
            frame_count: 0,
        })
    }

    /// Columns `[start, end)` covered by the bar in frame `index`.
    pub fn bar_span(&self, index: u64) -> (u32, u32) {
        let width = self.config.width;
        let bar_width = (width / 8).max(1);
        let travel = u64::from(width.saturating_sub(bar_width).max(1));
        let start = (index * u64::from(BAR_STEP) % travel) as u32;
        (start, (start + bar_width).min(width))
    }

    fn render_luma(&mut self) {
        let width = self.config.width as usize;
        let (start, end) = self.bar_span(self.frame_count);
        let noise = i16::from(self.config.noise);
        for row in self.luma.chunks_exact_mut(width) {
            for (x, px) in row.iter_mut().enumerate() {
                let base = if (start as usize..end as usize).contains(&x) {
                    BAR_LUMA
                } else {
                    BACKGROUND_LUMA
                };
                *px = if noise == 0 {
                    base
                } else {
                    let jitter = self.rng.gen_range(-noise..=noise);
                    (i16::from(base) + jitter).clamp(0, 255) as u8
                };
            }
        }
    }

    fn encode(&self) -> Vec<u8> {
        let format = self.config.format;
        match format {
            PixelFormat::Gray8 => self.luma.clone(),
            PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::I420 => {
                let tight = self.config.width as usize;
                let total = format
                    .expected_len(tight, self.config.height)
                    .unwrap_or(self.luma.len());
                let mut data = Vec::with_capacity(total);
                data.extend_from_slice(&self.luma);
                data.resize(total, NEUTRAL_CHROMA);
                data
            }
            PixelFormat::Rgb24 => self.luma.iter().flat_map(|&y| [y, y, y]).collect(),
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => {
                self.luma.iter().flat_map(|&y| [y, y, y, 255]).collect()
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: {}x{} {} (noise {})",
            self.config.width,
            self.config.height,
            self.config.format,
            self.config.noise
        );
        Ok(())
    }

    fn next_frame(&mut self, timestamp: FrameTimestamp) -> Result<RawFrame> {
        self.render_luma();
        let data = self.encode();
        self.frame_count += 1;
        Ok(RawFrame::new(
            data,
            self.config.width,
            self.config.height,
            self.config.format,
            timestamp,
        ))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            description: format!(
                "synthetic {}x{} {}",
                self.config.width, self.config.height, self.config.format
            ),
        }
    }
}
