use anyhow::{anyhow, Result};
use serde::Serialize;
use std::str::FromStr;

/// Default binary threshold on gradient magnitude (Sobel, L2 scale: 0..=1442).
pub const DEFAULT_THRESHOLD: u32 = 100;
/// Default Canny hysteresis thresholds.
pub const DEFAULT_LOW_THRESHOLD: u32 = 50;
pub const DEFAULT_HIGH_THRESHOLD: u32 = 150;

/// 3x3 separable gradient operator.
///
/// Both kernels differentiate with `[-1, 0, 1]` and smooth across the other axis
/// with the weights returned by `smoothing`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKernel {
    /// Smoothing `[1, 2, 1]`.
    #[default]
    Sobel,
    /// Smoothing `[1, 1, 1]`.
    Prewitt,
}

impl GradientKernel {
    /// `(outer, center)` smoothing weights.
    pub fn smoothing(self) -> (i32, i32) {
        match self {
            GradientKernel::Sobel => (1, 2),
            GradientKernel::Prewitt => (1, 1),
        }
    }
}

impl FromStr for GradientKernel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sobel" => Ok(GradientKernel::Sobel),
            "prewitt" => Ok(GradientKernel::Prewitt),
            other => Err(anyhow!("unknown gradient kernel '{}'", other)),
        }
    }
}

/// Gradient magnitude formula.
///
/// `L2` is `sqrt(gx² + gy²)`. It is evaluated exactly, without floating point,
/// by comparing `gx² + gy²` against the squared threshold. `L1` is `|gx| + |gy|`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Magnitude {
    #[default]
    L2,
    L1,
}

impl Magnitude {
    /// Monotonic strength of a gradient: squared norm for L2, the norm itself for L1.
    #[inline]
    pub fn strength(self, gx: i32, gy: i32) -> u32 {
        match self {
            Magnitude::L2 => (gx * gx + gy * gy) as u32,
            Magnitude::L1 => gx.unsigned_abs() + gy.unsigned_abs(),
        }
    }

    /// Threshold expressed on the `strength` scale.
    #[inline]
    pub fn level(self, threshold: u32) -> u32 {
        match self {
            Magnitude::L2 => threshold.saturating_mul(threshold),
            Magnitude::L1 => threshold,
        }
    }
}

impl FromStr for Magnitude {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Magnitude::L2),
            "l1" | "manhattan" => Ok(Magnitude::L1),
            other => Err(anyhow!("unknown magnitude formula '{}'", other)),
        }
    }
}

/// Tunable detector configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DetectorParams {
    pub kernel: GradientKernel,
    pub magnitude: Magnitude,
    /// Binary threshold: magnitude >= threshold marks an edge.
    pub threshold: u32,
    /// Canny: weak edge threshold.
    pub low_threshold: u32,
    /// Canny: strong edge threshold.
    pub high_threshold: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            kernel: GradientKernel::default(),
            magnitude: Magnitude::default(),
            threshold: DEFAULT_THRESHOLD,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

impl DetectorParams {
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_magnitude(mut self, magnitude: Magnitude) -> Self {
        self.magnitude = magnitude;
        self
    }

    pub fn with_kernel(mut self, kernel: GradientKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_hysteresis(mut self, low: u32, high: u32) -> Self {
        self.low_threshold = low;
        self.high_threshold = high;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(anyhow!("threshold must be greater than zero"));
        }
        if self.low_threshold == 0 {
            return Err(anyhow!("low_threshold must be greater than zero"));
        }
        if self.low_threshold > self.high_threshold {
            return Err(anyhow!(
                "low_threshold ({}) must not exceed high_threshold ({})",
                self.low_threshold,
                self.high_threshold
            ));
        }
        Ok(())
    }
}
