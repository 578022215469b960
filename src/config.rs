use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::detect::{
    BackendRegistry, DetectorParams, GradientKernel, Magnitude, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD,
    DEFAULT_THRESHOLD,
};
use crate::frame::PixelFormat;
use crate::pipeline::{OutputMode, DEFAULT_MISCONFIG_THRESHOLD};

const DEFAULT_BACKEND: &str = "sobel";
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: u32 = 30;
const DEFAULT_LOG_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    detector: Option<DetectorConfigFile>,
    mode: Option<String>,
    capture: Option<CaptureConfigFile>,
    diagnostics: Option<DiagnosticsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    threshold: Option<u32>,
    low_threshold: Option<u32>,
    high_threshold: Option<u32>,
    magnitude: Option<String>,
    kernel: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    pixel_format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DiagnosticsConfigFile {
    misconfig_threshold: Option<u64>,
    log_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Registry name of the edge backend.
    pub backend: String,
    pub detector: DetectorParams,
    pub mode: OutputMode,
    pub capture: CaptureSettings,
    /// Leading format failures before the capture is reported misconfigured.
    pub misconfig_threshold: u64,
    pub log_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
}

impl CaptureSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            detector: DetectorParams::default(),
            mode: OutputMode::default(),
            capture: CaptureSettings {
                width: DEFAULT_CAPTURE_WIDTH,
                height: DEFAULT_CAPTURE_HEIGHT,
                fps: DEFAULT_CAPTURE_FPS,
                pixel_format: PixelFormat::Nv12,
            },
            misconfig_threshold: DEFAULT_MISCONFIG_THRESHOLD,
            log_interval: Duration::from_secs(DEFAULT_LOG_INTERVAL_SECS),
        }
    }
}

impl PipelineConfig {
    /// Load from the file named by `EDGE_CONFIG` (if set), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EDGE_CONFIG").ok();
        Self::load_from_path(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then env overrides.
    pub fn load_from_path(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let detector_file = file.detector.unwrap_or_default();
        let capture_file = file.capture.unwrap_or_default();
        let diagnostics_file = file.diagnostics.unwrap_or_default();

        let mut detector = DetectorParams::default()
            .with_threshold(detector_file.threshold.unwrap_or(DEFAULT_THRESHOLD))
            .with_hysteresis(
                detector_file.low_threshold.unwrap_or(DEFAULT_LOW_THRESHOLD),
                detector_file.high_threshold.unwrap_or(DEFAULT_HIGH_THRESHOLD),
            );
        if let Some(magnitude) = detector_file.magnitude.as_deref() {
            detector = detector.with_magnitude(magnitude.parse::<Magnitude>()?);
        }
        if let Some(kernel) = detector_file.kernel.as_deref() {
            detector = detector.with_kernel(kernel.parse::<GradientKernel>()?);
        }

        let mode = match file.mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => defaults.mode,
        };
        let pixel_format = match capture_file.pixel_format.as_deref() {
            Some(tag) => tag.parse::<PixelFormat>()?,
            None => defaults.capture.pixel_format,
        };

        Ok(Self {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            detector,
            mode,
            capture: CaptureSettings {
                width: capture_file.width.unwrap_or(defaults.capture.width),
                height: capture_file.height.unwrap_or(defaults.capture.height),
                fps: capture_file.fps.unwrap_or(defaults.capture.fps),
                pixel_format,
            },
            misconfig_threshold: diagnostics_file
                .misconfig_threshold
                .unwrap_or(defaults.misconfig_threshold),
            log_interval: diagnostics_file
                .log_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.log_interval),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("EDGE_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend.trim().to_string();
            }
        }
        if let Ok(mode) = std::env::var("EDGE_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode.parse()?;
            }
        }
        if let Some(threshold) = env_u32("EDGE_THRESHOLD")? {
            self.detector.threshold = threshold;
        }
        if let Some(low) = env_u32("EDGE_LOW_THRESHOLD")? {
            self.detector.low_threshold = low;
        }
        if let Some(high) = env_u32("EDGE_HIGH_THRESHOLD")? {
            self.detector.high_threshold = high;
        }
        if let Ok(magnitude) = std::env::var("EDGE_MAGNITUDE") {
            if !magnitude.trim().is_empty() {
                self.detector.magnitude = magnitude.parse()?;
            }
        }
        if let Ok(kernel) = std::env::var("EDGE_KERNEL") {
            if !kernel.trim().is_empty() {
                self.detector.kernel = kernel.parse()?;
            }
        }
        if let Ok(format) = std::env::var("EDGE_PIXEL_FORMAT") {
            if !format.trim().is_empty() {
                self.capture.pixel_format = format.parse()?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.backend = self.backend.to_ascii_lowercase();
        let registry = BackendRegistry::with_builtin(self.detector);
        if !registry.contains(&self.backend) {
            return Err(anyhow!(
                "unknown backend '{}' (expected one of: {})",
                self.backend,
                registry.list().join(", ")
            ));
        }
        self.detector.validate()?;
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.capture.fps == 0 {
            return Err(anyhow!("capture fps must be greater than zero"));
        }
        if self.misconfig_threshold == 0 {
            return Err(anyhow!("misconfig_threshold must be greater than zero"));
        }
        if self.log_interval.is_zero() {
            return Err(anyhow!("log_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}
