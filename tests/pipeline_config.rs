use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use edge_pipeline::config::PipelineConfig;
use edge_pipeline::{GradientKernel, Magnitude, OutputMode, PixelFormat};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "EDGE_CONFIG",
        "EDGE_BACKEND",
        "EDGE_MODE",
        "EDGE_THRESHOLD",
        "EDGE_LOW_THRESHOLD",
        "EDGE_HIGH_THRESHOLD",
        "EDGE_MAGNITUDE",
        "EDGE_KERNEL",
        "EDGE_PIXEL_FORMAT",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "detector": {
                "backend": "canny",
                "threshold": 80,
                "low_threshold": 40,
                "high_threshold": 120,
                "magnitude": "l1",
                "kernel": "prewitt"
            },
            "mode": "edges",
            "capture": {
                "width": 1280,
                "height": 720,
                "fps": 15,
                "pixel_format": "nv21"
            },
            "diagnostics": {
                "misconfig_threshold": 10,
                "log_interval_secs": 2
            }
        }"#,
    );

    std::env::set_var("EDGE_CONFIG", file.path());
    std::env::set_var("EDGE_MODE", "passthrough");
    std::env::set_var("EDGE_HIGH_THRESHOLD", "160");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.backend, "canny");
    assert_eq!(cfg.detector.threshold, 80);
    assert_eq!(cfg.detector.low_threshold, 40);
    assert_eq!(cfg.detector.high_threshold, 160);
    assert_eq!(cfg.detector.magnitude, Magnitude::L1);
    assert_eq!(cfg.detector.kernel, GradientKernel::Prewitt);
    assert_eq!(cfg.mode, OutputMode::Passthrough);
    assert_eq!(cfg.capture.width, 1280);
    assert_eq!(cfg.capture.height, 720);
    assert_eq!(cfg.capture.fps, 15);
    assert_eq!(cfg.capture.pixel_format, PixelFormat::Nv21);
    assert_eq!(cfg.misconfig_threshold, 10);
    assert_eq!(cfg.log_interval, Duration::from_secs(2));

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load config");
    assert_eq!(cfg.backend, "sobel");
    assert_eq!(cfg.detector.threshold, 100);
    assert_eq!(cfg.detector.low_threshold, 50);
    assert_eq!(cfg.detector.high_threshold, 150);
    assert_eq!(cfg.detector.magnitude, Magnitude::L2);
    assert_eq!(cfg.mode, OutputMode::Edges);
    assert_eq!(cfg.capture.pixel_format, PixelFormat::Nv12);

    clear_env();
}

#[test]
fn env_overrides_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EDGE_BACKEND", "Canny");
    std::env::set_var("EDGE_THRESHOLD", "64");
    std::env::set_var("EDGE_PIXEL_FORMAT", "rgba");
    std::env::set_var("EDGE_KERNEL", "prewitt");

    let cfg = PipelineConfig::load_from_path(None).expect("load config");
    assert_eq!(cfg.backend, "canny");
    assert_eq!(cfg.detector.threshold, 64);
    assert_eq!(cfg.capture.pixel_format, PixelFormat::Rgba32);
    assert_eq!(cfg.detector.kernel, GradientKernel::Prewitt);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EDGE_THRESHOLD", "many");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("EDGE_THRESHOLD", "0");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("EDGE_LOW_THRESHOLD", "200");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("EDGE_BACKEND", "laplace");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("EDGE_PIXEL_FORMAT", "yuyv");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{"capture": {"fps": 0}}"#);
    assert!(PipelineConfig::load_from_path(Some(file.path())).is_err());

    let file = write_config("{ not json");
    assert!(PipelineConfig::load_from_path(Some(file.path())).is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EDGE_CONFIG", "/nonexistent/edge.json");
    assert!(PipelineConfig::load().is_err());

    clear_env();
}
