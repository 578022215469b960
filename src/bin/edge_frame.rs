//! edge_frame - run the edge detector once over a still image

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use image::GrayImage;
use std::path::PathBuf;
use std::sync::Arc;

use edge_pipeline::ingest::ImageFileSource;
use edge_pipeline::{
    BackendRegistry, ChannelSink, Diagnostics, FrameProcessor, FrameSource, FrameTimestamp,
    OutputMode, PipelineConfig, ResultPublisher,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input image (PNG or JPEG).
    input: PathBuf,
    /// Output PNG path.
    #[arg(long, default_value = "edges.png")]
    out: PathBuf,
    /// JSON config file.
    #[arg(long, env = "EDGE_CONFIG")]
    config: Option<PathBuf>,
    /// Backend name (sobel, canny). Overrides the config.
    #[arg(long)]
    backend: Option<String>,
    /// Binary threshold. Overrides the config.
    #[arg(long)]
    threshold: Option<u32>,
    /// Output mode (edges, passthrough). Overrides the config.
    #[arg(long)]
    mode: Option<OutputMode>,
    /// Print the result metadata as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PipelineConfig::load_from_path(args.config.as_deref())?;
    if let Some(threshold) = args.threshold {
        cfg.detector = cfg.detector.with_threshold(threshold);
        cfg.detector.validate()?;
    }
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    let backend_name = args.backend.unwrap_or_else(|| cfg.backend.clone());

    let mut registry = BackendRegistry::with_builtin(cfg.detector);
    let backend = registry.take(&backend_name.to_ascii_lowercase())?;

    let diagnostics = Arc::new(Diagnostics::new());
    let (sink, results) = ChannelSink::bounded(1);
    let publisher = ResultPublisher::with_sinks(diagnostics.clone(), vec![Box::new(sink)]);
    let mut processor = FrameProcessor::new(backend, publisher, cfg.mode, diagnostics);

    let mut source = ImageFileSource::open(&args.input)?;
    source.connect()?;
    let frame = source.next_frame(FrameTimestamp::ZERO)?;
    let report = processor
        .process(frame)
        .with_context(|| format!("failed to process {}", args.input.display()))?;
    let result = results
        .try_recv()
        .map_err(|_| anyhow!("no result was published"))?;

    let (width, height) = (result.width, result.height);
    let edges = GrayImage::from_raw(width, height, result.edge_map.clone())
        .ok_or_else(|| anyhow!("edge map does not fit {}x{}", width, height))?;
    edges
        .save(&args.out)
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    let edge_pixels = result.edge_map.iter().filter(|&&v| v != 0).count();
    log::info!(
        "{}: {}x{} {} backend={} nonzero={} in {:.2}ms -> {}",
        args.input.display(),
        width,
        height,
        match cfg.mode {
            OutputMode::Edges => "edges",
            OutputMode::Passthrough => "passthrough",
        },
        processor.backend_name(),
        edge_pixels,
        report.processing.as_secs_f64() * 1000.0,
        args.out.display()
    );
    if args.json {
        println!("{}", serde_json::to_string(&result)?);
    }
    processor.release();
    Ok(())
}
