//! edged - live edge-detection daemon
//!
//! This daemon:
//! 1. Loads the pipeline configuration (file + env)
//! 2. Runs a capture thread that submits frames at the configured rate
//! 3. Processes the latest frame on the pipeline's processing lane
//! 4. Streams viewer JSON lines (one per published frame) to stdout or a file
//! 5. Logs diagnostics periodically and stops on Ctrl-C or after `--seconds`

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use edge_pipeline::ingest::{open_source, SourceStats};
use edge_pipeline::pipeline::FrameSubmitter;
use edge_pipeline::{
    DisplaySink, FrameSource, Pipeline, PipelineConfig, SubmitOutcome, SyntheticConfig, ViewerSink,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "EDGE_CONFIG")]
    config: Option<PathBuf>,
    /// Local image to resubmit every tick. Defaults to the synthetic pattern.
    #[arg(long)]
    input: Option<String>,
    /// Stop after this many seconds (runs until Ctrl-C otherwise).
    #[arg(long)]
    seconds: Option<u64>,
    /// Write viewer JSON lines here instead of stdout.
    #[arg(long)]
    viewer_out: Option<PathBuf>,
    /// Do not emit viewer frames.
    #[arg(long)]
    no_viewer: bool,
    /// Peak luma noise for the synthetic pattern.
    #[arg(long, default_value_t = 0)]
    noise: u8,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = PipelineConfig::load_from_path(args.config.as_deref())?;

    let mut sinks: Vec<Box<dyn DisplaySink>> = Vec::new();
    if !args.no_viewer {
        sinks.push(Box::new(viewer_sink(args.viewer_out.as_ref())?));
    }

    let synthetic = SyntheticConfig {
        width: cfg.capture.width,
        height: cfg.capture.height,
        format: cfg.capture.pixel_format,
        noise: args.noise,
        ..SyntheticConfig::default()
    };
    let mut source = open_source(args.input.as_deref(), synthetic)?;
    source.connect()?;

    let pipeline = Pipeline::from_config(&cfg, sinks)?;
    log::info!(
        "edged running: backend={} mode={:?} capture {}x{} {} @ {} fps",
        cfg.backend,
        cfg.mode,
        cfg.capture.width,
        cfg.capture.height,
        cfg.capture.pixel_format,
        cfg.capture.fps
    );
    log::info!("detector params: {}", serde_json::to_string(&cfg.detector)?);

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let capture = spawn_capture(
        source,
        pipeline.submitter(),
        cfg.capture.frame_interval(),
        running.clone(),
    )?;

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut last_health_log = Instant::now();
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if capture.is_finished() {
            log::warn!("capture thread exited early");
            break;
        }
        if last_health_log.elapsed() >= cfg.log_interval {
            let snap = pipeline.diagnostics();
            log::info!(
                "frames submitted={} processed={} dropped={} lost={} format_errors={} avg_latency={:.2}ms",
                snap.frames_submitted,
                snap.frames_processed,
                snap.frames_superseded,
                snap.frames_lost,
                snap.format_errors,
                snap.average_latency_ms
            );
            last_health_log = Instant::now();
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    log::info!("edged stopping");
    running.store(false, Ordering::SeqCst);
    let stats = capture
        .join()
        .map_err(|_| anyhow!("capture thread panicked"))??;
    log::info!(
        "source {} captured {} frames",
        stats.description,
        stats.frames_captured
    );

    let final_snapshot = pipeline.shutdown()?;
    log::info!("final diagnostics: {}", serde_json::to_string(&final_snapshot)?);
    Ok(())
}

fn viewer_sink(path: Option<&PathBuf>) -> Result<ViewerSink> {
    let writer: Box<dyn Write + Send> = match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create viewer output {}", path.display()))?;
            log::info!("viewer frames -> {}", path.display());
            Box::new(BufWriter::new(file))
        }
        None => Box::new(std::io::stdout()),
    };
    ViewerSink::spawn(writer)
}

fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    submitter: FrameSubmitter,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<SourceStats>>> {
    std::thread::Builder::new()
        .name("edge-capture".into())
        .spawn(move || {
            let started = Instant::now();
            let mut ticks: u32 = 0;
            while running.load(Ordering::SeqCst) {
                if !source.is_healthy() {
                    return Err(anyhow!("frame source unhealthy"));
                }
                let frame = source.next_frame(submitter.now())?;
                if matches!(submitter.submit_frame(frame), SubmitOutcome::Closed) {
                    break;
                }
                ticks = ticks.wrapping_add(1);
                let next_tick = started + interval * ticks;
                std::thread::sleep(next_tick.saturating_duration_since(Instant::now()));
            }
            Ok(source.stats())
        })
        .context("failed to spawn capture thread")
}
