//! cascade_run - run a video through the cascade with stub backends.
//!
//! Real detector and generation backends are external; this binary wires the
//! built-in stubs to the pipeline so the control logic can be exercised and
//! profiled end to end on synthetic footage.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use event_cascade::{
    open_source, CascadeConfig, CascadePipeline, FrameDisposition, ProcessOptions, StubBackend,
    StubGenerator, VideoResult,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file path (TOML). Defaults to CASCADE_CONFIG or builtins.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Video source. Only stub:// synthetic sources are built in.
    #[arg(long, default_value = "stub://demo")]
    video: String,
    /// Cap on processed frames (overrides config).
    #[arg(long)]
    max_frames: Option<usize>,
    /// Target sample rate in frames per second (overrides config).
    #[arg(long)]
    sample_fps: Option<f64>,
    /// Run the full path on every frame, ignoring the gate.
    #[arg(long)]
    force: bool,
    /// Print one line per frame as results arrive instead of a progress bar.
    #[arg(long)]
    stream: bool,
    /// Write the full VideoResult as JSON to this path.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CascadeConfig::load_path(path)?,
        None => CascadeConfig::load()?,
    };

    let mut pipeline = CascadePipeline::new(
        &config,
        Box::new(StubBackend::new()),
        Box::new(StubGenerator::new()),
    )?;

    let mut options = pipeline.default_options();
    if let Some(max_frames) = args.max_frames {
        options.max_frames = Some(max_frames);
    }
    if let Some(sample_fps) = args.sample_fps {
        options.sample_fps = sample_fps;
    }
    options.force_full = args.force;

    let source = open_source(&args.video)?;
    let label = args.video.clone();
    let started = Instant::now();

    let progress = if args.stream {
        None
    } else {
        let bar = match options.max_frames {
            Some(cap) => ProgressBar::new(cap as u64),
            None => ProgressBar::new_spinner(),
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner} {pos} frames {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Some(bar)
    };

    let mut frames = Vec::new();
    let mut events = 0usize;
    let mut failed = 0usize;

    for item in pipeline.stream(source, options) {
        let result = item?;
        if result.is_event {
            events += 1;
        }
        if result.disposition == FrameDisposition::Failed {
            failed += 1;
        }
        if args.stream {
            println!(
                "frame {:>5}  t={:>7.2}s  tier={:<8}  tokens={}/{}  {}",
                result.frame_idx,
                result.timestamp,
                result.tier.as_str(),
                result.tokens_used,
                result.tokens_total,
                result
                    .caption
                    .as_deref()
                    .unwrap_or(match result.disposition {
                        FrameDisposition::Failed => "<failed>",
                        _ => "<skipped>",
                    }),
            );
        } else if let Some(bar) = &progress {
            bar.inc(1);
            bar.set_message(format!("{} events", events));
        }
        frames.push(result);
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    let total_time = started.elapsed().as_secs_f64();
    let processed = frames.len();
    let result = VideoResult {
        source: label,
        processed_frames: processed,
        event_frames: events,
        failed_frames: failed,
        frames,
        total_time,
        fps: processed as f64 / total_time.max(1e-6),
    };

    println!(
        "{}: {} frames, {} events ({:.0}%), {} failed, {:.1} fps, mean token reduction {:.1}%",
        result.source,
        result.processed_frames,
        result.event_frames,
        result.event_ratio() * 100.0,
        result.failed_frames,
        result.fps,
        result.mean_token_reduction() * 100.0,
    );

    if let Some(out) = &args.out {
        let json = serde_json::to_string_pretty(&result)?;
        fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
        log::info!("wrote results to {}", out.display());
    }

    Ok(())
}
