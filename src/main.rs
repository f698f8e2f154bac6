mod background;
mod config;
mod error;
mod layout;
mod media;
mod pipeline;
mod reconcile;
mod segmentation;
mod similarity;
mod worker;

use std::fs;
use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;

use config::{JobResult, JobSpec};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Job document path; `-` reads the JSON from stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging. Diagnostics go to stderr; stdout carries the
    // structured result.
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("scenemask starting");

    let (result, code) = match run(&args) {
        Ok(processed_frames) => (JobResult::success(processed_frames), 0),
        Err(e) => {
            tracing::error!("{e:#}");
            (JobResult::failure(format!("{e:#}")), 1)
        }
    };

    match serde_json::to_string(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("failed to serialize result: {e}");
            std::process::exit(1);
        }
    }
    std::process::exit(code);
}

fn run(args: &Args) -> Result<u64> {
    let spec = read_job(&args.input)?;

    tracing::info!("Input: {}", spec.input_video.display());
    tracing::info!("Scene: {}s - {}s", spec.scene_start, spec.scene_end);
    tracing::info!(
        "Background: {} = {}",
        spec.background_type,
        spec.background_value
    );

    let processed = pipeline::process_scene(&spec)?;
    Ok(processed)
}

fn read_job(input: &str) -> Result<JobSpec> {
    let raw = if input == "-" {
        tracing::info!("Reading job from stdin");
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read job from stdin")?;
        buf
    } else {
        fs::read_to_string(input).with_context(|| format!("failed to read job file {input}"))?
    };

    let spec = serde_json::from_str(&raw).context("failed to parse job document")?;
    Ok(spec)
}
