//! Dubber - Automated Video Dubbing Workflow
//!
//! Command-line front end: loads the configuration, sets up logging and
//! hands jobs to the orchestrator.

use anyhow::{Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use dubber::cli::{Args, Commands, parse_languages};
use dubber::config::Config;
use dubber::job::{DubbingJob, JobId, JobReport};
use dubber::media::MediaProcessorFactory;
use dubber::retry::RetryPolicy;
use dubber::workflow::Orchestrator;

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "mkv", "avi", "webm", "m4v"];

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    // Setup logging to both console and file
    setup_logging(args.verbose, &config.storage.work_dir.join("log"))?;
    info!("Starting Dubber - Automated Video Dubbing Workflow");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running jobs");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Commands::Dub { input, language, voice, job_id, keep_artifacts, json } => {
            let languages = parse_languages(&language);
            if languages.is_empty() {
                bail!("No target language given");
            }
            if job_id.is_some() && languages.len() > 1 {
                bail!("--job-id can only be used with a single target language");
            }

            let spinner = if languages.len() == 1 { stage_spinner() } else { ProgressBar::hidden() };
            let listener_spinner = spinner.clone();
            let orchestrator = Orchestrator::new(&config)?
                .with_keep_intermediates(keep_artifacts || config.jobs.keep_intermediates)
                .with_step_listener(Arc::new(move |id, step| {
                    listener_spinner.set_message(format!("{}: {}", id, step));
                }));
            orchestrator.check_dependencies().await?;

            let job_id = job_id.as_deref().map(JobId::parse).transpose()?;
            let mut jobs = Vec::new();
            for language in &languages {
                let job = orchestrator
                    .intake(&input, language, voice.clone(), job_id.clone())
                    .await?;
                jobs.push(job);
            }

            let jobs = orchestrator.process_all(jobs, &cancel).await?;
            spinner.finish_and_clear();
            print_reports(&jobs, json)?;
        }
        Commands::Batch { input_dir, language, voice, json } => {
            info!("Processing directory: {}", input_dir.display());
            if !input_dir.is_dir() {
                bail!("Input path is not a directory: {}", input_dir.display());
            }

            let orchestrator = Orchestrator::new(&config)?;
            orchestrator.check_dependencies().await?;

            let videos = find_videos(&input_dir);
            info!("Found {} video files to process", videos.len());

            let mut jobs = Vec::new();
            for video in videos {
                match orchestrator.intake(&video, &language, voice.clone(), None).await {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!("Skipping {}: {}", video.display(), e),
                }
            }

            let jobs = orchestrator.process_all(jobs, &cancel).await?;
            print_reports(&jobs, json)?;
        }
        Commands::Extract { input, output } => {
            info!("Extracting audio from: {}", input.display());
            let media = MediaProcessorFactory::create_processor(config.media.clone());
            RetryPolicy::none()
                .run("extract", config.timeouts.extraction(), || media.extract_audio(&input, &output))
                .await?;
            println!("{}", output.display());
        }
        Commands::Transcribe { input } => {
            info!("Transcribing audio: {}", input.display());
            let orchestrator = Orchestrator::new(&config)?;
            let transcript = orchestrator.transcribe(&input).await?;
            if let Some(language) = &transcript.language {
                info!("Detected language: {}", language);
            }
            println!("{}", transcript.text);
        }
        Commands::Translate { text, language } => {
            let orchestrator = Orchestrator::new(&config)?;
            println!("{}", orchestrator.translate(&text, &language).await?);
        }
        Commands::Synthesize { text, output, voice } => {
            let orchestrator = Orchestrator::new(&config)?;
            let voice = voice.unwrap_or_else(|| config.synthesize.voice.clone());
            let written = orchestrator.synthesize(&text, &voice, &output).await?;
            println!("{}", written.display());
        }
        Commands::Mux { video, audio, output } => {
            info!("Muxing {} with {}", video.display(), audio.display());
            let media = MediaProcessorFactory::create_processor(config.media.clone());
            RetryPolicy::none()
                .run("mux", config.timeouts.mux(), || media.mux(&video, &audio, &output))
                .await?;
            println!("{}", output.display());
        }
        Commands::InitConfig { output } => {
            if output.exists() {
                bail!("Refusing to overwrite existing {}", output.display());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, "dubber.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("dubber.log").display());

    Ok(())
}

fn stage_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn find_videos(dir: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .map(|e| e.into_path())
        .collect();
    videos.sort();
    videos
}

/// Print one report per job; fails if any job failed
fn print_reports(jobs: &[DubbingJob], json: bool) -> Result<()> {
    let reports: Vec<JobReport> = jobs.iter().map(DubbingJob::report).collect();

    for report in &reports {
        if json {
            println!("{}", serde_json::to_string(report)?);
            continue;
        }
        match report {
            JobReport::Success { job_id, output_path, .. } => {
                println!("[{}] dubbed video written to {}", job_id, output_path.display());
            }
            JobReport::Error { job_id, stage, error_kind, message } => {
                println!("[{}] {} during {}: {}", job_id, error_kind, stage, message);
            }
            JobReport::Pending { job_id, stage } => {
                println!("[{}] stopped in {:?}", job_id, stage);
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        bail!("{} of {} jobs failed", failed, reports.len());
    }
    info!("Dubber workflow completed successfully");
    Ok(())
}
