use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dub a single video file into one or more languages
    Dub {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Target languages (comma-separated), one job per language
        #[arg(short, long)]
        language: String,

        /// Voice for the synthesized speech
        #[arg(long)]
        voice: Option<String>,

        /// Job id to use instead of a generated one (single language only)
        #[arg(long)]
        job_id: Option<String>,

        /// Keep extracted and synthesized audio after the job ends
        #[arg(long)]
        keep_artifacts: bool,

        /// Print job reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dub all video files in a directory
    Batch {
        /// Input directory containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Target language
        #[arg(short, long)]
        language: String,

        /// Voice for the synthesized speech
        #[arg(long)]
        voice: Option<String>,

        /// Print job reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract the audio track of a video file
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Transcribe an audio file
    Transcribe {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Translate text
    Translate {
        /// Text to translate
        #[arg(short, long)]
        text: String,

        /// Target language
        #[arg(short, long)]
        language: String,
    },

    /// Synthesize speech from text
    Synthesize {
        /// Text to speak
        #[arg(short, long)]
        text: String,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,

        /// Voice for the synthesized speech
        #[arg(long)]
        voice: Option<String>,
    },

    /// Replace the audio of a video file
    Mux {
        /// Input video file
        #[arg(long)]
        video: PathBuf,

        /// Replacement audio file
        #[arg(long)]
        audio: PathBuf,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write the default configuration
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

/// Split a comma-separated language list, dropping blanks
pub fn parse_languages(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
