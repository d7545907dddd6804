use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{MediaCommandBuilder, MediaProcessor};
use crate::config::MediaConfig;
use crate::error::{DubError, Result, ServiceError};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct FfmpegProcessor {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegProcessor {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

/// Size of a file, zero when it does not exist
async fn file_len(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn require_input(path: &Path, what: &str) -> std::result::Result<(), ServiceError> {
    if file_len(path).await == 0 {
        return Err(ServiceError::InvalidInput(format!(
            "{} is missing or empty: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

/// Drop whatever a failed process left behind at `path`
async fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}

/// ffmpeg reports a missing stream for `-map 0:a:0` like this
fn is_missing_stream(stderr: &str) -> bool {
    stderr.contains("matches no streams")
        || stderr.contains("does not contain any stream")
        || stderr.contains("Output file #0 does not contain any stream")
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> std::result::Result<(), ServiceError> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());
        require_input(video_path, "Source video").await?;

        if let Some(parent) = audio_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let command = self.command_builder.extract_audio(video_path, audio_path);
        let output = command.run().await?;

        if !output.success {
            discard_partial(audio_path).await;
            if is_missing_stream(&output.stderr) {
                return Err(ServiceError::NoAudioStream);
            }
            return Err(ServiceError::Process(format!(
                "Audio extraction failed (exit {:?}): {}",
                output.code,
                output.stderr.trim()
            )));
        }

        if file_len(audio_path).await == 0 {
            discard_partial(audio_path).await;
            return Err(ServiceError::Process(format!(
                "Audio extraction produced no data: {}",
                audio_path.display()
            )));
        }

        info!("Audio extraction completed");
        Ok(())
    }

    async fn mux(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> std::result::Result<(), ServiceError> {
        info!(
            "Muxing {} with {} -> {}",
            video_path.display(),
            audio_path.display(),
            output_path.display()
        );
        require_input(video_path, "Source video").await?;
        require_input(audio_path, "Dubbed audio").await?;

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let command = self.command_builder.mux(
            video_path,
            audio_path,
            output_path,
            &self.config.audio_codec,
            &self.config.mux_options,
        );

        if let Err(e) = command.execute().await {
            discard_partial(output_path).await;
            return Err(e);
        }

        if file_len(output_path).await == 0 {
            discard_partial(output_path).await;
            return Err(ServiceError::Process(format!(
                "Muxer exited cleanly but wrote no output: {}",
                output_path.display()
            )));
        }

        info!("Muxing completed successfully");
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        let output = self
            .command_builder
            .version_check()
            .run()
            .await
            .map_err(|e| DubError::Media(format!("Media processor not found: {}", e)))?;

        if output.success {
            debug!("{}", output.stdout.lines().next().unwrap_or("Unknown version"));
            info!("Media processor is available");
            Ok(())
        } else {
            Err(DubError::Media(format!(
                "Media processor version check failed: {}",
                output.stderr.trim()
            )))
        }
    }
}
