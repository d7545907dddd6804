// Media processing through an external ffmpeg process
//
// - Commands: command builders and process execution
// - Processor: extraction and muxing with their input/output contracts

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::{Result, ServiceError};

/// Local media operations used by the dubbing pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Write the source's first audio stream to `audio_path`.
    ///
    /// Fails with `NoAudioStream` when the source has none. Never touches
    /// the source file.
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> std::result::Result<(), ServiceError>;

    /// Combine the first video stream of `video_path` with the first audio
    /// stream of `audio_path` into `output_path`.
    async fn mux(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> std::result::Result<(), ServiceError>;

    /// Check if media processor is available
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Arc<dyn MediaProcessor> {
        Arc::new(processor::FfmpegProcessor::new(config))
    }
}
