//! Dubber - Automated Video Dubbing Workflow
//!
//! Extracts the speech of a video, transcribes and translates it, renders
//! the translation with a synthetic voice and muxes the new audio back
//! against the original video stream.

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod openai;
pub mod retry;
pub mod synthesize;
pub mod transcribe;
pub mod translate;
pub mod workflow;

pub use job::{DubbingJob, ErrorKind, JobId, JobReport, JobStage, PipelineStep};
pub use workflow::{Orchestrator, Services};
