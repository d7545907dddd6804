// Job state and artifact bookkeeping
//
// A DubbingJob is threaded by mutable reference through the orchestrator:
// - JobStage: the monotonic state machine
// - PipelineStep: the five stage invocations and the artifacts they own
// - JobFailure/ErrorKind: the terminal failure record
// - JobReport: what gets handed back to the caller

pub mod layout;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

pub use layout::ArtifactLayout;

use crate::error::{DubError, Result};

/// Opaque job identifier, used to namespace every file a job touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Accept a caller supplied identifier if it is safe to use as a path component
    pub fn parse(value: &str) -> Result<Self> {
        let valid = !value.is_empty()
            && value.len() <= 128
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(DubError::InvalidJobId(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job state. Variants are declared in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobStage {
    Created,
    AudioExtracted,
    Transcribed,
    Translated,
    Synthesized,
    Muxed,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Muxed | JobStage::Failed)
    }
}

/// One stage invocation of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Extract,
    Transcribe,
    Translate,
    Synthesize,
    Mux,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::Extract,
        PipelineStep::Transcribe,
        PipelineStep::Translate,
        PipelineStep::Synthesize,
        PipelineStep::Mux,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PipelineStep::Extract => "extract",
            PipelineStep::Transcribe => "transcribe",
            PipelineStep::Translate => "translate",
            PipelineStep::Synthesize => "synthesize",
            PipelineStep::Mux => "mux",
        }
    }

    /// The stage a job is in once this step succeeded
    pub fn completes(self) -> JobStage {
        match self {
            PipelineStep::Extract => JobStage::AudioExtracted,
            PipelineStep::Transcribe => JobStage::Transcribed,
            PipelineStep::Translate => JobStage::Translated,
            PipelineStep::Synthesize => JobStage::Synthesized,
            PipelineStep::Mux => JobStage::Muxed,
        }
    }

    /// The stage a job must be in for this step to run
    pub fn requires(self) -> JobStage {
        match self {
            PipelineStep::Extract => JobStage::Created,
            PipelineStep::Transcribe => JobStage::AudioExtracted,
            PipelineStep::Translate => JobStage::Transcribed,
            PipelineStep::Synthesize => JobStage::Translated,
            PipelineStep::Mux => JobStage::Synthesized,
        }
    }

    /// The step that runs next for a job in `stage`, if any
    pub fn next_for(stage: JobStage) -> Option<PipelineStep> {
        PipelineStep::ALL.into_iter().find(|step| step.requires() == stage)
    }

    /// Intermediate artifacts may be deleted once the job is over
    pub fn is_intermediate(self) -> bool {
        !matches!(self, PipelineStep::Mux)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ExtractionError")]
    Extraction,
    #[serde(rename = "TranscriptionError")]
    Transcription,
    #[serde(rename = "TranslationError")]
    Translation,
    #[serde(rename = "SynthesisError")]
    Synthesis,
    /// The source contained no speech
    #[serde(rename = "EmptyContentError")]
    EmptyContent,
    #[serde(rename = "MuxError")]
    Mux,
    #[serde(rename = "CancelledError")]
    Cancelled,
    /// The task running the job died before the job terminated
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    /// The kind a service failure in `step` is reported as
    pub fn for_step(step: PipelineStep) -> Self {
        match step {
            PipelineStep::Extract => ErrorKind::Extraction,
            PipelineStep::Transcribe => ErrorKind::Transcription,
            PipelineStep::Translate => ErrorKind::Translation,
            PipelineStep::Synthesize => ErrorKind::Synthesis,
            PipelineStep::Mux => ErrorKind::Mux,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::Transcription => "TranscriptionError",
            ErrorKind::Translation => "TranslationError",
            ErrorKind::Synthesis => "SynthesisError",
            ErrorKind::EmptyContent => "EmptyContentError",
            ErrorKind::Mux => "MuxError",
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub step: PipelineStep,
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}: {}", self.kind, self.step, self.message)
    }
}

/// Output of a successful step, recorded into the job.
#[derive(Debug, Clone)]
pub enum StepOutput {
    Audio(PathBuf),
    Transcript { text: String, language: Option<String> },
    Translation(String),
    Speech(PathBuf),
    Video(PathBuf),
}

/// One user request to dub a single video into one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DubbingJob {
    pub id: JobId,
    pub source_video: PathBuf,
    pub target_language: String,
    pub voice: Option<String>,
    stage: JobStage,
    artifacts: BTreeMap<PipelineStep, PathBuf>,
    transcript: Option<String>,
    source_language: Option<String>,
    translation: Option<String>,
    error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DubbingJob {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(id: JobId, source_video: P, target_language: S) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_video: source_video.into(),
            target_language: target_language.into(),
            voice: None,
            stage: JobStage::Created,
            artifacts: BTreeMap::new(),
            transcript: None,
            source_language: None,
            translation: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_voice<S: Into<String>>(mut self, voice: Option<S>) -> Self {
        self.voice = voice.map(Into::into);
        self
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn artifact(&self, step: PipelineStep) -> Option<&Path> {
        self.artifacts.get(&step).map(PathBuf::as_path)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = (PipelineStep, &Path)> {
        self.artifacts.iter().map(|(step, path)| (*step, path.as_path()))
    }

    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }

    pub fn source_language(&self) -> Option<&str> {
        self.source_language.as_deref()
    }

    pub fn translation(&self) -> Option<&str> {
        self.translation.as_deref()
    }

    /// Final dubbed video, present only once the job is Muxed
    pub fn output_path(&self) -> Option<&Path> {
        self.artifact(PipelineStep::Mux)
    }

    /// File name of the uploaded source, used in output naming
    pub fn source_file_name(&self) -> Result<String> {
        self.source_video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DubError::Config(format!(
                    "Invalid source video path: {}",
                    self.source_video.display()
                ))
            })
    }

    /// Record a successful step and advance the stage.
    ///
    /// Ignored when the job is already terminal or when `step` is not the
    /// next step, so the stage never regresses or skips.
    pub(crate) fn record(&mut self, step: PipelineStep, output: StepOutput) -> bool {
        if self.stage != step.requires() {
            warn!(
                "Job {}: refusing to record {} while in {:?}",
                self.id, step, self.stage
            );
            return false;
        }

        match output {
            StepOutput::Audio(path) | StepOutput::Speech(path) | StepOutput::Video(path) => {
                self.artifacts.insert(step, path);
            }
            StepOutput::Transcript { text, language } => {
                self.transcript = Some(text);
                self.source_language = language;
            }
            StepOutput::Translation(text) => {
                self.translation = Some(text);
            }
        }

        self.stage = step.completes();
        self.updated_at = Utc::now();
        true
    }

    /// Move the job to Failed. No-op when the job already terminated.
    pub(crate) fn fail<S: Into<String>>(&mut self, step: PipelineStep, kind: ErrorKind, message: S) {
        if self.is_terminal() {
            return;
        }
        self.error = Some(JobFailure {
            step,
            kind,
            message: message.into(),
        });
        self.stage = JobStage::Failed;
        self.updated_at = Utc::now();
    }

    /// Forget intermediate artifact paths after they were deleted
    pub(crate) fn forget_intermediates(&mut self) {
        self.artifacts.retain(|step, _| !step.is_intermediate());
    }

    /// Structured result for the caller
    pub fn report(&self) -> JobReport {
        match (&self.error, self.output_path()) {
            (Some(failure), _) => JobReport::Error {
                job_id: self.id.clone(),
                stage: failure.step,
                error_kind: failure.kind,
                message: failure.message.clone(),
            },
            (None, Some(output)) if self.stage == JobStage::Muxed => JobReport::Success {
                job_id: self.id.clone(),
                output_path: output.to_path_buf(),
                source_language: self.source_language.clone(),
            },
            _ => JobReport::Pending {
                job_id: self.id.clone(),
                stage: self.stage,
            },
        }
    }
}

/// Result handed back to whoever submitted the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobReport {
    Success {
        job_id: JobId,
        output_path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_language: Option<String>,
    },
    Error {
        job_id: JobId,
        stage: PipelineStep,
        error_kind: ErrorKind,
        message: String,
    },
    /// Only produced for jobs inspected before they terminated
    Pending { job_id: JobId, stage: JobStage },
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        matches!(self, JobReport::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DubbingJob {
        DubbingJob::new(JobId::parse("job-1").unwrap(), "uploads/job-1/sample.mp4", "Spanish")
    }

    #[test]
    fn test_job_id_validation() {
        assert!(JobId::parse("abc_DEF-123").is_ok());
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("../etc").is_err());
        assert!(JobId::parse("a/b").is_err());
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn test_stage_advances_in_order_only() {
        let mut job = job();
        assert!(!job.record(PipelineStep::Transcribe, StepOutput::Transcript {
            text: "hola".into(),
            language: None,
        }));
        assert_eq!(job.stage(), JobStage::Created);

        assert!(job.record(PipelineStep::Extract, StepOutput::Audio("work/job-1/extracted.wav".into())));
        assert_eq!(job.stage(), JobStage::AudioExtracted);
        assert!(job.record(PipelineStep::Transcribe, StepOutput::Transcript {
            text: "hello".into(),
            language: Some("en".into()),
        }));
        assert_eq!(job.stage(), JobStage::Transcribed);
        assert_eq!(job.transcript(), Some("hello"));
        assert_eq!(job.source_language(), Some("en"));

        // replaying an earlier step never regresses the stage
        assert!(!job.record(PipelineStep::Extract, StepOutput::Audio("other.wav".into())));
        assert_eq!(job.stage(), JobStage::Transcribed);
        assert_eq!(job.artifact(PipelineStep::Extract), Some(Path::new("work/job-1/extracted.wav")));
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut job = job();
        job.fail(PipelineStep::Extract, ErrorKind::Extraction, "no audio");
        assert_eq!(job.stage(), JobStage::Failed);
        assert!(job.is_terminal());

        job.fail(PipelineStep::Mux, ErrorKind::Mux, "late");
        assert_eq!(job.error().unwrap().kind, ErrorKind::Extraction);
        assert!(!job.record(PipelineStep::Extract, StepOutput::Audio("a.wav".into())));
    }

    #[test]
    fn test_next_step_follows_stage() {
        assert_eq!(PipelineStep::next_for(JobStage::Created), Some(PipelineStep::Extract));
        assert_eq!(PipelineStep::next_for(JobStage::Synthesized), Some(PipelineStep::Mux));
        assert_eq!(PipelineStep::next_for(JobStage::Muxed), None);
        assert_eq!(PipelineStep::next_for(JobStage::Failed), None);
    }

    #[test]
    fn test_report_serialization() {
        let mut job = job();
        job.fail(PipelineStep::Synthesize, ErrorKind::EmptyContent, "source contained no speech");
        let json = serde_json::to_value(job.report()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["stage"], "synthesize");
        assert_eq!(json["error_kind"], "EmptyContentError");
        assert_eq!(json["job_id"], "job-1");
    }

    #[test]
    fn test_success_report() {
        let mut job = job();
        job.record(PipelineStep::Extract, StepOutput::Audio("a.wav".into()));
        job.record(PipelineStep::Transcribe, StepOutput::Transcript { text: "hi".into(), language: None });
        job.record(PipelineStep::Translate, StepOutput::Translation("hola".into()));
        job.record(PipelineStep::Synthesize, StepOutput::Speech("s.mp3".into()));
        job.record(PipelineStep::Mux, StepOutput::Video("out/dubbed_Spanish_sample.mp4".into()));

        let report = job.report();
        assert!(report.is_success());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["output_path"], "out/dubbed_Spanish_sample.mp4");

        job.forget_intermediates();
        assert!(job.artifact(PipelineStep::Extract).is_none());
        assert!(job.output_path().is_some());
    }
}
