use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{Config, TimeoutConfig};
use crate::error::{DubError, Result, ServiceError};
use crate::job::{ArtifactLayout, DubbingJob, ErrorKind, JobId, JobReport, PipelineStep, StepOutput};
use crate::media::{MediaProcessor, MediaProcessorFactory};
use crate::openai::OpenAiClient;
use crate::retry::RetryPolicy;
use crate::synthesize::{Synthesizer, SynthesizerFactory};
use crate::transcribe::{Transcriber, TranscriberFactory, Transcript};
use crate::translate::{Translator, TranslatorFactory, clean_translation};

/// Called when a job starts a step
pub type StepListener = Arc<dyn Fn(&JobId, PipelineStep) + Send + Sync>;

/// The stage implementations an orchestrator drives
#[derive(Clone)]
pub struct Services {
    pub media: Arc<dyn MediaProcessor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Services {
    /// ffmpeg plus the OpenAI bindings, as configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OpenAiClient::from_config(&config.openai)?;
        Ok(Self {
            media: MediaProcessorFactory::create_processor(config.media.clone()),
            transcriber: TranscriberFactory::create_transcriber(client.clone(), config.transcriber.clone()),
            translator: TranslatorFactory::create_translator(client.clone(), config.translate.clone()),
            synthesizer: SynthesizerFactory::create_synthesizer(client, config.synthesize.clone()),
        })
    }
}

/// A failed step before it is written into the job
struct StepFailure {
    kind: ErrorKind,
    message: String,
}

impl StepFailure {
    fn service(step: PipelineStep, e: ServiceError) -> Self {
        Self {
            kind: ErrorKind::for_step(step),
            message: e.to_string(),
        }
    }

    fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Drives dubbing jobs through extract, transcribe, translate, synthesize
/// and mux, owning every file a job produces.
///
/// Cheap to clone; clones share the stage implementations.
#[derive(Clone)]
pub struct Orchestrator {
    services: Services,
    layout: ArtifactLayout,
    timeouts: TimeoutConfig,
    retry: RetryPolicy,
    default_voice: String,
    keep_intermediates: bool,
    max_concurrent: usize,
    listener: Option<StepListener>,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_services(config, Services::from_config(config)?))
    }

    pub fn with_services(config: &Config, services: Services) -> Self {
        Self {
            services,
            layout: ArtifactLayout::new(&config.storage),
            timeouts: config.timeouts.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            default_voice: config.synthesize.voice.clone(),
            keep_intermediates: config.jobs.keep_intermediates,
            max_concurrent: config.jobs.max_concurrent.max(1),
            listener: None,
        }
    }

    pub fn with_step_listener(mut self, listener: StepListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Make sure the local media tooling can be executed
    pub async fn check_dependencies(&self) -> Result<()> {
        self.services.media.check_availability().await
    }

    /// Persist an uploaded file under the job's upload directory and
    /// create the job for it.
    pub async fn intake<P: AsRef<Path>>(
        &self,
        source: P,
        target_language: &str,
        voice: Option<String>,
        job_id: Option<JobId>,
    ) -> Result<DubbingJob> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(DubError::FileNotFound(source.display().to_string()));
        }
        if target_language.trim().is_empty() {
            return Err(DubError::Config("Target language must not be empty".to_string()));
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| DubError::Config("Invalid video filename".to_string()))?
            .to_string_lossy()
            .into_owned();

        let id = job_id.unwrap_or_else(JobId::generate);
        let stored = self.layout.upload_path(&id, &file_name);

        if stored != source {
            fs::create_dir_all(self.layout.job_upload_dir(&id)).await?;
            fs::copy(source, &stored).await?;
        }

        info!("Accepted job {} for {} -> {}", id, file_name, target_language.trim());
        Ok(DubbingJob::new(id, stored, target_language.trim()).with_voice(voice))
    }

    /// Run every remaining step of `job` in order.
    ///
    /// Stops at the first failure; the job ends either Muxed or Failed.
    /// Intermediate artifacts are left in place, see [`Orchestrator::cleanup`].
    pub async fn run(&self, job: &mut DubbingJob, cancel: &CancellationToken) -> JobReport {
        let span = info_span!("dub_job", job_id = %job.id, target_language = %job.target_language);
        self.run_steps(job, cancel).instrument(span).await;
        job.report()
    }

    async fn run_steps(&self, job: &mut DubbingJob, cancel: &CancellationToken) {
        if job.is_terminal() {
            debug!("Job already terminated in {:?}", job.stage());
            return;
        }

        if let Err(e) = fs::create_dir_all(self.layout.job_work_dir(&job.id)).await {
            job.fail(PipelineStep::Extract, ErrorKind::Extraction, format!("Cannot create work directory: {}", e));
            return;
        }

        for step in PipelineStep::ALL {
            if job.stage() != step.requires() {
                continue;
            }

            if cancel.is_cancelled() {
                warn!("Job cancelled before {}", step);
                job.fail(step, ErrorKind::Cancelled, format!("cancelled before {} started", step));
                return;
            }

            if let Some(listener) = &self.listener {
                listener(&job.id, step);
            }
            info!("Starting {}", step);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StepFailure::new(
                    ErrorKind::Cancelled,
                    format!("cancelled during {}", step),
                )),
                result = self.execute_step(job, step) => result,
            };

            // once the mux finished, the output lands and is recorded even if
            // cancellation arrives meanwhile
            let outcome = match outcome {
                Ok(StepOutput::Video(staging)) => self.publish_output(job, &staging).await,
                other => other,
            };

            match outcome {
                Ok(output) => {
                    job.record(step, output);
                    info!("Completed {}, job is {:?}", step, job.stage());
                }
                Err(failure) => {
                    if failure.kind == ErrorKind::EmptyContent {
                        info!("Source contained no speech, nothing to dub");
                    } else {
                        error!("{} failed: {}", step, failure.message);
                    }
                    job.fail(step, failure.kind, failure.message);
                    return;
                }
            }
        }
    }

    async fn execute_step(&self, job: &DubbingJob, step: PipelineStep) -> std::result::Result<StepOutput, StepFailure> {
        match step {
            PipelineStep::Extract => {
                let audio = self.layout.extracted_audio(&job.id);
                self.extract_audio(&job.source_video, &audio)
                    .await
                    .map_err(|e| StepFailure::service(step, e))?;
                Ok(StepOutput::Audio(audio))
            }
            PipelineStep::Transcribe => {
                let audio = job
                    .artifact(PipelineStep::Extract)
                    .ok_or_else(|| StepFailure::new(ErrorKind::Transcription, "extracted audio is missing"))?;
                let transcript = self.transcribe(audio).await.map_err(|e| StepFailure::service(step, e))?;
                Ok(StepOutput::Transcript {
                    text: transcript.text,
                    language: transcript.language,
                })
            }
            PipelineStep::Translate => {
                let text = job.transcript().unwrap_or_default();
                let translation = self
                    .translate(text, &job.target_language)
                    .await
                    .map_err(|e| StepFailure::service(step, e))?;
                Ok(StepOutput::Translation(translation))
            }
            PipelineStep::Synthesize => {
                let text = job.translation().unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(StepFailure::new(ErrorKind::EmptyContent, "source contained no speech"));
                }
                let voice = job.voice.as_deref().unwrap_or(&self.default_voice);
                let speech = self.layout.speech_audio(
                    &job.id,
                    &job.target_language,
                    &self.services.synthesizer.file_extension(),
                );
                let written = self
                    .synthesize(text, voice, &speech)
                    .await
                    .map_err(|e| StepFailure::service(step, e))?;
                Ok(StepOutput::Speech(written))
            }
            PipelineStep::Mux => {
                let speech = job
                    .artifact(PipelineStep::Synthesize)
                    .ok_or_else(|| StepFailure::new(ErrorKind::Mux, "synthesized audio is missing"))?;
                let file_name = job
                    .source_file_name()
                    .map_err(|e| StepFailure::new(ErrorKind::Mux, e.to_string()))?;
                let staging = self.layout.mux_staging(&job.id, &file_name);

                if let Err(e) = self.mux(&job.source_video, speech, &staging).await {
                    remove_quietly(&staging).await;
                    return Err(StepFailure::service(step, e));
                }
                // published by run_steps, outside the cancellation race
                Ok(StepOutput::Video(staging))
            }
        }
    }

    /// Move a finished mux from its staging path to the job's output path
    async fn publish_output(&self, job: &DubbingJob, staging: &Path) -> std::result::Result<StepOutput, StepFailure> {
        let file_name = job
            .source_file_name()
            .map_err(|e| StepFailure::new(ErrorKind::Mux, e.to_string()))?;
        let output = self.layout.output_path(&job.id, &job.target_language, &file_name);

        if let Err(e) = publish(staging, &output).await {
            remove_quietly(staging).await;
            return Err(StepFailure::new(ErrorKind::Mux, format!("Failed to publish output: {}", e)));
        }
        info!("Published {}", output.display());
        Ok(StepOutput::Video(output))
    }

    /// Extraction: one attempt, bounded by the extraction timeout
    pub async fn extract_audio(&self, video: &Path, audio: &Path) -> std::result::Result<(), ServiceError> {
        let media = &self.services.media;
        RetryPolicy::none()
            .run("extract", self.timeouts.extraction(), move || media.extract_audio(video, audio))
            .await
    }

    /// Transcription with transport retries
    pub async fn transcribe(&self, audio: &Path) -> std::result::Result<Transcript, ServiceError> {
        let transcriber = &self.services.transcriber;
        self.retry
            .run("transcribe", self.timeouts.transcription(), move || transcriber.transcribe(audio))
            .await
    }

    /// Translation with transport retries.
    ///
    /// Empty input short-circuits to empty output. The reply is cleaned
    /// again here whatever translator produced it.
    pub async fn translate(&self, text: &str, target_language: &str) -> std::result::Result<String, ServiceError> {
        if text.trim().is_empty() {
            debug!("Empty transcript, skipping translation");
            return Ok(String::new());
        }

        let translator = &self.services.translator;
        let raw = self
            .retry
            .run("translate", self.timeouts.translation(), move || {
                translator.translate(text, target_language)
            })
            .await?;

        let cleaned = clean_translation(&raw);
        if cleaned.is_empty() {
            return Err(ServiceError::Malformed(
                "translation service returned no text for a non-empty transcript".to_string(),
            ));
        }
        Ok(cleaned)
    }

    /// Synthesis with transport retries; the written file is checked
    pub async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> std::result::Result<PathBuf, ServiceError> {
        let synthesizer = &self.services.synthesizer;
        let written = self
            .retry
            .run("synthesize", self.timeouts.synthesis(), move || {
                synthesizer.synthesize(text, voice, output)
            })
            .await?;

        let len = fs::metadata(&written).await.map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return Err(ServiceError::Malformed(format!(
                "synthesized audio is missing or empty: {}",
                written.display()
            )));
        }
        Ok(written)
    }

    /// Muxing: one attempt, bounded by the mux timeout
    pub async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> std::result::Result<(), ServiceError> {
        let media = &self.services.media;
        RetryPolicy::none()
            .run("mux", self.timeouts.mux(), move || media.mux(video, audio, output))
            .await
    }

    /// Delete a terminated job's intermediate artifacts and uploaded copy.
    ///
    /// The published output is never touched. Non-terminal jobs are left
    /// alone.
    pub async fn cleanup(&self, job: &mut DubbingJob) -> Result<()> {
        if !job.is_terminal() {
            warn!("Job {} is still {:?}, not cleaning up", job.id, job.stage());
            return Ok(());
        }

        let intermediates: Vec<PathBuf> = job
            .artifacts()
            .filter(|(step, _)| step.is_intermediate())
            .map(|(_, path)| path.to_path_buf())
            .collect();
        for path in &intermediates {
            remove_quietly(path).await;
        }
        job.forget_intermediates();

        remove_dir_quietly(&self.layout.job_work_dir(&job.id)).await;

        let upload_dir = self.layout.job_upload_dir(&job.id);
        if job.source_video.starts_with(&upload_dir) {
            remove_dir_quietly(&upload_dir).await;
        }

        debug!("Cleaned up job {}", job.id);
        Ok(())
    }

    /// Run a job to completion and clean up unless intermediates are kept
    pub async fn process(&self, job: &mut DubbingJob, cancel: &CancellationToken) -> JobReport {
        let report = self.run(job, cancel).await;
        if !self.keep_intermediates {
            if let Err(e) = self.cleanup(job).await {
                warn!("Cleanup of job {} failed: {}", job.id, e);
            }
        }
        report
    }

    /// Process jobs concurrently, at most `max_concurrent` at once.
    ///
    /// Jobs are returned in submission order and every one of them has
    /// terminated; a job whose task panicked comes back Failed with
    /// `InternalError`. Nothing runs if two jobs share an id.
    pub async fn process_all(&self, jobs: Vec<DubbingJob>, cancel: &CancellationToken) -> Result<Vec<DubbingJob>> {
        let mut seen = HashSet::new();
        if let Some(job) = jobs.iter().find(|job| !seen.insert(&job.id)) {
            return Err(DubError::DuplicateJobId(job.id.to_string()));
        }

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let slots: Vec<Arc<Mutex<DubbingJob>>> = jobs.into_iter().map(|job| Arc::new(Mutex::new(job))).collect();
        let mut tasks = JoinSet::new();

        for slot in &slots {
            let orchestrator = self.clone();
            let permits = permits.clone();
            let slot = slot.clone();
            let cancel = cancel.child_token();
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let mut job = slot.lock().await;
                orchestrator.process(&mut job, &cancel).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Dubbing task aborted: {}", e);
            }
        }

        let mut finished = Vec::with_capacity(slots.len());
        for slot in slots {
            // a panicking task releases the lock while unwinding
            let mut job = slot.lock().await.clone();
            if !job.is_terminal() {
                let step = PipelineStep::next_for(job.stage()).unwrap_or(PipelineStep::Extract);
                error!("Job {} lost its task during {}", job.id, step);
                job.fail(step, ErrorKind::Internal, format!("job task aborted during {}", step));
                if !self.keep_intermediates {
                    if let Err(e) = self.cleanup(&mut job).await {
                        warn!("Cleanup of job {} failed: {}", job.id, e);
                    }
                }
            }
            finished.push(job);
        }

        Ok(finished)
    }
}

/// Move a finished mux into its published location
async fn publish(staging: &Path, output: &Path) -> std::io::Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).await?;
    }
    if fs::rename(staging, output).await.is_err() {
        // rename does not cross filesystems
        fs::copy(staging, output).await?;
        fs::remove_file(staging).await?;
    }
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

async fn remove_dir_quietly(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
