use std::path::{Path, PathBuf};

use super::JobId;
use crate::config::StorageConfig;

/// Naming scheme for every file a job reads or writes.
///
/// All paths are namespaced by job id, so concurrent jobs never share a
/// file. The final output depends only on the job id, the source file
/// name and the target language.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    upload_dir: PathBuf,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            upload_dir: storage.upload_dir.clone(),
            work_dir: storage.work_dir.clone(),
            output_dir: storage.output_dir.clone(),
        }
    }

    pub fn job_upload_dir(&self, id: &JobId) -> PathBuf {
        self.upload_dir.join(id.as_str())
    }

    pub fn upload_path(&self, id: &JobId, file_name: &str) -> PathBuf {
        self.job_upload_dir(id).join(sanitize_component(file_name))
    }

    pub fn job_work_dir(&self, id: &JobId) -> PathBuf {
        self.work_dir.join(id.as_str())
    }

    pub fn job_output_dir(&self, id: &JobId) -> PathBuf {
        self.output_dir.join(id.as_str())
    }

    /// Audio pulled out of the source for transcription
    pub fn extracted_audio(&self, id: &JobId) -> PathBuf {
        self.job_work_dir(id).join("extracted.wav")
    }

    /// Synthesized speech for one target language
    pub fn speech_audio(&self, id: &JobId, language: &str, extension: &str) -> PathBuf {
        self.job_work_dir(id)
            .join(format!("speech_{}.{}", sanitize_component(language), extension))
    }

    /// Where the muxer writes before the result is published
    pub fn mux_staging(&self, id: &JobId, file_name: &str) -> PathBuf {
        self.job_work_dir(id)
            .join(format!("muxing_{}", sanitize_component(file_name)))
    }

    /// Published dubbed video: `<output>/<job>/dubbed_<lang>_<file>`
    pub fn output_path(&self, id: &JobId, language: &str, file_name: &str) -> PathBuf {
        self.job_output_dir(id).join(format!(
            "dubbed_{}_{}",
            sanitize_component(language),
            sanitize_component(file_name)
        ))
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

/// Keep a label usable as a single path component.
///
/// Ordinary labels like "Spanish" or "pt-BR" pass through untouched.
pub fn sanitize_component(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.as_str() {
        "" => "_".to_string(),
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn layout() -> ArtifactLayout {
        ArtifactLayout::new(&StorageConfig {
            upload_dir: PathBuf::from("uploads"),
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("static/output"),
        })
    }

    #[test]
    fn test_output_name_is_deterministic() {
        let layout = layout();
        let id = JobId::parse("abc").unwrap();
        let first = layout.output_path(&id, "Spanish", "sample.mp4");
        let second = layout.output_path(&id, "Spanish", "sample.mp4");
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("static/output/abc/dubbed_Spanish_sample.mp4"));
    }

    #[test]
    fn test_language_label_cannot_escape_directory() {
        let layout = layout();
        let id = JobId::parse("abc").unwrap();
        let path = layout.output_path(&id, "../../etc", "sample.mp4");
        assert_eq!(path.parent(), Some(Path::new("static/output/abc")));
        assert_eq!(sanitize_component(".."), "__");
        assert_eq!(sanitize_component("pt-BR"), "pt-BR");
        assert_eq!(sanitize_component("Español"), "Español");
    }

    #[test]
    fn test_concurrent_jobs_never_share_artifacts() {
        let layout = layout();
        let mut seen = HashSet::new();
        let count = 200;

        for _ in 0..count {
            let id = JobId::generate();
            for path in [
                layout.upload_path(&id, "sample.mp4"),
                layout.extracted_audio(&id),
                layout.speech_audio(&id, "Spanish", "mp3"),
                layout.mux_staging(&id, "sample.mp4"),
                layout.output_path(&id, "Spanish", "sample.mp4"),
            ] {
                assert!(seen.insert(path.clone()), "collision on {}", path.display());
            }
        }

        assert_eq!(seen.len(), count * 5);
    }
}
