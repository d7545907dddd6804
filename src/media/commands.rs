use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::ServiceError;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Only print errors, keeps captured stderr small
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("error")
    }

    /// Select one stream, e.g. `0:v:0`
    pub fn map<S: Into<String>>(self, specifier: S) -> Self {
        self.arg("-map").arg(specifier)
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy video stream
    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Run the command and capture its output.
    ///
    /// The child is killed if the returned future is dropped, which is how
    /// stage timeouts and cancellation stop a stuck process.
    pub async fn run(&self) -> Result<CommandOutput, ServiceError> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ServiceError::Process(format!("Failed to execute {}: {}", self.binary_path, e))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Execute the command, failing on a non-zero exit
    pub async fn execute(&self) -> Result<(), ServiceError> {
        let output = self.run().await?;
        if !output.success {
            return Err(ServiceError::Process(format!(
                "{} failed (exit {:?}): {}",
                self.description,
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Builder for the ffmpeg invocations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build audio extraction command: first audio stream, 16 kHz mono PCM
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .quiet()
            .input(video_path)
            .map("0:a:0")
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(16000)
            .audio_channels(1)
            .overwrite()
            .output(audio_path)
    }

    /// Build mux command: video stream 0 of the source copied verbatim,
    /// audio stream 0 of the dub re-encoded
    pub fn mux<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        output_path: P,
        audio_codec: &str,
        additional_options: &[String],
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Dub muxing")
            .quiet()
            .overwrite()
            .input(video_path)
            .input(audio_path)
            .map("0:v:0")
            .map("1:a:0")
            .copy_video()
            .audio_codec(audio_codec)
            .args(additional_options.iter().cloned())
            .output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_selects_first_audio_stream() {
        let cmd = MediaCommandBuilder::new("ffmpeg").extract_audio("in.mp4", "out.wav");
        let args = cmd.args.join(" ");
        assert!(args.contains("-i in.mp4 -map 0:a:0 -vn"));
        assert!(args.contains("-c:a pcm_s16le -ar 16000 -ac 1"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("out.wav"));
    }

    #[test]
    fn test_mux_maps_exactly_one_stream_each() {
        let options = vec!["-movflags".to_string(), "+faststart".to_string()];
        let cmd = MediaCommandBuilder::new("ffmpeg").mux("in.mp4", "speech.mp3", "out.mp4", "aac", &options);

        assert_eq!(cmd.args.iter().filter(|a| *a == "-map").count(), 2);
        let args = cmd.args.join(" ");
        assert!(args.contains("-i in.mp4 -i speech.mp3 -map 0:v:0 -map 1:a:0 -c:v copy -c:a aac -movflags +faststart out.mp4"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_process_error() {
        let cmd = MediaCommandBuilder::new("definitely-not-an-installed-binary").version_check();
        assert!(matches!(cmd.execute().await, Err(ServiceError::Process(_))));
    }
}
