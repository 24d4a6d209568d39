//! Microphone capture through an external recorder process.
//!
//! The recorder writes into a temporary file that lives exactly as long as
//! the captured audio. Stopping a [`Recording`] interrupts the process so it
//! can finalize the file, and the child is killed if the recording is
//! dropped unfinished.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::process::{Child, Command};

use crate::client::{BackendClient, ClientError};
use crate::config::RecorderConfig;

/// Placeholder in recorder arguments replaced by the capture file path.
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// How long an interrupted recorder gets to write its trailer and exit.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Error type for voice capture.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The microphone could not be opened.
    #[error("Microphone unavailable: {0}")]
    Permission(String),

    /// The recorder failed while capturing.
    #[error("Recorder exited with {0}")]
    Recorder(ExitStatus),

    /// Reading or creating the capture file failed.
    #[error("Capture file error: {0}")]
    Io(#[from] std::io::Error),

    /// Uploading the audio for speech-to-text failed.
    #[error(transparent)]
    Upload(#[from] ClientError),
}

/// Starts recordings with a configured command.
#[derive(Debug, Clone)]
pub struct VoiceRecorder {
    config: RecorderConfig,
}

impl VoiceRecorder {
    /// Create a recorder for the given command.
    #[must_use]
    pub const fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    /// Acquire the microphone and start capturing.
    ///
    /// # Errors
    ///
    /// Returns `Permission` if the recorder cannot be launched or exits at once.
    pub fn start(&self) -> Result<Recording, VoiceError> {
        let file = tempfile::Builder::new()
            .prefix("fassist-voice-")
            .suffix(&format!(".{}", self.config.extension))
            .tempfile()?;
        let output = file.path().to_string_lossy().into_owned();

        let args = self
            .config
            .args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output));

        let mut child = Command::new(&self.config.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Permission(format!("{}: {e}", self.config.program)))?;

        if let Some(status) = child.try_wait()? {
            return Err(VoiceError::Permission(format!(
                "{} exited immediately ({status})",
                self.config.program
            )));
        }

        tracing::info!(program = %self.config.program, file = %output, "Recording started");
        Ok(Recording {
            child,
            file,
            file_name: format!("voice_input.{}", self.config.extension),
        })
    }
}

/// A capture in progress. Holds the microphone until finished or dropped.
#[derive(Debug)]
pub struct Recording {
    child: Child,
    file: NamedTempFile,
    file_name: String,
}

impl Recording {
    /// Stop capturing, release the microphone and collect the audio.
    ///
    /// # Errors
    ///
    /// Returns `Recorder` if the process had already failed on its own.
    pub async fn finish(mut self) -> Result<CapturedAudio, VoiceError> {
        match self.child.try_wait()? {
            Some(status) if !status.success() => {
                tracing::warn!(%status, "Recorder failed during capture");
                return Err(VoiceError::Recorder(status));
            }
            Some(_) => {}
            None => {
                let status = stop_recorder(&mut self.child).await?;
                tracing::debug!(%status, "Recorder stopped");
            }
        }

        let data = tokio::fs::read(self.file.path()).await?;
        tracing::info!(bytes = data.len(), "Recording finished");
        Ok(CapturedAudio {
            data,
            file_name: self.file_name,
            _file: self.file,
        })
    }
}

/// Send SIGINT to the recorder. Returns `false` if it could not be signalled.
#[cfg(unix)]
fn interrupt(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGINT) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to interrupt recorder");
            false
        }
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> bool {
    false
}

/// Interrupt the recorder and wait for it, killing it if it lingers.
async fn stop_recorder(child: &mut Child) -> std::io::Result<ExitStatus> {
    if interrupt(child) {
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(status) => return status,
            Err(_) => tracing::warn!("Recorder ignored SIGINT, killing it"),
        }
    }
    child.start_kill()?;
    child.wait().await
}

/// Audio collected by a finished recording. May be empty.
///
/// The capture file is deleted when this value is dropped.
#[derive(Debug)]
pub struct CapturedAudio {
    /// Raw audio bytes.
    pub data: Vec<u8>,
    /// Upload file name, e.g. `voice_input.wav`.
    pub file_name: String,
    _file: NamedTempFile,
}

/// Stop `recording` and send the audio to the backend for speech-to-text.
///
/// The microphone is released and the capture file removed whether or not
/// the upload succeeds.
///
/// # Errors
///
/// Returns the capture or upload failure.
pub async fn transcribe(
    client: &BackendClient,
    recording: Recording,
) -> Result<String, VoiceError> {
    let mut audio = recording.finish().await?;
    let data = std::mem::take(&mut audio.data);
    let text = client.transcribe(data, &audio.file_name).await?;
    tracing::debug!(chars = text.chars().count(), "Transcription received");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(program: &str, args: &[&str]) -> VoiceRecorder {
        VoiceRecorder::new(RecorderConfig {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            extension: "wav".to_string(),
        })
    }

    #[tokio::test]
    async fn missing_program_is_a_permission_error() {
        let err = recorder("fassist-no-such-recorder", &[]).start().unwrap_err();
        assert!(matches!(err, VoiceError::Permission(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_before_any_audio_yields_empty_capture() {
        let recording = recorder("sleep", &["30"]).start().unwrap();
        let audio = recording.finish().await.unwrap();
        assert!(audio.data.is_empty());
        assert_eq!(audio.file_name, "voice_input.wav");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captured_bytes_are_read_and_file_removed_on_drop() {
        let recording = recorder("sh", &["-c", "printf RIFF > {output}"]).start().unwrap();
        // Let the writer finish before stopping it.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let path = recording.file.path().to_path_buf();
        let audio = recording.finish().await.unwrap();
        assert_eq!(audio.data, b"RIFF");

        drop(audio);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recorder_failure_is_reported_on_finish() {
        let recording = recorder("sh", &["-c", "exit 3"]).start();
        // The process may already be gone at start; both outcomes are errors.
        match recording {
            Err(err) => assert!(matches!(err, VoiceError::Permission(_))),
            Ok(recording) => {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                let err = recording.finish().await.unwrap_err();
                assert!(matches!(err, VoiceError::Recorder(_)));
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_lets_the_recorder_finalize_its_file() {
        // Appends a trailer on SIGINT, like arecord fixing up the WAV header.
        let script = "trap 'printf DONE >> {output}; exit 0' INT; \
                      printf RIFF > {output}; \
                      while :; do sleep 0.05; done";
        let recording = recorder("sh", &["-c", script]).start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let audio = recording.finish().await.unwrap();
        assert_eq!(audio.data, b"RIFFDONE");
    }

    #[cfg(unix)]
    #[tokio::test(start_paused = true)]
    async fn recorder_ignoring_interrupt_is_killed() {
        let recording = recorder("sh", &["-c", "trap '' INT; while :; do sleep 0.05; done"])
            .start()
            .unwrap();
        let audio = recording.finish().await.unwrap();
        assert!(audio.data.is_empty());
    }
}
