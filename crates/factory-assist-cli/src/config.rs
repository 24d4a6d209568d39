//! Client configuration.
//!
//! Values come from command-line flags with environment fallbacks (see
//! `main.rs`); anything left unset uses the defaults defined here.

use std::time::Duration;

use serde::Deserialize;

/// Which assistant the chat view talks as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    /// Operating-procedure training.
    #[default]
    Training,
    /// Code and machine fault diagnosis.
    Debug,
}

impl AssistantMode {
    /// Wire prefix the backend agent uses to recognise debug requests.
    pub const DEBUG_PREFIX: &'static str = "[调试模式] ";

    /// Heading shown in the UI.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Training => "Training Assistant",
            Self::Debug => "Debug Assistant",
        }
    }

    /// Placeholder title of a fresh thread.
    #[must_use]
    pub const fn default_title(self) -> &'static str {
        match self {
            Self::Training => "New training",
            Self::Debug => "New debug session",
        }
    }

    /// Hint shown in an empty conversation.
    #[must_use]
    pub const fn empty_hint(self) -> &'static str {
        match self {
            Self::Training => {
                "Ask about equipment operating steps or fault handling procedures."
            }
            Self::Debug => {
                "Describe the fault or paste the error log and stack trace."
            }
        }
    }

    /// The query as sent on the wire.
    #[must_use]
    pub fn wire_query(self, query: &str) -> String {
        match self {
            Self::Training => query.to_string(),
            Self::Debug => format!("{}{query}", Self::DEBUG_PREFIX),
        }
    }
}

/// External command used to capture microphone audio.
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Program to run.
    #[serde(default = "RecorderConfig::default_program")]
    pub program: String,
    /// Arguments; `{output}` is replaced with the capture file path.
    #[serde(default = "RecorderConfig::default_args")]
    pub args: Vec<String>,
    /// File extension of the produced audio.
    #[serde(default = "RecorderConfig::default_extension")]
    pub extension: String,
}

impl RecorderConfig {
    fn default_program() -> String {
        "arecord".to_string()
    }

    fn default_args() -> Vec<String> {
        ["-q", "-f", "cd", "-t", "wav", "{output}"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_extension() -> String {
        "wav".to_string()
    }

    /// Parse a whitespace-separated command line such as `ffmpeg -f alsa -i default {output}`.
    ///
    /// Returns `None` for an empty string.
    #[must_use]
    pub fn from_command_line(line: &str, extension: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            extension: extension.to_string(),
        })
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            args: Self::default_args(),
            extension: Self::default_extension(),
        }
    }
}

/// Configuration for the terminal client.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Backend base URL.
    #[serde(default = "AppConfig::default_base_url")]
    pub base_url: String,

    /// Delay between two reveal steps, in milliseconds.
    #[serde(default = "AppConfig::default_reveal_interval")]
    pub reveal_interval_ms: u64,

    /// Maximum visible characters of a thread title in the thread list.
    #[serde(default = "AppConfig::default_title_chars")]
    pub title_display_chars: usize,

    /// Assistant mode of the chat view.
    #[serde(default)]
    pub mode: AssistantMode,

    /// Microphone capture command.
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl AppConfig {
    /// Smallest accepted reveal interval.
    pub const MIN_REVEAL_MS: u64 = 1;
    /// Largest accepted reveal interval.
    pub const MAX_REVEAL_MS: u64 = 1000;

    fn default_base_url() -> String {
        "http://localhost:8000".to_string()
    }

    const fn default_reveal_interval() -> u64 {
        10
    }

    const fn default_title_chars() -> usize {
        15
    }

    /// Get the reveal interval as a `Duration`, clamped to the accepted range.
    #[must_use]
    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(
            self.reveal_interval_ms
                .clamp(Self::MIN_REVEAL_MS, Self::MAX_REVEAL_MS),
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            reveal_interval_ms: Self::default_reveal_interval(),
            title_display_chars: Self::default_title_chars(),
            mode: AssistantMode::default(),
            recorder: RecorderConfig::default(),
        }
    }
}
