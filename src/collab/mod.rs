//! Collaborator contracts
//!
//! The engine never talks to speech models, translation models, OCR,
//! cameras, HTTP or the OS directly. It calls the traits below; concrete
//! implementations live in `crate::backends`.

mod session;

#[cfg(test)]
pub mod fakes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use session::with_token_refresh;

/// OCR result when the image contains no text
pub const OCR_NO_TEXT: &str = "No text detected";

/// Prefix of OCR results that describe a failure
pub const OCR_ERROR_PREFIX: &str = "Error:";

/// True if an OCR result is a sentinel rather than recognized text
pub fn is_ocr_sentinel(text: &str) -> bool {
    text.contains(OCR_ERROR_PREFIX) || text.contains(OCR_NO_TEXT)
}

/// Speech recognition engine holding one resident model
pub trait SpeechRecognizer: Send + Sync {
    /// Block until one utterance is finalized. Empty when nothing was heard.
    fn capture_utterance(&self) -> String;

    /// Replace the resident model with the one for `language_code`.
    ///
    /// On failure the previous model must stay loaded.
    fn swap_model(&self, language_code: &str) -> bool;
}

/// Text-to-speech output, fire and forget
pub trait TextToSpeech: Send + Sync {
    fn speak(&self, text: &str);
}

/// A loaded translation model bound to one (source, target) pair
#[derive(Debug, PartialEq, Eq)]
pub struct Pipeline {
    pub source: String,
    pub target: String,
    /// Backend-specific model identifier
    pub model: String,
}

pub type PipelineHandle = Arc<Pipeline>;

pub trait Translator: Send + Sync {
    /// Load a pipeline for the pair; `None` if no model is available
    fn build_pipeline(&self, source: &str, target: &str) -> Option<PipelineHandle>;

    fn translate(&self, text: &str, pipeline: &Pipeline) -> Option<String>;

    /// Translate `text`, spoken in `source`, into English
    fn translate_to_english(&self, text: &str, source: &str) -> Option<String>;
}

pub trait OpticalRecognizer: Send + Sync {
    /// Recognize text in an image. Failures come back as sentinel strings,
    /// see [`is_ocr_sentinel`].
    fn recognize_text(&self, image: &Path, language_code: &str) -> String;
}

pub trait Camera: Send + Sync {
    /// Capture a still to `path`, returning where it was written
    fn capture_image(&self, path: &Path) -> Option<PathBuf>;
}

/// Tokens returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access: String,
    pub refresh: Option<String>,
}

/// Remote assistant API
pub trait RemoteApi: Send + Sync {
    /// Reachability probe for the internet connection
    fn is_connected(&self) -> bool;

    fn login(&self, username: &str, password: &str) -> Result<Tokens, ApiError>;

    /// Exchange the refresh token for a new access token
    fn refresh_token(&self) -> bool;

    fn transcribe_audio(&self, audio: &Path) -> Result<String, ApiError>;

    fn send_chat(&self, prompt: &str, image: Option<&Path>) -> Result<String, ApiError>;
}

/// Errors from the remote API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("access token rejected")]
    Unauthorized,

    #[error("session expired, please log in again")]
    SessionExpired,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("could not connect to the API: {0}")]
    Transport(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("unexpected API response: {0}")]
    Decode(String),
}

/// OS-level Wi-Fi provisioning
pub trait NetworkProvisioner: Send + Sync {
    fn connect(&self, ssid: &str, password: &str) -> Result<(), ProvisionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Wi-Fi provisioning is not supported on {0}")]
    Unsupported(&'static str),

    #[error("failed to run {program}: {reason}")]
    Command { program: String, reason: String },

    #[error("failed to write network profile: {0}")]
    Profile(#[from] std::io::Error),
}

/// Battery state as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    pub percent: u8,
    pub charging: bool,
}

impl std::fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.charging {
            "Charging"
        } else {
            "Not Charging"
        };
        write!(f, "{}% | Status: {}", self.percent, status)
    }
}

pub trait BatteryMonitor: Send + Sync {
    /// `None` when no battery information is available
    fn read(&self) -> Option<BatteryStatus>;
}

/// Host power control for the "shut down" command
pub trait PowerControl: Send + Sync {
    fn shutdown(&self) -> Result<(), String>;
}

/// Named status lines of the display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Prompts and spoken-response echo
    Interaction,
    /// "Listening..." and "You said: ..."
    Listening,
    Translation,
    Ocr,
    /// Transcription of a recorded question
    Transcript,
    /// Answer from the remote assistant
    Response,
    Battery,
    Wifi,
    Username,
    /// Loading-screen message; empty when hidden
    Loading,
}

impl Channel {
    /// Channels cleared when leaving a session
    pub const OUTPUTS: [Channel; 6] = [
        Channel::Interaction,
        Channel::Listening,
        Channel::Translation,
        Channel::Ocr,
        Channel::Transcript,
        Channel::Response,
    ];
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::Interaction => "interaction",
            Channel::Listening => "listening",
            Channel::Translation => "translation",
            Channel::Ocr => "ocr",
            Channel::Transcript => "transcript",
            Channel::Response => "response",
            Channel::Battery => "battery",
            Channel::Wifi => "wifi",
            Channel::Username => "username",
            Channel::Loading => "loading",
        };
        f.write_str(name)
    }
}

/// Display surface: the core writes text to named channels, nothing else
pub trait Display: Send + Sync {
    fn show(&self, channel: Channel, text: &str);

    /// Clear the interaction and result channels
    fn clear_outputs(&self) {
        for channel in Channel::OUTPUTS {
            self.show(channel, "");
        }
    }
}

/// Collaborators used by the interaction engine
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub speaker: Arc<dyn TextToSpeech>,
    pub translator: Arc<dyn Translator>,
    pub ocr: Arc<dyn OpticalRecognizer>,
    pub camera: Arc<dyn Camera>,
    pub api: Arc<dyn RemoteApi>,
    pub display: Arc<dyn Display>,
    pub power: Arc<dyn PowerControl>,
}
