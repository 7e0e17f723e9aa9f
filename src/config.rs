//! Configuration loading and management

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// JSON file holding Wi-Fi and login credentials, written by the web portal
    pub credentials_path: PathBuf,

    /// WAV file the audio recorder writes to
    pub recording_path: PathBuf,

    /// Image file the camera writes to on "capture"
    pub capture_path: PathBuf,

    /// Base URL of the remote assistant API (with trailing slash)
    pub api_base_url: String,

    /// Command line of the external voice agent
    pub agent_command: Vec<String>,

    /// How often the credentials file and battery are polled
    pub poll_interval: Duration,

    /// Wait between interrupting the agent and killing it
    pub grace_period: Duration,

    /// Address used for the connectivity probe
    pub probe_addr: SocketAddr,

    /// Timeout of the connectivity probe
    pub probe_timeout: Duration,

    /// Whether "shut down" may power off the host
    pub allow_os_shutdown: bool,

    /// Substring of the microphone's device name; the default input if unset
    pub input_device: Option<String>,

    /// External programs backing the collaborators
    pub programs: Programs,
}

/// Names of the external programs the default backends shell out to
#[derive(Debug, Clone)]
pub struct Programs {
    pub tts: String,
    pub ocr: String,
    pub translator: String,
    pub camera: String,
}

impl Default for Programs {
    fn default() -> Self {
        Self {
            tts: "espeak-ng".to_string(),
            ocr: "tesseract".to_string(),
            translator: "argos-translate".to_string(),
            camera: "fswebcam".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = match env("EYECONIC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var("HOME")?;
                PathBuf::from(&home)
                    .join(".local")
                    .join("share")
                    .join("eyeconic")
            }
        };

        let socket_path = data_dir.join("daemon.sock");
        let credentials_path = env("EYECONIC_CREDENTIALS")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("credentials.json"));

        let mut api_base_url =
            env("EYECONIC_API_URL").unwrap_or_else(|| "http://127.0.0.1:8000/api/".to_string());
        if !api_base_url.ends_with('/') {
            api_base_url.push('/');
        }

        let agent_command = match env("EYECONIC_AGENT_COMMAND") {
            Some(cmd) => cmd.split_whitespace().map(str::to_string).collect(),
            None => vec![
                "python3".to_string(),
                "AgentStarter.py".to_string(),
                "console".to_string(),
            ],
        };

        let poll_interval = Duration::from_secs(secs("EYECONIC_POLL_SECS", 10)?);
        let grace_period = Duration::from_secs(secs("EYECONIC_GRACE_SECS", 2)?);

        let probe_addr = env("EYECONIC_PROBE_ADDR")
            .unwrap_or_else(|| "8.8.8.8:53".to_string())
            .parse()
            .context("EYECONIC_PROBE_ADDR is not a socket address")?;

        let allow_os_shutdown = env("EYECONIC_ALLOW_SHUTDOWN")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let defaults = Programs::default();
        let programs = Programs {
            tts: env("EYECONIC_TTS").unwrap_or(defaults.tts),
            ocr: env("EYECONIC_OCR").unwrap_or(defaults.ocr),
            translator: env("EYECONIC_TRANSLATOR").unwrap_or(defaults.translator),
            camera: env("EYECONIC_CAMERA").unwrap_or(defaults.camera),
        };

        Ok(Self {
            socket_path,
            recording_path: data_dir.join("recording.wav"),
            capture_path: data_dir.join("captured_image.jpg"),
            credentials_path,
            data_dir,
            api_base_url,
            agent_command,
            poll_interval,
            grace_period,
            probe_addr,
            probe_timeout: Duration::from_secs(3),
            allow_os_shutdown,
            input_device: env("EYECONIC_INPUT_DEVICE"),
            programs,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn secs(key: &str, default: u64) -> Result<u64> {
    match env(key) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a whole number of seconds")),
        None => Ok(default),
    }
}
