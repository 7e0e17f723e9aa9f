//! Concrete collaborators used by the daemon
//!
//! Most of them shell out to a command-line tool named in
//! [`crate::config::Programs`]. The remote API talks HTTP, and the display
//! surface is an in-memory board published over IPC.

mod console;
mod http;
mod media;
mod microphone;
mod status;
mod system;
mod translate;

use std::path::PathBuf;
use std::process::Output;

pub use console::ConsoleRecognizer;
pub use http::HttpApiClient;
pub use media::{CommandCamera, CommandSpeaker, TesseractOcr};
pub use microphone::CpalSource;
pub use status::StatusBoard;
pub use system::{SysfsBattery, SystemPower, SystemProvisioner};
pub use translate::CommandTranslator;

/// Errors while setting up a backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{program} not found on PATH: {source}")]
    MissingProgram {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolve an external program, failing if it is not installed
pub fn require(program: &str) -> Result<PathBuf, BackendError> {
    which::which(program).map_err(|source| BackendError::MissingProgram {
        program: program.to_string(),
        source,
    })
}

/// Resolve an optional program; `None` degrades the backend
fn optional(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Short failure description from a finished command
fn failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        output.status.to_string()
    } else {
        format!("{}: {stderr}", output.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_missing_program() {
        let err = require("eyeconic-no-such-program").unwrap_err();
        assert!(err.to_string().starts_with("eyeconic-no-such-program not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_require_finds_shell() {
        assert!(require("sh").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_includes_stderr() {
        let output = std::process::Command::new("sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .output()
            .unwrap();
        let text = failure(&output);
        assert!(text.contains("boom"));
        assert!(text.contains('3'));
    }
}
