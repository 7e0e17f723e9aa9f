//! Speech output, OCR and camera through command-line tools

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use super::{failure, optional, require, BackendError};
use crate::collab::{Camera, OpticalRecognizer, TextToSpeech, OCR_ERROR_PREFIX, OCR_NO_TEXT};

const TESSERACT_OUTPUT_TARGET: &str = "stdout";
const TESSERACT_PAGE_SEGMENT_MODE: &str = "6";
const CAPTURE_RESOLUTION: &str = "1280x720";

/// Speaks through `espeak-ng` (or a compatible program), blocking until done
pub struct CommandSpeaker {
    program: Option<PathBuf>,
}

impl CommandSpeaker {
    /// Falls back to logging the text when the program is missing
    pub fn new(program: &str) -> Self {
        let resolved = optional(program);
        if resolved.is_none() {
            warn!(program, "speech output program not found, speech will only be logged");
        }
        Self { program: resolved }
    }
}

impl TextToSpeech for CommandSpeaker {
    fn speak(&self, text: &str) {
        info!(text, "speak");
        let Some(program) = &self.program else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let status = Command::new(program)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(%status, "speech output exited with failure"),
            Err(e) => warn!(error = %e, "failed to run speech output"),
        }
    }
}

/// Text recognition with `tesseract`
pub struct TesseractOcr {
    program: Option<PathBuf>,
    name: String,
}

impl TesseractOcr {
    pub fn new(program: &str) -> Self {
        let resolved = optional(program);
        if resolved.is_none() {
            warn!(program, "OCR program not found, image translation will report errors");
        }
        Self {
            program: resolved,
            name: program.to_string(),
        }
    }
}

impl OpticalRecognizer for TesseractOcr {
    fn recognize_text(&self, image: &Path, language_code: &str) -> String {
        let Some(program) = &self.program else {
            return format!("{OCR_ERROR_PREFIX} {} is not installed", self.name);
        };
        if !image.exists() {
            return format!("{OCR_ERROR_PREFIX} image not found at {}", image.display());
        }

        let output = Command::new(program)
            .arg(image)
            .arg(TESSERACT_OUTPUT_TARGET)
            .args(["-l", language_code, "--psm", TESSERACT_PAGE_SEGMENT_MODE])
            .stdin(Stdio::null())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => return format!("{OCR_ERROR_PREFIX} failed to run {}: {e}", self.name),
        };
        if !output.status.success() {
            return format!("{OCR_ERROR_PREFIX} {}", failure(&output));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(chars = text.len(), language = language_code, "OCR finished");
        if text.is_empty() {
            OCR_NO_TEXT.to_string()
        } else {
            text
        }
    }
}

/// Still capture with `fswebcam`
pub struct CommandCamera {
    program: PathBuf,
}

impl CommandCamera {
    /// A missing camera program is fatal for the daemon
    pub fn new(program: &str) -> Result<Self, BackendError> {
        Ok(Self {
            program: require(program)?,
        })
    }
}

impl Camera for CommandCamera {
    fn capture_image(&self, path: &Path) -> Option<PathBuf> {
        let output = Command::new(&self.program)
            .args(["-q", "--no-banner", "-r", CAPTURE_RESOLUTION])
            .arg(path)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() && path.exists() => {
                info!(?path, "image captured");
                Some(path.to_path_buf())
            }
            Ok(output) => {
                warn!(reason = %failure(&output), "camera capture failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to run camera program");
                None
            }
        }
    }
}
