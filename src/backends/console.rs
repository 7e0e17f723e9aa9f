//! Text-console speech recognizer: one utterance per input line

use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::collab::SpeechRecognizer;
use crate::language::by_code;

/// Pause after end of input so an exhausted console does not spin
const EOF_BACKOFF: Duration = Duration::from_secs(1);

pub struct ConsoleRecognizer {
    input: Mutex<Box<dyn BufRead + Send>>,
    model: Mutex<String>,
    exhausted: AtomicBool,
}

impl ConsoleRecognizer {
    /// Read utterances from standard input
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(io::stdin()))
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            input: Mutex::new(Box::new(reader)),
            model: Mutex::new("en".to_string()),
            exhausted: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub fn model(&self) -> String {
        self.model.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn capture_utterance(&self) -> String {
        if self.exhausted.load(Ordering::Relaxed) {
            thread::sleep(EOF_BACKOFF);
            return String::new();
        }

        let mut line = String::new();
        let read = self
            .input
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_line(&mut line);

        match read {
            Ok(0) => {
                info!("console input closed");
                self.exhausted.store(true, Ordering::Relaxed);
                String::new()
            }
            Ok(_) => {
                let utterance = line.trim().to_string();
                let model = self.model.lock().unwrap_or_else(|e| e.into_inner());
                debug!(language = %*model, %utterance, "utterance read");
                utterance
            }
            Err(e) => {
                warn!(error = %e, "failed to read console input");
                String::new()
            }
        }
    }

    fn swap_model(&self, language_code: &str) -> bool {
        if by_code(language_code).is_none() {
            return false;
        }
        debug!(language = language_code, "console recognizer switched language");
        *self.model.lock().unwrap_or_else(|e| e.into_inner()) = language_code.to_string();
        true
    }
}
