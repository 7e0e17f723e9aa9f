//! Interaction modes and the shared mode cell

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::collab::PipelineHandle;
use crate::language::{Language, ENGLISH};

/// The active interaction context, including the sub-dialog it is in
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Mode {
    /// Waiting for "iconic" or "shut down"
    #[default]
    Idle,
    /// Asking whether to use the online or offline assistant
    Connection,
    /// Flat command loop against the remote assistant
    OnlineAssistant,
    /// Asking which translation tool to use
    OfflineAssistant,
    SpeechTranslation(SessionStage),
    ImageTranslation(SessionStage),
    /// Free conversation with the remote assistant, nested in online mode
    IconicSubChat,
}

/// Progress of a translation session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStage {
    SelectSource,
    SelectTarget {
        source: &'static Language,
    },
    Active {
        source: &'static Language,
        target: &'static Language,
        /// Absent when source and target are the same
        pipeline: Option<PipelineHandle>,
    },
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Idle => ModeKind::Idle,
            Mode::Connection => ModeKind::Connection,
            Mode::OnlineAssistant => ModeKind::OnlineAssistant,
            Mode::OfflineAssistant => ModeKind::OfflineAssistant,
            Mode::SpeechTranslation(_) => ModeKind::SpeechTranslation,
            Mode::ImageTranslation(_) => ModeKind::ImageTranslation,
            Mode::IconicSubChat => ModeKind::IconicSubChat,
        }
    }

    /// Language the recognizer must be listening in for this mode.
    ///
    /// Only an active speech translation session listens in something
    /// other than English.
    pub fn listening_language(&self) -> &'static Language {
        match self {
            Mode::SpeechTranslation(SessionStage::Active { source, .. }) => *source,
            _ => ENGLISH,
        }
    }

    /// Where "get out" leads from this mode
    pub fn parent(&self) -> Mode {
        match self {
            Mode::IconicSubChat => Mode::OnlineAssistant,
            _ => Mode::Idle,
        }
    }
}

/// Mode without its sub-state, for events and status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    #[default]
    Idle,
    Connection,
    OnlineAssistant,
    OfflineAssistant,
    SpeechTranslation,
    ImageTranslation,
    IconicSubChat,
}

impl std::fmt::Display for ModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeKind::Idle => write!(f, "Idle"),
            ModeKind::Connection => write!(f, "Connection"),
            ModeKind::OnlineAssistant => write!(f, "OnlineAssistant"),
            ModeKind::OfflineAssistant => write!(f, "OfflineAssistant"),
            ModeKind::SpeechTranslation => write!(f, "SpeechTranslation"),
            ModeKind::ImageTranslation => write!(f, "ImageTranslation"),
            ModeKind::IconicSubChat => write!(f, "IconicSubChat"),
        }
    }
}

/// Create the mode cell. The writer belongs to the interaction engine.
pub fn mode_channel() -> (ModeWriter, ModeReader) {
    let (tx, rx) = watch::channel(Mode::Idle);
    (ModeWriter { tx }, ModeReader { rx })
}

/// Sole write access to the active mode
pub struct ModeWriter {
    tx: watch::Sender<Mode>,
}

impl ModeWriter {
    pub fn get(&self) -> Mode {
        self.tx.borrow().clone()
    }

    /// Replace the mode, returning the previous one
    pub(crate) fn set(&self, mode: Mode) -> Mode {
        self.tx.send_replace(mode)
    }

    #[cfg(test)]
    pub fn reader(&self) -> ModeReader {
        ModeReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of the active mode for other loops
#[derive(Clone)]
pub struct ModeReader {
    rx: watch::Receiver<Mode>,
}

impl ModeReader {
    #[cfg(test)]
    pub fn get(&self) -> Mode {
        self.rx.borrow().clone()
    }

    pub fn kind(&self) -> ModeKind {
        self.rx.borrow().kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::by_code;

    #[test]
    fn test_reader_sees_writes() {
        let (writer, reader) = mode_channel();
        assert_eq!(reader.kind(), ModeKind::Idle);

        let previous = writer.set(Mode::Connection);
        assert_eq!(previous, Mode::Idle);
        assert_eq!(reader.get(), Mode::Connection);
        assert_eq!(writer.reader().kind(), ModeKind::Connection);
    }

    #[test]
    fn test_listening_language() {
        let spanish = by_code("es").unwrap();
        let active = Mode::SpeechTranslation(SessionStage::Active {
            source: spanish,
            target: ENGLISH,
            pipeline: None,
        });
        assert_eq!(active.listening_language().code, "es");

        let selecting = Mode::SpeechTranslation(SessionStage::SelectTarget { source: spanish });
        assert_eq!(selecting.listening_language().code, "en");

        let image = Mode::ImageTranslation(SessionStage::Active {
            source: spanish,
            target: ENGLISH,
            pipeline: None,
        });
        assert_eq!(image.listening_language().code, "en");
    }

    #[test]
    fn test_parents() {
        assert_eq!(Mode::IconicSubChat.parent(), Mode::OnlineAssistant);
        assert_eq!(Mode::OnlineAssistant.parent(), Mode::Idle);
        assert_eq!(
            Mode::ImageTranslation(SessionStage::SelectSource).parent(),
            Mode::Idle
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ModeKind::SpeechTranslation).unwrap();
        assert_eq!(json, "\"speech_translation\"");
    }
}
