//! Voice intent tables
//!
//! Each mode has an ordered table of (matcher, intent) pairs. The first
//! entry whose matcher accepts the utterance wins, so priority is the
//! table order.

/// What an utterance asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ShutDown,
    /// Leave the current mode for its parent
    Exit,
    Wake,
    Online,
    Offline,
    Speech,
    Image,
    Capture,
    /// Enter the nested chat with the remote assistant
    SubChat,
    /// Launch the external voice agent
    Hello,
    StartRecording,
    StopRecording,
    ResumeRecording,
    PauseRecording,
    /// Send the recording to the remote assistant
    Send,
}

#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Phrase appears anywhere in the utterance
    Contains(&'static str),
    /// Any of the phrases appears anywhere
    ContainsAny(&'static [&'static str]),
    /// Any of the words appears as a whole word
    AnyWord(&'static [&'static str]),
}

impl Matcher {
    /// `text` must already be lower case
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Contains(phrase) => text.contains(*phrase),
            Matcher::ContainsAny(phrases) => phrases.iter().any(|p| text.contains(*p)),
            Matcher::AnyWord(words) => text
                .split(|c: char| !c.is_alphanumeric())
                .any(|w| words.contains(&w)),
        }
    }
}

pub struct IntentTable {
    pub name: &'static str,
    entries: &'static [(Matcher, Intent)],
}

impl IntentTable {
    pub const fn new(name: &'static str, entries: &'static [(Matcher, Intent)]) -> Self {
        Self { name, entries }
    }

    /// First intent whose matcher accepts the utterance
    pub fn classify(&self, utterance: &str) -> Option<Intent> {
        let text = normalize(utterance);
        self.entries
            .iter()
            .find(|(matcher, _)| matcher.matches(&text))
            .map(|(_, intent)| *intent)
    }

    /// Intents in priority order
    pub fn intents(&self) -> impl Iterator<Item = Intent> + '_ {
        self.entries.iter().map(|(_, intent)| *intent)
    }
}

/// Lower-case and trim an utterance
pub fn normalize(utterance: &str) -> String {
    utterance.trim().to_lowercase()
}

use Matcher::{AnyWord, Contains, ContainsAny};

const SHUT_DOWN: (Matcher, Intent) = (Contains("shut down"), Intent::ShutDown);
const GET_OUT: (Matcher, Intent) = (Contains("get out"), Intent::Exit);

pub static IDLE: IntentTable = IntentTable::new(
    "idle",
    &[SHUT_DOWN, (Contains("iconic"), Intent::Wake)],
);

pub static CONNECTION: IntentTable = IntentTable::new(
    "connection",
    &[
        SHUT_DOWN,
        GET_OUT,
        (Contains("online"), Intent::Online),
        (Contains("offline"), Intent::Offline),
    ],
);

pub static TOOL_SELECTION: IntentTable = IntentTable::new(
    "tool_selection",
    &[
        SHUT_DOWN,
        GET_OUT,
        (Contains("speech"), Intent::Speech),
        (Contains("image"), Intent::Image),
    ],
);

pub static ONLINE: IntentTable = IntentTable::new(
    "online",
    &[
        SHUT_DOWN,
        GET_OUT,
        (Contains("iconic"), Intent::SubChat),
        (Contains("hello"), Intent::Hello),
        (Contains("capture"), Intent::Capture),
        (Contains("start"), Intent::StartRecording),
        (Contains("stop"), Intent::StopRecording),
        (ContainsAny(&["continue", "resume"]), Intent::ResumeRecording),
        (ContainsAny(&["wait", "pause"]), Intent::PauseRecording),
        // Whole words only: "go" is inside too many other words
        (AnyWord(&["go", "send"]), Intent::Send),
    ],
);

pub static IMAGE_SESSION: IntentTable = IntentTable::new(
    "image_session",
    &[SHUT_DOWN, GET_OUT, (Contains("capture"), Intent::Capture)],
);

/// Language selection, speech sessions and the nested chat only react to
/// these; everything else is content.
pub static SESSION_CONTROL: IntentTable =
    IntentTable::new("session_control", &[SHUT_DOWN, GET_OUT]);

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> [&'static IntentTable; 6] {
        [
            &IDLE,
            &CONNECTION,
            &TOOL_SELECTION,
            &ONLINE,
            &IMAGE_SESSION,
            &SESSION_CONTROL,
        ]
    }

    #[test]
    fn test_shut_down_has_top_priority_everywhere() {
        for table in all() {
            assert_eq!(table.intents().next(), Some(Intent::ShutDown), "{}", table.name);
            assert_eq!(
                table.classify("iconic please shut down"),
                Some(Intent::ShutDown),
                "{}",
                table.name
            );
        }
    }

    #[test]
    fn test_get_out_exits_every_sub_dialog_regardless_of_case() {
        for table in all().into_iter().filter(|t| t.name != "idle") {
            for utterance in ["get out", "GET OUT", "  please Get Out now "] {
                assert_eq!(
                    table.classify(utterance),
                    Some(Intent::Exit),
                    "{} / {utterance}",
                    table.name
                );
            }
        }
    }

    #[test]
    fn test_idle_wake_word() {
        assert_eq!(IDLE.classify("hey Iconic"), Some(Intent::Wake));
        assert_eq!(IDLE.classify("hello"), None);
        assert_eq!(IDLE.classify(""), None);
    }

    #[test]
    fn test_connection_choices() {
        assert_eq!(CONNECTION.classify("online please"), Some(Intent::Online));
        assert_eq!(CONNECTION.classify("offline"), Some(Intent::Offline));
        assert_eq!(CONNECTION.classify("maybe"), None);
    }

    #[test]
    fn test_tool_selection() {
        assert_eq!(TOOL_SELECTION.classify("speech"), Some(Intent::Speech));
        assert_eq!(TOOL_SELECTION.classify("an image"), Some(Intent::Image));
    }

    #[test]
    fn test_online_priority_order() {
        assert_eq!(ONLINE.classify("iconic hello"), Some(Intent::SubChat));
        assert_eq!(ONLINE.classify("hello there"), Some(Intent::Hello));
        assert_eq!(ONLINE.classify("capture and start"), Some(Intent::Capture));
        assert_eq!(ONLINE.classify("start"), Some(Intent::StartRecording));
        assert_eq!(ONLINE.classify("stop"), Some(Intent::StopRecording));
        assert_eq!(ONLINE.classify("continue"), Some(Intent::ResumeRecording));
        assert_eq!(ONLINE.classify("resume"), Some(Intent::ResumeRecording));
        assert_eq!(ONLINE.classify("wait"), Some(Intent::PauseRecording));
        assert_eq!(ONLINE.classify("pause"), Some(Intent::PauseRecording));
        assert_eq!(ONLINE.classify("go"), Some(Intent::Send));
        assert_eq!(ONLINE.classify("send it"), Some(Intent::Send));
    }

    #[test]
    fn test_go_requires_whole_word() {
        assert_eq!(ONLINE.classify("good morning"), None);
        assert_eq!(ONLINE.classify("google"), None);
    }

    #[test]
    fn test_image_session() {
        assert_eq!(IMAGE_SESSION.classify("capture"), Some(Intent::Capture));
        assert_eq!(IMAGE_SESSION.classify("what"), None);
    }
}
