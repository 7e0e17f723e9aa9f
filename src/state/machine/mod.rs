//! Interaction engine
//!
//! One cycle: make sure the recognizer listens in the mode's language,
//! show the mode's prompt, capture one utterance, classify it against the
//! mode's intent table and act. Sub-dialogs (tool choice, language
//! choice, the nested chat) are sub-states of [`Mode`], so every cycle
//! goes through this loop and the machine stays inspectable.

mod online;
mod translation;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::intent::{normalize, Intent, CONNECTION, IDLE};
use super::mode::{Mode, ModeWriter, SessionStage};
use crate::audio::AudioRecorder;
use crate::collab::{ApiError, Channel, Collaborators};
use crate::credentials::CredentialReader;
use crate::events::{EngineEvent, EngineEvent::ModeChanged};
use crate::language::{LanguageModelCache, ENGLISH};
use crate::lifecycle::RunFlag;
use crate::supervisor::SharedSupervisor;

/// Name used in greetings before anyone has logged in
const DEFAULT_USERNAME: &str = "User";

/// Whether the loop should keep cycling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Result of handling one utterance
#[derive(Debug)]
enum Next {
    Stay,
    Go(Mode),
    Terminate,
}

pub struct InteractionEngine {
    mode: ModeWriter,
    /// Time the current mode kind was entered
    entered_at: Instant,
    collab: Collaborators,
    languages: LanguageModelCache,
    recorder: AudioRecorder,
    supervisor: SharedSupervisor,
    credentials: CredentialReader,
    running: RunFlag,
    event_tx: broadcast::Sender<EngineEvent>,
    capture_path: PathBuf,
    /// Image attached to the next chat request
    last_image: Option<PathBuf>,
}

impl InteractionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: ModeWriter,
        collab: Collaborators,
        recorder: AudioRecorder,
        supervisor: SharedSupervisor,
        credentials: CredentialReader,
        running: RunFlag,
        event_tx: broadcast::Sender<EngineEvent>,
        capture_path: PathBuf,
    ) -> Self {
        let languages =
            LanguageModelCache::new(collab.recognizer.clone(), collab.translator.clone());
        Self {
            mode,
            entered_at: Instant::now(),
            collab,
            languages,
            recorder,
            supervisor,
            credentials,
            running,
            event_tx,
            capture_path,
            last_image: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn languages(&self) -> &LanguageModelCache {
        &self.languages
    }

    /// Cycle until a shutdown intent or the run flag is cleared
    pub fn run(&mut self) {
        info!("interaction engine started in Idle mode");

        while self.running.is_running() {
            if self.step() == Flow::Terminate {
                break;
            }
        }

        self.finish();
        info!("interaction engine stopped");
    }

    /// Handle exactly one utterance
    pub fn step(&mut self) -> Flow {
        let mode = self.mode.get();

        if !self.prepare_listening(&mode) {
            self.transition_to(Mode::Idle);
            return Flow::Continue;
        }
        self.prompt(&mode);

        let utterance = self.listen();
        if utterance.is_empty() {
            self.on_silence(&mode);
            return Flow::Continue;
        }

        match self.dispatch(&mode, &utterance) {
            Next::Stay => Flow::Continue,
            Next::Go(next) => {
                self.transition_to(next);
                Flow::Continue
            }
            Next::Terminate => {
                self.shutdown();
                Flow::Terminate
            }
        }
    }

    /// Load the model the mode listens in. False if a session language
    /// could not be loaded and the session has to be abandoned.
    fn prepare_listening(&mut self, mode: &Mode) -> bool {
        let language = mode.listening_language();
        if self.languages.ensure_recognition_model(language.code) {
            return true;
        }

        if language == ENGLISH {
            self.say("Error: Could not switch back to English speech model.");
            return true;
        }

        self.say(&format!(
            "Sorry, I couldn't load the speech model for {language}."
        ));
        self.languages.reset_to_english();
        false
    }

    /// Per-cycle prompt on the interaction channel
    fn prompt(&self, mode: &Mode) {
        let text = match mode {
            Mode::Idle => "Say 'iconic' to begin, or 'shut down' to exit.".to_string(),
            Mode::SpeechTranslation(SessionStage::Active { source, .. }) => {
                format!("Speak in {source} (or say 'get out' to exit):")
            }
            Mode::ImageTranslation(SessionStage::Active { .. }) => {
                "Say 'capture' to take a picture, or 'get out' to exit:".to_string()
            }
            _ => return,
        };
        self.show(Channel::Interaction, &text);
    }

    /// Capture one utterance, lower-cased and trimmed
    fn listen(&self) -> String {
        self.show(Channel::Listening, "Listening... Speak now");
        let utterance = normalize(&self.collab.recognizer.capture_utterance());
        if !utterance.is_empty() {
            debug!(%utterance, "utterance captured");
            self.show(Channel::Listening, &format!("You said: {utterance}"));
        }
        utterance
    }

    fn on_silence(&self, mode: &Mode) {
        match mode {
            Mode::SpeechTranslation(SessionStage::SelectSource)
            | Mode::SpeechTranslation(SessionStage::SelectTarget { .. })
            | Mode::ImageTranslation(SessionStage::SelectSource)
            | Mode::ImageTranslation(SessionStage::SelectTarget { .. }) => {
                self.say("I didn't catch that. Please try again.");
            }
            // Avoid spinning when the recognizer has nothing to give
            Mode::Idle => thread::sleep(Duration::from_millis(100)),
            _ => {}
        }
    }

    fn dispatch(&mut self, mode: &Mode, utterance: &str) -> Next {
        match mode {
            Mode::Idle => self.on_idle(utterance),
            Mode::Connection => self.on_connection(utterance),
            Mode::OnlineAssistant => self.on_online(utterance),
            Mode::OfflineAssistant => self.on_tool_selection(utterance),
            Mode::SpeechTranslation(stage) => self.on_speech_session(stage, utterance),
            Mode::ImageTranslation(stage) => self.on_image_session(stage, utterance),
            Mode::IconicSubChat => self.on_sub_chat(utterance),
        }
    }

    fn on_idle(&mut self, utterance: &str) -> Next {
        match IDLE.classify(utterance) {
            Some(Intent::ShutDown) => Next::Terminate,
            Some(Intent::Wake) => Next::Go(Mode::Connection),
            // The idle prompt is shown again on the next cycle
            _ => Next::Stay,
        }
    }

    fn on_connection(&mut self, utterance: &str) -> Next {
        match CONNECTION.classify(utterance) {
            Some(Intent::ShutDown) => Next::Terminate,
            Some(Intent::Exit) => {
                self.say("Exiting to idle mode.");
                Next::Go(Mode::Idle)
            }
            Some(Intent::Online) => {
                self.say("You chose online assistant. Loading iconic Online...");
                Next::Go(Mode::OnlineAssistant)
            }
            Some(Intent::Offline) => {
                self.say("You chose offline assistant. Loading iconic Offline...");
                Next::Go(Mode::OfflineAssistant)
            }
            _ => {
                self.say(
                    "I didn't understand that. Please say 'online', 'offline' or 'get out' for idle mode.",
                );
                Next::Stay
            }
        }
    }

    /// Switch modes and run entry actions, following redirects
    fn transition_to(&mut self, next: Mode) {
        let mut next = next;
        loop {
            let previous = self.mode.set(next.clone());

            if previous.kind() != next.kind() {
                let duration_ms = self.entered_at.elapsed().as_millis() as u64;
                self.entered_at = Instant::now();
                info!(
                    from = %previous.kind(),
                    to = %next.kind(),
                    duration_ms,
                    "mode transition"
                );
                let _ = self.event_tx.send(ModeChanged {
                    from: previous.kind(),
                    to: next.kind(),
                    duration_ms,
                });
            } else {
                debug!(mode = %next.kind(), ?next, "sub-state transition");
            }

            let language = next.listening_language();
            if !self.languages.ensure_recognition_model(language.code) {
                warn!(language = %language.code, "could not load recognition model for new mode");
            }

            match self.on_enter(&previous, &next) {
                Some(redirect) => next = redirect,
                None => break,
            }
        }
    }

    /// Entry actions. Returns a mode to redirect to, if any.
    fn on_enter(&mut self, previous: &Mode, next: &Mode) -> Option<Mode> {
        match next {
            Mode::Idle => {
                if matches!(
                    previous,
                    Mode::SpeechTranslation(_) | Mode::ImageTranslation(_)
                ) {
                    self.collab.display.clear_outputs();
                }
                None
            }
            Mode::Connection => {
                self.say("Hello, I am iconic, your personal assistant.");
                if self.collab.api.is_connected() {
                    self.say_display(
                        "You are connected. Do you want to use our online assistant or offline assistant?",
                        "Connected: Online or Offline assistant? (get out for idle mode)",
                    );
                    None
                } else {
                    info!("no internet connection, using offline assistant");
                    Some(Mode::OfflineAssistant)
                }
            }
            Mode::OnlineAssistant => {
                if *previous == Mode::IconicSubChat {
                    self.say("Back to the online assistant.");
                } else {
                    let greeting = format!("I am here to help you {}!", self.username());
                    self.say_display("iconic Online: You are connected.", &greeting);
                }
                None
            }
            Mode::OfflineAssistant => {
                let username = self.username();
                self.say_display(
                    &format!("Hello {username}, I am iconic, your offline assistant."),
                    &format!("iconic Offline: Hello {username}!"),
                );
                self.say_display(
                    "What is the data you will use for your translation: speech or image?",
                    "Select data type: speech or image?",
                );
                None
            }
            Mode::SpeechTranslation(stage) => {
                self.enter_speech_stage(stage);
                None
            }
            Mode::ImageTranslation(stage) => {
                self.enter_image_stage(stage);
                None
            }
            Mode::IconicSubChat => {
                self.say("Iconic chat: ask me anything, or say 'get out' to go back.");
                None
            }
        }
    }

    fn shutdown(&mut self) {
        self.say_display("Shutting down AR EyeConic. Goodbye!", "Shutting down...");
        self.running.stop();
        info!("shutdown requested by voice command");

        if let Err(e) = self.collab.power.shutdown() {
            warn!(error = %e, "OS shutdown failed");
            self.show(
                Channel::Interaction,
                &format!("Error trying to shut down the system: {e}"),
            );
        }
    }

    /// Release the recorder and the agent when the loop ends
    fn finish(&mut self) {
        if let Err(e) = self.recorder.stop() {
            warn!(?e, "failed to finish recording");
        }
        self.stop_agent();
    }

    fn username(&self) -> String {
        self.credentials
            .username()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string())
    }

    fn show(&self, channel: Channel, text: &str) {
        self.collab.display.show(channel, text);
    }

    /// Speak `text` and echo it on the interaction channel
    fn say(&self, text: &str) {
        self.say_display(text, text);
    }

    fn say_display(&self, spoken: &str, shown: &str) {
        self.show(Channel::Interaction, shown);
        self.collab.speaker.speak(spoken);
    }

    fn report_api_error(&self, error: &ApiError) {
        warn!(%error, "remote assistant request failed");
        self.say(&format!("Iconic Error: {error}"));
    }

    fn api(&self) -> Arc<dyn crate::collab::RemoteApi> {
        Arc::clone(&self.collab.api)
    }
}
