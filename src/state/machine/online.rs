//! Online assistant and the nested chat

use tracing::{info, warn};

use super::{InteractionEngine, Next};
use crate::audio::RecorderState;
use crate::collab::{with_token_refresh, Channel};
use crate::events::EngineEvent;
use crate::state::intent::{Intent, ONLINE, SESSION_CONTROL};
use crate::state::mode::Mode;

/// Words used to steer the recorder that end up in the transcript
const COMMAND_WORDS: &[&str] = &["stop", "wait", "continue"];

impl InteractionEngine {
    pub(super) fn on_online(&mut self, utterance: &str) -> Next {
        match ONLINE.classify(utterance) {
            Some(Intent::ShutDown) => Next::Terminate,
            Some(Intent::Exit) => {
                self.leave_online();
                Next::Go(Mode::Idle)
            }
            Some(Intent::SubChat) => Next::Go(Mode::IconicSubChat),
            Some(Intent::Hello) => {
                self.launch_agent();
                Next::Stay
            }
            Some(Intent::Capture) => {
                self.capture_for_chat();
                Next::Stay
            }
            Some(Intent::StartRecording) => {
                match self.recorder.start() {
                    Ok(()) => self.say("Recording started. Say 'stop' when you're done."),
                    Err(e) => {
                        warn!(error = %e, "could not start recording");
                        self.say(&format!("Iconic Error: {e}"));
                    }
                }
                Next::Stay
            }
            Some(Intent::StopRecording) => {
                if self.recorder.state() == RecorderState::Idle {
                    self.say("Nothing is being recorded.");
                    return Next::Stay;
                }
                match self.recorder.stop() {
                    Ok(_) => self.say("Recording stopped. Say 'go' to send it."),
                    Err(e) => self.say(&format!("Iconic Error: {e}")),
                }
                Next::Stay
            }
            Some(Intent::ResumeRecording) => {
                if self.recorder.resume() {
                    self.say("Resumed recording. Say 'stop' when you're done.");
                } else {
                    self.say("There is no paused recording.");
                }
                Next::Stay
            }
            Some(Intent::PauseRecording) => {
                if self.recorder.pause() {
                    self.say("Recording paused. Say 'continue' to resume or 'stop' to finish.");
                } else {
                    self.say("Nothing is being recorded.");
                }
                Next::Stay
            }
            Some(Intent::Send) => {
                self.send_recording();
                Next::Stay
            }
            _ => {
                self.say(
                    "I didn't understand that. Say 'start', 'capture', 'go', 'hello', 'iconic' or 'get out'.",
                );
                Next::Stay
            }
        }
    }

    pub(super) fn on_sub_chat(&mut self, utterance: &str) -> Next {
        match SESSION_CONTROL.classify(utterance) {
            Some(Intent::ShutDown) => return Next::Terminate,
            Some(Intent::Exit) => return Next::Go(Mode::IconicSubChat.parent()),
            _ => {}
        }

        self.chat(utterance);
        Next::Stay
    }

    /// Stop everything online mode started
    fn leave_online(&mut self) {
        if self.recorder.state() != RecorderState::Idle {
            if let Err(e) = self.recorder.stop() {
                warn!(error = %e, "failed to finish recording");
            }
        }
        self.stop_agent();
        self.say("Exiting online mode.");
    }

    fn launch_agent(&mut self) {
        let launched = {
            let mut supervisor = self.supervisor.lock().unwrap_or_else(|e| e.into_inner());
            let was_running = supervisor.is_running();
            supervisor.launch().map(|pid| (pid, was_running))
        };

        match launched {
            Ok((_, true)) => self.say("The voice agent is already running."),
            Ok((pid, false)) => {
                let _ = self.event_tx.send(EngineEvent::AgentStarted { pid });
                self.say("Voice agent started.");
            }
            Err(e) => {
                warn!(error = %e, "could not launch voice agent");
                self.say("Sorry, I couldn't start the voice agent.");
            }
        }
    }

    pub(super) fn stop_agent(&mut self) {
        let stopped = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .request_stop();
        if stopped {
            let _ = self.event_tx.send(EngineEvent::AgentStopped);
        }
    }

    fn capture_for_chat(&mut self) {
        self.show(Channel::Interaction, "Capturing image...");
        match self.collab.camera.capture_image(&self.capture_path) {
            Some(image) => {
                info!(path = ?image, "image attached to next question");
                self.last_image = Some(image);
                self.say("Image captured. Ask your question with 'start', then 'go'.");
            }
            None => self.say("Failed to capture image."),
        }
    }

    /// Transcribe the recording and ask the assistant about it
    fn send_recording(&mut self) {
        if let Err(e) = self.recorder.stop() {
            self.say(&format!("Iconic Error: {e}"));
            return;
        }

        let audio = self.recorder.path().to_path_buf();
        if !audio.exists() {
            self.say("There is no recording to send. Say 'start' first.");
            return;
        }

        self.show(Channel::Interaction, "Processing your question...");
        let api = self.api();
        let transcript = match with_token_refresh(api.as_ref(), |api| api.transcribe_audio(&audio)) {
            Ok(transcript) => transcript,
            Err(e) => {
                self.report_api_error(&e);
                return;
            }
        };
        self.show(Channel::Transcript, &transcript);

        let prompt = strip_command_words(&transcript, COMMAND_WORDS);
        if prompt.is_empty() {
            self.say("I didn't hear a question in the recording.");
            return;
        }

        self.chat(&prompt);
    }

    /// Send one prompt, with the pending image if any, and speak the reply
    fn chat(&mut self, prompt: &str) {
        let api = self.api();
        let image = self.last_image.clone();

        match with_token_refresh(api.as_ref(), |api| api.send_chat(prompt, image.as_deref())) {
            Ok(reply) => {
                self.last_image = None;
                self.show(Channel::Response, &reply);
                self.collab.speaker.speak(&reply);
            }
            Err(e) => self.report_api_error(&e),
        }
    }
}

/// Remove recorder commands from either end of a transcript.
///
/// Matching is case-insensitive and on whole words; punctuation left next
/// to a removed word goes with it.
pub(super) fn strip_command_words(text: &str, words: &[&str]) -> String {
    let is_separator = |c: char| c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?');
    let mut out = text.trim();

    loop {
        let before = out;
        for word in words {
            if let Some(rest) = strip_word_prefix(out, word) {
                out = rest.trim_start_matches(is_separator);
            }
            let core = out.trim_end_matches(is_separator);
            if let Some(rest) = strip_word_suffix(core, word) {
                out = rest.trim_end_matches(is_separator);
            }
        }
        if out == before {
            break;
        }
    }

    out.to_string()
}

fn strip_word_prefix<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let head = text.get(..word.len())?;
    let rest = &text[word.len()..];
    let boundary = rest.chars().next().map_or(true, |c| !c.is_alphanumeric());
    (head.eq_ignore_ascii_case(word) && boundary).then_some(rest)
}

fn strip_word_suffix<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(word.len())?;
    let tail = text.get(split..)?;
    let rest = &text[..split];
    let boundary = rest.chars().next_back().map_or(true, |c| !c.is_alphanumeric());
    (tail.eq_ignore_ascii_case(word) && boundary).then_some(rest)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::super::tests::{harness, harness_with_agent};
    use super::*;
    use crate::collab::fakes::FakeApi;
    use crate::state::mode::ModeKind;

    fn speech() -> Vec<i16> {
        (0..160).map(|i| if i % 2 == 0 { 6000 } else { -6000 }).collect()
    }

    #[test]
    fn test_strip_command_words() {
        assert_eq!(strip_command_words("stop what is this", COMMAND_WORDS), "what is this");
        assert_eq!(
            strip_command_words("Wait, tell me a joke. Continue", COMMAND_WORDS),
            "tell me a joke"
        );
        assert_eq!(
            strip_command_words("where is the bus stop", COMMAND_WORDS),
            "where is the bus"
        );
        assert_eq!(strip_command_words("stopwatch price", COMMAND_WORDS), "stopwatch price");
        assert_eq!(strip_command_words("stop", COMMAND_WORDS), "");
        assert_eq!(strip_command_words("what is this?", COMMAND_WORDS), "what is this?");
    }

    #[test]
    fn test_record_and_send() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online"]);
        assert_eq!(h.kind(), ModeKind::OnlineAssistant);

        h.hear(&["start"]);
        assert_eq!(h.engine.recorder.state(), RecorderState::Recording);
        assert!(h.source.push(&speech()));

        h.hear(&["wait"]);
        assert_eq!(h.engine.recorder.state(), RecorderState::Paused);
        h.hear(&["continue"]);
        assert_eq!(h.engine.recorder.state(), RecorderState::Recording);
        h.hear(&["stop"]);
        assert_eq!(h.engine.recorder.state(), RecorderState::Idle);

        h.hear(&["go"]);
        assert_eq!(
            h.fakes.display.last(Channel::Transcript).as_deref(),
            Some("stop what is this")
        );
        let chats = h.fakes.api.chats.lock().unwrap().clone();
        assert_eq!(chats, vec![("what is this".to_string(), None)]);
        assert_eq!(
            h.fakes.display.last(Channel::Response).as_deref(),
            Some("fake reply to: what is this")
        );
        assert_eq!(
            h.fakes.speaker.last().as_deref(),
            Some("fake reply to: what is this")
        );
    }

    #[test]
    fn test_send_without_recording() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online", "send"]);
        assert!(h.said("There is no recording to send"));
        assert!(h.fakes.api.chats.lock().unwrap().is_empty());
    }

    #[test]
    fn test_captured_image_goes_with_next_question_only() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online", "capture"]);
        assert_eq!(h.fakes.camera.captures.load(Ordering::SeqCst), 1);

        h.hear(&["start"]);
        h.source.push(&speech());
        h.hear(&["go", "start"]);
        h.source.push(&speech());
        h.hear(&["go"]);

        let chats = h.fakes.api.chats.lock().unwrap().clone();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].1.as_deref(), Some(h.dir.path().join("capture.jpg").as_path()));
        assert_eq!(chats[1].1, None);
    }

    #[test]
    fn test_expired_session_is_reported() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online", "start"]);
        h.source.push(&speech());
        h.fakes.api.rejections.store(5, Ordering::SeqCst);
        h.hear(&["go"]);

        assert!(h.said("Iconic Error: session expired"));
        assert_eq!(h.fakes.api.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(h.kind(), ModeKind::OnlineAssistant);
    }

    #[test]
    fn test_rejected_token_is_refreshed_transparently() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online", "start"]);
        h.source.push(&speech());
        h.fakes.api.rejections.store(1, Ordering::SeqCst);
        h.hear(&["go"]);

        assert_eq!(h.fakes.api.chats.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_sub_chat() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online", "iconic"]);
        assert_eq!(h.kind(), ModeKind::IconicSubChat);

        h.hear(&["what time is it"]);
        assert_eq!(
            h.fakes.display.last(Channel::Response).as_deref(),
            Some("fake reply to: what time is it")
        );

        h.hear(&["get out"]);
        assert_eq!(h.kind(), ModeKind::OnlineAssistant);
        assert!(h.said("Back to the online assistant"));
    }

    #[test]
    fn test_get_out_stops_recording() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online", "start"]);
        h.hear(&["get out"]);

        assert_eq!(h.kind(), ModeKind::Idle);
        assert_eq!(h.engine.recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn test_unknown_command_reprompts() {
        let mut h = harness(FakeApi::online());
        h.hear(&["iconic", "online", "banana"]);
        assert!(h.said("I didn't understand that"));
        assert_eq!(h.kind(), ModeKind::OnlineAssistant);
    }

    #[cfg(unix)]
    #[test]
    fn test_hello_launches_agent_and_get_out_stops_it() {
        let mut h = harness_with_agent(
            FakeApi::online(),
            vec!["sh".into(), "-c".into(), "sleep 30".into()],
        );
        h.hear(&["iconic", "online", "hello"]);
        assert!(h.said("Voice agent started."));
        assert!(h.engine.supervisor.lock().unwrap().is_running());

        h.hear(&["hello"]);
        assert!(h.said("already running"));

        h.hear(&["get out"]);
        std::thread::sleep(Duration::from_millis(50));
        assert!(!h.engine.supervisor.lock().unwrap().is_running());

        let mut started = 0;
        let mut stopped = 0;
        while let Ok(event) = h.events.try_recv() {
            match event {
                EngineEvent::AgentStarted { .. } => started += 1,
                EngineEvent::AgentStopped => stopped += 1,
                _ => {}
            }
        }
        assert_eq!((started, stopped), (1, 1));
    }

    #[test]
    fn test_failed_agent_launch_is_spoken() {
        let mut h = harness_with_agent(
            FakeApi::online(),
            vec!["/nonexistent/eyeconic-agent".into()],
        );
        h.hear(&["iconic", "online", "hello"]);
        assert!(h.said("couldn't start the voice agent"));
    }
}
