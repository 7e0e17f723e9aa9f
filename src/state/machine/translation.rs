//! Offline assistant: tool choice, language choice, translation sessions

use tracing::{debug, info};

use super::{InteractionEngine, Next};
use crate::collab::{is_ocr_sentinel, Channel, PipelineHandle};
use crate::language::{resolve, Language, Resolution, ENGLISH};
use crate::state::intent::{Intent, IMAGE_SESSION, SESSION_CONTROL, TOOL_SELECTION};
use crate::state::mode::{Mode, SessionStage};

impl InteractionEngine {
    pub(super) fn on_tool_selection(&mut self, utterance: &str) -> Next {
        match TOOL_SELECTION.classify(utterance) {
            Some(Intent::ShutDown) => Next::Terminate,
            Some(Intent::Exit) => {
                self.say("Returning to idle mode.");
                Next::Go(Mode::Idle)
            }
            Some(Intent::Speech) => Next::Go(Mode::SpeechTranslation(SessionStage::SelectSource)),
            Some(Intent::Image) => Next::Go(Mode::ImageTranslation(SessionStage::SelectSource)),
            _ => {
                self.say("I didn't understand that. Please say 'speech' or 'image'.");
                Next::Stay
            }
        }
    }

    pub(super) fn on_speech_session(&mut self, stage: &SessionStage, utterance: &str) -> Next {
        match stage {
            SessionStage::SelectSource => {
                if let Some(next) = self.session_control(utterance) {
                    return next;
                }
                match self.choose_language(utterance) {
                    Some(source) => self.select_speech_source(source),
                    None => Next::Stay,
                }
            }
            SessionStage::SelectTarget { source } => {
                if let Some(next) = self.session_control(utterance) {
                    return next;
                }
                match self.choose_language(utterance) {
                    Some(target) => self.activate_speech(*source, target),
                    None => Next::Stay,
                }
            }
            SessionStage::Active {
                source, pipeline, ..
            } => self.translate_speech(*source, pipeline.as_ref(), utterance),
        }
    }

    pub(super) fn on_image_session(&mut self, stage: &SessionStage, utterance: &str) -> Next {
        match stage {
            SessionStage::SelectSource => {
                if let Some(next) = self.session_control(utterance) {
                    return next;
                }
                match self.choose_language(utterance) {
                    Some(source) => {
                        Next::Go(Mode::ImageTranslation(SessionStage::SelectTarget { source }))
                    }
                    None => Next::Stay,
                }
            }
            SessionStage::SelectTarget { source } => {
                if let Some(next) = self.session_control(utterance) {
                    return next;
                }
                match self.choose_language(utterance) {
                    Some(target) => self.activate_image(*source, target),
                    None => Next::Stay,
                }
            }
            SessionStage::Active {
                source, pipeline, ..
            } => match IMAGE_SESSION.classify(utterance) {
                Some(Intent::ShutDown) => Next::Terminate,
                Some(Intent::Exit) => self.exit_session("Exiting image translation mode."),
                Some(Intent::Capture) => {
                    self.capture_and_translate(*source, pipeline.as_ref());
                    Next::Stay
                }
                _ => {
                    self.say("Say 'capture' to take a picture, or 'get out' to exit.");
                    Next::Stay
                }
            },
        }
    }

    pub(super) fn enter_speech_stage(&mut self, stage: &SessionStage) {
        match stage {
            SessionStage::SelectSource => {
                self.say("Entering speech translation mode.");
                self.say("What language will you be speaking in?");
            }
            SessionStage::SelectTarget { source } => {
                self.show(Channel::Interaction, &format!("Source language: {source}"));
                self.say("What language do you want to translate to?");
            }
            SessionStage::Active { source, target, .. } => {
                self.say(&format!(
                    "Ready to translate from {source} to {target}. Say 'get out' to stop."
                ));
            }
        }
    }

    pub(super) fn enter_image_stage(&mut self, stage: &SessionStage) {
        match stage {
            SessionStage::SelectSource => {
                self.say("Entering image translation mode.");
                self.say("What is the language of the text in the image?");
            }
            SessionStage::SelectTarget { source } => {
                self.show(Channel::Interaction, &format!("Text language: {source}"));
                self.say("What language do you want to translate the text to?");
            }
            SessionStage::Active { .. } => {
                self.say("Ready. Say 'capture' to take a picture.");
            }
        }
    }

    /// "shut down" and "get out" while choosing languages
    fn session_control(&mut self, utterance: &str) -> Option<Next> {
        match SESSION_CONTROL.classify(utterance) {
            Some(Intent::ShutDown) => Some(Next::Terminate),
            Some(Intent::Exit) => Some(self.exit_session("Exiting translation mode.")),
            _ => None,
        }
    }

    fn exit_session(&mut self, message: &str) -> Next {
        self.say(message);
        Next::Go(Mode::Idle)
    }

    /// Resolve a spoken language name, re-prompting when that fails
    fn choose_language(&mut self, utterance: &str) -> Option<&'static Language> {
        match resolve(utterance) {
            Resolution::Found(language) => {
                debug!(language = %language.code, "language selected");
                Some(language)
            }
            Resolution::Ambiguous(candidates) => {
                let names: Vec<String> = candidates.iter().map(|l| l.to_string()).collect();
                self.say(&format!(
                    "I heard more than one language: {}. Please say just one.",
                    names.join(" and ")
                ));
                None
            }
            Resolution::Unknown => {
                self.say(&format!(
                    "I couldn't recognize the language '{utterance}'. Please try again."
                ));
                None
            }
        }
    }

    /// Load the source recognition model as soon as the source is known.
    /// Target selection then listens in English again.
    fn select_speech_source(&mut self, source: &'static Language) -> Next {
        if !self.load_speech_model(source) {
            return Next::Go(Mode::Idle);
        }
        Next::Go(Mode::SpeechTranslation(SessionStage::SelectTarget { source }))
    }

    fn load_speech_model(&mut self, language: &'static Language) -> bool {
        if self.languages.ensure_recognition_model(language.code) {
            return true;
        }
        self.say(&format!(
            "Sorry, I couldn't load the speech model for {language}."
        ));
        self.languages.reset_to_english();
        false
    }

    fn activate_speech(&mut self, source: &'static Language, target: &'static Language) -> Next {
        if source == target {
            self.say("Source and target languages are the same.");
            return Next::Go(Mode::Idle);
        }

        if !self.load_speech_model(source) {
            return Next::Go(Mode::Idle);
        }

        match self.load_pipeline(source, target) {
            Some(pipeline) => Next::Go(Mode::SpeechTranslation(SessionStage::Active {
                source,
                target,
                pipeline: Some(pipeline),
            })),
            None => {
                self.languages.reset_to_english();
                Next::Go(Mode::Idle)
            }
        }
    }

    fn activate_image(&mut self, source: &'static Language, target: &'static Language) -> Next {
        // Same language: the OCR text is shown as is
        let pipeline = if source == target {
            None
        } else {
            match self.load_pipeline(source, target) {
                Some(pipeline) => Some(pipeline),
                None => return Next::Go(Mode::Idle),
            }
        };

        Next::Go(Mode::ImageTranslation(SessionStage::Active {
            source,
            target,
            pipeline,
        }))
    }

    fn load_pipeline(
        &mut self,
        source: &'static Language,
        target: &'static Language,
    ) -> Option<PipelineHandle> {
        self.show(Channel::Loading, "Loading Translation Model...");
        let pipeline = self.languages.get_or_build_pipeline(source.code, target.code);
        self.show(Channel::Loading, "");

        if pipeline.is_none() {
            self.say(&format!(
                "Sorry, the {source} to {target} translation model is not available."
            ));
        }
        pipeline
    }

    fn translate_speech(
        &mut self,
        source: &'static Language,
        pipeline: Option<&PipelineHandle>,
        utterance: &str,
    ) -> Next {
        // Control words may be spoken in either language
        let control = SESSION_CONTROL.classify(utterance).or_else(|| {
            if source == ENGLISH {
                return None;
            }
            let english = self
                .collab
                .translator
                .translate_to_english(utterance, source.code)?;
            SESSION_CONTROL.classify(&english)
        });

        match control {
            Some(Intent::ShutDown) => return Next::Terminate,
            Some(Intent::Exit) => return self.exit_session("Exiting speech translation mode."),
            _ => {}
        }

        let Some(pipeline) = pipeline else {
            self.show(Channel::Translation, utterance);
            return Next::Stay;
        };

        match self.collab.translator.translate(utterance, pipeline) {
            Some(translated) => {
                self.show(Channel::Translation, &translated);
                self.collab.speaker.speak(&translated);
            }
            None => self.say("Sorry, I couldn't translate that."),
        }
        Next::Stay
    }

    fn capture_and_translate(
        &mut self,
        source: &'static Language,
        pipeline: Option<&PipelineHandle>,
    ) {
        self.show(Channel::Interaction, "Capturing image...");
        let Some(image) = self.collab.camera.capture_image(&self.capture_path) else {
            self.say("Failed to capture image.");
            return;
        };
        info!(path = ?image, "image captured");
        self.say("Image captured.");

        let text = self.collab.ocr.recognize_text(&image, source.ocr_code);
        self.show(Channel::Ocr, &text);
        if is_ocr_sentinel(&text) {
            return;
        }

        let Some(pipeline) = pipeline else {
            self.show(
                Channel::Interaction,
                "Source and target languages are the same.",
            );
            return;
        };

        self.say("Translating text...");
        match self.collab.translator.translate(&text, pipeline) {
            Some(translated) => {
                self.show(Channel::Translation, &translated);
                self.collab.speaker.speak(&translated);
            }
            None => self.say("Sorry, I couldn't translate the text from the image."),
        }
    }
}
