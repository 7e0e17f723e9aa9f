//! Scripted collaborators for tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::*;

/// Returns scripted utterances in order, then empty strings
#[derive(Default)]
pub struct ScriptedRecognizer {
    utterances: Mutex<VecDeque<String>>,
    pub swaps: Mutex<Vec<String>>,
    pub unavailable: Mutex<HashSet<String>>,
}

impl ScriptedRecognizer {
    pub fn new(script: &[&str]) -> Self {
        let recognizer = Self::default();
        recognizer.push(script);
        recognizer
    }

    pub fn push(&self, script: &[&str]) {
        let mut queue = self.utterances.lock().unwrap();
        queue.extend(script.iter().map(|s| s.to_string()));
    }

    pub fn swap_count(&self) -> usize {
        self.swaps.lock().unwrap().len()
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn capture_utterance(&self) -> String {
        self.utterances.lock().unwrap().pop_front().unwrap_or_default()
    }

    fn swap_model(&self, language_code: &str) -> bool {
        if self.unavailable.lock().unwrap().contains(language_code) {
            return false;
        }
        self.swaps.lock().unwrap().push(language_code.to_string());
        true
    }
}

#[derive(Default)]
pub struct RecordingSpeaker {
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingSpeaker {
    pub fn said(&self, fragment: &str) -> bool {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.contains(fragment))
    }

    pub fn last(&self) -> Option<String> {
        self.spoken.lock().unwrap().last().cloned()
    }
}

impl TextToSpeech for RecordingSpeaker {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

/// Translates by tagging text with the target language
#[derive(Default)]
pub struct FakeTranslator {
    pub builds: Mutex<Vec<(String, String)>>,
    pub missing_pairs: Mutex<HashSet<(String, String)>>,
    pub to_english: Mutex<HashMap<String, String>>,
    /// Source languages passed to `translate_to_english`
    pub to_english_sources: Mutex<Vec<String>>,
    pub fail_translation: AtomicBool,
}

impl Translator for FakeTranslator {
    fn build_pipeline(&self, source: &str, target: &str) -> Option<PipelineHandle> {
        let pair = (source.to_string(), target.to_string());
        if self.missing_pairs.lock().unwrap().contains(&pair) {
            return None;
        }
        self.builds.lock().unwrap().push(pair);
        Some(Arc::new(Pipeline {
            source: source.to_string(),
            target: target.to_string(),
            model: format!("fake-{source}-{target}"),
        }))
    }

    fn translate(&self, text: &str, pipeline: &Pipeline) -> Option<String> {
        if self.fail_translation.load(Ordering::SeqCst) {
            return None;
        }
        Some(format!("[{}] {}", pipeline.target, text))
    }

    fn translate_to_english(&self, text: &str, source: &str) -> Option<String> {
        self.to_english_sources.lock().unwrap().push(source.to_string());
        self.to_english.lock().unwrap().get(text).cloned()
    }
}

pub struct FakeOcr {
    pub text: Mutex<String>,
    pub languages: Mutex<Vec<String>>,
}

impl FakeOcr {
    pub fn returning(text: &str) -> Self {
        Self {
            text: Mutex::new(text.to_string()),
            languages: Mutex::new(Vec::new()),
        }
    }
}

impl OpticalRecognizer for FakeOcr {
    fn recognize_text(&self, _image: &Path, language_code: &str) -> String {
        self.languages.lock().unwrap().push(language_code.to_string());
        self.text.lock().unwrap().clone()
    }
}

pub struct FakeCamera {
    pub working: AtomicBool,
    pub captures: AtomicUsize,
}

impl FakeCamera {
    pub fn working() -> Self {
        Self {
            working: AtomicBool::new(true),
            captures: AtomicUsize::new(0),
        }
    }
}

impl Camera for FakeCamera {
    fn capture_image(&self, path: &Path) -> Option<PathBuf> {
        if !self.working.load(Ordering::SeqCst) {
            return None;
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Some(path.to_path_buf())
    }
}

pub struct FakeApi {
    pub connected: AtomicBool,
    pub login_ok: AtomicBool,
    pub refresh_ok: AtomicBool,
    /// Number of upcoming calls rejected with `Unauthorized`
    pub rejections: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub logins: Mutex<Vec<(String, String)>>,
    pub transcript: Mutex<String>,
    pub chats: Mutex<Vec<(String, Option<PathBuf>)>>,
}

impl FakeApi {
    pub fn online() -> Self {
        Self {
            connected: AtomicBool::new(true),
            login_ok: AtomicBool::new(true),
            refresh_ok: AtomicBool::new(true),
            rejections: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            logins: Mutex::new(Vec::new()),
            transcript: Mutex::new("stop what is this".to_string()),
            chats: Mutex::new(Vec::new()),
        }
    }

    pub fn offline() -> Self {
        let api = Self::online();
        api.connected.store(false, Ordering::SeqCst);
        api
    }

    fn check_token(&self) -> Result<(), ApiError> {
        let pending = self.rejections.load(Ordering::SeqCst);
        if pending > 0 {
            self.rejections.store(pending - 1, Ordering::SeqCst);
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }
}

impl RemoteApi for FakeApi {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn login(&self, username: &str, password: &str) -> Result<Tokens, ApiError> {
        self.logins
            .lock()
            .unwrap()
            .push((username.to_string(), password.to_string()));
        if self.login_ok.load(Ordering::SeqCst) {
            Ok(Tokens {
                access: "access".to_string(),
                refresh: Some("refresh".to_string()),
            })
        } else {
            Err(ApiError::Status {
                status: 401,
                body: "bad credentials".to_string(),
            })
        }
    }

    fn refresh_token(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.refresh_ok.load(Ordering::SeqCst)
    }

    fn transcribe_audio(&self, audio: &Path) -> Result<String, ApiError> {
        self.check_token()?;
        if !audio.exists() {
            return Err(ApiError::MissingFile(audio.to_path_buf()));
        }
        Ok(self.transcript.lock().unwrap().clone())
    }

    fn send_chat(&self, prompt: &str, image: Option<&Path>) -> Result<String, ApiError> {
        self.check_token()?;
        self.chats
            .lock()
            .unwrap()
            .push((prompt.to_string(), image.map(Path::to_path_buf)));
        Ok(format!("fake reply to: {prompt}"))
    }
}

#[derive(Default)]
pub struct FakeDisplay {
    pub lines: Mutex<Vec<(Channel, String)>>,
}

impl FakeDisplay {
    /// Most recent text written to `channel`
    pub fn last(&self, channel: Channel) -> Option<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, text)| text.clone())
    }
}

impl Display for FakeDisplay {
    fn show(&self, channel: Channel, text: &str) {
        self.lines.lock().unwrap().push((channel, text.to_string()));
    }
}

#[derive(Default)]
pub struct FakePower {
    pub requests: AtomicUsize,
}

impl PowerControl for FakePower {
    fn shutdown(&self) -> Result<(), String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeProvisioner {
    pub succeed: AtomicBool,
    pub attempts: Mutex<Vec<(String, String)>>,
}

impl FakeProvisioner {
    pub fn succeeding() -> Self {
        Self {
            succeed: AtomicBool::new(true),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

impl NetworkProvisioner for FakeProvisioner {
    fn connect(&self, ssid: &str, password: &str) -> Result<(), ProvisionError> {
        self.attempts
            .lock()
            .unwrap()
            .push((ssid.to_string(), password.to_string()));
        if self.succeed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProvisionError::Command {
                program: "nmcli".to_string(),
                reason: "exit status 10".to_string(),
            })
        }
    }
}

pub struct FakeBattery(pub Option<BatteryStatus>);

impl BatteryMonitor for FakeBattery {
    fn read(&self) -> Option<BatteryStatus> {
        self.0
    }
}

/// Handles to every fake behind a [`Collaborators`] bundle
pub struct FakeSet {
    pub recognizer: Arc<ScriptedRecognizer>,
    pub speaker: Arc<RecordingSpeaker>,
    pub translator: Arc<FakeTranslator>,
    pub ocr: Arc<FakeOcr>,
    pub camera: Arc<FakeCamera>,
    pub api: Arc<FakeApi>,
    pub display: Arc<FakeDisplay>,
    pub power: Arc<FakePower>,
}

impl FakeSet {
    pub fn new(api: FakeApi) -> Self {
        Self {
            recognizer: Arc::new(ScriptedRecognizer::default()),
            speaker: Arc::new(RecordingSpeaker::default()),
            translator: Arc::new(FakeTranslator::default()),
            ocr: Arc::new(FakeOcr::returning("Bienvenue à Paris")),
            camera: Arc::new(FakeCamera::working()),
            api: Arc::new(api),
            display: Arc::new(FakeDisplay::default()),
            power: Arc::new(FakePower::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            recognizer: self.recognizer.clone(),
            speaker: self.speaker.clone(),
            translator: self.translator.clone(),
            ocr: self.ocr.clone(),
            camera: self.camera.clone(),
            api: self.api.clone(),
            display: self.display.clone(),
            power: self.power.clone(),
        }
    }
}
