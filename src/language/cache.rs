//! Resident recognition model and translation pipeline cache

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::table::ENGLISH;
use crate::collab::{PipelineHandle, SpeechRecognizer, Translator};

/// Owns the active speech-recognition language and every translation
/// pipeline built so far.
///
/// Only one recognition model is resident at a time. Pipelines are kept
/// for the life of the process and keyed by the ordered (source, target)
/// pair.
pub struct LanguageModelCache {
    recognizer: Arc<dyn SpeechRecognizer>,
    translator: Arc<dyn Translator>,
    /// Code of the last successfully loaded recognition model
    active: String,
    pipelines: HashMap<(String, String), PipelineHandle>,
}

impl LanguageModelCache {
    /// Create a cache around a recognizer that starts with the English model
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, translator: Arc<dyn Translator>) -> Self {
        Self {
            recognizer,
            translator,
            active: ENGLISH.code.to_string(),
            pipelines: HashMap::new(),
        }
    }

    /// Code of the resident recognition model
    pub fn active(&self) -> &str {
        &self.active
    }

    /// Make `code` the resident recognition model.
    ///
    /// No-op when it is already active. On a failed load the previous
    /// model stays active and false is returned.
    pub fn ensure_recognition_model(&mut self, code: &str) -> bool {
        if code == self.active {
            return true;
        }

        info!(from = %self.active, to = %code, "swapping recognition model");
        if self.recognizer.swap_model(code) {
            self.active = code.to_string();
            true
        } else {
            warn!(language = %code, active = %self.active, "recognition model load failed");
            false
        }
    }

    /// Switch back to the English model
    pub fn reset_to_english(&mut self) -> bool {
        self.ensure_recognition_model(ENGLISH.code)
    }

    /// Return the cached pipeline for (source, target), building it on a miss.
    ///
    /// Failed builds are not cached; the next call tries again.
    pub fn get_or_build_pipeline(&mut self, source: &str, target: &str) -> Option<PipelineHandle> {
        let key = (source.to_string(), target.to_string());
        if let Some(pipeline) = self.pipelines.get(&key) {
            debug!(%source, %target, "translation pipeline cache hit");
            return Some(Arc::clone(pipeline));
        }

        info!(%source, %target, "building translation pipeline");
        match self.translator.build_pipeline(source, target) {
            Some(pipeline) => {
                self.pipelines.insert(key, Arc::clone(&pipeline));
                Some(pipeline)
            }
            None => {
                warn!(%source, %target, "translation pipeline unavailable");
                None
            }
        }
    }

    #[cfg(test)]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::fakes::{FakeTranslator, ScriptedRecognizer};

    fn create_cache() -> (
        LanguageModelCache,
        Arc<ScriptedRecognizer>,
        Arc<FakeTranslator>,
    ) {
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let translator = Arc::new(FakeTranslator::default());
        let cache = LanguageModelCache::new(recognizer.clone(), translator.clone());
        (cache, recognizer, translator)
    }

    #[test]
    fn test_starts_in_english() {
        let (cache, _, _) = create_cache();
        assert_eq!(cache.active(), "en");
    }

    #[test]
    fn test_english_is_idempotent() {
        let (mut cache, recognizer, _) = create_cache();
        assert!(cache.ensure_recognition_model("en"));
        assert!(cache.ensure_recognition_model("en"));
        assert_eq!(recognizer.swap_count(), 0);
    }

    #[test]
    fn test_swap_loads_once() {
        let (mut cache, recognizer, _) = create_cache();
        assert!(cache.ensure_recognition_model("es"));
        assert!(cache.ensure_recognition_model("es"));
        assert_eq!(recognizer.swap_count(), 1);
        assert_eq!(cache.active(), "es");

        assert!(cache.reset_to_english());
        assert_eq!(cache.active(), "en");
        assert_eq!(*recognizer.swaps.lock().unwrap(), vec!["es", "en"]);
    }

    #[test]
    fn test_failed_swap_keeps_previous_model() {
        let (mut cache, recognizer, _) = create_cache();
        recognizer.unavailable.lock().unwrap().insert("ko".to_string());

        assert!(!cache.ensure_recognition_model("ko"));
        assert_eq!(cache.active(), "en");
    }

    #[test]
    fn test_pipeline_is_cached() {
        let (mut cache, _, translator) = create_cache();
        let first = cache.get_or_build_pipeline("es", "en").unwrap();
        let second = cache.get_or_build_pipeline("es", "en").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(translator.builds.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_pairs_are_ordered() {
        let (mut cache, _, _) = create_cache();
        let forward = cache.get_or_build_pipeline("es", "en").unwrap();
        let backward = cache.get_or_build_pipeline("en", "es").unwrap();

        assert!(!Arc::ptr_eq(&forward, &backward));
        assert_eq!(cache.pipeline_count(), 2);
    }

    #[test]
    fn test_failed_build_is_retried() {
        let (mut cache, _, translator) = create_cache();
        let pair = ("ja".to_string(), "pl".to_string());
        translator.missing_pairs.lock().unwrap().insert(pair.clone());

        assert!(cache.get_or_build_pipeline("ja", "pl").is_none());
        assert_eq!(cache.pipeline_count(), 0);

        translator.missing_pairs.lock().unwrap().remove(&pair);
        assert!(cache.get_or_build_pipeline("ja", "pl").is_some());
        assert_eq!(cache.pipeline_count(), 1);
    }
}
