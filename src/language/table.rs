//! Language-name table and utterance resolution

/// A supported language
#[derive(Debug, PartialEq, Eq)]
pub struct Language {
    /// Spoken English name, lower case
    pub name: &'static str,
    /// Code used by the recognizer and translator
    pub code: &'static str,
    /// Code used by the OCR engine
    pub ocr_code: &'static str,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Capitalize the first letter for prompts
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => write!(f, "{}{}", first.to_uppercase(), chars.as_str()),
            None => Ok(()),
        }
    }
}

pub static ENGLISH: &Language = &LANGUAGES[0];

pub static LANGUAGES: [Language; 17] = [
    Language { name: "english", code: "en", ocr_code: "eng" },
    Language { name: "arabic", code: "ar", ocr_code: "ara" },
    Language { name: "spanish", code: "es", ocr_code: "spa" },
    Language { name: "french", code: "fr", ocr_code: "fra" },
    Language { name: "german", code: "de", ocr_code: "deu" },
    Language { name: "russian", code: "ru", ocr_code: "rus" },
    Language { name: "portuguese", code: "pt", ocr_code: "por" },
    Language { name: "chinese", code: "cn", ocr_code: "chi_sim" },
    Language { name: "turkish", code: "tr", ocr_code: "tur" },
    Language { name: "italian", code: "it", ocr_code: "ita" },
    Language { name: "ukrainian", code: "uk", ocr_code: "ukr" },
    Language { name: "dutch", code: "nl", ocr_code: "nld" },
    Language { name: "hindi", code: "hi", ocr_code: "hin" },
    Language { name: "vietnamese", code: "vi", ocr_code: "vie" },
    Language { name: "korean", code: "ko", ocr_code: "kor" },
    Language { name: "japanese", code: "ja", ocr_code: "jpn" },
    Language { name: "polish", code: "pl", ocr_code: "pol" },
];

/// Outcome of matching an utterance against the table
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(&'static Language),
    /// More than one language was named
    Ambiguous(Vec<&'static Language>),
    Unknown,
}

/// Find the language named in an utterance.
///
/// Names are matched as whole words anywhere in the text, so
/// "spanish please" resolves to Spanish.
pub fn resolve(utterance: &str) -> Resolution {
    let normalized = utterance.trim().to_lowercase();
    let words: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut found: Vec<&'static Language> = Vec::new();
    for language in LANGUAGES.iter() {
        if words.contains(&language.name) && !found.contains(&language) {
            found.push(language);
        }
    }

    match found.len() {
        0 => Resolution::Unknown,
        1 => Resolution::Found(found[0]),
        _ => Resolution::Ambiguous(found),
    }
}

/// Look a language up by its recognition code
pub fn by_code(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code == code)
}
