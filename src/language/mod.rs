//! Languages the assistant can listen, read and translate in
//!
//! - `table`: spoken names, recognition codes and OCR codes
//! - `cache`: the resident recognition model and the translation pipelines

mod cache;
mod table;

pub use cache::LanguageModelCache;
pub use table::{by_code, resolve, Language, Resolution, ENGLISH};
