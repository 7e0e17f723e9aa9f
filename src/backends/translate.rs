//! Offline translation through the `argos-translate` command line

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{failure, optional};
use crate::collab::{Pipeline, PipelineHandle, Translator};

/// Text used to check that a language pair is installed
const PROBE_TEXT: &str = "hello";

pub struct CommandTranslator {
    program: Option<PathBuf>,
}

impl CommandTranslator {
    pub fn new(program: &str) -> Self {
        let resolved = optional(program);
        if resolved.is_none() {
            warn!(program, "translation program not found, translation is unavailable");
        }
        Self { program: resolved }
    }

    fn run(&self, source: &str, target: &str, text: &str) -> Option<String> {
        let program = self.program.as_ref()?;
        let output = Command::new(program)
            .args(["--from-lang", argos_code(source), "--to-lang", argos_code(target)])
            .arg(text)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Ok(output) => {
                debug!(source, target, reason = %failure(&output), "translation failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to run translation program");
                None
            }
        }
    }
}

impl Translator for CommandTranslator {
    fn build_pipeline(&self, source: &str, target: &str) -> Option<PipelineHandle> {
        self.run(source, target, PROBE_TEXT)?;
        info!(source, target, "translation pipeline ready");
        Some(Arc::new(Pipeline {
            source: source.to_string(),
            target: target.to_string(),
            model: format!("argos-{}-{}", argos_code(source), argos_code(target)),
        }))
    }

    fn translate(&self, text: &str, pipeline: &Pipeline) -> Option<String> {
        self.run(&pipeline.source, &pipeline.target, text)
    }

    fn translate_to_english(&self, text: &str, source: &str) -> Option<String> {
        if source == "en" {
            return Some(text.to_string());
        }
        self.run(source, "en", text)
    }
}

/// Argos package codes differ from the recognizer's for Chinese
fn argos_code(code: &str) -> &str {
    match code {
        "cn" => "zh",
        other => other,
    }
}
