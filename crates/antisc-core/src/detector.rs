//! Character-level script difference detection.
//!
//! A text is "suspicious" in proportion to how many of its script characters
//! change when run through the normalization service. Han characters that are
//! already Traditional survive the conversion untouched; Simplified ones do not.

use std::sync::Arc;

use regex::Regex;

use crate::{logging::Logger, ports::ScriptConverter};

const HAN_PATTERN: &str = r"\p{Han}";

/// Result of [`ScriptDiffDetector::evaluate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptDiff {
    /// Characters that differ, in order of appearance.
    pub differing: Vec<char>,
    /// Number of script characters found in the original text.
    pub total: usize,
}

pub struct ScriptDiffDetector {
    converter: Arc<dyn ScriptConverter>,
    logger: Arc<dyn Logger>,
    script: Regex,
}

impl ScriptDiffDetector {
    /// Detector for Han-script characters.
    pub fn new(converter: Arc<dyn ScriptConverter>, logger: Arc<dyn Logger>) -> Self {
        Self::with_script(converter, logger, han_regex())
    }

    /// Detector for an arbitrary character class (one char per match).
    pub fn with_script(
        converter: Arc<dyn ScriptConverter>,
        logger: Arc<dyn Logger>,
        script: Regex,
    ) -> Self {
        Self {
            converter,
            logger,
            script,
        }
    }

    pub fn evaluate(&self, text: &str) -> ScriptDiff {
        let original = self.extract(text);
        if original.is_empty() {
            return ScriptDiff::default();
        }

        // Convert the whole text, not just the extracted characters, so the
        // converter can use the surrounding context for phrase-level mappings.
        let converted = match self.converter.convert(text) {
            Ok(s) => self.extract(&s),
            Err(e) => {
                self.logger
                    .error("detector", &format!("convert failed: {e}, text: {text:?}"));
                return ScriptDiff {
                    differing: Vec::new(),
                    total: original.len(),
                };
            }
        };

        ScriptDiff {
            differing: diff_chars(&original, &converted),
            total: original.len(),
        }
    }

    fn extract(&self, text: &str) -> Vec<char> {
        self.script
            .find_iter(text)
            .flat_map(|m| m.as_str().chars())
            .collect()
    }
}

fn han_regex() -> Regex {
    Regex::new(HAN_PATTERN).expect("valid regex")
}

/// Position-wise comparison. Mismatches record the original character;
/// the unmatched tail of whichever side is longer is recorded as-is.
fn diff_chars(original: &[char], converted: &[char]) -> Vec<char> {
    let mut out: Vec<char> = original
        .iter()
        .zip(converted.iter())
        .filter(|(o, c)| o != c)
        .map(|(o, _)| *o)
        .collect();

    let common = original.len().min(converted.len());
    if original.len() > common {
        out.extend_from_slice(&original[common..]);
    } else if converted.len() > common {
        out.extend_from_slice(&converted[common..]);
    }
    out
}
