use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::InputError;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

// Word characters, keeping an apostrophe between two word characters ("don't").
static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+(?:['’]\w+)*").expect("valid token pattern"));

// Sentinels the extraction prompts ask the model to emit for illegible spans.
static ILLEGIBLE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[\s*(?:unclear|unreadable|illegible)\s*\]").expect("valid marker pattern"));

/// Share of control characters above which input is rejected as binary
const MAX_CONTROL_CHAR_RATIO: f64 = 0.10;

/// Canonical form of one answer, shared by every metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    /// Lower-cased text with whitespace runs collapsed to single spaces
    pub text: String,
    /// Word tokens in order of appearance
    pub tokens: Vec<String>,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.text.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Strip `[unclear]`, `[unreadable]` and `[illegible]` placeholders before comparison
    pub drop_illegible_markers: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            drop_illegible_markers: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, text: &str) -> Result<NormalizedText, InputError> {
        Self::validate(text)?;

        let lowered = if self.config.drop_illegible_markers {
            ILLEGIBLE_MARKER.replace_all(text, " ").to_lowercase()
        } else {
            text.to_lowercase()
        };

        let collapsed = WHITESPACE.replace_all(lowered.trim(), " ").into_owned();
        let tokens = TOKEN
            .find_iter(&collapsed)
            .map(|m| m.as_str().to_string())
            .collect();

        Ok(NormalizedText {
            text: collapsed,
            tokens,
        })
    }

    /// Reject payloads that are clearly not text
    fn validate(text: &str) -> Result<(), InputError> {
        if let Some(offset) = text.find('\0') {
            return Err(InputError::NulByte { offset });
        }

        let mut total = 0usize;
        let mut control = 0usize;
        for c in text.chars() {
            total += 1;
            if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
                control += 1;
            }
        }

        if total > 0 {
            let ratio = control as f64 / total as f64;
            if ratio > MAX_CONTROL_CHAR_RATIO {
                return Err(InputError::ControlCharacters {
                    count: control,
                    total,
                    percent: ratio * 100.0,
                });
            }
        }

        Ok(())
    }
}
