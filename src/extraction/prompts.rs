use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Instruction sent with each page image to the vision model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptProfile {
    /// Student answer sheets: typed questions with handwritten answers
    #[default]
    Handwritten,
    /// Typed or printed pages such as marking schemes
    Printed,
}

const HANDWRITTEN_PROMPT: &str = "You are an OCR assistant analyzing a scanned student answer sheet. \
Transcribe all visible text as accurately as possible, including handwritten parts. \
If any word or phrase is illegible, write [unclear] in its place and do not guess. \
Keep question numbers and format each response as:\n\
Question Number: ...\nAnswer: ...\n\n\
Provide only the transcription without any additional comments.";

const PRINTED_PROMPT: &str = "Perform precise OCR on this page. Extract all text verbatim, \
maintaining the original formatting, question numbers and answer structure. \
If any text is unclear, mark it as [unclear]. \
Provide only the extracted text without any additional comments.";

impl PromptProfile {
    pub fn text(&self) -> &'static str {
        match self {
            PromptProfile::Handwritten => HANDWRITTEN_PROMPT,
            PromptProfile::Printed => PRINTED_PROMPT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptProfile::Handwritten => "handwritten",
            PromptProfile::Printed => "printed",
        }
    }
}

impl fmt::Display for PromptProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "handwritten" => Ok(PromptProfile::Handwritten),
            "printed" => Ok(PromptProfile::Printed),
            other => Err(format!("unknown prompt profile '{}' (expected handwritten or printed)", other)),
        }
    }
}
