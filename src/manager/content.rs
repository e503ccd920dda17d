//! Document content handed to the persistence collaborator.

use serde::{Deserialize, Serialize};

/// Inline style carried alongside the text. Overlapping ranges are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Bold,
    Italic,
    Underline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFormat {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: FormatKind,
    pub id: String,
}

/// A full-document snapshot: each save is a complete write, not a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub text: String,
    pub formats: Vec<TextFormat>,
}

impl DocumentContent {
    pub fn from_text(text: impl Into<String>) -> Self {
        DocumentContent {
            text: text.into(),
            formats: Vec::new(),
        }
    }
}
