use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Upper bound on the text kept per page.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 50_000;

/// Content extracted from one visited page.
///
/// When the visit failed, `error` holds the reason, `title` is empty and
/// `text` describes the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageRecord {
    pub fn success(
        url: impl Into<String>,
        title: impl Into<String>,
        text: &str,
        max_text_chars: usize,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: truncate_chars(text, max_text_chars),
            error: None,
        }
    }

    pub fn failure(url: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            url: url.into(),
            title: String::new(),
            text: format!("Error: {message}"),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Pages in visitation order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub pages: Vec<PageRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractResult {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FillFormResult {
    pub filled: BTreeMap<String, bool>,
    pub url: String,
}

/// Keeps at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
