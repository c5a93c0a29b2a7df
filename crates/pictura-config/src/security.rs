use serde::Deserialize;

use crate::default_true;

/// Prompt validation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Reject prompts containing any blocked word
    #[serde(default = "default_true")]
    pub content_filter: bool,
    /// Case-insensitive substrings rejected by the content filter
    #[serde(default = "default_blocked_words")]
    pub blocked_words: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            content_filter: true,
            blocked_words: default_blocked_words(),
        }
    }
}

fn default_blocked_words() -> Vec<String> {
    [
        "violent", "sexual", "explicit", "nude", "naked", "gore", "blood", "weapon", "drug", "hate",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}
