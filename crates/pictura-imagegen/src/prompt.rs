use pictura_config::SecurityConfig;

use crate::error::{ImageGenError, Result};

/// Prompt checks applied before a record is created
#[derive(Debug, Clone)]
pub(crate) struct PromptPolicy {
    max_length: usize,
    /// Lowercased; empty when content filtering is off
    blocked_words: Vec<String>,
}

impl PromptPolicy {
    pub fn new(max_length: usize, security: &SecurityConfig) -> Self {
        let blocked_words = if security.content_filter {
            security
                .blocked_words
                .iter()
                .map(|word| word.trim().to_lowercase())
                .filter(|word| !word.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        Self {
            max_length,
            blocked_words,
        }
    }

    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    /// Length is measured in bytes
    pub fn check(&self, prompt: &str) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(ImageGenError::InvalidPrompt("Prompt cannot be empty".to_owned()));
        }

        if prompt.len() > self.max_length {
            return Err(ImageGenError::InvalidPrompt(format!(
                "Prompt cannot exceed {} characters",
                self.max_length
            )));
        }

        let lowered = prompt.to_lowercase();
        if self.blocked_words.iter().any(|word| lowered.contains(word.as_str())) {
            return Err(ImageGenError::InvalidPrompt(
                "Prompt contains inappropriate content and cannot be processed".to_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_length: usize) -> PromptPolicy {
        PromptPolicy::new(max_length, &SecurityConfig::default())
    }

    #[test]
    fn empty_and_blank_prompts_are_rejected() {
        let policy = policy(100);

        for prompt in ["", "   ", "\n\t"] {
            let err = policy.check(prompt).unwrap_err();
            assert!(matches!(err, ImageGenError::InvalidPrompt(ref m) if m == "Prompt cannot be empty"));
        }
    }

    #[test]
    fn length_is_counted_in_bytes() {
        let policy = policy(8);

        policy.check("a lake!!").unwrap();
        assert!(policy.check("a lake!!!").is_err());
        // four two-byte characters fill the budget
        policy.check("éééé").unwrap();
        assert!(policy.check("ééééé").is_err());
    }

    #[test]
    fn blocked_words_match_case_insensitively() {
        let policy = policy(100);

        policy.check("a quiet harbour at dawn").unwrap();
        assert!(policy.check("A BLOODY sunset").is_err());
        assert!(policy.check("hateful graffiti").is_err());
    }

    #[test]
    fn disabled_filter_lets_everything_through() {
        let security = SecurityConfig {
            content_filter: false,
            ..SecurityConfig::default()
        };
        let policy = PromptPolicy::new(100, &security);

        policy.check("a weapon on a table").unwrap();
    }
}
