//! Per-character text splitting.

/// One visual letter unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letter {
    pub text: String,
    /// Whether this letter is whitespace (a word boundary).
    pub whitespace: bool,
}

impl Letter {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let whitespace = text.trim().is_empty();
        Self { text, whitespace }
    }
}

/// Splits text into letters for per-letter animation.
pub trait TextSplitter: Send + Sync + 'static {
    fn split(&self, text: &str) -> Vec<Letter>;
}

/// Splits on every `char`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LetterSplitter;

impl TextSplitter for LetterSplitter {
    fn split(&self, text: &str) -> Vec<Letter> {
        text.chars().map(|c| Letter::new(c.to_string())).collect()
    }
}
