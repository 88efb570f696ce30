use serde::{Deserialize, Serialize};

/// Matches `[PAUSE 5s]`, `[pause 1.5s]` and `[PAUSE 2]`. Group 1 holds the seconds.
pub const DEFAULT_DIRECTIVE_PATTERN: &str = r"(?i)\[\s*PAUSE(?:\s+(\d+(?:\.\d+)?)\s*s?)?\s*\]";

/// A buffer holding a directive must be longer than this before it is flushed on the
/// directive alone.
pub const DEFAULT_MIN_DIRECTIVE_LEN: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    #[serde(default = "default_min_directive_len")]
    pub min_directive_len: usize,
    #[serde(default = "default_directive_pattern")]
    pub directive_pattern: String,
}

fn default_min_directive_len() -> usize {
    DEFAULT_MIN_DIRECTIVE_LEN
}

fn default_directive_pattern() -> String {
    DEFAULT_DIRECTIVE_PATTERN.to_string()
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_directive_len: default_min_directive_len(),
            directive_pattern: default_directive_pattern(),
        }
    }
}

/// One flushable slice of generated text, in generation order.
///
/// `text` is the trimmed flush and may still contain pacing directives; the
/// dispatcher strips them before anything is sent to a synthesis provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub text: String,
}
