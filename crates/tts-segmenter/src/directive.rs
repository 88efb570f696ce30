//! Inline pacing hints such as `[PAUSE 3s]`.
//!
//! Directives are timing metadata for the listener experience. They are never
//! spoken, so every segment passes through [`DirectiveStripper::strip`] before
//! it reaches a synthesis provider.

use crate::error::{compile, Result};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingDirective {
    /// Requested pause; `None` when the marker carries no duration.
    pub seconds: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct DirectiveStripper {
    pattern: Regex,
}

impl DirectiveStripper {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
        })
    }

    pub fn contains(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Byte offset just past the last directive in `text`.
    pub(crate) fn last_end(&self, text: &str) -> Option<usize> {
        self.pattern.find_iter(text).last().map(|m| m.end())
    }

    /// Remove every directive and collapse the whitespace left behind.
    pub fn strip(&self, text: &str) -> String {
        let replaced = self.pattern.replace_all(text, " ");
        replaced.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn parse(&self, text: &str) -> Vec<PacingDirective> {
        self.pattern
            .captures_iter(text)
            .map(|caps| PacingDirective {
                seconds: caps.get(1).and_then(|m| m.as_str().parse::<f32>().ok()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_DIRECTIVE_PATTERN;

    fn stripper() -> DirectiveStripper {
        DirectiveStripper::new(DEFAULT_DIRECTIVE_PATTERN).unwrap()
    }

    #[test]
    fn strips_directives_and_joins_words() {
        let s = stripper();
        assert_eq!(
            s.strip("Breathe in. [PAUSE 4s] Hold it.  [pause 2.5s]  Release."),
            "Breathe in. Hold it. Release."
        );
    }

    #[test]
    fn directive_only_text_strips_to_empty() {
        let s = stripper();
        assert_eq!(s.strip("  [PAUSE 5s] "), "");
        assert_eq!(s.strip("[PAUSE]"), "");
    }

    #[test]
    fn text_without_directives_keeps_words() {
        let s = stripper();
        assert_eq!(s.strip("Relax your shoulders."), "Relax your shoulders.");
        // Brackets that are not pacing hints stay in place.
        assert_eq!(s.strip("[sigh] okay"), "[sigh] okay");
    }

    #[test]
    fn parses_durations() {
        let s = stripper();
        let found = s.parse("a [PAUSE 5s] b [PAUSE 1.5s] c [PAUSE 2] d [PAUSE]");
        let secs: Vec<Option<f32>> = found.iter().map(|d| d.seconds).collect();
        assert_eq!(secs, vec![Some(5.0), Some(1.5), Some(2.0), None]);
    }

    #[test]
    fn rejects_invalid_pattern() {
        assert!(DirectiveStripper::new("[unclosed").is_err());
    }
}
