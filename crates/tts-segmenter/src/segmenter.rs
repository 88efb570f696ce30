use crate::error::{compile, Result};
use crate::{DirectiveStripper, Segment, SegmenterConfig};
use regex::Regex;
use tracing::trace;

const SENTENCE_END: &str = r"[.!?]\s+$";
const SENTENCE_BOUNDARY: &str = r"[.!?]\s+";
const PARAGRAPH_BREAK: &str = r"\n[ \t]*\n\s*";

/// Boundary detection over an accumulated text buffer.
#[derive(Debug, Clone)]
pub struct Segmenter {
    sentence_end: Regex,
    sentence_boundary: Regex,
    paragraph_break: Regex,
    directives: DirectiveStripper,
    min_directive_len: usize,
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Result<Self> {
        Ok(Self {
            sentence_end: compile(SENTENCE_END)?,
            sentence_boundary: compile(SENTENCE_BOUNDARY)?,
            paragraph_break: compile(PARAGRAPH_BREAK)?,
            directives: DirectiveStripper::new(&config.directive_pattern)?,
            min_directive_len: config.min_directive_len,
        })
    }

    pub fn directives(&self) -> &DirectiveStripper {
        &self.directives
    }

    /// Whether `buffer` holds text worth voicing now.
    ///
    /// Ready when the buffer ends in a sentence terminator followed by
    /// whitespace, contains a blank-line paragraph break, or contains a pacing
    /// directive and is longer than the configured minimum. Blank buffers are
    /// never ready.
    pub fn is_ready(&self, buffer: &str) -> bool {
        if buffer.trim().is_empty() {
            return false;
        }
        if self.sentence_end.is_match(buffer) || self.paragraph_break.is_match(buffer) {
            return true;
        }
        self.directives.contains(buffer) && buffer.chars().count() > self.min_directive_len
    }

    /// Split `buffer` at its last boundary into `(flush, rest)`.
    ///
    /// Several short sentences may land in one flush. With no boundary the
    /// flush is empty and the whole buffer is returned as `rest`.
    pub fn extract<'a>(&self, buffer: &'a str) -> (&'a str, &'a str) {
        let sentence = self.sentence_boundary.find_iter(buffer).last().map(|m| m.end());
        let paragraph = self.paragraph_break.find_iter(buffer).last().map(|m| m.end());
        let directive = self.directives.last_end(buffer);

        match [sentence, paragraph, directive].into_iter().flatten().max() {
            Some(end) => buffer.split_at(end),
            None => ("", buffer),
        }
    }
}

/// Per-run accumulator between the token source and the dispatcher.
///
/// Owned by exactly one pipeline run; [`SegmentBuffer::finish`] consumes it so
/// the remainder can only be flushed once.
#[derive(Debug)]
pub struct SegmentBuffer {
    segmenter: Segmenter,
    buffer: String,
    next_index: usize,
}

impl SegmentBuffer {
    pub fn new(segmenter: Segmenter) -> Self {
        Self {
            segmenter,
            buffer: String::new(),
            next_index: 0,
        }
    }

    /// Append a fragment and return a segment if the buffer became ready.
    pub fn push(&mut self, fragment: &str) -> Option<Segment> {
        self.buffer.push_str(fragment);
        if !self.segmenter.is_ready(&self.buffer) {
            return None;
        }

        let (flush, rest) = self.segmenter.extract(&self.buffer);
        if flush.trim().is_empty() {
            // leading blank lines only
            self.buffer = rest.to_string();
            return None;
        }
        let text = flush.trim().to_string();
        self.buffer = rest.to_string();
        trace!(pending = self.buffer.len(), "segment boundary");
        Some(self.emit(text))
    }

    /// Flush whatever is left once the token source is exhausted, ready or not.
    pub fn finish(mut self) -> Option<Segment> {
        let text = self.buffer.trim().to_string();
        if text.is_empty() {
            return None;
        }
        Some(self.emit(text))
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn emit(&mut self, text: String) -> Segment {
        let index = self.next_index;
        self.next_index += 1;
        Segment { index, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(&SegmenterConfig::default()).unwrap()
    }

    fn run(tokens: &[&str]) -> Vec<Segment> {
        let mut buf = SegmentBuffer::new(segmenter());
        let mut out: Vec<Segment> = tokens.iter().filter_map(|t| buf.push(t)).collect();
        out.extend(buf.finish());
        out
    }

    #[test]
    fn blank_buffers_are_never_ready() {
        let s = segmenter();
        for b in ["", " ", "\n\n", " \t\n \n "] {
            assert!(!s.is_ready(b), "{b:?}");
        }
    }

    #[test]
    fn sentence_terminator_needs_trailing_whitespace() {
        let s = segmenter();
        assert!(!s.is_ready("Take a deep breath."));
        assert!(s.is_ready("Take a deep breath. "));
        assert!(s.is_ready("Are you ready? "));
        assert!(s.is_ready("Wonderful!\n"));
        assert!(!s.is_ready("Hold 3.5 seconds"));
    }

    #[test]
    fn paragraph_break_is_ready() {
        let s = segmenter();
        assert!(s.is_ready("First thought\n\nSecond"));
        assert_eq!(s.extract("First thought\n\nSecond"), ("First thought\n\n", "Second"));
    }

    #[test]
    fn bare_directive_is_not_ready() {
        let s = segmenter();
        assert!(!s.is_ready("[PAUSE 5s]"));
        assert!(!s.is_ready("[PAUSE 5s] "));
        assert!(s.is_ready("Let your body soften [PAUSE 5s] and"));
    }

    #[test]
    fn extract_uses_last_boundary() {
        let s = segmenter();
        assert_eq!(s.extract("One. Two. Thr"), ("One. Two. ", "Thr"));
        assert_eq!(s.extract("no boundary yet"), ("", "no boundary yet"));
        assert_eq!(
            s.extract("Soften your jaw [PAUSE 3s] and"),
            ("Soften your jaw [PAUSE 3s]", " and")
        );
    }

    #[test]
    fn breathing_scenario() {
        let segs = run(&["Take ", "a ", "deep ", "breath. ", "Now ", "exhale."]);
        let texts: Vec<&str> = segs.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Take a deep breath.", "Now exhale."]);
        assert_eq!(segs[0].index, 0);
        assert_eq!(segs[1].index, 1);
    }

    #[test]
    fn short_sentences_merge_into_one_segment() {
        let segs = run(&["Hi. Yes. ", "Ok"]);
        let texts: Vec<&str> = segs.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi. Yes.", "Ok"]);
    }

    #[test]
    fn directive_only_input_flushes_once_at_end() {
        let mut buf = SegmentBuffer::new(segmenter());
        assert!(buf.push("[PAUSE 5s]").is_none());
        assert_eq!(buf.pending(), "[PAUSE 5s]");
        let last = buf.finish().unwrap();
        assert_eq!(last.text, "[PAUSE 5s]");
    }

    #[test]
    fn remainder_without_boundary_is_flushed() {
        let segs = run(&["no", " terminator", " at all"]);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "no terminator at all");
    }

    #[test]
    fn whitespace_remainder_is_dropped() {
        let segs = run(&["Done. ", "  "]);
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn concatenation_is_independent_of_chunking() {
        let text = "Welcome back. Let's settle in. [PAUSE 3s] Notice your breath!\n\n\
                    Is it fast? Or slow? [PAUSE 2s] Either is fine and you are doing well. Rest now";
        let s = segmenter();
        let expected = s.directives().strip(text);

        for size in [1usize, 2, 3, 5, 8, 13, text.len()] {
            let chars: Vec<char> = text.chars().collect();
            let tokens: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();
            let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
            let segs = run(&refs);
            let joined = segs
                .iter()
                .map(|seg| s.directives().strip(&seg.text))
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            assert_eq!(joined, expected, "chunk size {size}");
        }
    }
}
