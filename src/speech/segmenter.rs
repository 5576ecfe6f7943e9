//! Sentence segmentation of the streamed reply
//!
//! A unit completes on a sentence terminator followed by whitespace, when
//! the buffered fragment outgrows the safety length (bounds latency for
//! punctuation-free run-on text), or at end of stream.

use super::SynthesisUnit;

/// Default safety length for punctuation-free text
pub const DEFAULT_MAX_UNIT_CHARS: usize = 280;

const TERMINALS: [char; 3] = ['.', '!', '?'];

/// Splits the text-delta stream into ordered synthesis units
pub struct SentenceSegmenter {
    buffer: String,
    next_index: usize,
    max_unit_chars: usize,
}

impl SentenceSegmenter {
    /// Create a segmenter with the given safety length
    #[must_use]
    pub const fn new(max_unit_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            next_index: 0,
            max_unit_chars,
        }
    }

    /// Push one text delta; returns units completed by it, in order
    pub fn push(&mut self, delta: &str) -> Vec<SynthesisUnit> {
        self.buffer.push_str(delta);
        let mut completed = Vec::new();

        loop {
            if let Some(boundary) = self.find_boundary() {
                let rest = self.buffer.split_off(boundary);
                let sentence = std::mem::replace(&mut self.buffer, rest);
                self.emit(sentence.trim(), &mut completed);
                continue;
            }

            if self.buffer.chars().count() >= self.max_unit_chars {
                let overlong = std::mem::take(&mut self.buffer);
                self.emit(overlong.trim(), &mut completed);
                continue;
            }

            break;
        }

        completed
    }

    /// End of stream: emit any remainder even without terminal punctuation
    pub fn flush(&mut self) -> Option<SynthesisUnit> {
        let remainder = std::mem::take(&mut self.buffer);
        let text = remainder.trim();
        if text.is_empty() {
            return None;
        }
        let unit = SynthesisUnit::pending(self.next_index, text.to_string());
        self.next_index += 1;
        Some(unit)
    }

    /// Units emitted so far
    #[must_use]
    pub const fn units_emitted(&self) -> usize {
        self.next_index
    }

    /// Byte offset just past the first sentence terminator that is followed
    /// by whitespace
    fn find_boundary(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if TERMINALS.contains(&c) {
                if let Some((_, next)) = chars.peek() {
                    if next.is_whitespace() {
                        return Some(i + c.len_utf8());
                    }
                }
            }
        }
        None
    }

    fn emit(&mut self, text: &str, completed: &mut Vec<SynthesisUnit>) {
        if text.is_empty() {
            return;
        }
        completed.push(SynthesisUnit::pending(self.next_index, text.to_string()));
        self.next_index += 1;
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNIT_CHARS)
    }
}
