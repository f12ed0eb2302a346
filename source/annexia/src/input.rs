use alloc::string::String;
use core::ops::Range;

/// The current input line, and a cursor over its whitespace separated
/// tokens.
#[derive(Default)]
pub struct WordStrBuf {
    buf: String,
    cur: usize,
    cur_word: Option<Range<usize>>,
}

impl WordStrBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(&mut self, input: &str) {
        self.buf.clear();
        self.buf.push_str(input);
        self.cur = 0;
        self.cur_word = None;
    }

    pub fn advance(&mut self) {
        let _ = self.cur_word.take();
        let bytes = self.buf.as_bytes();

        // Find the start, skipping any ASCII whitespace
        let start = loop {
            match bytes.get(self.cur) {
                None => return,
                Some(b) if b.is_ascii_whitespace() => self.cur += 1,
                Some(_) => break self.cur,
            }
        };
        // Find the end, either the first ASCII whitespace, or the end of the buffer
        // This is ONE PAST the last character
        let end = loop {
            match bytes.get(self.cur) {
                Some(b) if !b.is_ascii_whitespace() => self.cur += 1,
                _ => break self.cur,
            }
        };
        // The single delimiter after a token belongs to it, so `KEY` sees
        // the character that follows.
        if end < bytes.len() {
            self.cur += 1;
        }
        self.cur_word = Some(start..end);
    }

    pub fn cur_word(&self) -> Option<&str> {
        self.cur_word.clone().map(|range| &self.buf[range])
    }

    /// Takes the next raw character of the line, past the current token.
    pub fn next_char(&mut self) -> Option<char> {
        let c = self.buf.get(self.cur..)?.chars().next()?;
        self.cur += c.len_utf8();
        Some(c)
    }

    /// The not yet consumed part of the line.
    pub fn remaining(&self) -> &str {
        self.buf.get(self.cur..).unwrap_or("")
    }
}
