//! Terminal input line discipline
//!
//! Characters arrive one per receive interrupt. They accumulate in the
//! current line until a newline arrives (the newline is kept) or the line
//! reaches `max_line` bytes, at which point the line is complete.

use alloc::vec::Vec;

/// Result of feeding one character
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    /// Character buffered, line still open
    Pending,
    /// Line terminated by newline
    Line(Vec<u8>),
    /// Line cut at `max_line` bytes without a newline
    Full(Vec<u8>),
}

/// Accumulates received characters into lines.
pub struct LineDiscipline {
    current: Vec<u8>,
    max_line: usize,
}

impl LineDiscipline {
    /// New discipline producing lines of at most `max_line` bytes.
    pub fn new(max_line: usize) -> Self {
        Self {
            current: Vec::with_capacity(max_line),
            max_line: max_line.max(1),
        }
    }

    /// Bytes in the open line
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    /// Feed one received character.
    pub fn push(&mut self, byte: u8) -> LineEvent {
        self.current.push(byte);
        if byte == b'\n' {
            return LineEvent::Line(self.take());
        }
        if self.current.len() >= self.max_line {
            return LineEvent::Full(self.take());
        }
        LineEvent::Pending
    }

    fn take(&mut self) -> Vec<u8> {
        core::mem::replace(&mut self.current, Vec::with_capacity(self.max_line))
    }
}
