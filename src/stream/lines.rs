//! NDJSON line splitter
//!
//! Accumulates body bytes and yields complete lines. Handles `\n` and `\r\n`
//! endings and lines split across reads. A line that grows past the limit
//! without a newline is reported once and its remaining bytes are skipped.

/// Output of [`LineBuffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, without its terminator
    Line(Vec<u8>),
    /// A line exceeded the limit and was discarded
    Oversized { len: usize, limit: usize },
}

#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_bytes: usize,
    /// Skipping the tail of an oversized line until the next newline
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes,
            discarding: false,
        }
    }

    /// Feed bytes, returning every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while let Some(index) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(index);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.pending.clear();
                continue;
            }

            if self.pending.len() + head.len() > self.max_line_bytes {
                frames.push(Frame::Oversized {
                    len: self.pending.len() + head.len(),
                    limit: self.max_line_bytes,
                });
                self.pending.clear();
                continue;
            }

            let mut line = std::mem::take(&mut self.pending);
            line.extend_from_slice(head);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            frames.push(Frame::Line(line));
        }

        if !self.discarding {
            self.pending.extend_from_slice(rest);
            if self.pending.len() > self.max_line_bytes {
                frames.push(Frame::Oversized {
                    len: self.pending.len(),
                    limit: self.max_line_bytes,
                });
                self.pending.clear();
                self.discarding = true;
            }
        }

        frames
    }

    /// Flush the unterminated tail once the body has closed.
    pub fn finish(&mut self) -> Option<Frame> {
        let discarding = std::mem::replace(&mut self.discarding, false);
        let mut line = std::mem::take(&mut self.pending);
        if discarding || line.is_empty() {
            return None;
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(Frame::Line(line))
    }

    /// Bytes currently buffered without a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
