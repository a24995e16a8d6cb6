//! Bounded capture of child process output
//!
//! Installers can print megabytes of progress output. Only the most recent
//! `capacity` bytes are kept; older bytes are dropped from the front.

use std::collections::VecDeque;

/// Default number of bytes retained for diagnostics
pub const DEFAULT_TAIL_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct OutputTail {
    buf: VecDeque<u8>,
    capacity: usize,
    /// Total bytes ever written, including dropped ones
    written: u64,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            written: 0,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.written += bytes.len() as u64;

        // Only the last `capacity` bytes of a large chunk can survive.
        let bytes = if bytes.len() > self.capacity {
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };

        let overflow = (self.buf.len() + bytes.len()).saturating_sub(self.capacity);
        self.buf.drain(..overflow);
        self.buf.extend(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether output was dropped to stay within capacity
    pub fn truncated(&self) -> bool {
        self.written > self.buf.len() as u64
    }

    /// Retained output as text (lossy UTF-8, a cut multi-byte char becomes U+FFFD)
    pub fn to_text(&self) -> String {
        let (front, back) = self.buf.as_slices();
        let mut bytes = Vec::with_capacity(self.buf.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_BYTES)
    }
}
