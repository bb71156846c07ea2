//! Newline-delimited JSON framing with trailing-object tolerance.
//!
//! The two ends of the wire disagree on termination: the bridge always
//! appends `\n`, while some editor builds flush a bare JSON object with no
//! newline. `FrameBuffer` accepts both: it drains every `\n`-delimited
//! candidate first, then, if the remainder parses as one complete JSON
//! value, emits it and clears the buffer. An incomplete tail stays
//! buffered for the next feed.

use serde_json::Value;

/// Default cap on a single peer's receive buffer. A frame larger than this
/// indicates a runaway or hostile peer; the owning connection should drop.
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

/// One outcome from feeding bytes into a [`FrameBuffer`].
#[derive(Debug)]
pub enum Frame {
    /// A complete JSON object (or other value) framed off the stream.
    Message(Value),
    /// A `\n`-delimited candidate that failed to parse. The stream
    /// continues at the next newline.
    Invalid { raw: String, error: String },
}

/// Framing failure that terminates the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("receive buffer overflow: {size} bytes buffered (cap {cap})")]
    Overflow { size: usize, cap: usize },
}

/// Stateful per-connection framer.
///
/// Buffers raw bytes, not text: a read may end mid-way through a
/// multibyte UTF-8 sequence, so decoding happens per complete candidate.
pub struct FrameBuffer {
    buf: Vec<u8>,
    cap: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_BUFFER)
    }

    pub fn with_capacity_limit(cap: usize) -> Self {
        Self {
            buf: Vec::new(),
            cap,
        }
    }

    /// Bytes currently buffered waiting for completion.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append `bytes` and frame off every complete message.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buf.extend_from_slice(bytes);

        if self.buf.len() > self.cap {
            return Err(FrameError::Overflow {
                size: self.buf.len(),
                cap: self.cap,
            });
        }

        let mut out = Vec::new();

        // Drain every newline-delimited candidate first.
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let decoded = String::from_utf8_lossy(&line);
            let candidate = decoded.trim();
            if candidate.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(candidate) {
                Ok(v) => out.push(Frame::Message(v)),
                Err(e) => out.push(Frame::Invalid {
                    raw: candidate.to_string(),
                    error: e.to_string(),
                }),
            }
        }

        // Trailing-object tolerance: only after all newlines are drained.
        // An incomplete UTF-8 tail fails the decode and stays buffered.
        if let Ok(tail) = std::str::from_utf8(&self.buf) {
            let tail = tail.trim();
            if !tail.is_empty() {
                if let Ok(v) = serde_json::from_str::<Value>(tail) {
                    out.push(Frame::Message(v));
                    self.buf.clear();
                }
            }
        }

        Ok(out)
    }
}
