//! Stream framing
//!
//! TCP hands us an ordered byte stream with no message boundaries: one read
//! may carry a fragment of a line, exactly one line, or several lines glued
//! together. `Framer` buffers the raw bytes and yields complete
//! newline-delimited UTF-8 frames, carrying any trailing partial frame over
//! to the next read. It knows nothing about chat semantics.

use crate::error::FrameError;

/// Default maximum frame length in bytes (delimiter and trailing
/// carriage return excluded)
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024;

/// Incremental newline-delimited frame decoder
///
/// Feed raw reads through [`Framer::decode`]; a frame exceeding the length
/// limit or containing invalid UTF-8 poisons the framer, since the session is
/// torn down for a protocol violation anyway.
#[derive(Debug)]
pub struct Framer {
    buf: Vec<u8>,
    max_frame_len: usize,
    poisoned: bool,
}

impl Framer {
    /// Create a framer enforcing the given maximum frame length
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
            poisoned: false,
        }
    }

    /// Buffer new bytes and iterate over the complete frames now available
    ///
    /// The returned iterator is lazy and finite; a trailing partial frame
    /// stays buffered for the next call. An empty `input` is fine and simply
    /// yields whatever was already complete (end-of-stream detection is the
    /// caller's job via the zero-length read).
    pub fn decode<'a>(&'a mut self, input: &[u8]) -> Frames<'a> {
        if !self.poisoned {
            self.buf.extend_from_slice(input);
        }
        Frames { framer: self }
    }

    /// Serialize one outbound line to delimiter-terminated bytes
    ///
    /// The delimiter may never appear inside a frame, so embedded line breaks
    /// are replaced with spaces.
    pub fn encode(line: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(line.len() + 1);
        for byte in line.bytes() {
            out.push(match byte {
                b'\n' | b'\r' => b' ',
                other => other,
            });
        }
        out.push(b'\n');
        out
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.buf.clear();
    }
}

/// Iterator over complete frames buffered so far
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut Framer,
}

impl Iterator for Frames<'_> {
    type Item = Result<String, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let framer = &mut *self.framer;
        if framer.poisoned {
            return None;
        }

        let Some(idx) = framer.buf.iter().position(|&b| b == b'\n') else {
            // No complete frame yet; an over-long partial can already be
            // rejected without waiting for its delimiter. A trailing '\r'
            // may still turn out to be part of a CRLF, so it doesn't count.
            let len = match framer.buf.last() {
                Some(&b'\r') => framer.buf.len() - 1,
                _ => framer.buf.len(),
            };
            if len > framer.max_frame_len {
                framer.poison();
                return Some(Err(FrameError::Oversized {
                    len,
                    max: framer.max_frame_len,
                }));
            }
            return None;
        };

        // The limit applies to frame content: neither the delimiter nor a
        // CRLF's carriage return count against it.
        let len = match idx.checked_sub(1).map(|i| framer.buf[i]) {
            Some(b'\r') => idx - 1,
            _ => idx,
        };
        if len > framer.max_frame_len {
            framer.poison();
            return Some(Err(FrameError::Oversized {
                len,
                max: framer.max_frame_len,
            }));
        }

        let mut line: Vec<u8> = framer.buf.drain(..=idx).collect();
        line.pop(); // the '\n' delimiter
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        match String::from_utf8(line) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                framer.poison();
                Some(Err(FrameError::InvalidUtf8))
            }
        }
    }
}
