//! Newline-delimited framing.
//!
//! The server writes one JSON object per line. Reads off a socket do not
//! respect those boundaries, so [`FrameDecoder`] accumulates bytes and hands
//! back only complete lines:
//!
//! ```text
//! read #1: {"type":"notifi
//! read #2: cation",...}\n{"type":"response",...}\n{"ty
//! read #3: pe":...
//!          └──────── frame 1 ───────┘└──── frame 2 ────┘└ kept ┘
//! ```

/// Frame delimiter.
pub const DELIMITER: u8 = b'\n';

/// Splits an append-only byte buffer into complete frames.
///
/// Bytes after the last delimiter are retained until more input arrives;
/// they are never parsed on their own.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Start of the first unconsumed byte.
    cursor: usize,
    /// Everything in `cursor..scanned` is known to contain no delimiter.
    scanned: usize,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.compact();
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// A trailing `\r` is stripped and blank lines are skipped.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let offset = self.buf[self.scanned..]
                .iter()
                .position(|&b| b == DELIMITER);

            let Some(offset) = offset else {
                self.scanned = self.buf.len();
                return None;
            };

            let end = self.scanned + offset;
            let mut line = &self.buf[self.cursor..end];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            let frame = if line.iter().all(u8::is_ascii_whitespace) {
                tracing::trace!(len = end - self.cursor, "skipping blank frame");
                None
            } else {
                Some(line.to_vec())
            };

            self.cursor = end + 1;
            self.scanned = self.cursor;

            if frame.is_some() {
                return frame;
            }
        }
    }

    /// Iterate over the frames currently buffered.
    ///
    /// The iterator ends when no complete frame is left; calling `frames()`
    /// again after [`extend`](Self::extend) resumes where it stopped.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Whether any undelimited bytes are buffered.
    pub fn has_partial(&self) -> bool {
        self.pending() > 0
    }

    /// Handle end-of-stream.
    ///
    /// Complete frames should be drained first. Whatever remains is an
    /// unterminated fragment; it is discarded and its length returned.
    pub fn finish(&mut self) -> usize {
        let trailing = self.pending();
        self.buf.clear();
        self.cursor = 0;
        self.scanned = 0;
        trailing
    }

    fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        if self.cursor == self.buf.len() {
            self.buf.clear();
            self.cursor = 0;
            self.scanned = 0;
        } else if self.cursor >= self.buf.len() / 2 {
            self.buf.drain(..self.cursor);
            self.scanned -= self.cursor;
            self.cursor = 0;
        }
    }
}

/// Lazy iterator returned by [`FrameDecoder::frames`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &[u8] = b"{\"type\":\"notification\",\"event\":\"tool_started\",\"message\":\"pwd\"}\n\
{\"type\":\"response\",\"id\":\"1\",\"result\":{\"output\":\"/home/user\",\"exit_code\":0}}\n";

    fn collect_chunked(input: &[u8], chunk: usize) -> Vec<Vec<u8>> {
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for piece in input.chunks(chunk) {
            decoder.extend(piece);
            out.extend(decoder.frames());
        }
        out
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"a\":1}\n");
        assert_eq!(decoder.next_frame(), Some(b"{\"a\":1}".to_vec()));
        assert_eq!(decoder.next_frame(), None);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_many_frames_in_one_read() {
        let frames = collect_chunked(STREAM, STREAM.len());
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with(b"{\"type\":\"notification\""));
        assert!(frames[1].starts_with(b"{\"type\":\"response\""));
    }

    #[test]
    fn test_chunk_size_does_not_change_frames() {
        let whole = collect_chunked(STREAM, STREAM.len());
        for chunk in [1, 2, 3, 7, 16, 64] {
            assert_eq!(collect_chunked(STREAM, chunk), whole, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"type\":\"resp");
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.pending(), 13);

        decoder.extend(b"onse\"}\n{\"x\"");
        assert_eq!(decoder.next_frame(), Some(b"{\"type\":\"response\"}".to_vec()));
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.pending(), 4);
    }

    #[test]
    fn test_delimiter_split_from_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{}");
        assert_eq!(decoder.next_frame(), None);
        decoder.extend(b"\n");
        assert_eq!(decoder.next_frame(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_finish_discards_trailing_fragment() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"a\":1}\n{\"b\":");
        assert_eq!(decoder.next_frame(), Some(b"{\"a\":1}".to_vec()));
        assert_eq!(decoder.finish(), 5);
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"\n\r\n  \n{\"a\":1}\r\n\n{\"b\":2}\n");
        let frames: Vec<_> = decoder.frames().collect();
        assert_eq!(frames, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn test_frames_iterator_is_restartable() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"a\":1}\n{\"b\"");
        assert_eq!(decoder.frames().count(), 1);
        assert_eq!(decoder.frames().count(), 0);
        decoder.extend(b":2}\n");
        assert_eq!(decoder.frames().collect::<Vec<_>>(), vec![b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn test_compaction_keeps_partial_bytes() {
        let mut decoder = FrameDecoder::new();
        for i in 0..100 {
            decoder.extend(format!("{{\"n\":{}}}\n{{\"par", i).as_bytes());
            assert_eq!(decoder.next_frame().map(|f| f.starts_with(b"{")), Some(true));
            decoder.extend(b"tial\":true}\n");
            assert_eq!(decoder.next_frame(), Some(b"{\"partial\":true}".to_vec()));
        }
        assert_eq!(decoder.pending(), 0);
    }
}
