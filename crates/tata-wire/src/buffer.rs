//! Line reassembly over arbitrarily chunked bytes

/// Accumulates transport chunks and yields complete newline-terminated records.
///
/// Splitting happens on raw bytes so a multi-byte UTF-8 character cut across two
/// chunks is only decoded once both halves have arrived.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    carry: Vec<u8>,
}

impl ChunkBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every line it completes.
    ///
    /// Returned lines have the terminator (`\n` or `\r\n`) stripped. Invalid UTF-8
    /// inside a line is replaced rather than dropped, so the decoder still sees the record.
    pub fn feed(&mut self, fragment: impl AsRef<[u8]>) -> Vec<String> {
        let fragment = fragment.as_ref();
        if fragment.is_empty() {
            return Vec::new();
        }

        // Only the new bytes can contain a terminator we haven't seen yet
        let scan_from = self.carry.len();
        self.carry.extend_from_slice(fragment);

        let Some(last_newline) = self.carry[scan_from..]
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| scan_from + pos)
        else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        // `complete` ends with '\n'; drop it so split doesn't yield a phantom empty line
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Append a text fragment
    pub fn feed_str(&mut self, fragment: &str) -> Vec<String> {
        self.feed(fragment.as_bytes())
    }

    /// End of stream: discard any incomplete trailing record.
    ///
    /// Returns the number of bytes dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.carry.len();
        if dropped > 0 {
            tracing::debug!("Discarding {} bytes of incomplete record at end of stream", dropped);
        }
        self.carry.clear();
        dropped
    }
}
