//! PCM conversion and the per-session rolling sample buffer.

/// Converts 16-bit little-endian PCM bytes to normalized f32 samples in
/// [-1.0, 1.0]. A trailing odd byte is dropped.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}

/// Ordered samples plus a read offset, owned by exactly one session.
///
/// The offset tracks how far the VAD has consumed the buffer; trimming
/// rebases it so window boundaries stay aligned.
#[derive(Debug, Default)]
pub struct RollingBuffer {
    samples: Vec<f32>,
    offset: usize,
}

impl RollingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the next unconsumed window of `size` samples if one is
    /// fully buffered, advancing the offset past it.
    pub fn next_window(&mut self, size: usize) -> Option<&[f32]> {
        if self.offset + size > self.samples.len() {
            return None;
        }
        let window = &self.samples[self.offset..self.offset + size];
        self.offset += size;
        Some(window)
    }

    /// Keeps only the trailing `keep` samples and rebases the offset.
    pub fn trim_to_last(&mut self, keep: usize) {
        if self.samples.len() <= keep {
            return;
        }
        let excess = self.samples.len() - keep;
        self.samples.drain(..excess);
        self.offset = self.offset.saturating_sub(excess);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.offset = 0;
    }
}
