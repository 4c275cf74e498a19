use crate::error::ConfigError;

pub const DEFAULT_CHUNK_SIZE: usize = 10;
pub const DEFAULT_CHUNK_OVERLAP: usize = 8;

/// Sliding-window parameters. Only constructible with a positive step, so
/// [`ChunkConfig::chunk`] always terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    size: usize,
    overlap: usize,
}

impl ChunkConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if overlap >= size {
            return Err(ConfigError::Overlap {
                chunk_size: size,
                overlap,
            });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Split `text` into overlapping word windows.
    ///
    /// Text with at most `size` words comes back as-is in a single chunk.
    /// Longer text is walked with a window of `size` words and a stride of
    /// `size - overlap`; the walk ends with the first window that reaches the
    /// last word.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }
        if words.len() <= self.size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        for start in (0..words.len()).step_by(self.step()) {
            let end = (start + self.size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if start + self.size >= words.len() {
                break;
            }
        }
        chunks
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

pub fn chunk_message(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ConfigError> {
    Ok(ChunkConfig::new(size, overlap)?.chunk(text))
}
