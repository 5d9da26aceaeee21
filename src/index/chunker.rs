//! Fixed-size overlapping chunker for news documents
//!
//! Sizes are in characters. The 1024/100 defaults are part of the index
//! contract: retrieval granularity depends on them.

pub const CHUNK_SIZE: usize = 1024;
pub const CHUNK_OVERLAP: usize = 100;

/// Preferred cut points, strongest first
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// Overlap is clamped below the chunk size so every chunk advances
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into trimmed, non-empty chunks of at most `chunk_size` chars
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                self.soft_end(&chars[start..hard_end])
                    .map(|offset| start + offset)
                    .unwrap_or(hard_end)
            } else {
                hard_end
            };

            let chunk: String = chars[start..end].iter().collect();
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= total {
                break;
            }

            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Char offset just past the strongest separator in the back half of the window
    fn soft_end(&self, window: &[char]) -> Option<usize> {
        let text: String = window.iter().collect();
        let min_offset = window.len() / 2;

        SEPARATORS.iter().find_map(|sep| {
            let byte_pos = text.rfind(sep)?;
            let offset = text[..byte_pos].chars().count() + sep.chars().count();
            (offset > min_offset).then_some(offset)
        })
    }
}
