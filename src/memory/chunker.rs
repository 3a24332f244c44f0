// src/memory/chunker.rs
// Overlapping-window text chunking for embedding

use anyhow::Result;

/// Splits message content into bounded-size chunks with a fixed overlap, so
/// that long messages embed as several records instead of one truncated one.
///
/// Windows are measured in characters and advance by `size - overlap`, which
/// for content of length L > size yields `ceil((L - overlap) / (size - overlap))`
/// chunks.
#[derive(Debug, Clone)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(anyhow::anyhow!("chunk size must be non-zero"));
        }
        if overlap >= size {
            return Err(anyhow::anyhow!(
                "chunk overlap {} must be smaller than chunk size {}",
                overlap,
                size
            ));
        }
        Ok(Self { size, overlap })
    }

    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.size {
            return vec![text.to_string()];
        }

        let step = self.size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = usize::min(start + self.size, chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
        if len <= size {
            1
        } else {
            (len - overlap).div_ceil(size - overlap)
        }
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = TextChunker::new(500, 50).unwrap();
        let chunks = chunker.chunk_text("hello");
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn test_chunk_count_matches_formula() {
        let chunker = TextChunker::new(100, 20).unwrap();
        for len in [100, 101, 180, 181, 500, 999] {
            let text = "x".repeat(len);
            let chunks = chunker.chunk_text(&text);
            assert_eq!(
                chunks.len(),
                expected_count(len, 100, 20),
                "wrong chunk count for len {}",
                len
            );
        }
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let chunker = TextChunker::new(10, 4).unwrap();
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker.chunk_text(text);

        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0].chars().skip(pair[0].chars().count() - 4).collect();
            assert!(pair[1].starts_with(&prev_tail));
        }
    }

    #[test]
    fn test_chunks_cover_full_text() {
        let chunker = TextChunker::new(10, 4).unwrap();
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        let chunks = chunker.chunk_text(text);
        assert!(chunks.last().unwrap().ends_with('9'));
        assert!(chunks.first().unwrap().starts_with('a'));
    }

    #[test]
    fn test_multibyte_content_does_not_panic() {
        let chunker = TextChunker::new(5, 2).unwrap();
        let text = "héllo wörld ünïcode tëst çontent";
        let chunks = chunker.chunk_text(text);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(10, 10).is_err());
        assert!(TextChunker::new(10, 20).is_err());
    }
}
