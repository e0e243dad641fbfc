//! Text chunking module
//!
//! Splits cleaned lyrics into fixed-size token windows for embedding. The
//! whole text is tokenized once with the GPT-2 BPE vocabulary (`r50k_base`)
//! and a window of `chunk_size` tokens slides forward by
//! `chunk_size - chunk_overlap`, so consecutive chunks share exactly
//! `chunk_overlap` tokens. The last window may be shorter.

use crate::errors::IngestionError;
use drunkenbot_common::config::ChunkingSettings;
use tiktoken_rs::{CoreBPE, Rank};
use tracing::debug;

/// A text chunk with its position in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk content
    pub content: String,
    /// Ordinal of this chunk within its song
    pub index: usize,
    /// Index of the first token of this window
    pub token_start: usize,
    /// Number of tokens in this window
    pub token_count: usize,
    /// Start byte offset in the source text
    pub start_pos: usize,
    /// End byte offset in the source text
    pub end_pos: usize,
}

/// Sliding token-window splitter
pub struct Chunker {
    tokenizer: CoreBPE,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(settings: &ChunkingSettings) -> Result<Self, IngestionError> {
        if settings.chunk_size == 0 {
            return Err(IngestionError::Chunking("chunk_size must be positive".to_string()));
        }
        if settings.chunk_overlap >= settings.chunk_size {
            return Err(IngestionError::Chunking(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                settings.chunk_overlap, settings.chunk_size
            )));
        }

        let tokenizer = tiktoken_rs::r50k_base()
            .map_err(|e| IngestionError::Chunking(format!("tokenizer: {}", e)))?;

        Ok(Self {
            tokenizer,
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Tokens between the starts of consecutive windows
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Token ids of `text`
    pub fn encode(&self, text: &str) -> Vec<Rank> {
        self.tokenizer.encode_ordinary(text)
    }

    /// Number of tokens in `text`
    pub fn count_tokens(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Split `text` into ordered chunks numbered from 0
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let tokens = self.encode(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        // Byte offset of each token boundary; the tokens concatenate back to `text`
        let mut offsets = Vec::with_capacity(tokens.len() + 1);
        offsets.push(0usize);
        for bytes in self.tokenizer._decode_native_and_split(tokens.clone()) {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + bytes.len());
        }

        let mut chunks = Vec::new();
        let mut token_start = 0;
        loop {
            let token_end = (token_start + self.chunk_size).min(tokens.len());

            // A character split across tokens stays whole in both neighbours
            let start_pos = floor_char_boundary(text, offsets[token_start]);
            let end_pos = ceil_char_boundary(text, offsets[token_end]);

            chunks.push(TextChunk {
                content: text[start_pos..end_pos].to_string(),
                index: chunks.len(),
                token_start,
                token_count: token_end - token_start,
                start_pos,
                end_pos,
            });

            if token_end == tokens.len() {
                break;
            }
            token_start += self.stride();
        }

        debug!(
            input_len = text.len(),
            tokens = tokens.len(),
            chunk_count = chunks.len(),
            chunk_size = self.chunk_size,
            "Text chunked"
        );

        chunks
    }
}

fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn ceil_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    const LYRICS: &str = "Is this the real life? Is this just fantasy?\n\
        Caught in a landslide, no escape from reality\n\
        Open your eyes, look up to the skies and see\n\
        I'm just a poor boy, I need no sympathy\n\
        Because I'm easy come, easy go, little high, little low\n\
        Any way the wind blows doesn't really matter to me, to me";

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingSettings {
            chunk_size: size,
            chunk_overlap: overlap,
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        for (size, overlap) in [(10, 10), (10, 12), (0, 0)] {
            let result = Chunker::new(&ChunkingSettings {
                chunk_size: size,
                chunk_overlap: overlap,
            });
            assert!(matches!(result, Err(IngestionError::Chunking(_))));
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(chunker(25, 7).chunk("").is_empty());
    }

    #[test]
    fn test_window_count_follows_stride() {
        let chunker = chunker(25, 7);
        let n = chunker.count_tokens(LYRICS);
        assert!(n > 25);

        let chunks = chunker.chunk(LYRICS);
        assert_eq!(chunks.len(), (n - 7).div_ceil(18));

        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.token_count, 25);
        }
        let last = &chunks[chunks.len() - 1];
        assert_eq!(last.token_start + last.token_count, n);
        assert!(last.token_count <= 25);
    }

    #[test]
    fn test_consecutive_chunks_share_exactly_overlap_tokens() {
        let chunker = chunker(25, 7);
        let tokens = chunker.encode(LYRICS);
        let chunks = chunker.chunk(LYRICS);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.token_start, i * 18);
            let window = tokens[chunk.token_start..chunk.token_start + chunk.token_count].to_vec();
            assert_eq!(chunker.tokenizer.decode(window).unwrap(), chunk.content);
        }

        for w in chunks.windows(2) {
            let shared = w[0].token_start + w[0].token_count - w[1].token_start;
            assert_eq!(shared, 7);

            let shared_text = &LYRICS[w[1].start_pos..w[0].end_pos];
            let shared_tokens = tokens[w[1].token_start..w[1].token_start + 7].to_vec();
            assert_eq!(chunker.tokenizer.decode(shared_tokens).unwrap(), shared_text);
            assert!(w[0].content.ends_with(shared_text));
            assert!(w[1].content.starts_with(shared_text));
        }
    }

    #[test]
    fn test_offsets_cover_the_text() {
        let chunks = chunker(25, 7).chunk(LYRICS);
        for chunk in &chunks {
            assert_eq!(&LYRICS[chunk.start_pos..chunk.end_pos], chunk.content);
        }
        assert_eq!(chunks[0].start_pos, 0);
        assert_eq!(chunks[chunks.len() - 1].end_pos, LYRICS.len());
        assert!(chunks.windows(2).all(|w| w[1].start_pos < w[0].end_pos));
    }

    #[test]
    fn test_multibyte_characters_are_never_split() {
        let text = "Déjà vu, señorita, 日本語の歌詞 🎸🎶 ".repeat(12);
        let chunks = chunker(25, 7).chunk(&text);
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start_pos));
            assert!(text.is_char_boundary(chunk.end_pos));
            assert_eq!(&text[chunk.start_pos..chunk.end_pos], chunk.content);
        }
        assert_eq!(chunks[chunks.len() - 1].end_pos, text.len());
        assert!(chunks.windows(2).all(|w| w[1].start_pos < w[0].end_pos));
    }

    #[test]
    fn test_deterministic() {
        let chunker = chunker(25, 7);
        assert_eq!(chunker.chunk(LYRICS), chunker.chunk(LYRICS));
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunker(25, 7).chunk("Mama, just killed a man");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Mama, just killed a man");
        assert!(chunks[0].token_count > 0);
    }
}
