//! Fixed-window text chunking with overlap.
//!
//! Sizes are counted in characters (Unicode scalar values). Consecutive
//! chunks share exactly `overlap` characters, and the last chunk may be
//! shorter than `chunk_size`. Text is never trimmed, so dropping the overlap
//! from every chunk after the first reproduces the document exactly.

use crate::types::{Chunk, Document};
use cyclecare_core::{AppError, AppResult, RagConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with `AppError::Config` unless `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::Config("chunk size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(AppError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &RagConfig) -> AppResult<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily split a document. Every call starts from the beginning.
    pub fn split<'a>(&self, document: &'a Document) -> ChunkIter<'a> {
        ChunkIter {
            document,
            chunk_size: self.chunk_size,
            step: self.chunk_size - self.overlap,
            char_len: document.text.chars().count(),
            start: 0,
            start_byte: 0,
            position: 0,
            finished: false,
        }
    }
}

/// Iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    document: &'a Document,
    chunk_size: usize,
    step: usize,
    char_len: usize,
    start: usize,
    start_byte: usize,
    position: usize,
    finished: bool,
}

impl ChunkIter<'_> {
    /// Byte offset of the character `chars` characters after `start_byte`.
    fn advance(&self, chars: usize) -> usize {
        let text = &self.document.text;
        text[self.start_byte..]
            .char_indices()
            .nth(chars)
            .map(|(offset, _)| self.start_byte + offset)
            .unwrap_or(text.len())
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.finished || self.start >= self.char_len {
            return None;
        }

        let end = (self.start + self.chunk_size).min(self.char_len);
        let end_byte = self.advance(end - self.start);

        let chunk = Chunk {
            id: format!("{}:{}", self.document.id, self.position),
            document_id: self.document.id.clone(),
            position: self.position,
            text: self.document.text[self.start_byte..end_byte].to_string(),
            char_start: self.start,
            char_end: end,
            metadata: self.document.metadata.clone(),
        };

        if end == self.char_len {
            self.finished = true;
        } else {
            self.start_byte = self.advance(self.step);
            self.start += self.step;
            self.position += 1;
        }

        Some(chunk)
    }
}
