//! Text splitting service for document chunking.
//!
//! Two strategies are offered. [`ChunkingStrategy::Fixed`] slides a character
//! window of `chunk_size` with step `chunk_size - overlap`, so identical input
//! always yields identical boundaries and at most
//! `ceil((len - overlap) / (chunk_size - overlap))` chunks. Windows holding
//! only whitespace are dropped and the remaining chunks are renumbered.
//! [`ChunkingStrategy::Semantic`] uses the `text-splitter` crate to cut at
//! sentence and paragraph boundaries while respecting the same size limit.

#[cfg(feature = "config")]
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use text_splitter::{ChunkConfig, TextSplitter};

use super::config::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::{Result, WorkerError};

/// How documents are split into chunks.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display
)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Fixed character window.
    #[default]
    Fixed,
    /// Sentence and paragraph aware splitting.
    Semantic,
}

/// Configuration for the text splitter service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitterConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub overlap: usize,
    /// Splitting strategy.
    pub strategy: ChunkingStrategy,
}

impl Default for TextSplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            strategy: ChunkingStrategy::Fixed,
        }
    }
}

impl TextSplitterConfig {
    /// Creates a new text splitter configuration.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }

    /// Sets the overlap between chunks.
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Sets the splitting strategy.
    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// A text chunk with its position in the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of the chunk in the document, starting at zero.
    pub index: usize,
    /// Byte offset in the original text.
    pub offset: usize,
    /// The chunk content.
    pub content: String,
}

/// Service for splitting documents into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitterService {
    config: TextSplitterConfig,
}

impl Default for TextSplitterService {
    fn default() -> Self {
        Self {
            config: TextSplitterConfig::default(),
        }
    }
}

impl TextSplitterService {
    /// Creates a new text splitter service with the given configuration.
    ///
    /// # Errors
    ///
    /// Fails if the chunk size is zero or the overlap is not smaller than it.
    pub fn new(config: TextSplitterConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(WorkerError::configuration("chunk size must be positive"));
        }
        if config.overlap >= config.chunk_size {
            return Err(WorkerError::configuration(
                "chunk overlap must be smaller than chunk size",
            ));
        }
        Ok(Self { config })
    }

    /// Creates a text splitter service with default settings.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &TextSplitterConfig {
        &self.config
    }

    /// Splits text into non-blank chunks with contiguous indices starting at
    /// zero.
    pub fn split(&self, text: &str) -> Result<Vec<TextChunk>> {
        match self.config.strategy {
            ChunkingStrategy::Fixed => Ok(self.split_fixed(text)),
            ChunkingStrategy::Semantic => self.split_semantic(text),
        }
    }

    fn split_fixed(&self, text: &str) -> Vec<TextChunk> {
        // Byte offset of every char, plus the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;
        if char_count == 0 {
            return Vec::new();
        }

        let size = self.config.chunk_size;
        let step = size - self.config.overlap;
        let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
        let mut start = 0;

        loop {
            let end = (start + size).min(char_count);
            let (from, to) = (boundaries[start], boundaries[end]);
            let content = &text[from..to];
            if !content.trim().is_empty() {
                chunks.push(TextChunk {
                    index: chunks.len(),
                    offset: from,
                    content: content.to_owned(),
                });
            }
            if end >= char_count {
                break;
            }
            start += step;
        }

        chunks
    }

    fn split_semantic(&self, text: &str) -> Result<Vec<TextChunk>> {
        let chunk_config = ChunkConfig::new(self.config.chunk_size)
            .with_overlap(self.config.overlap)
            .map_err(|e| WorkerError::processing_with_source("invalid chunk configuration", e))?;

        Ok(TextSplitter::new(chunk_config)
            .chunk_indices(text)
            .filter(|(_, chunk)| !chunk.trim().is_empty())
            .enumerate()
            .map(|(index, (offset, chunk))| TextChunk {
                index,
                offset,
                content: chunk.to_owned(),
            })
            .collect())
    }
}
