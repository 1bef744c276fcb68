use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies the structural unit a span of text came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UnitRef {
    Page(u32),
    Paragraph(u32),
    Sheet(String),
    Slide(u32),
    Unknown,
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(number) => write!(f, "page {number}"),
            Self::Paragraph(number) => write!(f, "paragraph {number}"),
            Self::Sheet(name) => write!(f, "sheet {name}"),
            Self::Slide(number) => write!(f, "slide {number}"),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// A page, paragraph, sheet or slide with its half-open character span
/// `[char_start, char_end)` in the document's full text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralUnit {
    pub unit_ref: UnitRef,
    pub char_start: usize,
    pub char_end: usize,
}

impl StructuralUnit {
    pub fn overlaps(&self, char_start: usize, char_end: usize) -> bool {
        char_start < self.char_end && char_end > self.char_start
    }
}

/// A document as handed over by extraction, with normalized units.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub text: String,
    pub units: Vec<StructuralUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub unit_refs: Vec<UnitRef>,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn into_record(self, source: impl Into<String>) -> ChunkRecord {
        ChunkRecord {
            text: self.text,
            source: source.into(),
            unit_refs: self.unit_refs,
            char_start: self.char_start,
            char_end: self.char_end,
        }
    }
}

/// Persisted description of one indexed chunk. Position `i` in the metadata
/// store describes vector `i` in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub source: String,
    pub unit_refs: Vec<UnitRef>,
    pub char_start: usize,
    pub char_end: usize,
}

pub type MetadataStore = Vec<ChunkRecord>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(flatten)]
    pub record: ChunkRecord,
    pub distance: f32,
    pub similarity_score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_tokens: 50,
        }
    }
}

impl ChunkingOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_tokens == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_tokens ({}) must be smaller than max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub documents_dir: PathBuf,
    pub embeddings_dir: PathBuf,
    pub chunking: ChunkingOptions,
    pub top_k: usize,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("data"),
            embeddings_dir: PathBuf::from("embeddings"),
            chunking: ChunkingOptions::default(),
            top_k: 5,
            batch_size: 32,
        }
    }
}
