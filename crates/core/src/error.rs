use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("office document parse error: {0}")]
    OfficeParse(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model could not be loaded (offline: {offline}; online: {online})")]
    Initialization { offline: String, online: String },

    #[error("embedding failed: {0}")]
    Encode(String),

    #[error("embedder returned {actual} vectors for {expected} inputs")]
    OutputCount { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no embeddings found in {}; run the build step first", dir.display())]
    MissingArtifacts { dir: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt index artifact: {0}")]
    Corrupt(String),

    #[error("metadata checksum does not match the index manifest")]
    ChecksumMismatch,

    #[error("index holds {vectors} vectors but metadata holds {records} records")]
    Misaligned { vectors: usize, records: usize },

    #[error("got {texts} chunk texts for {records} chunk records")]
    LengthMismatch { texts: usize, records: usize },

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Embed(#[from] EmbedError),
}

impl IndexError {
    /// True when the artifacts were never built, as opposed to being unreadable.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingArtifacts { .. })
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
