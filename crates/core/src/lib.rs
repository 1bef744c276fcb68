pub mod builder;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod retriever;
pub mod store;

pub use builder::IndexBuilder;
pub use chunking::{
    assemble_chunks, chunk_plain, chunk_text_with_units, normalize_whitespace, split_sentences,
    Sentence,
};
#[cfg(feature = "fastembed")]
pub use embeddings::MiniLmEmbedder;
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbedderConfig, DEFAULT_EMBEDDING_DIMENSIONS,
    MINILM_MODEL_ID,
};
pub use error::{EmbedError, IndexError, IngestError};
pub use extractor::{
    extract_document, DocumentExtractor, DocxExtractor, ExtractedDocument, PdfExtractor,
    PlainTextExtractor, PptxExtractor, SpreadsheetExtractor,
};
pub use index::{FlatIndex, Neighbor};
pub use ingest::{
    build_corpus_index, chunk_corpus, discover_documents, load_corpus_best_effort,
    search_corpus_index, BuildReport, CorpusReport, SkippedDocument,
};
pub use models::{
    Chunk, ChunkRecord, ChunkingOptions, MetadataStore, PipelineConfig, RetrievalResult,
    SourceDocument, StructuralUnit, UnitRef,
};
pub use normalize::{normalize_units, UnitMetadata};
pub use retriever::{
    similarity_from_distance, summarize_sources, Retriever, SourceSummary, DEFAULT_TOP_K,
};
pub use store::{IndexHandle, IndexManifest, LoadedIndex, INDEX_FILE, METADATA_FILE};
