use crate::builder::IndexBuilder;
use crate::chunking::chunk_text_with_units;
use crate::embeddings::Embedder;
use crate::error::{IndexError, IngestError};
use crate::extractor::extract_document;
use crate::models::{ChunkRecord, ChunkingOptions, PipelineConfig, RetrievalResult, SourceDocument};
use crate::retriever::Retriever;
use crate::store::IndexManifest;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions picked up during discovery. The legacy binary `doc` and `ppt`
/// formats have no extractor and are reported as skipped.
pub const DOCUMENT_EXTENSIONS: [&str; 9] =
    ["pdf", "txt", "md", "docx", "doc", "xlsx", "xls", "pptx", "ppt"];

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_document = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                DOCUMENT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if is_document {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct CorpusReport {
    pub documents: Vec<SourceDocument>,
    pub skipped: Vec<SkippedDocument>,
}

/// Extracts every discovered document. Unreadable, unsupported and empty
/// files are skipped with a reason instead of failing the whole corpus.
pub fn load_corpus_best_effort(folder: &Path) -> Result<CorpusReport, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "document folder does not exist: {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    for path in discover_documents(folder) {
        match extract_document(&path) {
            Ok(extracted) if extracted.is_empty() => skipped.push(SkippedDocument {
                path,
                reason: "document has no extractable text".to_string(),
            }),
            Ok(extracted) => documents.push(extracted.normalize()),
            Err(error) => skipped.push(SkippedDocument {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(CorpusReport { documents, skipped })
}

/// Chunks each document and tags the chunks with their source filename.
pub fn chunk_corpus(documents: &[SourceDocument], options: &ChunkingOptions) -> Vec<ChunkRecord> {
    let mut records = Vec::new();

    for document in documents {
        let chunks = chunk_text_with_units(&document.text, &document.units, options);
        debug!(source = %document.filename, chunk_count = chunks.len(), "chunked document");
        records.extend(
            chunks
                .into_iter()
                .map(|chunk| chunk.into_record(document.filename.clone())),
        );
    }

    records
}

pub struct BuildReport {
    pub documents: usize,
    pub skipped: Vec<SkippedDocument>,
    pub chunks: usize,
    /// `None` when there was nothing to index and no artifacts were written.
    pub manifest: Option<IndexManifest>,
}

/// Discovery, extraction, chunking and index build in one pass.
pub fn build_corpus_index(
    config: &PipelineConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<BuildReport, IngestError> {
    config.chunking.validate()?;
    if config.batch_size == 0 {
        return Err(IngestError::InvalidArgument(
            "batch_size must be greater than zero".to_string(),
        ));
    }
    let builder = IndexBuilder::new(embedder).with_batch_size(config.batch_size);

    let corpus = load_corpus_best_effort(&config.documents_dir)?;
    for skipped in &corpus.skipped {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
    }

    let records = chunk_corpus(&corpus.documents, &config.chunking);
    let mut report = BuildReport {
        documents: corpus.documents.len(),
        skipped: corpus.skipped,
        chunks: records.len(),
        manifest: None,
    };

    if records.is_empty() {
        warn!(
            folder = %config.documents_dir.display(),
            documents = report.documents,
            "no text chunks produced; index not written"
        );
        return Ok(report);
    }

    info!(
        documents = report.documents,
        chunk_count = records.len(),
        "indexing corpus"
    );
    report.manifest = Some(builder.build_from_records(&records, &config.embeddings_dir)?);
    Ok(report)
}

/// Loads the index under `embeddings_dir` and returns the `top_k` chunks
/// closest to `query`.
pub fn search_corpus_index(
    config: &PipelineConfig,
    retriever: &Retriever,
    query: &str,
) -> Result<Vec<RetrievalResult>, IndexError> {
    let loaded = retriever.load(&config.embeddings_dir)?;
    retriever.retrieve_loaded(query, &loaded, config.top_k)
}
