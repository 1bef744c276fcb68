use crate::embeddings::Embedder;
use crate::error::{EmbedError, IndexError};
use crate::index::FlatIndex;
use crate::models::ChunkRecord;
use crate::store::{self, IndexManifest};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_BATCH_SIZE: usize = 32;

/// Encodes chunk texts and persists the resulting index with its metadata.
/// Every build starts from scratch.
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn encode<S: AsRef<str>>(&self, texts: &[S]) -> Result<FlatIndex, IndexError> {
        let mut index = FlatIndex::new(self.embedder.dimensions());

        for (batch_number, batch) in texts.chunks(self.batch_size).enumerate() {
            let batch: Vec<&str> = batch.iter().map(|text| text.as_ref()).collect();
            let vectors = self.embedder.embed_batch(&batch)?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::OutputCount {
                    expected: batch.len(),
                    actual: vectors.len(),
                }
                .into());
            }
            for vector in &vectors {
                index.add(vector)?;
            }
            debug!(batch = batch_number, encoded = index.len(), "encoded batch");
        }

        Ok(index)
    }

    /// `texts[i]` is the text embedded for `records[i]`.
    pub fn build<S: AsRef<str>>(
        &self,
        texts: &[S],
        records: &[ChunkRecord],
        destination: &Path,
    ) -> Result<IndexManifest, IndexError> {
        if texts.len() != records.len() {
            return Err(IndexError::LengthMismatch {
                texts: texts.len(),
                records: records.len(),
            });
        }

        info!(
            chunk_count = texts.len(),
            model = %self.embedder.model_id(),
            "building index"
        );
        let index = self.encode(texts)?;
        store::save(destination, &self.embedder.model_id(), &index, records)
    }

    pub fn build_from_records(
        &self,
        records: &[ChunkRecord],
        destination: &Path,
    ) -> Result<IndexManifest, IndexError> {
        let texts: Vec<&str> = records.iter().map(|record| record.text.as_str()).collect();
        self.build(&texts, records, destination)
    }
}
