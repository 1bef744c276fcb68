use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::index::FlatIndex;
use crate::models::{ChunkRecord, RetrievalResult, UnitRef};
use crate::store::{self, LoadedIndex};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 5;

/// Maps a distance into `(0, 1]`; larger means closer. Not a probability.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    /// The embedder must be the one the index was built with.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn load(&self, source: &Path) -> Result<LoadedIndex, IndexError> {
        let loaded = store::load(source)?;
        let model_id = self.embedder.model_id();
        if loaded.manifest.model_id != model_id {
            warn!(
                index_model = %loaded.manifest.model_id,
                query_model = %model_id,
                "index was built with a different embedding model"
            );
        }
        Ok(loaded)
    }

    pub fn retrieve(
        &self,
        query: &str,
        index: &FlatIndex,
        metadata: &[ChunkRecord],
        k: usize,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        if index.len() != metadata.len() {
            return Err(IndexError::Misaligned {
                vectors: index.len(),
                records: metadata.len(),
            });
        }
        if k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query)?;
        let neighbors = index.search(&query_vector, k)?;

        let results = neighbors
            .into_iter()
            .enumerate()
            .map(|(offset, neighbor)| -> Result<RetrievalResult, IndexError> {
                let record = metadata.get(neighbor.position).cloned().ok_or(
                    IndexError::Misaligned {
                        vectors: index.len(),
                        records: metadata.len(),
                    },
                )?;
                Ok(RetrievalResult {
                    record,
                    distance: neighbor.distance,
                    similarity_score: similarity_from_distance(neighbor.distance),
                    rank: offset + 1,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(k, returned = results.len(), "retrieved chunks");
        Ok(results)
    }

    pub fn retrieve_loaded(
        &self,
        query: &str,
        loaded: &LoadedIndex,
        k: usize,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        self.retrieve(query, &loaded.index, &loaded.metadata, k)
    }
}

/// The distinct units cited by results from one source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub unit_refs: Vec<UnitRef>,
}

/// Groups results by source in first-seen order; unit refs are sorted and
/// deduplicated within each source.
pub fn summarize_sources(results: &[RetrievalResult]) -> Vec<SourceSummary> {
    let mut summaries: Vec<SourceSummary> = Vec::new();

    for result in results {
        let position = match summaries
            .iter()
            .position(|summary| summary.source == result.record.source)
        {
            Some(position) => position,
            None => {
                summaries.push(SourceSummary {
                    source: result.record.source.clone(),
                    unit_refs: Vec::new(),
                });
                summaries.len() - 1
            }
        };
        summaries[position]
            .unit_refs
            .extend(result.record.unit_refs.iter().cloned());
    }

    for summary in &mut summaries {
        summary.unit_refs.sort();
        summary.unit_refs.dedup();
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::embeddings::CharacterNgramEmbedder;
    use tempfile::tempdir;

    fn record(source: &str, text: &str, unit_refs: Vec<UnitRef>) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            source: source.to_string(),
            unit_refs,
            char_start: 0,
            char_end: text.chars().count(),
        }
    }

    fn result(source: &str, unit_refs: Vec<UnitRef>, rank: usize) -> RetrievalResult {
        RetrievalResult {
            record: record(source, "text", unit_refs),
            distance: 0.0,
            similarity_score: 1.0,
            rank,
        }
    }

    #[test]
    fn similarity_is_one_at_zero_distance_and_decreasing() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert!(similarity_from_distance(2.0) < similarity_from_distance(1.0));
        assert!(similarity_from_distance(1000.0) > 0.0);
    }

    #[test]
    fn top_two_of_three_chunks_are_ranked() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder: Arc<dyn Embedder> = Arc::new(CharacterNgramEmbedder::default());
        let records = vec![
            record("doc1", "Policy A requires X.", vec![UnitRef::Page(1)]),
            record("doc1", "Policy B requires Y.", vec![UnitRef::Page(2)]),
            record("doc2", "Cafeteria opens at noon.", vec![UnitRef::Slide(3)]),
        ];
        IndexBuilder::new(Arc::clone(&embedder)).build_from_records(&records, dir.path())?;

        let retriever = Retriever::new(embedder);
        let loaded = retriever.load(dir.path())?;
        assert_eq!(loaded.index.dimension(), 384);

        let results = retriever.retrieve_loaded("X", &loaded, 2)?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
        for result in &results {
            assert!(result.similarity_score > 0.0 && result.similarity_score <= 1.0);
        }
        assert!(results[1].similarity_score <= results[0].similarity_score);
        Ok(())
    }

    #[test]
    fn closest_chunk_ranks_first() -> Result<(), Box<dyn std::error::Error>> {
        let embedder: Arc<dyn Embedder> = Arc::new(CharacterNgramEmbedder::default());
        let records = vec![
            record("a", "hydraulic pump pressure limits", vec![]),
            record("b", "holiday leave request process", vec![]),
        ];
        let texts: Vec<&str> = records.iter().map(|record| record.text.as_str()).collect();
        let index = IndexBuilder::new(Arc::clone(&embedder)).encode(&texts)?;

        let results =
            Retriever::new(embedder).retrieve("holiday leave request", &index, &records, 5)?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.source, "b");
        assert!(results[0].distance <= results[1].distance);
        Ok(())
    }

    #[test]
    fn empty_index_and_zero_k_return_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let retriever = Retriever::new(Arc::new(CharacterNgramEmbedder::default()));
        let empty = FlatIndex::new(384);
        assert!(retriever.retrieve("anything", &empty, &[], 5)?.is_empty());

        let mut index = FlatIndex::new(384);
        index.add(&CharacterNgramEmbedder::default().embed("some text")?)?;
        let metadata = vec![record("doc", "some text", vec![])];
        assert!(retriever.retrieve("some text", &index, &metadata, 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn misaligned_metadata_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let retriever = Retriever::new(Arc::new(CharacterNgramEmbedder::default()));
        let mut index = FlatIndex::new(384);
        index.add(&CharacterNgramEmbedder::default().embed("some text")?)?;

        let result = retriever.retrieve("query", &index, &[], 3);
        assert!(matches!(
            result,
            Err(IndexError::Misaligned {
                vectors: 1,
                records: 0
            })
        ));
        Ok(())
    }

    #[test]
    fn sources_are_grouped_in_first_seen_order() {
        let results = vec![
            result("manual", vec![UnitRef::Page(3)], 1),
            result("handbook", vec![UnitRef::Paragraph(2)], 2),
            result("manual", vec![UnitRef::Page(1), UnitRef::Page(3)], 3),
        ];

        let summaries = summarize_sources(&results);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].source, "manual");
        assert_eq!(summaries[0].unit_refs, vec![UnitRef::Page(1), UnitRef::Page(3)]);
        assert_eq!(summaries[1].source, "handbook");
        assert_eq!(summaries[1].unit_refs, vec![UnitRef::Paragraph(2)]);
    }
}
