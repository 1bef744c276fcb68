use crate::error::IndexError;
use crate::index::FlatIndex;
use crate::models::{ChunkRecord, MetadataStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

pub const INDEX_FILE: &str = "index.json";
pub const METADATA_FILE: &str = "metadata.json";
const FORMAT_VERSION: u32 = 1;

/// Describes how an index was built. Stored next to the vectors so a reader
/// can detect a model change or a metadata file from a different build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub model_id: String,
    pub dimension: usize,
    pub metric: String,
    pub entries: usize,
    pub metadata_sha256: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct IndexArtifact {
    manifest: IndexManifest,
    index: FlatIndex,
}

/// An index and its positionally aligned metadata, loaded as one unit.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub manifest: IndexManifest,
    pub index: FlatIndex,
    pub metadata: MetadataStore,
}

pub fn artifacts_exist(dir: &Path) -> bool {
    dir.join(INDEX_FILE).is_file() && dir.join(METADATA_FILE).is_file()
}

/// Writes both artifacts under `dir`. Each file is written to a temporary
/// name first and renamed into place, index last.
pub fn save(
    dir: &Path,
    model_id: &str,
    index: &FlatIndex,
    records: &[ChunkRecord],
) -> Result<IndexManifest, IndexError> {
    if index.len() != records.len() {
        return Err(IndexError::Misaligned {
            vectors: index.len(),
            records: records.len(),
        });
    }

    fs::create_dir_all(dir)?;

    let metadata_bytes = serde_json::to_vec_pretty(records)?;
    let manifest = IndexManifest {
        format_version: FORMAT_VERSION,
        model_id: model_id.to_string(),
        dimension: index.dimension(),
        metric: "l2".to_string(),
        entries: records.len(),
        metadata_sha256: sha256_hex(&metadata_bytes),
        built_at: Utc::now(),
    };
    let artifact = IndexArtifact {
        manifest,
        index: index.clone(),
    };
    let index_bytes = serde_json::to_vec(&artifact)?;

    write_atomically(&dir.join(METADATA_FILE), &metadata_bytes)?;
    write_atomically(&dir.join(INDEX_FILE), &index_bytes)?;

    info!(
        path = %dir.display(),
        entries = artifact.manifest.entries,
        dimension = artifact.manifest.dimension,
        "index artifacts written"
    );
    Ok(artifact.manifest)
}

pub fn load(dir: &Path) -> Result<LoadedIndex, IndexError> {
    if !artifacts_exist(dir) {
        return Err(IndexError::MissingArtifacts {
            dir: dir.to_path_buf(),
        });
    }

    let artifact: IndexArtifact = serde_json::from_slice(&fs::read(dir.join(INDEX_FILE))?)?;
    let metadata_bytes = fs::read(dir.join(METADATA_FILE))?;

    if sha256_hex(&metadata_bytes) != artifact.manifest.metadata_sha256 {
        return Err(IndexError::ChecksumMismatch);
    }
    let metadata: MetadataStore = serde_json::from_slice(&metadata_bytes)?;

    artifact.index.validate()?;
    if artifact.manifest.dimension != artifact.index.dimension() {
        return Err(IndexError::Corrupt(format!(
            "manifest dimension {} differs from stored dimension {}",
            artifact.manifest.dimension,
            artifact.index.dimension()
        )));
    }
    if artifact.index.len() != metadata.len() {
        return Err(IndexError::Misaligned {
            vectors: artifact.index.len(),
            records: metadata.len(),
        });
    }

    info!(
        path = %dir.display(),
        entries = metadata.len(),
        model = %artifact.manifest.model_id,
        "index loaded"
    );
    Ok(LoadedIndex {
        manifest: artifact.manifest,
        index: artifact.index,
        metadata,
    })
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    let temporary = PathBuf::from(temporary);

    fs::write(&temporary, bytes)?;
    fs::rename(&temporary, path)?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Shares a loaded index between readers. `reload` reads a complete new pair
/// before swapping it in, so readers see either the old or the new pair.
pub struct IndexHandle {
    dir: PathBuf,
    current: RwLock<Arc<LoadedIndex>>,
}

impl IndexHandle {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        let loaded = load(&dir)?;
        Ok(Self {
            dir,
            current: RwLock::new(Arc::new(loaded)),
        })
    }

    pub fn current(&self) -> Arc<LoadedIndex> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// On failure the previously loaded pair stays in service.
    pub fn reload(&self) -> Result<Arc<LoadedIndex>, IndexError> {
        let fresh = Arc::new(load(&self.dir)?);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&fresh);
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitRef;
    use tempfile::tempdir;

    fn record(text: &str) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            source: "doc1".to_string(),
            unit_refs: vec![UnitRef::Page(1)],
            char_start: 0,
            char_end: text.chars().count(),
        }
    }

    fn sample() -> Result<(FlatIndex, Vec<ChunkRecord>), IndexError> {
        let mut index = FlatIndex::new(2);
        index.add(&[0.0, 1.0])?;
        index.add(&[1.0, 0.0])?;
        Ok((index, vec![record("first"), record("second")]))
    }

    #[test]
    fn saved_artifacts_load_back_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (index, records) = sample()?;

        let manifest = save(dir.path(), "test-model", &index, &records)?;
        let loaded = load(dir.path())?;

        assert_eq!(loaded.metadata, records);
        assert_eq!(loaded.index, index);
        assert_eq!(loaded.manifest, manifest);
        assert_eq!(loaded.manifest.entries, 2);
        assert!(!dir.path().join("index.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn missing_artifacts_are_reported_as_missing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let error = load(dir.path()).err().ok_or("load should fail")?;
        assert!(error.is_missing());
        Ok(())
    }

    #[test]
    fn metadata_from_another_build_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (index, records) = sample()?;
        save(dir.path(), "test-model", &index, &records)?;

        let replacement = serde_json::to_vec_pretty(&vec![record("only")])?;
        fs::write(dir.path().join(METADATA_FILE), replacement)?;

        assert!(matches!(load(dir.path()), Err(IndexError::ChecksumMismatch)));
        Ok(())
    }

    #[test]
    fn corrupt_index_is_a_load_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (index, records) = sample()?;
        save(dir.path(), "test-model", &index, &records)?;
        fs::write(dir.path().join(INDEX_FILE), b"{not json")?;

        let error = load(dir.path()).err().ok_or("load should fail")?;
        assert!(matches!(error, IndexError::Serialization(_)));
        assert!(!error.is_missing());
        Ok(())
    }

    #[test]
    fn save_refuses_misaligned_pairs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (index, mut records) = sample()?;
        records.pop();

        let result = save(dir.path(), "test-model", &index, &records);
        assert!(matches!(
            result,
            Err(IndexError::Misaligned {
                vectors: 2,
                records: 1
            })
        ));
        assert!(!artifacts_exist(dir.path()));
        Ok(())
    }

    #[test]
    fn reload_swaps_in_the_rebuilt_pair() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (index, records) = sample()?;
        save(dir.path(), "test-model", &index, &records)?;

        let handle = IndexHandle::open(dir.path())?;
        let before = handle.current();
        assert_eq!(before.metadata.len(), 2);

        let mut smaller = FlatIndex::new(2);
        smaller.add(&[0.5, 0.5])?;
        save(dir.path(), "test-model", &smaller, &[record("rebuilt")])?;
        handle.reload()?;

        assert_eq!(handle.current().metadata[0].text, "rebuilt");
        assert_eq!(before.metadata.len(), 2);
        Ok(())
    }

    #[test]
    fn failed_reload_keeps_serving_the_old_pair() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (index, records) = sample()?;
        save(dir.path(), "test-model", &index, &records)?;
        let handle = IndexHandle::open(dir.path())?;

        fs::remove_file(dir.path().join(INDEX_FILE))?;
        assert!(handle.reload().is_err());
        assert_eq!(handle.current().metadata.len(), 2);
        Ok(())
    }
}
