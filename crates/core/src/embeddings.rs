use crate::error::EmbedError;
use std::path::PathBuf;

/// Output size of all-MiniLM-L6-v2; the hashing embedder defaults to it so
/// both backends produce interchangeable index shapes.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

pub const MINILM_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Turns text into fixed-size vectors. Implementations are created once and
/// shared read-only between the builder and the retriever.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> String;

    fn dimensions(&self) -> usize;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text])?;
        if vectors.len() != 1 {
            return Err(EmbedError::OutputCount {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> String {
        format!("char-trigram-{}", self.dimensions.max(1))
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Where the sentence-transformer model is looked up. `model_dir` holds an
/// exported ONNX model for offline use; `cache_dir` receives downloads.
#[derive(Debug, Clone, Default)]
pub struct EmbedderConfig {
    pub model_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

#[cfg(feature = "fastembed")]
pub use minilm::MiniLmEmbedder;

#[cfg(feature = "fastembed")]
mod minilm {
    use super::{Embedder, EmbedderConfig, DEFAULT_EMBEDDING_DIMENSIONS, MINILM_MODEL_ID};
    use crate::error::EmbedError;
    use fastembed::{
        EmbeddingModel, InitOptions, InitOptionsUserDefined, Pooling, TextEmbedding,
        TokenizerFiles, UserDefinedEmbeddingModel,
    };
    use std::path::Path;
    use tracing::{info, warn};

    const ENCODE_BATCH: usize = 64;

    pub struct MiniLmEmbedder {
        model: TextEmbedding,
    }

    impl MiniLmEmbedder {
        /// Loads from `model_dir` first and downloads only if that fails.
        /// Both failures together are fatal.
        pub fn load(config: &EmbedderConfig) -> Result<Self, EmbedError> {
            let offline = match config.model_dir.as_deref() {
                Some(dir) => load_local(dir),
                None => Err("no local model directory configured".to_string()),
            };

            let offline_error = match offline {
                Ok(model) => {
                    info!(model = MINILM_MODEL_ID, "loaded embedding model from local files");
                    return Ok(Self { model });
                }
                Err(error) => error,
            };

            warn!(error = %offline_error, "offline model load failed, trying download");
            let mut options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false);
            if let Some(cache_dir) = &config.cache_dir {
                options = options.with_cache_dir(cache_dir.clone());
            }

            match TextEmbedding::try_new(options) {
                Ok(model) => {
                    info!(model = MINILM_MODEL_ID, "downloaded and loaded embedding model");
                    Ok(Self { model })
                }
                Err(error) => Err(EmbedError::Initialization {
                    offline: offline_error,
                    online: error.to_string(),
                }),
            }
        }
    }

    fn load_local(dir: &Path) -> Result<TextEmbedding, String> {
        let read = |name: &str| {
            std::fs::read(dir.join(name))
                .map_err(|error| format!("{}: {error}", dir.join(name).display()))
        };

        let tokenizer_files = TokenizerFiles {
            tokenizer_file: read("tokenizer.json")?,
            config_file: read("config.json")?,
            special_tokens_map_file: read("special_tokens_map.json")?,
            tokenizer_config_file: read("tokenizer_config.json")?,
        };
        let model = UserDefinedEmbeddingModel::new(read("model.onnx")?, tokenizer_files)
            .with_pooling(Pooling::Mean);

        TextEmbedding::try_new_from_user_defined(model, InitOptionsUserDefined::default())
            .map_err(|error| error.to_string())
    }

    impl Embedder for MiniLmEmbedder {
        fn model_id(&self) -> String {
            MINILM_MODEL_ID.to_string()
        }

        fn dimensions(&self) -> usize {
            DEFAULT_EMBEDDING_DIMENSIONS
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let vectors = self
                .model
                .embed(texts.to_vec(), Some(ENCODE_BATCH))
                .map_err(|error| EmbedError::Encode(error.to_string()))?;

            if vectors.len() != texts.len() {
                return Err(EmbedError::OutputCount {
                    expected: texts.len(),
                    actual: vectors.len(),
                });
            }
            Ok(vectors)
        }
    }
}
