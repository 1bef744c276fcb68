use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use docqa_core::{
    build_corpus_index, search_corpus_index, summarize_sources, CharacterNgramEmbedder,
    ChunkingOptions, Embedder, EmbedderConfig, PipelineConfig, Retriever, DEFAULT_TOP_K,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder scanned recursively for documents
    #[arg(long, env = "DOCQA_DOCUMENTS_DIR", default_value = "data")]
    documents_dir: PathBuf,

    /// Folder holding index.json and metadata.json
    #[arg(long, env = "DOCQA_EMBEDDINGS_DIR", default_value = "embeddings")]
    embeddings_dir: PathBuf,

    /// Embedding backend; must match between build and search
    #[arg(long, value_enum, default_value_t = EmbedderKind::Hashing)]
    embedder: EmbedderKind,

    /// Local ONNX export of all-MiniLM-L6-v2 tried before downloading
    #[arg(long, env = "DOCQA_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Download cache for the embedding model
    #[arg(long, env = "DOCQA_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Hashed character trigrams, no model download
    Hashing,
    /// all-MiniLM-L6-v2 sentence embeddings
    Minilm,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and embed the document folder, replacing any existing index.
    Build {
        /// Word budget per chunk.
        #[arg(long, default_value = "512")]
        max_tokens: usize,
        /// Words carried over from one chunk into the next.
        #[arg(long, default_value = "50")]
        overlap_tokens: usize,
        /// Texts encoded per embedding call.
        #[arg(long, default_value = "32")]
        batch_size: usize,
    },
    /// Retrieve the chunks closest to a question.
    Search {
        /// Question text
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

fn make_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    let config = EmbedderConfig {
        model_dir: cli.model_dir.clone(),
        cache_dir: cli.cache_dir.clone(),
    };

    match cli.embedder {
        EmbedderKind::Hashing => Ok(Arc::new(CharacterNgramEmbedder::default())),
        EmbedderKind::Minilm => load_minilm(&config),
    }
}

#[cfg(feature = "fastembed")]
fn load_minilm(config: &EmbedderConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    Ok(Arc::new(docqa_core::MiniLmEmbedder::load(config)?))
}

#[cfg(not(feature = "fastembed"))]
fn load_minilm(_config: &EmbedderConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    anyhow::bail!("this binary was built without the `fastembed` feature")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let embedder = make_embedder(&cli)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %embedder.model_id(),
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    match cli.command {
        Command::Build {
            max_tokens,
            overlap_tokens,
            batch_size,
        } => {
            let config = PipelineConfig {
                documents_dir: cli.documents_dir,
                embeddings_dir: cli.embeddings_dir,
                chunking: ChunkingOptions {
                    max_tokens,
                    overlap_tokens,
                },
                batch_size,
                ..PipelineConfig::default()
            };
            let report = build_corpus_index(&config, embedder)?;

            for skipped in &report.skipped {
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }
            match report.manifest {
                Some(manifest) => println!(
                    "{} chunks from {} documents indexed into {} at {}",
                    manifest.entries,
                    report.documents,
                    config.embeddings_dir.display(),
                    manifest.built_at.to_rfc3339()
                ),
                None => println!(
                    "no text chunks created from {}; nothing was indexed",
                    config.documents_dir.display()
                ),
            }
        }
        Command::Search { query, top_k } => {
            let query = query.trim();
            if query.is_empty() {
                anyhow::bail!("query is empty");
            }

            let config = PipelineConfig {
                documents_dir: cli.documents_dir,
                embeddings_dir: cli.embeddings_dir,
                top_k,
                ..PipelineConfig::default()
            };
            let retriever = Retriever::new(embedder);
            let results = match search_corpus_index(&config, &retriever, query) {
                Ok(results) => results,
                Err(error) if error.is_missing() => {
                    warn!(path = %config.embeddings_dir.display(), "no embeddings found");
                    anyhow::bail!("{error}; run `docqa build` first");
                }
                Err(error) => return Err(error.into()),
            };
            println!("query: {query}");
            if results.is_empty() {
                println!("no matching chunks");
            }

            for result in &results {
                let units = result
                    .record
                    .unit_refs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "[{}] score={:.4} source={} units={}",
                    result.rank, result.similarity_score, result.record.source, units
                );
                println!("  {}", result.record.text);
            }

            if !results.is_empty() {
                println!("sources used:");
                for summary in summarize_sources(&results) {
                    if summary.unit_refs.is_empty() {
                        println!("  {}: location unavailable", summary.source);
                    } else {
                        let units = summary
                            .unit_refs
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        println!("  {}: {}", summary.source, units);
                    }
                }
            }
        }
    }

    Ok(())
}
