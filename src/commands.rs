use anyhow::Context;
use chrono::{Duration, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::compare::BackendComparator;
use crate::config::{Config, VectorBackend, get_config_dir};
use crate::embeddings::EmbeddingClient;
use crate::ingest::IngestPipeline;
use crate::search::{SearchMode, SearchService};
use crate::store::{FsObjectStore, ObjectStore, list_transcripts};
use crate::vectors::{HttpVectorIndex, InMemoryVectorIndex, LanceVectorIndex, VectorIndex};
use crate::{MeetsearchError, Result};

/// Construct the vector index named by the configuration.
#[inline]
pub async fn build_vector_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    match config.vectors.backend {
        VectorBackend::Lance => Ok(Arc::new(LanceVectorIndex::new(config).await?)),
        VectorBackend::Http => Ok(Arc::new(HttpVectorIndex::new(config)?)),
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorIndex::new())),
    }
}

fn build_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    Ok(Arc::new(FsObjectStore::new(config.transcripts_path())?))
}

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir().map_err(|e| MeetsearchError::Config(e.to_string()))?;
    Config::load(config_dir).map_err(MeetsearchError::Other)
}

/// Print the active configuration.
#[inline]
pub fn show_config() -> Result<()> {
    let config = load_config()?;

    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();
    eprintln!("{}", style("Embedding Service").bold().yellow());
    eprintln!("  URL: {}", config.embedding_url().map_err(|e| MeetsearchError::Config(e.to_string()))?);
    eprintln!("  Model: {}", config.embedding.model);
    eprintln!("  Dimension: {}", config.embedding.dimension);
    eprintln!();
    eprintln!("{}", style("Vector Backend").bold().yellow());
    eprintln!("  Backend: {:?}", config.vectors.backend);
    eprintln!("  Collection: {}", config.vectors.collection);
    if let Some(ref endpoint) = config.vectors.endpoint {
        eprintln!("  Endpoint: {endpoint}");
    }
    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());
    eprintln!("  Chunk size: {} words", config.chunking.chunk_size);
    eprintln!("  Overlap: {} words", config.chunking.overlap);
    eprintln!();
    eprintln!("Config file: {}", config.config_file_path().display());
    eprintln!("Transcripts: {}", config.transcripts_path().display());

    Ok(())
}

/// Ingest a transcript file.
#[inline]
pub async fn ingest_file(
    path: &Path,
    title: Option<String>,
    source_id: Option<String>,
    accept_ambiguous: bool,
) -> Result<()> {
    let config = load_config()?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript file: {}", path.display()))?;

    let title = title.or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    });

    let vectors = build_vector_index(&config).await?;
    let store = build_store(&config)?;
    let pipeline = IngestPipeline::new(&config, vectors, store)?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} Ingesting {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(path.display().to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let report = pipeline
        .ingest_text(&text, title.as_deref(), source_id.as_deref(), accept_ambiguous)
        .await?;
    bar.finish_and_clear();

    println!("{}", style("Transcript ingested").green().bold());
    println!("  Title: {}", report.title);
    println!("  Source ID: {}", report.source_id);
    println!("  Stored at: {}", report.object_key);
    println!(
        "  Chunks: {} ({} indexed)",
        report.chunk_count, report.vectors_indexed
    );
    for warning in &report.warnings {
        println!("  {} {}", style("warning:").yellow(), warning);
    }

    Ok(())
}

/// Search meetings and print grouped results.
#[inline]
pub async fn search_meetings(query: &str, top_k: usize) -> Result<()> {
    let config = load_config()?;
    let vectors = build_vector_index(&config).await?;
    let store = build_store(&config)?;
    let embeddings = EmbeddingClient::new(&config)?;

    let service = SearchService::new(embeddings, vectors, store);
    let response = service.search(query, top_k).await?;

    if response.mode == SearchMode::Keyword {
        println!(
            "{}",
            style("Semantic search unavailable; showing keyword matches").yellow()
        );
    }

    if response.matches.is_empty() {
        println!("No meetings matched '{query}'.");
        return Ok(());
    }

    println!(
        "Found {} meeting(s) for '{}':",
        response.matches.len(),
        query
    );
    println!();

    for meeting in &response.matches {
        println!(
            "{} {}",
            style(&meeting.title).bold(),
            style(format!("(score {:.2})", meeting.top_score)).dim()
        );
        println!("   {}", meeting.object_key);
        for snippet in meeting.snippets.iter().take(3) {
            match snippet.chunk_index {
                Some(index) => println!("   [chunk {index}] {}", snippet.text),
                None => println!("   {}", snippet.text),
            }
        }
        println!();
    }

    Ok(())
}

/// List recently stored transcripts, newest first.
#[inline]
pub fn list_meetings(days: i64, limit: usize) -> Result<()> {
    let config = load_config()?;
    let store = build_store(&config)?;

    let end = Utc::now();
    let start = end - Duration::days(days);
    let listed = list_transcripts(store.as_ref(), start, end, limit)?;

    if listed.is_empty() {
        println!("No transcripts stored in the last {days} days.");
        return Ok(());
    }

    println!("Transcripts ({} total):", listed.len());
    for metadata in &listed {
        println!(
            "  {}  {}  {}",
            metadata.date.format("%Y-%m-%d %H:%M"),
            style(&metadata.title).bold(),
            style(&metadata.source_id).dim()
        );
    }

    Ok(())
}

/// Delete a meeting's document and vectors.
#[inline]
pub async fn delete_meeting(source_id: &str, key: Option<String>) -> Result<()> {
    let config = load_config()?;
    let vectors = build_vector_index(&config).await?;
    let store = build_store(&config)?;

    let object_key = match key {
        Some(key) => key,
        None => {
            let end = Utc::now();
            let start = end - Duration::days(365);
            list_transcripts(store.as_ref(), start, end, usize::MAX)?
                .into_iter()
                .find(|m| m.source_id == source_id)
                .map(|m| m.key)
                .ok_or_else(|| {
                    MeetsearchError::MetadataIndex(format!(
                        "No stored transcript found for source id {source_id}"
                    ))
                })?
        }
    };

    let pipeline = IngestPipeline::new(&config, vectors, store)?;
    pipeline.delete_document(source_id, &object_key).await?;

    println!(
        "{} {} ({})",
        style("Deleted").green().bold(),
        source_id,
        object_key
    );
    Ok(())
}

/// Mirror the configured index into a candidate backend and score it.
#[inline]
pub async fn compare_backends(
    candidate: VectorBackend,
    queries: Vec<String>,
    top_k: usize,
    max_vectors: usize,
) -> Result<()> {
    let config = load_config()?;

    if candidate == config.vectors.backend {
        return Err(MeetsearchError::Config(
            "Candidate backend matches the configured primary".to_string(),
        ));
    }

    let primary = build_vector_index(&config).await?;
    let candidate_index: Arc<dyn VectorIndex> = match candidate {
        VectorBackend::Lance => Arc::new(LanceVectorIndex::new(&config).await?),
        VectorBackend::Http => Arc::new(HttpVectorIndex::new(&config)?),
        VectorBackend::Memory => Arc::new(InMemoryVectorIndex::new()),
    };

    let embeddings = EmbeddingClient::new(&config)?;
    let comparator = BackendComparator::new(embeddings, primary, candidate_index);

    info!("Starting backend comparison with {} queries", queries.len());
    let report = comparator.run(&queries, top_k, max_vectors).await?;

    println!("{}", style("Backend Comparison").bold().cyan());
    println!("  Vectors mirrored: {}", report.vectors_mirrored);
    println!(
        "  Counts: primary {} / candidate {}",
        report.primary_count, report.candidate_count
    );
    println!();
    for query in &report.queries {
        println!("  Query: '{}'", query.query);
        println!("    Recall@{top_k}: {:.2}", query.recall);
        println!("    Rank correlation: {:.2}", query.rank_correlation);
        println!(
            "    Latency: {:.1}ms vs {:.1}ms",
            query.primary_latency_ms, query.candidate_latency_ms
        );
    }
    println!();
    println!("  Average recall: {:.2}", report.avg_recall);
    println!("  Average correlation: {:.2}", report.avg_correlation);
    println!(
        "  Latency improvement: {:.1}%",
        report.latency_improvement_pct()
    );
    if report.passed {
        println!("  {}", style("Result: PASSED").green().bold());
    } else {
        println!("  {}", style("Result: FAILED").red().bold());
    }

    Ok(())
}

/// Show pipeline health: stored counts and embedding service reachability.
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config()?;
    let store = build_store(&config)?;

    println!("{}", style("Meetsearch Status").bold().cyan());

    let end = Utc::now();
    let start = end - Duration::days(90);
    match list_transcripts(store.as_ref(), start, end, usize::MAX) {
        Ok(listed) => println!("  Transcripts (last 90 days): {}", listed.len()),
        Err(e) => println!("  Transcripts: {}", style(format!("error: {e}")).red()),
    }

    match build_vector_index(&config).await {
        Ok(vectors) => match vectors.count().await {
            Ok(count) => println!("  Indexed vectors: {count}"),
            Err(e) => println!("  Indexed vectors: {}", style(format!("error: {e}")).red()),
        },
        Err(e) => println!("  Vector backend: {}", style(format!("error: {e}")).red()),
    }

    let embeddings = EmbeddingClient::new(&config)?;
    match embeddings.health_check() {
        Ok(()) => println!("  Embedding service: {}", style("reachable").green()),
        Err(e) => println!("  Embedding service: {}", style(format!("error: {e}")).red()),
    }

    Ok(())
}
