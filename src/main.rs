use clap::{Parser, Subcommand};
use meetsearch::Result;
use meetsearch::commands::{
    compare_backends, delete_meeting, ingest_file, list_meetings, search_meetings, show_config,
    show_status,
};
use meetsearch::config::VectorBackend;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meetsearch")]
#[command(about = "Meeting transcript ingestion and semantic search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active configuration
    Config,
    /// Ingest a transcript file
    Ingest {
        /// Path to the transcript file (cue dialect or free-form text)
        file: PathBuf,
        /// Meeting title; defaults to the file name
        #[arg(long)]
        title: Option<String>,
        /// Stable document id; generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Accept low-confidence format detections instead of rejecting them
        #[arg(long)]
        accept_ambiguous: bool,
    },
    /// Search stored meetings
    Search {
        /// Query text
        query: String,
        /// Number of chunk hits to retrieve before grouping
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// List recently ingested meetings
    List {
        /// How many days back to list
        #[arg(long, default_value_t = 30)]
        days: i64,
        /// Maximum number of meetings to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete a meeting's document and vectors
    Delete {
        /// Document id of the meeting
        source_id: String,
        /// Object key; resolved from the id when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// Mirror the index into a candidate backend and score it
    Compare {
        /// Candidate backend to evaluate
        #[arg(long, value_enum)]
        candidate: VectorBackend,
        /// Comma-separated evaluation queries
        #[arg(long, value_delimiter = ',')]
        queries: Vec<String>,
        /// Result depth per query
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Maximum vectors to mirror into the candidate
        #[arg(long, default_value_t = 10_000)]
        max_vectors: usize,
    },
    /// Show pipeline health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            show_config()?;
        }
        Commands::Ingest {
            file,
            title,
            id,
            accept_ambiguous,
        } => {
            ingest_file(&file, title, id, accept_ambiguous).await?;
        }
        Commands::Search { query, top_k } => {
            search_meetings(&query, top_k).await?;
        }
        Commands::List { days, limit } => {
            list_meetings(days, limit)?;
        }
        Commands::Delete { source_id, key } => {
            delete_meeting(&source_id, key).await?;
        }
        Commands::Compare {
            candidate,
            queries,
            top_k,
            max_vectors,
        } => {
            compare_backends(candidate, queries, top_k, max_vectors).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["meetsearch", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
        }
    }

    #[test]
    fn ingest_command_with_flags() {
        let cli = Cli::try_parse_from([
            "meetsearch",
            "ingest",
            "standup.vtt",
            "--title",
            "Daily Standup",
            "--accept-ambiguous",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                file,
                title,
                id,
                accept_ambiguous,
            } = parsed.command
            {
                assert_eq!(file, PathBuf::from("standup.vtt"));
                assert_eq!(title.as_deref(), Some("Daily Standup"));
                assert_eq!(id, None);
                assert!(accept_ambiguous);
            }
        }
    }

    #[test]
    fn search_defaults_top_k() {
        let cli = Cli::try_parse_from(["meetsearch", "search", "quarterly review"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, top_k } = parsed.command {
                assert_eq!(query, "quarterly review");
                assert_eq!(top_k, 10);
            }
        }
    }

    #[test]
    fn compare_parses_query_list() {
        let cli = Cli::try_parse_from([
            "meetsearch",
            "compare",
            "--candidate",
            "memory",
            "--queries",
            "budget,roadmap",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Compare {
                candidate, queries, ..
            } = parsed.command
            {
                assert_eq!(candidate, VectorBackend::Memory);
                assert_eq!(queries, vec!["budget", "roadmap"]);
            }
        }
    }

    #[test]
    fn missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["meetsearch"]).is_err());
    }
}
