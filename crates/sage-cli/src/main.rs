//! Sage CLI - Command-line interface
//!
//! Usage:
//!   sage ingest <paths>...
//!   sage query <question> [--no-stream]
//!   sage search <query> [-k N]
//!   sage info

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use sage_core::{AppConfig, LoggingConfig};
use sage_parser::{ChunkConfig, ParserRegistry, TextChunker};
use sage_rag::RagEngine;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sage")]
#[command(about = "Retrieval-augmented question answering over local documents")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot directory (overrides the config)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, chunk, and index documents, then save the snapshot
    Ingest {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a question
    Query {
        /// Question to ask
        question: String,

        /// Print the answer once complete instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Show the chunks nearest to a query
    Search {
        query: String,

        /// Number of results
        #[arg(short, default_value_t = 4)]
        k: usize,
    },
    /// Show index statistics
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path.clone())?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if let Some(dir) = cli.snapshot {
        config.snapshot.dir = dir;
    }
    // Every command works on the saved index
    config.snapshot.load_on_startup = true;
    config.snapshot.save_after_ingest = false;

    init_tracing(&config.logging);

    match cli.command {
        Commands::Ingest { paths } => ingest(config, &paths).await,
        Commands::Query {
            question,
            no_stream,
        } => query(config, question, no_stream).await,
        Commands::Search { query, k } => search(config, &query, k).await,
        Commands::Info => info(config).await,
    }
}

async fn open_engine(config: AppConfig) -> anyhow::Result<RagEngine> {
    RagEngine::from_config(config)
        .await
        .context("failed to initialise the RAG engine")
}

async fn ingest(config: AppConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let chunker = TextChunker::new(ChunkConfig::from(&config.rag));
    let registry = ParserRegistry::with_defaults();
    let engine = open_engine(config).await?;

    let files = collect_files(paths, &registry)?;
    if files.is_empty() {
        anyhow::bail!("no supported documents found (.pdf, .docx, .txt, .md)");
    }

    let mut failed = 0;
    for file in &files {
        let document = match registry.parse(file) {
            Ok(document) if !document.is_blank() => document,
            Ok(_) => {
                eprintln!("skipped {}: no extractable text", file.display());
                failed += 1;
                continue;
            }
            Err(e) => {
                eprintln!("skipped {}: {e}", file.display());
                failed += 1;
                continue;
            }
        };

        let records = chunker.chunk_document(&document);
        let report = engine.ingest(records).await?;
        print!(
            "{}: {} chunks indexed",
            file.display(),
            report.indexed_count
        );
        if report.is_degraded() {
            print!(" ({} without embeddings)", report.degraded_count);
        }
        println!();
    }

    let saved = engine.save_snapshot().await?;
    println!(
        "Indexed {} of {} files; {} vectors saved to {}",
        files.len() - failed,
        files.len(),
        saved.total_vectors,
        saved.dir.display()
    );
    Ok(())
}

async fn query(config: AppConfig, question: String, no_stream: bool) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;

    if no_stream {
        println!("{}", engine.answer_full(question).await?);
        return Ok(());
    }

    let mut answer = engine.answer(question);
    let mut stdout = std::io::stdout();
    while let Some(fragment) = answer.next().await {
        match fragment {
            Ok(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Err(e) => {
                writeln!(stdout)?;
                return Err(e.into());
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}

async fn search(config: AppConfig, query: &str, k: usize) -> anyhow::Result<()> {
    if k == 0 {
        anyhow::bail!("-k must be at least 1");
    }
    let engine = open_engine(config).await?;

    let results = engine.retrieve(query, Some(k)).await?;
    if results.is_empty() {
        println!("No results.");
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} (#{})",
            rank + 1,
            result.distance,
            result.chunk.source(),
            result.chunk.position
        );
        println!("   {}", snippet(&result.chunk.text, 200));
    }
    Ok(())
}

async fn info(config: AppConfig) -> anyhow::Result<()> {
    let dir = config.snapshot.dir.clone();
    let engine = open_engine(config).await?;
    let info = engine.info().await;

    println!("Snapshot:   {}", dir.display());
    println!("Vectors:    {}", info.total_vectors);
    println!("Dimension:  {}", info.embedding_dimension);
    println!("LLM:        {}", engine.llm_name());
    Ok(())
}

/// Expand directories into the supported files beneath them, sorted
fn collect_files(paths: &[PathBuf], registry: &ParserRegistry) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, registry, &mut files)
                .with_context(|| format!("failed to read {}", path.display()))?;
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("{} does not exist", path.display());
        }
    }
    Ok(files)
}

fn walk(dir: &Path, registry: &ParserRegistry, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk(&path, registry, files)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| registry.supports(name))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// First `max_chars` characters on one line
fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sage_cli={0},sage_rag={0},sage_vector={0},sage_parser={0}",
            logging.level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        assert_eq!(snippet("short  text\nhere", 200), "short text here");
        assert_eq!(snippet("héllo wörld", 4), "héll...");
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.md"), "# b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("ignored.exe"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.txt"), "c").unwrap();

        let registry = ParserRegistry::with_defaults();
        let files = collect_files(&[dir.path().to_path_buf()], &registry).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.txt", "b.md", "c.txt"]);
    }

    #[test]
    fn test_collect_files_missing_path() {
        let registry = ParserRegistry::with_defaults();
        assert!(collect_files(&[PathBuf::from("/definitely/not/here")], &registry).is_err());
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["sage", "search", "rent", "-k", "2", "--snapshot", "idx"])
            .unwrap();
        assert_eq!(cli.snapshot, Some(PathBuf::from("idx")));
        assert!(matches!(cli.command, Commands::Search { k: 2, .. }));

        let cli = Cli::try_parse_from(["sage", "query", "why?", "--no-stream"]).unwrap();
        assert!(matches!(cli.command, Commands::Query { no_stream: true, .. }));

        assert!(Cli::try_parse_from(["sage", "ingest"]).is_err());
    }
}
