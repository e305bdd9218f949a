//! # docqa-cli
//!
//! Command-line front end for `docqa-rag` and `docqa-eval`.
//!
//! ```text
//! docqa ingest ./manuals            # load, chunk, embed and index files
//! docqa ask "How do I reset it?"    # answer from the indexed documents
//! docqa eval answers.jsonl          # ROUGE scores for generated answers
//! docqa stats                       # index size and dimension
//! ```

pub mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use docqa_eval::{EvalConfig, EvalRecord, EvaluationHarness, RougeMetric, load_records};
use docqa_rag::source::load_paths;
use docqa_rag::{
    CompletionModel, EmbeddingProvider, HashingEmbedder, InMemoryVectorStore, IngestionPipeline,
    IngestionReport, MetadataFilter, OpenAIChatModel, OpenAIEmbeddingProvider, QaPipeline,
    QdrantVectorStore, QueryOptions, QueryOutcome, QueryStats, VectorStore,
};
use tracing::{info, warn};

pub use config::{CliConfig, EmbedderKind, StoreKind};

#[derive(Debug, Parser)]
#[command(name = "docqa", version, about = "Ask questions about your documents")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "DOCQA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load files and directories into the index
    Ingest {
        /// Files or directories (.pdf, .txt, .md)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer one or more questions
    Ask {
        #[arg(required = true)]
        questions: Vec<String>,
        /// Ingest these paths first (needed with the in-memory store)
        #[arg(long = "docs")]
        docs: Vec<PathBuf>,
        /// Only use passages whose `author` metadata matches
        #[arg(long)]
        author: Option<String>,
        /// Override the number of passages retrieved
        #[arg(long)]
        top_k: Option<usize>,
        /// Print answers as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score answers against references with ROUGE
    Eval {
        /// Dataset in .json or .jsonl form
        records: PathBuf,
        /// ROUGE-N order; ignored with --lcs
        #[arg(long, default_value_t = 1)]
        n: usize,
        /// Use ROUGE-L instead of ROUGE-N
        #[arg(long)]
        lcs: bool,
        /// F-measure at which a record passes
        #[arg(long)]
        pass_threshold: Option<f64>,
        /// Regenerate answers for records that carry a query
        #[arg(long)]
        generate: bool,
    },
    /// Show index statistics
    Stats,
}

/// Run a parsed command.
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().or_else(default_config_path);
    let config = CliConfig::load(config_path.as_deref())?;
    match cli.command {
        Command::Ingest { paths } => {
            let backends = build_backends(&config).await?;
            let ingestion =
                IngestionPipeline::from_config(&config.rag, backends.embedder, backends.store)?;
            let report = ingest(&ingestion, &config, &paths).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Ask { questions, docs, author, top_k, json } => {
            let pipeline = build_pipeline(&config).await?;
            if !docs.is_empty() {
                let report = ingest(pipeline.ingestion(), &config, &docs).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            let mut options = QueryOptions::default();
            if let Some(author) = author {
                options = options.filter(MetadataFilter::new().require("author", author));
            }
            if let Some(top_k) = top_k {
                options = options.top_k(top_k);
            }
            ask(&pipeline, &questions, &options, json).await
        }
        Command::Eval { records, n, lcs, pass_threshold, generate } => {
            let metric = if lcs { RougeMetric::L } else { RougeMetric::N { n } };
            let mut records = load_records(&records)?;
            if generate {
                let pipeline = build_pipeline(&config).await?;
                regenerate(&pipeline, &mut records).await;
            }
            let harness = EvaluationHarness::new(EvalConfig { metric, pass_threshold })?;
            let report = harness.evaluate(&records)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Stats => {
            let stats = build_backends(&config).await?.store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

/// The embedding provider and vector store a config selects.
pub struct Backends {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
}

/// Connect the configured embedder and store. Needs no chat model credentials.
pub async fn build_backends(config: &CliConfig) -> Result<Backends> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedder.kind {
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.embedder.dimensions)),
        EmbedderKind::OpenAI => {
            let mut provider = OpenAIEmbeddingProvider::from_env()?
                .with_model(&config.embedder.model)
                .with_dimensions(config.embedder.dimensions);
            if let Some(url) = &config.model.base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
    };

    let dimensions = embedder.dimensions();
    let store: Arc<dyn VectorStore> = match config.store.kind {
        StoreKind::Memory => Arc::new(InMemoryVectorStore::new(dimensions)),
        StoreKind::Qdrant => Arc::new(
            QdrantVectorStore::connect(&config.store.url, &config.store.collection, dimensions)
                .await
                .with_context(|| format!("cannot reach Qdrant at {}", config.store.url))?,
        ),
    };
    Ok(Backends { embedder, store })
}

/// Assemble the full question-answering pipeline, chat model included.
pub async fn build_pipeline(config: &CliConfig) -> Result<QaPipeline> {
    let Backends { embedder, store } = build_backends(config).await?;

    let mut model = OpenAIChatModel::from_env()?.with_model(&config.model.model);
    if let Some(url) = &config.model.base_url {
        model = model.with_base_url(url);
    }
    let model: Arc<dyn CompletionModel> = Arc::new(model);

    Ok(QaPipeline::builder()
        .config(config.rag.clone())
        .embedding_provider(embedder)
        .vector_store(store)
        .completion_model(model)
        .build()?)
}

async fn ingest(
    ingestion: &IngestionPipeline,
    config: &CliConfig,
    paths: &[PathBuf],
) -> Result<IngestionReport> {
    let loaded = load_paths(paths, &config.rag.source).await?;
    for failure in &loaded.failures {
        warn!(path = %failure.path, reason = %failure.reason, "skipping file");
    }
    if loaded.documents.is_empty() {
        bail!("no documents could be loaded from {}", display_paths(paths));
    }

    let report = ingestion.ingest(&loaded.documents).await?;
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        chunk_count = report.total_chunks(),
        "ingestion finished"
    );
    Ok(report)
}

async fn ask(
    pipeline: &QaPipeline,
    questions: &[String],
    options: &QueryOptions,
    json: bool,
) -> Result<()> {
    let mut stats = QueryStats::default();
    for question in questions {
        let outcome = pipeline
            .ask_until(question, options, async {
                // A failed handler install must not cancel the query.
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            })
            .await;
        stats.record(&outcome);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) if e.is_user_facing() => {
                println!("{question}\n  error: {e}\n");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if json {
            println!("{}", serde_json::to_string(&outcome)?);
            continue;
        }
        match outcome {
            QueryOutcome::Answered(answer) => {
                println!("{question}\n\n{}\n", answer.text);
                if let Some(confidence) = answer.confidence {
                    println!("confidence: {confidence:.2}");
                }
                for source in &answer.sources {
                    println!(
                        "  [{}] {} ({:.3}) {}",
                        source.index, source.filename, source.score, source.snippet
                    );
                }
                println!();
            }
            QueryOutcome::Rejected(rejection) => println!("{question}\n  rejected: {rejection}\n"),
        }
    }
    info!(
        total = stats.total,
        answered = stats.answered,
        rejected = stats.rejected,
        failed = stats.failed,
        mean_confidence = ?stats.mean_confidence(),
        "queries finished"
    );
    Ok(())
}

/// Replace `generated` with a fresh pipeline answer for every record that has a query.
async fn regenerate(pipeline: &QaPipeline, records: &mut [EvalRecord]) {
    for record in records.iter_mut() {
        let Some(query) = record.query.as_deref() else {
            continue;
        };
        match pipeline.ask(query).await {
            Ok(QueryOutcome::Answered(answer)) => record.generated = answer.text,
            Ok(QueryOutcome::Rejected(rejection)) => {
                warn!(query, %rejection, "query rejected; scoring an empty answer");
                record.generated.clear();
            }
            Err(e) => {
                warn!(query, error = %e, "generation failed; scoring an empty answer");
                record.generated.clear();
            }
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// Resolve the config path to use when none was given: `docqa.toml` in the
/// working directory, if present.
pub fn default_config_path() -> Option<PathBuf> {
    let candidate = Path::new("docqa.toml");
    candidate.exists().then(|| candidate.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_filter() {
        let cli = Cli::try_parse_from([
            "docqa", "ask", "What is covered?", "--author", "Ivanov", "--top-k", "3", "--json",
        ])
        .unwrap();
        let Command::Ask { questions, author, top_k, json, docs } = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(questions, ["What is covered?"]);
        assert_eq!(author.as_deref(), Some("Ivanov"));
        assert_eq!(top_k, Some(3));
        assert!(json);
        assert!(docs.is_empty());
    }

    #[test]
    fn parses_eval_defaults() {
        let cli = Cli::try_parse_from(["docqa", "eval", "set.jsonl"]).unwrap();
        let Command::Eval { records, n, lcs, pass_threshold, generate } = cli.command else {
            panic!("expected eval");
        };
        assert_eq!(records, PathBuf::from("set.jsonl"));
        assert_eq!((n, lcs, pass_threshold, generate), (1, false, None, false));
    }

    #[test]
    fn ingest_requires_paths() {
        assert!(Cli::try_parse_from(["docqa", "ingest"]).is_err());
    }

    fn offline_config() -> CliConfig {
        CliConfig::from_toml(
            "[embedder]\nkind = \"hashing\"\ndimensions = 64\n\n[store]\nkind = \"memory\"\n",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ingest_and_stats_need_no_chat_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("guide.txt"),
            "The pump must be serviced every six months by a certified technician.",
        )
        .unwrap();
        let config = offline_config();

        let backends = build_backends(&config).await.unwrap();
        let ingestion =
            IngestionPipeline::from_config(&config.rag, backends.embedder, backends.store.clone())
                .unwrap();
        let report = ingest(&ingestion, &config, &[dir.path().to_path_buf()]).await.unwrap();
        assert_eq!(report.succeeded(), 1);

        let stats = backends.store.stats().await.unwrap();
        assert_eq!(stats.dimension, 64);
        assert!(stats.total_vectors > 0);
    }

    #[tokio::test]
    async fn stats_command_runs_offline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"[embedder]\nkind = \"hashing\"\ndimensions = 64\n\n[store]\nkind = \"memory\"\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from(["docqa", "--config", &file.path().to_string_lossy(), "stats"])
            .unwrap();
        run(cli).await.unwrap();
    }
}
