//! Question-answering pipeline orchestrator.
//!
//! The [`QaPipeline`] composes a [`LanguageGate`], a [`RetrievalEngine`] and
//! an [`AnswerGenerator`] into the query path, and owns an
//! [`IngestionPipeline`] over the same index.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{QaPipeline, RagConfig, InMemoryVectorStore, HashingEmbedder};
//!
//! let pipeline = QaPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbedder::new(384)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new(384)))
//!     .completion_model(Arc::new(my_model))
//!     .build()?;
//!
//! pipeline.ingest(&documents).await?;
//! match pipeline.ask("What is the refund policy?").await? {
//!     QueryOutcome::Answered(answer) => println!("{}", answer.text),
//!     QueryOutcome::Rejected(reason) => println!("rejected: {reason}"),
//! }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::document::{Answer, Document};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::{AnswerGenerator, CompletionModel};
use crate::ingest::{IngestionPipeline, IngestionReport};
use crate::language::{Decision, Language, LanguageDetector, LanguageGate, Rejection, WhatlangDetector};
use crate::retrieval::{QueryOptions, RetrievalEngine};
use crate::vectorstore::{IndexStats, VectorStore};

/// Result of a query that did not fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum QueryOutcome {
    Answered(Answer),
    /// The language gate turned the query away. Not an error.
    Rejected(Rejection),
}

/// The question-answering pipeline.
///
/// Holds no mutable state of its own; share it behind an `Arc` and call
/// [`ask`](Self::ask) concurrently.
pub struct QaPipeline {
    config: RagConfig,
    gate: LanguageGate,
    retrieval: RetrievalEngine,
    generator: AnswerGenerator,
    ingestion: IngestionPipeline,
    vector_store: Arc<dyn VectorStore>,
}

impl QaPipeline {
    /// Create a new [`QaPipelineBuilder`].
    pub fn builder() -> QaPipelineBuilder {
        QaPipelineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    pub fn generator(&self) -> &AnswerGenerator {
        &self.generator
    }

    pub fn gate(&self) -> &LanguageGate {
        &self.gate
    }

    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.ingestion
    }

    /// Ingest documents into the pipeline's index.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestionReport> {
        self.ingestion.ingest(documents).await
    }

    /// Vector count and dimension of the index.
    pub async fn stats(&self) -> Result<IndexStats> {
        self.vector_store.stats().await
    }

    /// Answer `query` with the configured retrieval defaults.
    pub async fn ask(&self, query: &str) -> Result<QueryOutcome> {
        self.ask_with(query, &QueryOptions::default()).await
    }

    /// Answer `query`: language gate, then retrieval, then generation.
    ///
    /// Under the translate policy the query is translated with the
    /// completion model first, and the answer is produced in the target
    /// language.
    pub async fn ask_with(&self, query: &str, options: &QueryOptions) -> Result<QueryOutcome> {
        let (query, language) = match self.gate.check(query) {
            Decision::Reject(rejection) => {
                info!(reason = %rejection, "query rejected by language gate");
                return Ok(QueryOutcome::Rejected(rejection));
            }
            Decision::Proceed(language) => (query.to_string(), language),
            Decision::Translate { from, to } => {
                info!(from = %from.code, to = %to, "translating query");
                let translated = self.generator.translate(query, &from.code, &to).await?;
                (translated, Language { code: to, confidence: from.confidence })
            }
        };

        let context = self.retrieval.retrieve_with(&query, options).await?;
        let answer = self.generator.generate(&query, &context, &language).await?;
        Ok(QueryOutcome::Answered(answer))
    }

    /// Like [`ask_with`](Self::ask_with), but gives up with
    /// [`RagError::Cancelled`] as soon as `cancel` completes. In-flight
    /// embedding, search and completion calls are dropped.
    pub async fn ask_until<C>(&self, query: &str, options: &QueryOptions, cancel: C) -> Result<QueryOutcome>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                warn!("query cancelled by caller");
                Err(RagError::Cancelled)
            }
            outcome = self.ask_with(query, options) => outcome,
        }
    }
}

/// Builder for constructing a [`QaPipeline`].
///
/// The embedding provider, vector store and completion model are required.
/// The chunker defaults to a [`FixedSizeChunker`] built from the chunking
/// configuration, the language detector to [`WhatlangDetector`].
#[derive(Default)]
pub struct QaPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    completion_model: Option<Arc<dyn CompletionModel>>,
    chunker: Option<Arc<dyn Chunker>>,
    language_detector: Option<Arc<dyn LanguageDetector>>,
}

impl QaPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn completion_model(mut self, model: Arc<dyn CompletionModel>) -> Self {
        self.completion_model = Some(model);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn language_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.language_detector = Some(detector);
        self
    }

    /// Build the [`QaPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required component is missing
    /// or the configuration is invalid, and [`RagError::DimensionMismatch`]
    /// if the embedder and store disagree on vector size.
    pub fn build(self) -> Result<QaPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedder = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let model = self
            .completion_model
            .ok_or_else(|| RagError::ConfigError("completion_model is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::new(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            )?),
        };
        let detector = self.language_detector.unwrap_or_else(|| Arc::new(WhatlangDetector));

        let gate = LanguageGate::with_detector(config.language.clone(), detector)?;
        let retrieval = RetrievalEngine::new(
            embedder.clone(),
            vector_store.clone(),
            config.retrieval,
            config.retry.clone(),
        )?;
        let generator = AnswerGenerator::new(model, config.generator.clone(), config.retry.clone())?;
        let ingestion = IngestionPipeline::new(
            chunker,
            embedder,
            vector_store.clone(),
            config.ingest,
            config.retry.clone(),
        )?;

        Ok(QaPipeline { config, gate, retrieval, generator, ingestion, vector_store })
    }
}

/// Running totals over query outcomes.
///
/// The pipeline keeps no history; callers that want statistics feed each
/// outcome to [`record`](Self::record).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryStats {
    pub total: usize,
    pub answered: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Answered queries per language code.
    pub languages: BTreeMap<String, usize>,
    confidence_sum: f64,
    confidence_count: usize,
}

impl QueryStats {
    pub fn record(&mut self, outcome: &Result<QueryOutcome>) {
        self.total += 1;
        match outcome {
            Ok(QueryOutcome::Answered(answer)) => {
                self.answered += 1;
                *self.languages.entry(answer.language.clone()).or_default() += 1;
                if let Some(confidence) = answer.confidence {
                    self.confidence_sum += f64::from(confidence);
                    self.confidence_count += 1;
                }
            }
            Ok(QueryOutcome::Rejected(_)) => self.rejected += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Mean confidence of grounded answers, if there were any.
    pub fn mean_confidence(&self) -> Option<f64> {
        (self.confidence_count > 0).then(|| self.confidence_sum / self.confidence_count as f64)
    }
}
