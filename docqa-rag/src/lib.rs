//! # docqa-rag
//!
//! Retrieval-augmented question answering over a private document collection.
//!
//! ## Overview
//!
//! Documents are split into overlapping character windows, embedded and
//! stored in a vector index. A query passes a language gate, is embedded,
//! matched against the index, and the best passages are handed to a
//! completion model that answers with citations.
//!
//! - [`IngestionPipeline`] - chunk, embed and upsert documents with bounded concurrency
//! - [`LanguageGate`] - accept, translate or reject queries by detected language
//! - [`RetrievalEngine`] - embed, search, threshold and rank passages into a [`Context`]
//! - [`AnswerGenerator`] - prompt a [`CompletionModel`] and cite the passages used
//! - [`QaPipeline`] - all of the above behind one `ask` call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{HashingEmbedder, InMemoryVectorStore, QaPipeline, QueryOutcome, RagConfig};
//!
//! let pipeline = QaPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbedder::new(384)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new(384)))
//!     .completion_model(model)
//!     .build()?;
//!
//! pipeline.ingest(&documents).await?;
//! if let QueryOutcome::Answered(answer) = pipeline.ask("How do refunds work?").await? {
//!     println!("{} {:?}", answer.text, answer.citations);
//! }
//! ```
//!
//! ## Features
//!
//! - `pdf` (default) - PDF text extraction via `pdf-extract`
//! - `openai` - OpenAI embeddings and chat completions
//! - `qdrant` - Qdrant vector store

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod inmemory;
pub mod language;
pub mod pipeline;
pub mod retrieval;
pub mod retry;
pub mod source;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{ChunkSequence, Chunker, FixedSizeChunker, split};
pub use config::{ChunkingConfig, IngestConfig, RagConfig, RagConfigBuilder, RetrievalConfig};
pub use document::{
    Answer, CharSpan, Chunk, Context, Document, EmbeddedChunk, MetadataFilter, RetrievalResult,
    ScoredChunk, SourceRef,
};
pub use embedding::{EmbeddingProvider, HashingEmbedder};
pub use error::{FailureKind, RagError, Result};
pub use generator::{
    AnswerGenerator, CompletionModel, CompletionRequest, EmptyContextPolicy, GeneratorConfig,
    PromptSet,
};
pub use ingest::{DocumentReport, DocumentStatus, IngestionPipeline, IngestionReport};
pub use inmemory::InMemoryVectorStore;
pub use language::{
    Decision, Language, LanguageConfig, LanguageDetector, LanguageGate, Rejection,
    UnsupportedLanguagePolicy, WhatlangDetector,
};
pub use pipeline::{QaPipeline, QaPipelineBuilder, QueryOutcome, QueryStats};
pub use retrieval::{QueryOptions, RetrievalEngine};
pub use retry::RetryPolicy;
pub use source::{LoadedSources, SourceConfig, SourceFailure, SourceKind};
pub use vectorstore::{IndexStats, VectorStore};

#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
