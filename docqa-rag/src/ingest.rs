//! Document ingestion: chunk, embed in batches, upsert.
//!
//! Documents are processed concurrently up to `max_concurrency`, and every
//! embed, upsert or delete call additionally takes a permit from a shared
//! semaphore of the same size, so the number of in-flight requests to the
//! embedding provider and vector store never exceeds the limit.
//!
//! One document failing never aborts the batch; it is reported as
//! [`DocumentStatus::Failed`]. The exception is [`RagError::DimensionMismatch`],
//! which means the embedder and index disagree and aborts the whole run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::{IngestConfig, RagConfig};
use crate::document::{Chunk, Document, EmbeddedChunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{FailureKind, RagError, Result};
use crate::retry::RetryPolicy;
use crate::vectorstore::{VectorStore, check_dimension};

/// Outcome for a single document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DocumentStatus {
    Succeeded { chunks: usize },
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentReport {
    pub document_id: String,
    #[serde(flatten)]
    pub status: DocumentStatus,
}

/// Per-document results of one ingestion run, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestionReport {
    pub documents: Vec<DocumentReport>,
}

impl IngestionReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Skipped { .. }))
    }

    /// Chunks written across all successful documents.
    pub fn total_chunks(&self) -> usize {
        self.documents
            .iter()
            .map(|d| match d.status {
                DocumentStatus::Succeeded { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }

    /// Status of the given document, if it was part of the run.
    pub fn status(&self, document_id: &str) -> Option<&DocumentStatus> {
        self.documents.iter().find(|d| d.document_id == document_id).map(|d| &d.status)
    }

    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.status)).count()
    }
}

/// Ingests documents into a [`VectorStore`].
pub struct IngestionPipeline {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: IngestConfig,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl IngestionPipeline {
    /// Create a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the embedder and store
    /// disagree on vector size, or [`RagError::ConfigError`] for zero batch
    /// size or concurrency.
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: IngestConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimensions(),
                actual: embedder.dimensions(),
            });
        }
        if config.embed_batch_size == 0 || config.max_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size and max_concurrency must be greater than zero".to_string(),
            ));
        }
        retry.validate()?;
        Ok(Self {
            chunker,
            embedder,
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            retry,
        })
    }

    /// Create a pipeline with a [`FixedSizeChunker`] from `config`.
    pub fn from_config(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let chunker =
            FixedSizeChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        Self::new(Arc::new(chunker), embedder, store, config.ingest, config.retry.clone())
    }

    /// Ingest `documents`.
    ///
    /// Re-ingesting an id replaces its chunks; chunks of the previous version
    /// that the new version does not produce are deleted once all new
    /// batches have been written. When the same id appears more than once,
    /// the last occurrence wins and earlier ones are skipped.
    ///
    /// # Errors
    ///
    /// Only [`RagError::DimensionMismatch`] aborts the run. Every other
    /// failure is recorded in the report.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestionReport> {
        let mut last_index: HashMap<&str, usize> = HashMap::new();
        for (i, doc) in documents.iter().enumerate() {
            last_index.insert(doc.id.as_str(), i);
        }

        let statuses: Vec<DocumentStatus> = stream::iter(documents.iter().enumerate())
            .map(|(i, doc)| {
                let superseded = last_index.get(doc.id.as_str()) != Some(&i);
                async move {
                    if superseded {
                        debug!(document.id = %doc.id, "superseded by a later duplicate");
                        return Ok(DocumentStatus::Skipped {
                            reason: "superseded by a later document with the same id".to_string(),
                        });
                    }
                    self.ingest_document(doc).await
                }
            })
            .buffered(self.config.max_concurrency)
            .try_collect()
            .await?;

        let report = IngestionReport {
            documents: documents
                .iter()
                .zip(statuses)
                .map(|(doc, status)| DocumentReport { document_id: doc.id.clone(), status })
                .collect(),
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            chunks = report.total_chunks(),
            "ingestion run completed"
        );
        Ok(report)
    }

    async fn ingest_document(&self, document: &Document) -> Result<DocumentStatus> {
        if document.raw_text.trim().is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "skipping empty document");
            return Ok(DocumentStatus::Skipped { reason: "document has no text".to_string() });
        }

        let chunks = self.chunker.chunk(document);
        let written = stream::iter(chunks.chunks(self.config.embed_batch_size))
            .map(|batch| self.write_batch(batch))
            .buffer_unordered(self.config.max_concurrency)
            .try_fold(0, |total, n| async move { Ok(total + n) })
            .await;

        match written {
            Ok(chunk_count) => match self.purge_stale(document, &chunks).await {
                Ok(removed) => {
                    info!(document.id = %document.id, chunk_count, stale_removed = removed, "ingested document");
                    Ok(DocumentStatus::Succeeded { chunks: chunk_count })
                }
                Err(e) => {
                    error!(document.id = %document.id, error = %e, "failed to remove stale chunks");
                    Ok(DocumentStatus::Failed { reason: format!("stale chunk cleanup failed: {e}") })
                }
            },
            Err(e @ RagError::DimensionMismatch { .. }) => {
                error!(document.id = %document.id, error = %e, "embedding dimension does not match index, aborting");
                Err(e)
            }
            Err(e) => {
                error!(document.id = %document.id, error = %e, "ingestion failed");
                Ok(DocumentStatus::Failed { reason: e.to_string() })
            }
        }
    }

    /// Embed and upsert one batch; returns the number of chunks written.
    async fn write_batch(&self, batch: &[Chunk]) -> Result<usize> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let embedder = &self.embedder;
        let vectors = {
            let _permit = self.permit().await?;
            self.retry.run("embed_batch", || embedder.embed_batch(&texts)).await?
        };
        if vectors.len() != batch.len() {
            return Err(RagError::embedding(
                embedder.name(),
                FailureKind::Permanent,
                format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
            ));
        }

        let dimensions = self.store.dimensions();
        let embedded = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                check_dimension(dimensions, &vector)?;
                Ok(EmbeddedChunk { chunk: chunk.clone(), vector })
            })
            .collect::<Result<Vec<_>>>()?;

        let store = &self.store;
        let _permit = self.permit().await?;
        self.retry.run("upsert", || store.upsert(&embedded)).await?;
        Ok(embedded.len())
    }

    /// Delete chunks of `document` that the new version did not write.
    async fn purge_stale(&self, document: &Document, current: &[Chunk]) -> Result<usize> {
        let store = &self.store;
        let existing = {
            let _permit = self.permit().await?;
            self.retry.run("chunk_ids", || store.chunk_ids(&document.id)).await?
        };
        let keep: HashSet<String> = current.iter().map(Chunk::id).collect();
        let stale: Vec<&str> =
            existing.iter().map(String::as_str).filter(|id| !keep.contains(*id)).collect();
        if stale.is_empty() {
            return Ok(0);
        }

        warn!(document.id = %document.id, count = stale.len(), "removing stale chunks from previous version");
        let _permit = self.permit().await?;
        self.retry.run("delete", || store.delete(&stale)).await?;
        Ok(stale.len())
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| RagError::ConfigError("ingestion concurrency limiter closed".to_string()))
    }
}
