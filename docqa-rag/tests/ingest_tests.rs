//! Ingestion failure handling against fake capabilities.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{
    Document, DocumentStatus, EmbeddedChunk, EmbeddingProvider, FailureKind, HashingEmbedder,
    IndexStats, InMemoryVectorStore, IngestionPipeline, MetadataFilter, RagConfig, RagError,
    Result, RetryPolicy, ScoredChunk, VectorStore,
};

const DIM: usize = 32;

/// Wraps an in-memory store; the first `failures` upserts fail transiently.
struct FlakyStore {
    inner: InMemoryVectorStore,
    failures: AtomicU32,
    upserts: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryVectorStore::new(DIM),
            failures: AtomicU32::new(failures),
            upserts: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn dimensions(&self) -> usize {
        DIM
    }

    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RagError::vector_store("flaky", FailureKind::Transient, "503 unavailable"));
        }
        self.inner.upsert(chunks).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner.query(vector, top_k, filter).await
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        self.inner.delete(ids).await
    }

    async fn chunk_ids(&self, document_id: &str) -> Result<Vec<String>> {
        self.inner.chunk_ids(document_id).await
    }

    async fn stats(&self) -> Result<IndexStats> {
        self.inner.stats().await
    }
}

/// Fails permanently for any batch containing the word "poison".
struct FailingEmbedder(HashingEmbedder);

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.0.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(RagError::embedding("failing", FailureKind::Permanent, "400 bad input"));
        }
        self.0.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }
}

/// Claims `DIM` dimensions but produces shorter vectors.
struct SkewedEmbedder;

#[async_trait]
impl EmbeddingProvider for SkewedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.5; DIM / 2])
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

fn config(max_concurrency: usize) -> RagConfig {
    RagConfig::builder()
        .chunk_size(50)
        .chunk_overlap(5)
        .context_budget(500)
        .embed_batch_size(1)
        .max_concurrency(max_concurrency)
        .retry(RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
            timeout_ms: 1_000,
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn transient_upsert_failures_are_retried() {
    let store = Arc::new(FlakyStore::new(2));
    let pipeline =
        IngestionPipeline::from_config(&config(1), Arc::new(HashingEmbedder::new(DIM)), store.clone())
            .unwrap();

    let report = pipeline.ingest(&[Document::new("doc", "a short text")]).await.unwrap();
    assert_eq!(report.status("doc"), Some(&DocumentStatus::Succeeded { chunks: 1 }));
    assert_eq!(store.upserts.load(Ordering::SeqCst), 3);
    assert_eq!(store.stats().await.unwrap().total_vectors, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_only_that_document() {
    let store = Arc::new(FlakyStore::new(3));
    let pipeline =
        IngestionPipeline::from_config(&config(1), Arc::new(HashingEmbedder::new(DIM)), store.clone())
            .unwrap();

    let docs = [Document::new("first", "unlucky text"), Document::new("second", "lucky text")];
    let report = pipeline.ingest(&docs).await.unwrap();
    assert!(matches!(
        report.status("first"),
        Some(DocumentStatus::Failed { reason }) if reason.contains("503")
    ));
    assert_eq!(report.status("second"), Some(&DocumentStatus::Succeeded { chunks: 1 }));
    assert_eq!((report.succeeded(), report.failed()), (1, 1));
}

#[tokio::test]
async fn permanent_embedding_failure_is_not_retried() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let embedder = Arc::new(FailingEmbedder(HashingEmbedder::new(DIM)));
    let pipeline = IngestionPipeline::from_config(&config(2), embedder, store.clone()).unwrap();

    let docs = [Document::new("bad", "this contains poison"), Document::new("good", "clean text")];
    let report = pipeline.ingest(&docs).await.unwrap();
    assert!(matches!(report.status("bad"), Some(DocumentStatus::Failed { .. })));
    assert_eq!(report.status("good"), Some(&DocumentStatus::Succeeded { chunks: 1 }));
    assert!(store.chunk_ids("bad").await.unwrap().is_empty());
}

#[tokio::test]
async fn dimension_mismatch_aborts_the_run() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let pipeline =
        IngestionPipeline::from_config(&config(2), Arc::new(SkewedEmbedder), store).unwrap();

    let err = pipeline.ingest(&[Document::new("doc", "anything")]).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: DIM, actual } if actual == DIM / 2));
}

#[tokio::test]
async fn concurrent_store_calls_stay_within_limit() {
    let store = Arc::new(FlakyStore::new(0));
    let pipeline =
        IngestionPipeline::from_config(&config(3), Arc::new(HashingEmbedder::new(DIM)), store.clone())
            .unwrap();

    let docs: Vec<_> = (0..8)
        .map(|i| Document::new(format!("doc-{i}"), format!("document number {i} ").repeat(20)))
        .collect();
    let report = pipeline.ingest(&docs).await.unwrap();
    assert_eq!(report.succeeded(), 8);
    assert!(store.max_in_flight.load(Ordering::SeqCst) <= 3);
}
