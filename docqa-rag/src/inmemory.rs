//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `Vec` in insertion order plus a `HashMap` id index, protected by a
//! `tokio::sync::RwLock`. It is suitable for development, testing, and
//! small-scale use cases.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{EmbeddedChunk, MetadataFilter, ScoredChunk};
use crate::error::Result;
use crate::vectorstore::{IndexStats, VectorStore, check_dimension};

#[derive(Debug, Default)]
struct Entries {
    /// Insertion order. Overwrites keep their original slot.
    slots: Vec<EmbeddedChunk>,
    positions: HashMap<String, usize>,
}

impl Entries {
    /// Remove `ids`, keeping the remaining chunks in insertion order.
    fn remove(&mut self, ids: &[&str]) {
        let before = self.positions.len();
        for id in ids {
            self.positions.remove(*id);
        }
        if self.positions.len() == before {
            return;
        }
        let positions = &self.positions;
        self.slots.retain(|e| positions.contains_key(&e.chunk.id()));
        for (slot, entry) in self.slots.iter().enumerate() {
            self.positions.insert(entry.chunk.id(), slot);
        }
    }
}

/// An in-memory vector store using cosine similarity for search.
///
/// Overwriting a chunk keeps its original insertion position, so equal-score
/// ties resolve the same way before and after a re-ingest.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(384);
/// store.upsert(&chunks).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    entries: RwLock<Entries>,
}

impl InMemoryVectorStore {
    /// Create an empty store whose vectors must have `dimensions` entries.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, entries: RwLock::new(Entries::default()) }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        for chunk in chunks {
            check_dimension(self.dimensions, &chunk.vector)?;
        }
        let mut guard = self.entries.write().await;
        let entries = &mut *guard;
        for chunk in chunks {
            let id = chunk.chunk.id();
            match entries.positions.get(&id).copied() {
                Some(slot) => entries.slots[slot] = chunk.clone(),
                None => {
                    let slot = entries.slots.len();
                    entries.slots.push(chunk.clone());
                    entries.positions.insert(id, slot);
                }
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        check_dimension(self.dimensions, vector)?;
        let entries = self.entries.read().await;

        let mut scored: Vec<ScoredChunk> = entries
            .slots
            .iter()
            .filter(|e| filter.is_none_or(|f| f.matches(&e.chunk.metadata)))
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(&e.vector, vector),
            })
            .collect();

        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        self.entries.write().await.remove(ids);
        Ok(())
    }

    async fn chunk_ids(&self, document_id: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .slots
            .iter()
            .filter(|e| e.chunk.document_id == document_id)
            .map(|e| e.chunk.id())
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let entries = self.entries.read().await;
        Ok(IndexStats { total_vectors: entries.positions.len(), dimension: self.dimensions })
    }

    fn name(&self) -> &str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CharSpan, Chunk};
    use crate::error::RagError;

    fn embedded(doc: &str, seq: usize, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                document_id: doc.into(),
                sequence_index: seq,
                text: format!("{doc} {seq}"),
                char_span: CharSpan { start: 0, end: 1 },
                metadata: HashMap::from([("author".to_string(), doc.to_string())]),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new(3);
        let err = store.upsert(&[embedded("a", 0, vec![1.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
        let err = store.query(&[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn ties_keep_insertion_order_across_overwrites() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[
                embedded("a", 0, vec![1.0, 0.0]),
                embedded("b", 0, vec![1.0, 0.0]),
                embedded("c", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        store.upsert(&[embedded("a", 0, vec![2.0, 0.0])]).await.unwrap();

        let hits = store.query(&[1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.document_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(store.stats().await.unwrap().total_vectors, 3);
    }

    #[tokio::test]
    async fn delete_and_chunk_ids() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[
                embedded("a", 0, vec![1.0, 0.0]),
                embedded("a", 1, vec![1.0, 0.0]),
                embedded("b", 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let mut ids = store.chunk_ids("a").await.unwrap();
        ids.sort();
        assert_eq!(ids, ["a_0", "a_1"]);

        store.delete(&["a_1", "missing"]).await.unwrap();
        assert_eq!(store.chunk_ids("a").await.unwrap(), ["a_0"]);
        assert_eq!(store.stats().await.unwrap().total_vectors, 2);
    }

    #[tokio::test]
    async fn reingest_cycles_do_not_grow_storage() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[embedded("a", 0, vec![1.0, 0.0]), embedded("b", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        for _ in 0..10 {
            store.delete(&["a_0"]).await.unwrap();
            store.upsert(&[embedded("a", 0, vec![1.0, 0.0])]).await.unwrap();
        }
        assert_eq!(store.entries.read().await.slots.len(), 2);

        // A deleted and re-added chunk goes to the back.
        let hits = store.query(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.id()).collect();
        assert_eq!(ids, ["b_0", "a_0"]);
    }

    #[tokio::test]
    async fn filter_restricts_candidates() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[embedded("a", 0, vec![1.0, 0.0]), embedded("b", 0, vec![0.0, 1.0])])
            .await
            .unwrap();
        let filter = MetadataFilter::new().require("author", "b");
        let hits = store.query(&[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.document_id, "b");
    }
}
