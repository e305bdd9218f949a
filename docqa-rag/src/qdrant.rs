//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! One store instance is bound to one collection.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::connect("http://localhost:6334", "docs", 1536).await?;
//! store.upsert(&embedded).await?;
//! let hits = store.query(&query_embedding, 5, None).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CollectionInfo, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::document::{CharSpan, Chunk, EmbeddedChunk, MetadataFilter, ScoredChunk};
use crate::error::{FailureKind, RagError, Result};
use crate::vectorstore::{IndexStats, VectorStore, check_dimension};

const BACKEND: &str = "qdrant";
const SCROLL_PAGE: u32 = 256;

// gRPC status codes.
const ABORTED: i32 = 10;
const DEADLINE_EXCEEDED: i32 = 4;
const INTERNAL: i32 = 13;
const RESOURCE_EXHAUSTED: i32 = 8;
const UNAVAILABLE: i32 = 14;

/// A [`VectorStore`] backed by a single [Qdrant](https://qdrant.tech/) collection
/// using cosine distance.
///
/// Point ids are UUID v5 digests of the chunk id, which is kept in the
/// payload together with the text, span and metadata.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimensions: usize,
}

impl QdrantVectorStore {
    /// Connect to `url` and make sure `collection` exists with `dimensions`.
    pub async fn connect(url: &str, collection: impl Into<String>, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Self::from_client(client, collection, dimensions).await
    }

    /// Wrap an existing client, creating the collection if needed.
    ///
    /// Returns [`RagError::DimensionMismatch`] if the collection exists with a
    /// different vector size.
    pub async fn from_client(client: Qdrant, collection: impl Into<String>, dimensions: usize) -> Result<Self> {
        let store = Self { client, collection: collection.into(), dimensions };
        store.ensure_collection().await?;
        Ok(store)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self) -> Result<()> {
        let name = self.collection.as_str();
        let collections = self.client.list_collections().await.map_err(Self::map_err)?;
        if collections.collections.iter().any(|c| c.name == name) {
            let info = self.client.collection_info(name).await.map_err(Self::map_err)?;
            let size = info.result.as_ref().and_then(Self::vector_size);
            return match size {
                Some(size) if size != self.dimensions as u64 => {
                    Err(RagError::DimensionMismatch { expected: size as usize, actual: self.dimensions })
                }
                _ => {
                    debug!(collection = name, "qdrant collection already exists, skipping creation");
                    Ok(())
                }
            };
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions = self.dimensions, "created qdrant collection");
        Ok(())
    }

    /// Size of the collection's single unnamed vector, if it has one.
    fn vector_size(info: &CollectionInfo) -> Option<u64> {
        let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
        match vectors.config.as_ref()? {
            VectorsConfigKind::Params(params) => Some(params.size),
            VectorsConfigKind::ParamsMap(_) => None,
        }
    }

    fn map_err(e: QdrantError) -> RagError {
        let kind = match &e {
            QdrantError::ResponseError { status } | QdrantError::ResourceExhaustedError { status, .. } => {
                Self::classify_code(status.code() as i32)
            }
            _ => FailureKind::Permanent,
        };
        RagError::vector_store(BACKEND, kind, e.to_string())
    }

    /// Unavailability, deadlines, throttling, aborts and internal errors may
    /// succeed on a retry; auth, argument and missing-resource errors will not.
    fn classify_code(code: i32) -> FailureKind {
        match code {
            UNAVAILABLE | DEADLINE_EXCEEDED | RESOURCE_EXHAUSTED | ABORTED | INTERNAL => {
                FailureKind::Transient
            }
            _ => FailureKind::Permanent,
        }
    }

    fn point_id(chunk_id: &str) -> PointId {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string().into()
    }

    fn payload(chunk: &Chunk) -> Result<Payload> {
        let value = json!({
            "chunk_id": chunk.id(),
            "document_id": chunk.document_id,
            "sequence_index": chunk.sequence_index,
            "text": chunk.text,
            "span_start": chunk.char_span.start,
            "span_end": chunk.char_span.end,
            "metadata": chunk.metadata,
        });
        Payload::try_from(value).map_err(|e| {
            RagError::vector_store(BACKEND, FailureKind::Permanent, format!("invalid payload: {e}"))
        })
    }

    fn filter(filter: Option<&MetadataFilter>) -> Option<Filter> {
        let filter = filter.filter(|f| !f.is_empty())?;
        Some(Filter::must(
            filter
                .equals
                .iter()
                .map(|(k, v)| Condition::matches(format!("metadata.{k}"), v.clone())),
        ))
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_usize(value: &QdrantValue) -> Option<usize> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
            Some(Kind::DoubleValue(n)) if *n >= 0.0 => Some(*n as usize),
            _ => None,
        }
    }

    /// Rebuild a chunk from a point payload.
    fn chunk_from_payload(payload: &HashMap<String, QdrantValue>) -> Chunk {
        let string = |key: &str| payload.get(key).and_then(Self::extract_string).unwrap_or_default();
        let number = |key: &str| payload.get(key).and_then(Self::extract_usize).unwrap_or_default();
        let metadata = payload
            .get("metadata")
            .and_then(|v| match &v.kind {
                Some(Kind::StructValue(s)) => Some(
                    s.fields
                        .iter()
                        .filter_map(|(k, v)| Self::extract_string(v).map(|s| (k.clone(), s)))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        Chunk {
            document_id: string("document_id"),
            sequence_index: number("sequence_index"),
            text: string("text"),
            char_span: CharSpan { start: number("span_start"), end: number("span_end") },
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .map(|embedded| {
                check_dimension(self.dimensions, &embedded.vector)?;
                let chunk = &embedded.chunk;
                Ok(PointStruct::new(
                    Self::point_id(&chunk.id()),
                    embedded.vector.clone(),
                    Self::payload(chunk)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        check_dimension(self.dimensions, vector)?;

        let mut search = SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
            .with_payload(true);
        if let Some(filter) = Self::filter(filter) {
            search = search.filter(filter);
        }
        let response = self.client.search_points(search).await.map_err(Self::map_err)?;

        Ok(response
            .result
            .into_iter()
            .map(|scored| ScoredChunk {
                chunk: Self::chunk_from_payload(&scored.payload),
                score: scored.score,
            })
            .collect())
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::point_id(id)).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn chunk_ids(&self, document_id: &str) -> Result<Vec<String>> {
        let filter = Filter::must([Condition::matches("document_id", document_id.to_string())]);
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut scroll = ScrollPointsBuilder::new(&self.collection)
                .filter(filter.clone())
                .with_payload(true)
                .limit(SCROLL_PAGE);
            if let Some(offset) = offset.take() {
                scroll = scroll.offset(offset);
            }
            let page = self.client.scroll(scroll).await.map_err(Self::map_err)?;
            ids.extend(
                page.result
                    .iter()
                    .filter_map(|point| point.payload.get("chunk_id").and_then(Self::extract_string)),
            );
            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let info = self.client.collection_info(self.collection.as_str()).await.map_err(Self::map_err)?;
        let total_vectors = info.result.and_then(|i| i.points_count).unwrap_or(0) as usize;
        Ok(IndexStats { total_vectors, dimension: self.dimensions })
    }

    fn name(&self) -> &str {
        BACKEND
    }
}
