//! Data types for documents, chunks, retrieval results and answers.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Metadata key holding a chunk's sequence index.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier. Re-ingesting the same id replaces the stored chunks.
    pub id: String,
    /// The extracted text content of the document.
    pub raw_text: String,
    /// Key-value metadata such as filename, title, author or language.
    #[serde(default)]
    pub source_metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self { id: id.into(), raw_text: raw_text.into(), source_metadata: HashMap::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.source_metadata.insert(key.into(), value.into());
        self
    }
}

/// End-exclusive character offsets into a document's text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A contiguous slice of a [`Document`], the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its document, starting at zero.
    pub sequence_index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Where the text sits in the parent document.
    pub char_span: CharSpan,
    /// Metadata inherited from the parent document plus `chunk_index`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// The identifier the chunk is stored under: `{document_id}_{sequence_index}`.
    pub fn id(&self) -> String {
        chunk_id(&self.document_id, self.sequence_index)
    }
}

/// Build the storage identifier for a chunk.
pub fn chunk_id(document_id: &str, sequence_index: usize) -> String {
    format!("{document_id}_{sequence_index}")
}

/// A [`Chunk`] paired with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by a vector store together with its similarity score.
///
/// Stores return these in their native order; ranking happens in the
/// [`RetrievalEngine`](crate::RetrievalEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity, higher is more relevant.
    pub score: f32,
}

/// A ranked retrieval hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    /// 1-based rank. Equal scores keep the order the index returned them in.
    pub rank: usize,
}

/// Equality filter over chunk metadata. All conditions must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilter {
    pub equals: HashMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn require(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Returns `true` if every condition holds for `metadata`.
    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.equals.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }
}

/// Ranked passages assembled under a character budget.
///
/// An empty context means "no grounding available" and is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    results: Vec<RetrievalResult>,
    budget: usize,
}

impl Context {
    /// Assemble ranked results under `budget` characters.
    ///
    /// Results are taken in rank order; the first one that does not fit ends
    /// assembly, so the lowest-ranked results are the ones dropped.
    pub fn assemble(mut ranked: Vec<RetrievalResult>, budget: usize) -> Self {
        ranked.sort_by_key(|r| r.rank);
        let mut used = 0;
        let mut kept = Vec::with_capacity(ranked.len());
        for result in ranked {
            let size = result.chunk.text.chars().count();
            if used + size > budget {
                break;
            }
            used += size;
            kept.push(result);
        }
        Self { results: kept, budget }
    }

    /// An empty context under the given budget.
    pub fn empty(budget: usize) -> Self {
        Self { results: Vec::new(), budget }
    }

    /// Re-assemble this context under a smaller budget.
    pub fn truncated(&self, budget: usize) -> Self {
        Self::assemble(self.results.clone(), budget.min(self.budget))
    }

    pub fn results(&self) -> &[RetrievalResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// The budget this context was assembled under.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Total characters of all passages.
    pub fn size(&self) -> usize {
        self.results.iter().map(|r| r.chunk.text.chars().count()).sum()
    }

    /// Passage texts in rank order.
    pub fn texts(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.chunk.text.as_str()).collect()
    }

    /// Ids of the documents the passages come from.
    pub fn document_ids(&self) -> BTreeSet<String> {
        self.results.iter().map(|r| r.chunk.document_id.clone()).collect()
    }
}

/// A display-ready reference to a passage that grounded an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// 1-based position in the context.
    pub index: usize,
    pub score: f32,
    pub document_id: String,
    pub filename: String,
    pub title: String,
    pub author: String,
    /// The first 200 characters of the passage.
    pub snippet: String,
}

const SNIPPET_CHARS: usize = 200;

impl SourceRef {
    fn from_result(result: &RetrievalResult) -> Self {
        let meta = &result.chunk.metadata;
        let field = |key: &str| meta.get(key).cloned().unwrap_or_else(|| "Unknown".to_string());
        let text = &result.chunk.text;
        let snippet = if text.chars().count() > SNIPPET_CHARS {
            format!("{}...", text.chars().take(SNIPPET_CHARS).collect::<String>())
        } else {
            text.clone()
        };
        Self {
            index: result.rank,
            score: result.score,
            document_id: result.chunk.document_id.clone(),
            filename: field("filename"),
            title: field("title"),
            author: field("author"),
            snippet,
        }
    }
}

/// A generated answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Documents that appeared in the context sent to the model.
    pub citations: BTreeSet<String>,
    /// ISO 639-3 code of the query language.
    pub language: String,
    /// 0.0–1.0, absent for ungrounded answers.
    pub confidence: Option<f32>,
    /// `false` when the model answered without any retrieved passages.
    pub grounded: bool,
    /// Passages that grounded the answer, for display.
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl Answer {
    pub(crate) fn sources_from(context: &Context) -> Vec<SourceRef> {
        context.results().iter().map(SourceRef::from_result).collect()
    }
}
