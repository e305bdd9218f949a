//! Document chunking.
//!
//! [`FixedSizeChunker`] splits text into overlapping windows measured in
//! characters. Windows advance by `chunk_size - chunk_overlap` and stop once a
//! window reaches the end of the text, so adjacent chunks always share exactly
//! `chunk_overlap` characters and together cover the whole document.

use crate::document::{CHUNK_INDEX_KEY, CharSpan, Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations must be deterministic: the same document and parameters
/// always produce the same chunk boundaries.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, ordered by `sequence_index`.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Each chunk inherits the parent document's metadata plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(1000, 100)?;
/// for chunk in chunker.split(&document).iter() {
///     println!("{:?}", chunk.char_span);
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `0 <= chunk_overlap < chunk_size`
    /// and `chunk_size > 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily split a document. The returned sequence can be iterated repeatedly.
    pub fn split<'a>(&self, document: &'a Document) -> ChunkSequence<'a> {
        ChunkSequence {
            document,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            total_chars: document.raw_text.chars().count(),
        }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(document).iter().collect()
    }
}

/// Validate parameters and lazily split `document`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] for invalid `chunk_size` / `overlap`.
pub fn split(document: &Document, chunk_size: usize, overlap: usize) -> Result<ChunkSequence<'_>> {
    Ok(FixedSizeChunker::new(chunk_size, overlap)?.split(document))
}

/// The finite, restartable sequence of chunks for one document.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSequence<'a> {
    document: &'a Document,
    chunk_size: usize,
    chunk_overlap: usize,
    total_chars: usize,
}

impl<'a> ChunkSequence<'a> {
    /// Start a fresh pass over the chunks.
    pub fn iter(&self) -> Chunks<'a> {
        Chunks {
            document: self.document,
            chunk_size: self.chunk_size,
            step: self.chunk_size - self.chunk_overlap,
            total_chars: self.total_chars,
            start_char: 0,
            start_byte: 0,
            sequence_index: 0,
            finished: self.total_chars == 0,
        }
    }

    /// Number of chunks the sequence yields, computed without materialising them.
    pub fn len(&self) -> usize {
        if self.total_chars == 0 {
            return 0;
        }
        if self.total_chars <= self.chunk_size {
            return 1;
        }
        let step = self.chunk_size - self.chunk_overlap;
        1 + (self.total_chars - self.chunk_size).div_ceil(step)
    }

    pub fn is_empty(&self) -> bool {
        self.total_chars == 0
    }
}

impl<'a> IntoIterator for &ChunkSequence<'a> {
    type Item = Chunk;
    type IntoIter = Chunks<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the chunks of a [`ChunkSequence`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    chunk_size: usize,
    step: usize,
    total_chars: usize,
    start_char: usize,
    start_byte: usize,
    sequence_index: usize,
    finished: bool,
}

/// Byte offset of the `n`th character of `text`, or `text.len()` past the end.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.finished {
            return None;
        }

        let rest = &self.document.raw_text[self.start_byte..];
        let end_char = (self.start_char + self.chunk_size).min(self.total_chars);
        let end_byte = byte_offset(rest, end_char - self.start_char);

        let mut metadata = self.document.source_metadata.clone();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), self.sequence_index.to_string());

        let chunk = Chunk {
            document_id: self.document.id.clone(),
            sequence_index: self.sequence_index,
            text: rest[..end_byte].to_string(),
            char_span: CharSpan { start: self.start_char, end: end_char },
            metadata,
        };

        if end_char == self.total_chars {
            self.finished = true;
        } else {
            self.start_byte += byte_offset(rest, self.step);
            self.start_char += self.step;
            self.sequence_index += 1;
        }

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc", text)
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(FixedSizeChunker::new(0, 0), Err(RagError::ConfigError(_))));
        assert!(matches!(FixedSizeChunker::new(10, 10), Err(RagError::ConfigError(_))));
        assert!(matches!(FixedSizeChunker::new(10, 11), Err(RagError::ConfigError(_))));
        assert!(FixedSizeChunker::new(10, 0).is_ok());
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let document = doc("tiny");
        let chunks: Vec<_> = split(&document, 100, 10).unwrap().iter().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_span, CharSpan { start: 0, end: 4 });
        assert_eq!(chunks[0].text, "tiny");
    }

    #[test]
    fn empty_document_yields_nothing() {
        let document = doc("");
        let sequence = split(&document, 100, 10).unwrap();
        assert!(sequence.is_empty());
        assert_eq!(sequence.iter().count(), 0);
    }

    #[test]
    fn three_thousand_chars_make_four_chunks() {
        let document = doc(&"a".repeat(3000));
        let spans: Vec<_> =
            split(&document, 1000, 100).unwrap().iter().map(|c| c.char_span.as_range()).collect();
        assert_eq!(spans, vec![0..1000, 900..1900, 1800..2800, 2700..3000]);
    }

    #[test]
    fn exact_fit_does_not_emit_contained_tail() {
        let document = doc(&"a".repeat(1000));
        assert_eq!(split(&document, 1000, 100).unwrap().iter().count(), 1);
    }

    #[test]
    fn sequence_is_restartable_and_len_matches() {
        let document = doc(&"abcdefghij".repeat(57));
        let sequence = split(&document, 64, 16).unwrap();
        let first: Vec<_> = sequence.iter().collect();
        let second: Vec<_> = (&sequence).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(sequence.len(), first.len());
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let document = doc("документ о машинном обучении");
        let chunks = FixedSizeChunker::new(8, 3).unwrap().chunk(&document);
        for chunk in &chunks {
            let expected: String = document
                .raw_text
                .chars()
                .skip(chunk.char_span.start)
                .take(chunk.char_span.len())
                .collect();
            assert_eq!(chunk.text, expected);
        }
        assert_eq!(chunks.last().unwrap().char_span.end, document.raw_text.chars().count());
    }

    #[test]
    fn chunks_inherit_metadata_with_index() {
        let document = doc(&"x".repeat(30)).with_metadata("filename", "a.pdf");
        let chunks = FixedSizeChunker::new(10, 2).unwrap().chunk(&document);
        assert_eq!(chunks[2].metadata.get("filename").map(String::as_str), Some("a.pdf"));
        assert_eq!(chunks[2].metadata.get(CHUNK_INDEX_KEY).map(String::as_str), Some("2"));
        assert_eq!(chunks[2].id(), "doc_2");
    }
}
