//! Property tests for in-memory vector store query ordering.

use std::collections::HashMap;

use docqa_rag::document::{CharSpan, Chunk, EmbeddedChunk};
use docqa_rag::inmemory::InMemoryVectorStore;
use docqa_rag::vectorstore::VectorStore;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate an embedded chunk; ids may repeat across a generated batch.
fn arb_embedded_chunk(dim: usize) -> impl Strategy<Value = EmbeddedChunk> {
    ("[a-c]", 0usize..4, "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(document_id, sequence_index, text, vector)| EmbeddedChunk {
            chunk: Chunk {
                document_id,
                sequence_index,
                char_span: CharSpan { start: 0, end: text.chars().count() },
                text,
                metadata: HashMap::new(),
            },
            vector,
        },
    )
}

/// Query results are ordered by descending cosine similarity, bounded by
/// `top_k`, and never contain the same chunk id twice.
mod prop_inmemory_query_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            chunks in proptest::collection::vec(arb_embedded_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new(DIM);
                store.upsert(&chunks).await.unwrap();
                let unique = store.stats().await.unwrap().total_vectors;
                (store.query(&query, top_k, None).await.unwrap(), unique)
            });

            prop_assert!(results.len() <= top_k);
            prop_assert_eq!(results.len(), top_k.min(unique_count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "not descending: {} < {}",
                    window[0].score,
                    window[1].score
                );
            }

            let mut ids: Vec<String> = results.iter().map(|r| r.chunk.id()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), results.len());
        }

        #[test]
        fn last_write_wins_for_repeated_ids(
            chunks in proptest::collection::vec(arb_embedded_chunk(DIM), 1..20),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let stored = rt.block_on(async {
                let store = InMemoryVectorStore::new(DIM);
                store.upsert(&chunks).await.unwrap();
                store.query(&chunks[0].vector, chunks.len(), None).await.unwrap()
            });

            let mut expected: HashMap<String, String> = HashMap::new();
            for c in &chunks {
                expected.insert(c.chunk.id(), c.chunk.text.clone());
            }
            prop_assert_eq!(stored.len(), expected.len());
            for hit in &stored {
                prop_assert_eq!(Some(&hit.chunk.text), expected.get(&hit.chunk.id()));
            }
        }
    }
}
