//! Ingest-then-ask scenarios over the bundled offline components.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa_rag::{
    CompletionModel, CompletionRequest, Document, HashingEmbedder, InMemoryVectorStore,
    IngestionPipeline, Language, LanguageDetector, QaPipeline, QueryOptions, QueryOutcome,
    RagConfig, Result, RetrievalEngine, chunking::split,
};

const DIM: usize = 512;

/// Text whose vocabulary changes every 100 characters: every word carries the
/// index of the 100-character region it starts in.
fn regional_text(tag: &str, len: usize) -> String {
    let mut text = String::new();
    let mut j = 0;
    while text.len() < len {
        let region = text.len() / 100;
        text.push_str(&format!("{tag}{region}w{j} "));
        j += 1;
    }
    text.truncate(len);
    text
}

fn config() -> RagConfig {
    RagConfig::builder()
        .chunk_size(1000)
        .chunk_overlap(100)
        .context_budget(4000)
        .top_k(4)
        .score_threshold(0.05)
        .build()
        .unwrap()
}

struct EnglishDetector;

impl LanguageDetector for EnglishDetector {
    fn detect(&self, _text: &str) -> Option<Language> {
        Some(Language { code: "eng".into(), confidence: 1.0 })
    }
}

#[derive(Default)]
struct EchoModel {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionModel for EchoModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        Ok(format!("Based on passage [1]: {}", request.prompt.len()))
    }
}

#[tokio::test]
async fn phrase_from_third_chunk_ranks_its_chunk_first() {
    let manual = Document::new("manual", regional_text("m", 3000));
    let other = Document::new("other", regional_text("q", 3000));

    let spans: Vec<_> = split(&manual, 1000, 100)
        .unwrap()
        .iter()
        .map(|c| (c.char_span.start, c.char_span.end))
        .collect();
    assert_eq!(spans, [(0, 1000), (900, 1900), (1800, 2800), (2700, 3000)]);

    let config = config();
    let embedder = Arc::new(HashingEmbedder::new(DIM));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let ingestion = IngestionPipeline::from_config(&config, embedder.clone(), store.clone()).unwrap();
    let report = ingestion.ingest(&[manual.clone(), other]).await.unwrap();
    assert_eq!(report.total_chunks(), 8);

    let engine =
        RetrievalEngine::new(embedder, store, config.retrieval, config.retry.clone()).unwrap();
    let phrase = &manual.raw_text[1950..2650];
    let context = engine.retrieve(phrase, 4, 0.05).await.unwrap();

    let top = &context.results()[0];
    assert_eq!(top.rank, 1);
    assert_eq!(top.chunk.document_id, "manual");
    assert_eq!(top.chunk.sequence_index, 2);
}

#[tokio::test]
async fn shorter_reingest_leaves_nothing_stale_to_retrieve() {
    let pipeline = QaPipeline::builder()
        .config(config())
        .embedding_provider(Arc::new(HashingEmbedder::new(DIM)))
        .vector_store(Arc::new(InMemoryVectorStore::new(DIM)))
        .completion_model(Arc::new(EchoModel::default()))
        .language_detector(Arc::new(EnglishDetector))
        .build()
        .unwrap();

    let long = Document::new("notes", regional_text("n", 3000));
    let tail_phrase = long.raw_text[2750..2950].to_string();
    pipeline.ingest(&[long]).await.unwrap();
    assert_eq!(pipeline.stats().await.unwrap().total_vectors, 4);

    pipeline.ingest(&[Document::new("notes", regional_text("n", 500))]).await.unwrap();
    assert_eq!(pipeline.stats().await.unwrap().total_vectors, 1);

    let context = pipeline.retrieval().retrieve(&tail_phrase, 4, 0.05).await.unwrap();
    assert!(context.results().iter().all(|r| r.chunk.sequence_index == 0));
}

#[tokio::test]
async fn answer_cites_the_documents_it_was_given() {
    let model = Arc::new(EchoModel::default());
    let pipeline = QaPipeline::builder()
        .config(config())
        .embedding_provider(Arc::new(HashingEmbedder::new(DIM)))
        .vector_store(Arc::new(InMemoryVectorStore::new(DIM)))
        .completion_model(model.clone())
        .language_detector(Arc::new(EnglishDetector))
        .build()
        .unwrap();

    let guide = Document::new("guide", regional_text("g", 1500)).with_metadata("filename", "guide.md");
    let phrase = guide.raw_text[100..400].to_string();
    pipeline.ingest(&[guide, Document::new("unrelated", regional_text("u", 1500))]).await.unwrap();

    // Hash collisions give unrelated chunks small non-zero scores.
    let options = QueryOptions::default().score_threshold(0.3);
    let QueryOutcome::Answered(answer) = pipeline.ask_with(&phrase, &options).await.unwrap() else {
        panic!("expected an answer");
    };
    assert!(answer.grounded);
    assert!(answer.citations.contains("guide"));
    assert!(!answer.citations.contains("unrelated"));
    assert_eq!(answer.sources[0].filename, "guide.md");
    assert!(answer.confidence.is_some_and(|c| (0.0..=1.0).contains(&c)));
    assert!(model.prompts.lock().unwrap()[0].contains(&phrase));
}
