//! Answer generation over an assembled [`Context`].
//!
//! [`AnswerGenerator`] turns a query plus retrieved passages into a prompt
//! for a [`CompletionModel`], calls it under the configured [`RetryPolicy`],
//! and packages the result as an [`Answer`] with citations and a confidence
//! score.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::{Answer, Context};
use crate::error::{RagError, Result};
use crate::language::Language;
use crate::retry::RetryPolicy;

/// A single prompt sent to a [`CompletionModel`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    /// System instructions.
    pub system: String,
    /// The user turn: passages and question.
    pub prompt: String,
    pub temperature: Option<f32>,
}

/// A text completion backend.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Complete `request` and return the generated text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// A short provider name used in logs and errors.
    fn name(&self) -> &str {
        "completion_model"
    }
}

/// What to do when retrieval produced no passages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Answer from the model's own knowledge, labelled `grounded = false`.
    #[default]
    Ungrounded,
    /// Refuse with [`RagError::InsufficientContext`].
    Fail,
}

/// Prompt templates for one language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptSet {
    /// System prompt used when passages are available.
    pub grounded: String,
    /// System prompt used under [`EmptyContextPolicy::Ungrounded`].
    pub ungrounded: String,
    /// Notice prefixed to ungrounded answers.
    pub no_documents: String,
}

impl PromptSet {
    fn english() -> Self {
        Self {
            grounded: "You are an assistant for answering questions based on provided documents.\n\n\
                       Instructions:\n\
                       1. Answer in English\n\
                       2. Use only information from the provided documents\n\
                       3. If information is insufficient, say so\n\
                       4. Cite your sources by passage number, e.g. [1]\n\
                       5. Be specific and accurate"
                .to_string(),
            ungrounded: "You are an assistant answering questions. No reference documents are \
                         available for this question. Answer in English from your own general \
                         knowledge only, and say so if you are unsure."
                .to_string(),
            no_documents: "No relevant documents found to answer your question.".to_string(),
        }
    }

    fn russian() -> Self {
        Self {
            grounded: "Ты помощник для ответов на вопросы на основе предоставленных документов.\n\n\
                       Инструкции:\n\
                       1. Отвечай на русском языке\n\
                       2. Используй только информацию из предоставленных документов\n\
                       3. Если информации недостаточно, так и скажи\n\
                       4. Указывай источники по номеру фрагмента, например [1]\n\
                       5. Будь конкретным и точным"
                .to_string(),
            ungrounded: "Ты помощник для ответов на вопросы. Справочных документов по этому \
                         вопросу нет. Отвечай на русском языке, опираясь только на общие знания, \
                         и скажи, если не уверен."
                .to_string(),
            no_documents: "Не найдено релевантных документов для ответа на ваш вопрос.".to_string(),
        }
    }
}

/// Answer generator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub empty_context: EmptyContextPolicy,
    /// Largest context, in characters, the model is sent.
    pub max_context_chars: usize,
    pub temperature: Option<f32>,
    /// Language used when a query's language has no prompt set.
    pub fallback_language: String,
    /// Prompt sets keyed by ISO 639-3 code. Entries replace the bundled ones.
    pub prompts: BTreeMap<String, PromptSet>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            empty_context: EmptyContextPolicy::Ungrounded,
            max_context_chars: 12_000,
            temperature: Some(0.1),
            fallback_language: "eng".to_string(),
            prompts: BTreeMap::new(),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_context_chars == 0 {
            return Err(RagError::ConfigError("max_context_chars must be greater than zero".into()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RagError::ConfigError(format!("temperature ({t}) must be within [0, 2]")));
            }
        }
        Ok(())
    }

    /// Prompt set for `language`, falling back to the configured fallback
    /// language and then to English.
    pub fn prompts_for(&self, language: &str) -> PromptSet {
        let lookup = |code: &str| {
            self.prompts.get(code).cloned().or_else(|| match code {
                "eng" => Some(PromptSet::english()),
                "rus" => Some(PromptSet::russian()),
                _ => None,
            })
        };
        lookup(language).or_else(|| lookup(&self.fallback_language)).unwrap_or_else(PromptSet::english)
    }
}

/// Heuristic answer confidence in `[0, 1]`.
///
/// The mean retrieval score of the passages used, reduced by a fifth for
/// answers under 50 characters and raised by a tenth when three or more
/// passages support it.
pub fn confidence(scores: &[f32], answer: &str) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut value = scores.iter().sum::<f32>() / scores.len() as f32;
    if answer.chars().count() < 50 {
        value *= 0.8;
    }
    if scores.len() >= 3 {
        value *= 1.1;
    }
    value.clamp(0.0, 1.0)
}

/// Adapter between assembled context and a [`CompletionModel`].
#[derive(Clone)]
pub struct AnswerGenerator {
    model: Arc<dyn CompletionModel>,
    config: GeneratorConfig,
    retry: RetryPolicy,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn CompletionModel>, config: GeneratorConfig, retry: RetryPolicy) -> Result<Self> {
        config.validate()?;
        retry.validate()?;
        Ok(Self { model, config, retry })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate an answer to `query` from `context`.
    ///
    /// The context is first cut down to `max_context_chars`; the citations
    /// are exactly the documents of the passages that were sent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InsufficientContext`] for an empty context under
    /// [`EmptyContextPolicy::Fail`], [`RagError::ConfigError`] when passages
    /// were retrieved but none fits `max_context_chars`, or the model's error
    /// once retries are exhausted.
    pub async fn generate(&self, query: &str, context: &Context, language: &Language) -> Result<Answer> {
        let truncated = context.truncated(self.config.max_context_chars);
        if truncated.is_empty() && !context.is_empty() {
            return Err(RagError::ConfigError(format!(
                "no retrieved passage fits max_context_chars ({})",
                self.config.max_context_chars
            )));
        }
        let context = truncated;
        let prompts = self.config.prompts_for(&language.code);

        if context.is_empty() {
            return match self.config.empty_context {
                EmptyContextPolicy::Fail => {
                    debug!(language = %language.code, "empty context, refusing to answer");
                    Err(RagError::InsufficientContext)
                }
                EmptyContextPolicy::Ungrounded => {
                    let request = CompletionRequest {
                        system: prompts.ungrounded,
                        prompt: format!("Question: {query}"),
                        temperature: self.config.temperature,
                    };
                    let text = self.complete(&request).await?;
                    warn!(language = %language.code, "answered without grounding passages");
                    Ok(Answer {
                        text: format!("{}\n\n{}", prompts.no_documents, text.trim()),
                        citations: BTreeSet::new(),
                        language: language.code.clone(),
                        confidence: None,
                        grounded: false,
                        sources: Vec::new(),
                    })
                }
            };
        }

        let request = CompletionRequest {
            system: prompts.grounded,
            prompt: grounded_prompt(query, &context),
            temperature: self.config.temperature,
        };
        let text = self.complete(&request).await?.trim().to_string();

        let scores: Vec<f32> = context.results().iter().map(|r| r.score).collect();
        let confidence = confidence(&scores, &text);
        info!(
            language = %language.code,
            passages = context.len(),
            context_chars = context.size(),
            confidence,
            "generated answer"
        );

        Ok(Answer {
            citations: context.document_ids(),
            sources: Answer::sources_from(&context),
            text,
            language: language.code.clone(),
            confidence: Some(confidence),
            grounded: true,
        })
    }

    /// Translate `text` from `from` into `to` with the completion model.
    pub async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        let request = CompletionRequest {
            system: format!(
                "Translate the user's text from the language with ISO 639-3 code '{from}' into \
                 the language with code '{to}'. Reply with the translation only."
            ),
            prompt: text.to_string(),
            temperature: Some(0.0),
        };
        let translated = self.complete(&request).await?;
        debug!(from, to, "translated query");
        Ok(translated.trim().to_string())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = &self.model;
        self.retry.run("complete", || model.complete(request)).await
    }
}

fn grounded_prompt(query: &str, context: &Context) -> String {
    let mut prompt = String::from("Context:\n");
    for result in context.results() {
        let source = result.chunk.metadata.get("filename").unwrap_or(&result.chunk.document_id);
        let _ = write!(prompt, "\n[{}] (source: {source})\n{}\n", result.rank, result.chunk.text);
    }
    let _ = write!(prompt, "\nQuestion: {query}");
    prompt
}
