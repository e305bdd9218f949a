//! Query language gate.
//!
//! Embedding and completion quality degrade silently on unsupported
//! languages, so the gate fails closed: when detection is not confident it
//! rejects the query as ambiguous instead of guessing.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};

/// A detected language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Language {
    /// ISO 639-3 code, e.g. `eng`, `rus`.
    pub code: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

/// A probabilistic language detector.
pub trait LanguageDetector: Send + Sync {
    /// Detect the language of `text`, or `None` if nothing can be said.
    fn detect(&self, text: &str) -> Option<Language>;
}

/// [`LanguageDetector`] backed by `whatlang`.
///
/// The reported confidence is whatlang's confidence multiplied by the share
/// of letters written in the dominant script, so mixed-script input such as
/// `"hello мир"` is never reported as confident.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl WhatlangDetector {
    fn script_purity(text: &str) -> f64 {
        let mut letters: HashMap<String, usize> = HashMap::new();
        for word in text.split_whitespace() {
            if let Some(script) = whatlang::detect_script(word) {
                *letters.entry(format!("{script:?}")).or_default() +=
                    word.chars().filter(|c| c.is_alphabetic()).count();
            }
        }
        let total: usize = letters.values().sum();
        if total == 0 {
            return 0.0;
        }
        let dominant = letters.values().copied().max().unwrap_or(0);
        dominant as f64 / total as f64
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<Language> {
        let info = whatlang::detect(text)?;
        let confidence = info.confidence() * Self::script_purity(text);
        Some(Language { code: info.lang().code().to_string(), confidence })
    }
}

/// What to do with a confidently detected language outside the supported set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum UnsupportedLanguagePolicy {
    /// Refuse the query.
    #[default]
    Reject,
    /// Ask the caller to translate the query into `target` first.
    Translate { target: String },
}

/// Language gate settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanguageConfig {
    /// Supported ISO 639-3 codes.
    pub supported: BTreeSet<String>,
    /// Minimum detector confidence to accept a detection.
    pub min_confidence: f64,
    pub unsupported: UnsupportedLanguagePolicy,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            supported: ["eng", "rus"].into_iter().map(String::from).collect(),
            min_confidence: 0.7,
            unsupported: UnsupportedLanguagePolicy::Reject,
        }
    }
}

impl LanguageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.supported.is_empty() {
            return Err(RagError::ConfigError("supported language set must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(RagError::ConfigError(format!(
                "min_confidence ({}) must be within [0, 1]",
                self.min_confidence
            )));
        }
        if let UnsupportedLanguagePolicy::Translate { target } = &self.unsupported {
            if !self.supported.contains(target) {
                return Err(RagError::ConfigError(format!(
                    "translation target '{target}' is not a supported language"
                )));
            }
        }
        Ok(())
    }
}

/// Why a query was turned away.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Rejection {
    /// The query has no text.
    EmptyQuery,
    /// Detection was below the confidence threshold.
    Ambiguous { confidence: f64 },
    /// Confidently detected, but not in the supported set.
    UnsupportedLanguage { language: String },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyQuery => write!(f, "empty query"),
            Self::Ambiguous { confidence } => {
                write!(f, "ambiguous language (confidence {confidence:.2})")
            }
            Self::UnsupportedLanguage { language } => write!(f, "unsupported language '{language}'"),
        }
    }
}

/// The gate's routing decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Proceed(Language),
    Translate { from: Language, to: String },
    Reject(Rejection),
}

/// Detects a query's language and decides whether the pipeline proceeds.
#[derive(Clone)]
pub struct LanguageGate {
    config: LanguageConfig,
    detector: Arc<dyn LanguageDetector>,
}

impl LanguageGate {
    /// Create a gate using [`WhatlangDetector`].
    pub fn new(config: LanguageConfig) -> Result<Self> {
        Self::with_detector(config, Arc::new(WhatlangDetector))
    }

    pub fn with_detector(config: LanguageConfig, detector: Arc<dyn LanguageDetector>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, detector })
    }

    pub fn config(&self) -> &LanguageConfig {
        &self.config
    }

    /// Route `query`.
    pub fn check(&self, query: &str) -> Decision {
        if query.trim().is_empty() {
            return Decision::Reject(Rejection::EmptyQuery);
        }

        let Some(language) = self.detector.detect(query) else {
            debug!("language detection returned nothing");
            return Decision::Reject(Rejection::Ambiguous { confidence: 0.0 });
        };

        if language.confidence < self.config.min_confidence {
            debug!(language = %language.code, confidence = language.confidence, "language below confidence threshold");
            return Decision::Reject(Rejection::Ambiguous { confidence: language.confidence });
        }

        if self.config.supported.contains(&language.code) {
            return Decision::Proceed(language);
        }

        match &self.config.unsupported {
            UnsupportedLanguagePolicy::Reject => {
                Decision::Reject(Rejection::UnsupportedLanguage { language: language.code })
            }
            UnsupportedLanguagePolicy::Translate { target } => {
                Decision::Translate { from: language, to: target.clone() }
            }
        }
    }
}
