//! CLI configuration: a TOML file overlaid with environment variables.

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use docqa_rag::RagConfig;
use serde::{Deserialize, Serialize};

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Offline feature hashing; useful for trying the CLI without credentials.
    Hashing,
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderSettings {
    pub kind: EmbedderKind,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self { kind: EmbedderKind::default(), model: "text-embedding-3-small".into(), dimensions: 1536 }
    }
}

/// Which vector store to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process-local; contents are lost when the command exits.
    Memory,
    #[default]
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    pub url: String,
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { kind: StoreKind::default(), url: "http://localhost:6334".into(), collection: "documents".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { model: "gpt-4o-mini".into(), base_url: None }
    }
}

/// Everything the `docqa` binary needs to assemble a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CliConfig {
    pub rag: RagConfig,
    pub embedder: EmbedderSettings,
    pub store: StoreSettings,
    pub model: ModelSettings,
}

impl CliConfig {
    /// Load from `path` (or defaults when `None`), then apply environment overrides
    /// and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.rag.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from environment variables, looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let rag = &mut self.rag;
        override_parsed(&var, "CHUNK_SIZE", &mut rag.chunking.chunk_size)?;
        override_parsed(&var, "CHUNK_OVERLAP", &mut rag.chunking.chunk_overlap)?;
        override_parsed(&var, "SIMILARITY_TOP_K", &mut rag.retrieval.top_k)?;
        override_parsed(&var, "SIMILARITY_THRESHOLD", &mut rag.retrieval.score_threshold)?;
        override_parsed(&var, "MAX_FILE_SIZE_MB", &mut rag.source.max_file_size_mb)?;
        override_parsed(&var, "MAX_FILES_COUNT", &mut rag.source.max_files_count)?;

        if let Some(model) = var("OPENAI_MODEL") {
            self.model.model = model;
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.embedder.model = model;
        }
        if let Some(url) = var("QDRANT_URL") {
            self.store.url = url;
        }
        if let Some(collection) = var("QDRANT_COLLECTION") {
            self.store.collection = collection;
        }
        Ok(())
    }
}

fn override_parsed<T>(var: impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = var(key) else {
        return Ok(());
    };
    match raw.trim().parse() {
        Ok(value) => {
            *target = value;
            Ok(())
        }
        Err(e) => bail!("invalid {key}={raw:?}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.rag.chunking.chunk_size, 1024);
        assert_eq!(config.store.kind, StoreKind::Qdrant);
    }

    #[test]
    fn toml_sections_are_read() {
        let config = CliConfig::from_toml(
            r#"
            [rag.chunking]
            chunk_size = 500
            chunk_overlap = 50

            [rag.retrieval]
            top_k = 3

            [embedder]
            kind = "hashing"
            dimensions = 256

            [store]
            kind = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.rag.chunking.chunk_size, 500);
        assert_eq!(config.rag.chunking.chunk_overlap, 50);
        assert_eq!(config.rag.retrieval.top_k, 3);
        assert_eq!(config.rag.retrieval.score_threshold, 0.7);
        assert_eq!(config.embedder.kind, EmbedderKind::Hashing);
        assert_eq!(config.embedder.dimensions, 256);
        assert_eq!(config.store.kind, StoreKind::Memory);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = CliConfig::from_toml("[rag.chunking]\nchunk_size = 500\n").unwrap();
        config
            .apply_env(env(&[
                ("CHUNK_SIZE", "800"),
                ("SIMILARITY_THRESHOLD", "0.25"),
                ("MAX_FILES_COUNT", "7"),
                ("OPENAI_MODEL", "gpt-4o"),
                ("QDRANT_COLLECTION", "manuals"),
            ]))
            .unwrap();
        assert_eq!(config.rag.chunking.chunk_size, 800);
        assert_eq!(config.rag.retrieval.score_threshold, 0.25);
        assert_eq!(config.rag.source.max_files_count, 7);
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.store.collection, "manuals");
        assert_eq!(config.store.url, "http://localhost:6334");
    }

    #[test]
    fn malformed_override_names_the_variable() {
        let mut config = CliConfig::default();
        let err = config.apply_env(env(&[("SIMILARITY_TOP_K", "many")])).unwrap_err();
        assert!(err.to_string().contains("SIMILARITY_TOP_K"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[model]\nbase_url = \"http://localhost:8080/v1\"\n")
            .unwrap();
        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.model.base_url.as_deref(), Some("http://localhost:8080/v1"));
    }
}
