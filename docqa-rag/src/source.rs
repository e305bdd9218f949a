//! Loading documents from PDF and plain-text files.
//!
//! A file that cannot be read or parsed is reported in
//! [`LoadedSources::failures`] and never aborts the rest of the batch.
//! PDFs take `title`, `author` and `creation_date` from their info
//! dictionary when it has them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{RagError, Result};
use crate::language::{LanguageDetector, WhatlangDetector};

/// Characters sampled from the start of a document for language detection.
const LANGUAGE_SAMPLE_CHARS: usize = 2000;

/// File validation limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub max_file_size_mb: u64,
    pub max_files_count: usize,
    /// Store the detected language under the `language` metadata key.
    pub detect_language: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { max_file_size_mb: 50, max_files_count: 100, detect_language: true }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_mb == 0 || self.max_files_count == 0 {
            return Err(RagError::ConfigError(
                "max_file_size_mb and max_files_count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn max_file_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
}

impl SourceKind {
    /// Guess the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "md" | "markdown" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
        }
    }
}

/// A file that could not be turned into a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedSources {
    pub documents: Vec<Document>,
    pub failures: Vec<SourceFailure>,
}

/// Load every supported file named in `paths`.
///
/// Directories contribute their supported files (non-recursively, sorted by
/// name). Unsupported files inside directories are ignored; unsupported files
/// named explicitly are reported as failures.
///
/// # Errors
///
/// Returns [`RagError::Source`] if more than `max_files_count` files would be
/// loaded, or if a directory cannot be listed.
pub async fn load_paths(paths: &[PathBuf], config: &SourceConfig) -> Result<LoadedSources> {
    let mut files = Vec::new();
    for path in paths {
        if tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
            files.extend(list_dir(path).await?);
        } else {
            files.push(path.clone());
        }
    }

    if files.len() > config.max_files_count {
        return Err(RagError::Source {
            path: display(paths.first().map(PathBuf::as_path).unwrap_or(Path::new("."))),
            message: format!(
                "{} files exceeds the limit of {}",
                files.len(),
                config.max_files_count
            ),
        });
    }

    let mut loaded = LoadedSources::default();
    for file in files {
        match load_file(&file, config).await {
            Ok(document) => loaded.documents.push(document),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping unreadable source");
                loaded.failures.push(SourceFailure { path: display(&file), reason: e.to_string() });
            }
        }
    }
    info!(documents = loaded.documents.len(), failures = loaded.failures.len(), "loaded sources");
    Ok(loaded)
}

/// Load a single file as a [`Document`] whose id is the file path.
pub async fn load_file(path: &Path, config: &SourceConfig) -> Result<Document> {
    let source_err = |message: String| RagError::Source { path: display(path), message };

    let kind = SourceKind::from_path(path)
        .ok_or_else(|| source_err("unsupported file type (expected .pdf, .txt or .md)".into()))?;
    let size = tokio::fs::metadata(path).await.map_err(|e| source_err(e.to_string()))?.len();
    if size > config.max_file_bytes() {
        return Err(source_err(format!(
            "file is {:.1} MB, limit is {} MB",
            size as f64 / (1024.0 * 1024.0),
            config.max_file_size_mb
        )));
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| source_err(e.to_string()))?;
    let (text, pdf_meta) = match kind {
        SourceKind::Text => {
            let text = String::from_utf8(bytes)
                .map_err(|_| source_err("file is not valid UTF-8".into()))?;
            (text, None)
        }
        SourceKind::Pdf => {
            let (text, info) = extract_pdf(bytes).await.map_err(source_err)?;
            (text, Some(info))
        }
    };
    debug!(path = %path.display(), chars = text.chars().count(), "extracted text");

    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = path.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let info = pdf_meta.unwrap_or_default();
    let mut document = Document::new(display(path), text)
        .with_metadata("filename", filename)
        .with_metadata("title", info.title.unwrap_or(stem))
        .with_metadata("file_type", kind.as_str())
        .with_metadata("size_bytes", size.to_string())
        .with_metadata("ingested_at", chrono::Utc::now().to_rfc3339());
    if kind == SourceKind::Pdf {
        document = document.with_metadata("author", info.author.unwrap_or_else(|| "Unknown".into()));
        if let Some(created) = info.creation_date {
            document = document.with_metadata("creation_date", created);
        }
    }

    if config.detect_language {
        let sample: String = document.raw_text.chars().take(LANGUAGE_SAMPLE_CHARS).collect();
        if let Some(language) = WhatlangDetector.detect(&sample) {
            document.source_metadata.insert("language".to_string(), language.code);
        }
    }
    Ok(document)
}

async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| RagError::Source { path: display(dir), message: e.to_string() })?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if SourceKind::from_path(&path).is_some() && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Fields read from a PDF's document information dictionary.
#[derive(Debug, Default, PartialEq)]
struct PdfInfo {
    title: Option<String>,
    author: Option<String>,
    creation_date: Option<String>,
}

#[cfg(feature = "pdf")]
async fn extract_pdf(bytes: Vec<u8>) -> std::result::Result<(String, PdfInfo), String> {
    // pdf-extract can panic on malformed input; a panic in the blocking
    // task surfaces as a JoinError and becomes a per-file failure.
    tokio::task::spawn_blocking(move || {
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| format!("failed to extract PDF text: {e}"))?;
        let info = match lopdf::Document::load_mem(&bytes) {
            Ok(doc) => pdf_info(&doc),
            Err(e) => {
                warn!(error = %e, "could not read PDF metadata");
                PdfInfo::default()
            }
        };
        Ok((text, info))
    })
    .await
    .map_err(|e| format!("PDF parser crashed: {e}"))?
}

#[cfg(not(feature = "pdf"))]
async fn extract_pdf(_bytes: Vec<u8>) -> std::result::Result<(String, PdfInfo), String> {
    Err("PDF support is not enabled (build with the `pdf` feature)".to_string())
}

/// Read `/Title`, `/Author` and `/CreationDate` from the trailer's `/Info`
/// dictionary. Missing or blank entries are `None`.
#[cfg(feature = "pdf")]
fn pdf_info(doc: &lopdf::Document) -> PdfInfo {
    let Ok(info) = doc.trailer.get_deref(b"Info", doc).and_then(lopdf::Object::as_dict) else {
        return PdfInfo::default();
    };
    let field = |key: &[u8]| {
        info.get_deref(key, doc)
            .and_then(lopdf::decode_text_string)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    PdfInfo {
        title: field(b"Title"),
        author: field(b"Author"),
        creation_date: field(b"CreationDate"),
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
