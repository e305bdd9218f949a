//! Evaluation records and dataset loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// One generated answer paired with its reference answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The question, when the dataset carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub generated: String,
    pub reference: String,
}

impl EvalRecord {
    pub fn new(generated: impl Into<String>, reference: impl Into<String>) -> Self {
        Self { id: None, query: None, generated: generated.into(), reference: reference.into() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Load records from a `.json` array or a `.jsonl` file (one object per line).
///
/// Blank lines in JSON Lines files are ignored; parse errors report the
/// 1-based line number.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<EvalRecord>> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = fs::read_to_string(path)
        .map_err(|source| EvalError::Io { path: display.clone(), source })?;

    let is_array = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || content.trim_start().starts_with('[');
    if is_array {
        return serde_json::from_str(&content).map_err(|e| EvalError::Parse {
            path: display,
            line: e.line(),
            message: e.to_string(),
        });
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| EvalError::Parse {
                path: display.clone(),
                line: i + 1,
                message: e.to_string(),
            })
        })
        .collect()
}
