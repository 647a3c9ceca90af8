//! Benchmark run configuration
//!
//! Defines the eval.toml schema: engine knobs, cutoff set and evaluation
//! flags, all optional with the reference defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::search::{ScoreFunction, SearchConfig};

/// Evaluation settings loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Corpus items encoded and ranked per chunk
    #[serde(default = "default_corpus_chunk_size")]
    pub corpus_chunk_size: usize,

    /// Batch size forwarded to the embedding provider
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Metric cutoffs
    #[serde(default = "default_k_values")]
    pub k_values: Vec<usize>,

    /// Candidates kept per query; defaults to max(k_values)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// `cos_sim` or `dot`
    #[serde(default = "default_score_function")]
    pub score_function: String,

    /// Drop (qid, pid) pairs with qid == pid before scoring
    #[serde(default)]
    pub ignore_identical_ids: bool,

    /// Results file or URL to load instead of searching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_results: Option<String>,
}

fn default_corpus_chunk_size() -> usize {
    20_000
}
fn default_batch_size() -> usize {
    128
}
fn default_k_values() -> Vec<usize> {
    vec![1, 3, 5, 10, 20, 100, 1000]
}
fn default_score_function() -> String {
    "cos_sim".to_string()
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            corpus_chunk_size: default_corpus_chunk_size(),
            batch_size: default_batch_size(),
            k_values: default_k_values(),
            top_k: None,
            score_function: default_score_function(),
            ignore_identical_ids: false,
            previous_results: None,
        }
    }
}

impl EvalConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read eval config: {path:?}"))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse eval config: {path:?}"))?;
        Ok(config)
    }

    /// Load from default location (./eval.toml) or return defaults
    pub fn load_default() -> Result<Self> {
        let local_path = Path::new("eval.toml");
        if local_path.exists() {
            return Self::load(local_path);
        }
        Ok(Self::default())
    }

    /// Save config to TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Candidates kept per query.
    pub fn top_k(&self) -> usize {
        self.top_k
            .unwrap_or_else(|| self.k_values.iter().copied().max().unwrap_or(10))
            .max(1)
    }

    /// The configured score function; unknown names fail here, before any
    /// encoding work.
    pub fn score_function(&self) -> std::result::Result<ScoreFunction, EvalError> {
        ScoreFunction::parse(&self.score_function)
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            corpus_chunk_size: self.corpus_chunk_size,
            batch_size: self.batch_size,
        }
    }
}
