//! Error types shared by the search engine and the metric evaluator.

use thiserror::Error;

/// Errors surfaced by the retrieval core.
///
/// All variants are fatal for the operation that produced them; nothing is
/// retried and no partial results are returned alongside an error.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Score function name outside the supported set.
    #[error("score function `{0}` must be either `cos_sim` for cosine similarity or `dot` for dot product")]
    InvalidScoreFunction(String),

    /// Modality tag outside {text, image, text+image}.
    #[error("unsupported modality: {0}")]
    UnsupportedModality(String),

    /// A cached results file did not decode to `{query_id: {corpus_id: score}}`.
    #[error("malformed cached results at {path}: expected a mapping of query ids to {{corpus_id: score}} mappings")]
    MalformedCachedResults {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Results and relevance judgments share no query ids; a metric mean
    /// over zero queries is undefined.
    #[error("no scored queries: results and relevance judgments share no query ids")]
    NoScoredQueries,

    /// The embedding backend reported a failure.
    #[error("embedding backend failed: {0}")]
    Embed(anyhow::Error),

    #[error("i/o error")]
    Io(#[from] std::io::Error),

    /// Fetching a remote cached-results file failed. Retrying is the
    /// caller's responsibility.
    #[error("failed to fetch cached results")]
    Fetch(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, EvalError>;
