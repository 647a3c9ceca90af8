//! Loading previously computed first-stage results.
//!
//! A results file holds `{query_id: {corpus_id: score}}` and lets a caller
//! skip the search stage entirely, e.g. when re-scoring a cached run with a
//! different cutoff set.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{EvalError, Result};

use super::ResultSet;

/// Deterministic cache location for a fetched results URL.
pub fn cache_path_for_url(url: &str) -> PathBuf {
    let descriptor = url
        .split("https://")
        .last()
        .unwrap_or(url)
        .replace('/', "--");
    PathBuf::from("results").join(format!("cached_predictions--{descriptor}"))
}

/// Load a results mapping from a local path or an `https://` URL.
///
/// URLs are fetched once into [`cache_path_for_url`] and reused afterwards.
pub async fn load_previous_results(location: &str) -> Result<ResultSet> {
    let path = if location.contains("https://") {
        fetch(location).await?
    } else {
        PathBuf::from(location)
    };
    parse_results_file(&path)
}

async fn fetch(url: &str) -> Result<PathBuf> {
    let dest = cache_path_for_url(url);
    if !dest.exists() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = reqwest::get(url).await?.error_for_status()?.bytes().await?;
        std::fs::write(&dest, &body)?;
        info!(url, dest = %dest.display(), "Downloaded previous results");
    }
    Ok(dest)
}

/// Parse a results file; anything that is not a mapping of mappings is a
/// fatal input error.
pub fn parse_results_file(path: &Path) -> Result<ResultSet> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str::<ResultSet>(&content).map_err(|source| {
        EvalError::MalformedCachedResults {
            path: path.display().to_string(),
            source,
        }
    })
}
