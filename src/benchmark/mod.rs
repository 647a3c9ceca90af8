//! Retrieval quality evaluation.
//!
//! Scores a search run against relevance judgments: trec-style NDCG, MAP,
//! Recall and Precision at a caller-supplied cutoff set, supplementary rank
//! metrics, and abstention diagnostics relating retrieval confidence to
//! per-query quality.

pub mod abstention;
pub mod custom;
pub mod trec;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::debug;

use crate::error::EvalError;
use crate::search::ResultSet;

pub use abstention::{confidence_scores, nauc, ConfidenceScores, CONFIDENCE_FUNCTIONS};
pub use custom::CustomMetric;
pub use trec::RelevanceEvaluator;

/// query id → {corpus id → integer relevance grade}. Ground truth, supplied
/// externally and never mutated here.
pub type Qrels = BTreeMap<String, BTreeMap<String, i32>>;

/// Load qrels from a JSON mapping `{query_id: {corpus_id: grade}}`.
pub fn load_qrels(path: &Path) -> anyhow::Result<Qrels> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read qrels: {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse qrels: {path:?}"))
}

/// Per-query metric score lists keyed `<METRIC>@<k>`, each aligned to
/// `query_ids`.
#[derive(Debug, Clone, Default)]
pub struct PerQueryScores {
    pub query_ids: Vec<String>,
    pub scores: BTreeMap<String, Vec<f64>>,
}

impl PerQueryScores {
    pub(crate) fn with_keys(label: &str, k_values: &[usize]) -> Self {
        Self {
            query_ids: Vec::new(),
            scores: k_values
                .iter()
                .map(|k| (format!("{label}@{k}"), Vec::new()))
                .collect(),
        }
    }

    pub(crate) fn push(&mut self, key: &str, value: f64) {
        self.scores.entry(key.to_string()).or_default().push(value);
    }

    pub fn is_empty(&self) -> bool {
        self.query_ids.is_empty()
    }
}

/// Corpus-mean metric tables (rounded to 5 decimals) plus abstention
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalScores {
    pub ndcg: BTreeMap<String, f64>,
    pub map: BTreeMap<String, f64>,
    pub recall: BTreeMap<String, f64>,
    pub precision: BTreeMap<String, f64>,
    pub naucs: BTreeMap<String, f64>,
}

/// A run's documents ranked by score descending; exactly equal scores rank
/// the lexicographically lower id first.
pub(crate) fn ranked_docs(run: &BTreeMap<String, f32>) -> Vec<(&str, f32)> {
    let mut hits: Vec<(&str, f32)> = run.iter().map(|(id, &score)| (id.as_str(), score)).collect();
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    hits
}

fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

fn strip_identical_ids(results: &ResultSet) -> ResultSet {
    results
        .iter()
        .map(|(qid, docs)| {
            let docs = docs
                .iter()
                .filter(|(pid, _)| pid.as_str() != qid.as_str())
                .map(|(pid, &score)| (pid.clone(), score))
                .collect();
            (qid.clone(), docs)
        })
        .collect()
}

fn mean(values: &[f64]) -> Result<f64, EvalError> {
    if values.is_empty() {
        return Err(EvalError::NoScoredQueries);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Score `results` against `qrels` at every cutoff in `k_values`.
///
/// With `ignore_identical_ids`, every `(qid, pid)` pair with `qid == pid` is
/// dropped before scoring, for corpora that share an id space with their
/// queries. Queries are aggregated in sorted id order, so repeated calls on
/// the same inputs are bit-identical.
pub fn evaluate(
    qrels: &Qrels,
    results: &ResultSet,
    k_values: &[usize],
    ignore_identical_ids: bool,
) -> Result<RetrievalScores, EvalError> {
    let filtered = if ignore_identical_ids {
        debug!("Dropping identical query/document id pairs before scoring");
        Some(strip_identical_ids(results))
    } else {
        None
    };
    let results = filtered.as_ref().unwrap_or(results);

    let per_query = RelevanceEvaluator::new(qrels, k_values).evaluate(results);
    if per_query.is_empty() {
        return Err(EvalError::NoScoredQueries);
    }

    let mut lists = PerQueryScores::default();
    lists.query_ids = per_query.keys().cloned().collect();
    for (index, k) in k_values.iter().enumerate() {
        for eval in per_query.values() {
            lists.push(&format!("NDCG@{k}"), eval.ndcg[index]);
            lists.push(&format!("MAP@{k}"), eval.map[index]);
            lists.push(&format!("Recall@{k}"), eval.recall[index]);
            lists.push(&format!("P@{k}"), eval.precision[index]);
        }
    }

    let table = |label: &str| -> Result<BTreeMap<String, f64>, EvalError> {
        k_values
            .iter()
            .map(|k| {
                let key = format!("{label}@{k}");
                let values = &lists.scores[&key];
                Ok((key, round5(mean(values)?)))
            })
            .collect()
    };
    let ndcg = table("NDCG")?;
    let map = table("MAP")?;
    let recall = table("Recall")?;
    let precision = table("P")?;
    let naucs = abstention::evaluate_abstention(results, &lists);

    Ok(RetrievalScores {
        ndcg,
        map,
        recall,
        precision,
        naucs,
    })
}

/// Score `results` with one of the supplementary metrics. Returns the
/// corpus-mean table and the metric's abstention diagnostics.
pub fn evaluate_custom(
    qrels: &Qrels,
    results: &ResultSet,
    k_values: &[usize],
    metric: CustomMetric,
) -> Result<(BTreeMap<String, f64>, BTreeMap<String, f64>), EvalError> {
    let per_query = match metric {
        CustomMetric::Mrr => custom::mrr(qrels, results, k_values),
        CustomMetric::RecallCap => custom::recall_cap(qrels, results, k_values),
        CustomMetric::Hole => custom::hole(qrels, results, k_values),
        CustomMetric::TopKAccuracy => custom::top_k_accuracy(qrels, results, k_values),
    };
    if per_query.is_empty() {
        return Err(EvalError::NoScoredQueries);
    }

    let means = per_query
        .scores
        .iter()
        .map(|(key, values)| Ok((key.clone(), mean(values)?)))
        .collect::<Result<BTreeMap<String, f64>, EvalError>>()?;
    let naucs = abstention::evaluate_abstention(results, &per_query);
    Ok((means, naucs))
}
