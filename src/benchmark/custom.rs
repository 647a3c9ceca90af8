//! Supplementary rank metrics: MRR, capped recall, hole rate and top-k
//! accuracy.
//!
//! Each function returns per-query score lists keyed `<METRIC>@<k>`; the
//! corpus mean and abstention diagnostics are layered on by
//! [`super::evaluate_custom`].

use std::collections::BTreeSet;

use super::{ranked_docs, PerQueryScores, Qrels};
use crate::search::ResultSet;

/// Metric selector for [`super::evaluate_custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomMetric {
    Mrr,
    RecallCap,
    Hole,
    TopKAccuracy,
}

impl CustomMetric {
    /// Accepts the aliases callers commonly use for each metric.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mrr" | "mrr@k" | "mrr_cut" => Some(Self::Mrr),
            "recall_cap" | "r_cap" | "r_cap@k" => Some(Self::RecallCap),
            "hole" | "hole@k" => Some(Self::Hole),
            "acc" | "top_k_acc" | "accuracy" | "accuracy@k" | "top_k_accuracy" => {
                Some(Self::TopKAccuracy)
            }
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mrr => "MRR",
            Self::RecallCap => "R_cap",
            Self::Hole => "Hole",
            Self::TopKAccuracy => "Accuracy",
        }
    }
}

fn k_max(k_values: &[usize]) -> usize {
    k_values.iter().copied().max().unwrap_or(0)
}

fn relevant_docs(qrel: &std::collections::BTreeMap<String, i32>) -> BTreeSet<&str> {
    qrel.iter()
        .filter(|(_, &grade)| grade > 0)
        .map(|(id, _)| id.as_str())
        .collect()
}

/// Reciprocal rank of the first relevant document within the top k.
pub fn mrr(qrels: &Qrels, results: &ResultSet, k_values: &[usize]) -> PerQueryScores {
    let mut out = PerQueryScores::with_keys("MRR", k_values);
    for (qid, run) in results {
        let Some(qrel) = qrels.get(qid) else { continue };
        let relevant = relevant_docs(qrel);
        let top_hits = ranked_docs(run);
        let top_hits = &top_hits[..top_hits.len().min(k_max(k_values))];

        out.query_ids.push(qid.clone());
        for &k in k_values {
            let rr = top_hits
                .iter()
                .take(k)
                .enumerate()
                .find(|(_, (id, _))| relevant.contains(id))
                .map(|(rank, _)| 1.0 / (rank + 1) as f64)
                .unwrap_or(0.0);
            out.push(&format!("MRR@{k}"), rr);
        }
    }
    out
}

/// Recall with the denominator capped at k: retrieved-relevant@k over
/// min(relevant, k). A query with no relevant documents scores zero rather
/// than dividing by zero.
pub fn recall_cap(qrels: &Qrels, results: &ResultSet, k_values: &[usize]) -> PerQueryScores {
    let mut out = PerQueryScores::with_keys("R_cap", k_values);
    for (qid, run) in results {
        let Some(qrel) = qrels.get(qid) else { continue };
        let relevant = relevant_docs(qrel);
        let top_hits = ranked_docs(run);
        let top_hits = &top_hits[..top_hits.len().min(k_max(k_values))];

        out.query_ids.push(qid.clone());
        for &k in k_values {
            let retrieved = top_hits
                .iter()
                .take(k)
                .filter(|(id, _)| relevant.contains(id))
                .count();
            let denominator = relevant.len().min(k);
            let score = if denominator > 0 {
                retrieved as f64 / denominator as f64
            } else {
                0.0
            };
            out.push(&format!("R_cap@{k}"), score);
        }
    }
    out
}

/// Fraction of the top k that was never judged at all (any grade counts as
/// judged). Scored for every result query; no per-query judgments needed.
pub fn hole(qrels: &Qrels, results: &ResultSet, k_values: &[usize]) -> PerQueryScores {
    let annotated: BTreeSet<&str> = qrels
        .values()
        .flat_map(|docs| docs.keys())
        .map(|id| id.as_str())
        .collect();

    let mut out = PerQueryScores::with_keys("Hole", k_values);
    for (qid, run) in results {
        let top_hits = ranked_docs(run);
        let top_hits = &top_hits[..top_hits.len().min(k_max(k_values))];

        out.query_ids.push(qid.clone());
        for &k in k_values {
            let holes = top_hits
                .iter()
                .take(k)
                .filter(|(id, _)| !annotated.contains(id))
                .count();
            out.push(&format!("Hole@{k}"), holes as f64 / k as f64);
        }
    }
    out
}

/// Whether any relevant document appears in the top k.
pub fn top_k_accuracy(qrels: &Qrels, results: &ResultSet, k_values: &[usize]) -> PerQueryScores {
    let mut out = PerQueryScores::with_keys("Accuracy", k_values);
    for (qid, run) in results {
        let Some(qrel) = qrels.get(qid) else { continue };
        let relevant = relevant_docs(qrel);
        let top_hits = ranked_docs(run);
        let top_hits = &top_hits[..top_hits.len().min(k_max(k_values))];

        out.query_ids.push(qid.clone());
        for &k in k_values {
            let hit = top_hits
                .iter()
                .take(k)
                .any(|(id, _)| relevant.contains(id));
            out.push(&format!("Accuracy@{k}"), if hit { 1.0 } else { 0.0 });
        }
    }
    out
}
