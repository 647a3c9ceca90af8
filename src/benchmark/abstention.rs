//! Confidence statistics and normalized abstention AUC.
//!
//! For every query, scalar confidence estimates are derived from the
//! distribution of its retrieved similarity scores. The normalized AUC then
//! measures how much of a metric's achievable gain is captured by abstaining
//! on low-confidence queries first, scaled between the flat curve (random
//! order) and the oracle curve (queries ordered by the metric itself).

use std::collections::BTreeMap;

use super::PerQueryScores;
use crate::search::ResultSet;

/// Abstention rates swept when building a curve: 0.0, 0.1, … 0.9.
const ABSTENTION_RATES: [f64; 10] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

/// Names of the confidence functions, in the order [`ConfidenceScores::get`]
/// resolves them.
pub const CONFIDENCE_FUNCTIONS: [&str; 3] = ["max", "std", "diff1"];

/// Confidence estimates for one query, derived from its retrieved scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScores {
    /// Highest retrieved similarity score.
    pub max: f64,
    /// Population standard deviation of the retrieved scores.
    pub std: f64,
    /// Margin between the best and second-best score; 0 for singletons.
    pub diff1: f64,
}

impl ConfidenceScores {
    pub fn get(&self, function: &str) -> Option<f64> {
        match function {
            "max" => Some(self.max),
            "std" => Some(self.std),
            "diff1" => Some(self.diff1),
            _ => None,
        }
    }
}

/// Confidence statistics for a single query's retrieved similarity scores.
/// An empty score list gets the −1 sentinel as `max`: a query that retrieved
/// nothing ranks below every real score distribution.
pub fn confidence_scores(sim_scores: &[f32]) -> ConfidenceScores {
    if sim_scores.is_empty() {
        return ConfidenceScores {
            max: -1.0,
            std: 0.0,
            diff1: 0.0,
        };
    }
    let mut sorted: Vec<f64> = sim_scores.iter().map(|&s| f64::from(s)).collect();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    ConfidenceScores {
        max: sorted[0],
        std: variance.sqrt(),
        diff1: if sorted.len() > 1 {
            sorted[0] - sorted[1]
        } else {
            0.0
        },
    }
}

fn argsort_ascending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));
    order
}

/// Mean metric over the queries that survive each abstention rate, dropping
/// the lowest-`order_by` queries first.
fn abstention_curve(order_by: &[f64], metrics: &[f64]) -> Vec<f64> {
    let order = argsort_ascending(order_by);
    let n = metrics.len();
    ABSTENTION_RATES
        .iter()
        .map(|rate| {
            let abstained = ((rate * n as f64).round() as usize).min(n - 1);
            let kept = &order[abstained..];
            kept.iter().map(|&i| metrics[i]).sum::<f64>() / kept.len() as f64
        })
        .collect()
}

fn trapezoid_auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// Normalized abstention AUC of `conf_scores` as a predictor of `metrics`.
///
/// 1.0 means confidence orders queries as well as the metric itself, 0 means
/// no better than random, negative means confidence is anti-correlated with
/// quality. Degenerate metric distributions (oracle equals flat) yield 0.
pub fn nauc(conf_scores: &[f64], metrics: &[f64]) -> f64 {
    debug_assert_eq!(conf_scores.len(), metrics.len());
    if metrics.is_empty() {
        return 0.0;
    }
    let abst_curve = abstention_curve(conf_scores, metrics);
    let oracle_curve = abstention_curve(metrics, metrics);
    let abst_auc = trapezoid_auc(&ABSTENTION_RATES, &abst_curve);
    let oracle_auc = trapezoid_auc(&ABSTENTION_RATES, &oracle_curve);

    let mean = metrics.iter().sum::<f64>() / metrics.len() as f64;
    let range = ABSTENTION_RATES[ABSTENTION_RATES.len() - 1] - ABSTENTION_RATES[0];
    let flat_auc = mean * range;

    if (oracle_auc - flat_auc).abs() < f64::EPSILON {
        return 0.0;
    }
    (abst_auc - flat_auc) / (oracle_auc - flat_auc)
}

/// nAUC for every (metric, confidence-function) pair, keyed
/// `nAUC_<metric>_<fct>`. Confidence values are aligned to the metric lists
/// through the scored-query id order recorded in `metric_scores`.
pub fn evaluate_abstention(
    results: &ResultSet,
    metric_scores: &PerQueryScores,
) -> BTreeMap<String, f64> {
    let confidences: Vec<ConfidenceScores> = metric_scores
        .query_ids
        .iter()
        .map(|qid| {
            let sim_scores: Vec<f32> = results
                .get(qid)
                .map(|docs| docs.values().copied().collect())
                .unwrap_or_default();
            confidence_scores(&sim_scores)
        })
        .collect();

    let mut naucs = BTreeMap::new();
    for function in CONFIDENCE_FUNCTIONS {
        let conf_values: Vec<f64> = confidences
            .iter()
            .map(|c| c.get(function).expect("known confidence function"))
            .collect();
        for (metric_name, scores) in &metric_scores.scores {
            naucs.insert(
                format!("nAUC_{metric_name}_{function}"),
                nauc(&conf_values, scores),
            );
        }
    }
    naucs
}
