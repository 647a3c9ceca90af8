//! trec_eval-style relevance scoring.
//!
//! Per-query NDCG, MAP, Recall and Precision at a caller-supplied cutoff
//! set, with `ndcg_cut`/`map_cut` semantics: linear gains discounted by
//! log2(rank+1), average precision cut at k with the full relevant count as
//! denominator. A document is relevant when its grade is strictly positive;
//! negative grades contribute zero gain.

use std::collections::BTreeMap;

use super::{ranked_docs, Qrels};
use crate::search::ResultSet;

/// Metric values for one query, parallel to the evaluator's cutoff set.
#[derive(Debug, Clone)]
pub struct QueryEval {
    pub ndcg: Vec<f64>,
    pub map: Vec<f64>,
    pub recall: Vec<f64>,
    pub precision: Vec<f64>,
}

/// Scores a results mapping against relevance judgments.
pub struct RelevanceEvaluator<'a> {
    qrels: &'a Qrels,
    k_values: &'a [usize],
}

impl<'a> RelevanceEvaluator<'a> {
    pub fn new(qrels: &'a Qrels, k_values: &'a [usize]) -> Self {
        Self { qrels, k_values }
    }

    /// Score every query present in both the results and the judgments.
    /// Queries without judgments are skipped, not scored as zero.
    pub fn evaluate(&self, results: &ResultSet) -> BTreeMap<String, QueryEval> {
        results
            .iter()
            .filter_map(|(qid, run)| {
                self.qrels
                    .get(qid)
                    .map(|qrel| (qid.clone(), self.score_query(qrel, run)))
            })
            .collect()
    }

    fn score_query(&self, qrel: &BTreeMap<String, i32>, run: &BTreeMap<String, f32>) -> QueryEval {
        let ranked = ranked_docs(run);
        let gains: Vec<f64> = ranked
            .iter()
            .map(|(id, _)| f64::from(qrel.get(*id).copied().unwrap_or(0).max(0)))
            .collect();
        let num_rel = qrel.values().filter(|&&grade| grade > 0).count();
        let mut ideal_gains: Vec<f64> = qrel
            .values()
            .filter(|&&grade| grade > 0)
            .map(|&grade| f64::from(grade))
            .collect();
        ideal_gains.sort_unstable_by(|a, b| b.total_cmp(a));

        let mut eval = QueryEval {
            ndcg: Vec::with_capacity(self.k_values.len()),
            map: Vec::with_capacity(self.k_values.len()),
            recall: Vec::with_capacity(self.k_values.len()),
            precision: Vec::with_capacity(self.k_values.len()),
        };
        for &k in self.k_values {
            let dcg = discounted_gain(gains.iter().take(k));
            let idcg = discounted_gain(ideal_gains.iter().take(k));
            eval.ndcg.push(if idcg > 0.0 { dcg / idcg } else { 0.0 });

            let mut hits = 0usize;
            let mut precision_sum = 0.0;
            for (rank, gain) in gains.iter().take(k).enumerate() {
                if *gain > 0.0 {
                    hits += 1;
                    precision_sum += hits as f64 / (rank + 1) as f64;
                }
            }
            eval.map.push(if num_rel > 0 {
                precision_sum / num_rel as f64
            } else {
                0.0
            });
            eval.recall.push(if num_rel > 0 {
                hits as f64 / num_rel as f64
            } else {
                0.0
            });
            eval.precision.push(hits as f64 / k as f64);
        }
        eval
    }
}

fn discounted_gain<'g>(gains: impl Iterator<Item = &'g f64>) -> f64 {
    gains
        .enumerate()
        .map(|(rank, gain)| gain / ((rank + 2) as f64).log2())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qrels_one_query() -> Qrels {
        let mut qrels = Qrels::new();
        qrels.insert(
            "q1".into(),
            BTreeMap::from([("d1".into(), 2), ("d2".into(), 1), ("d3".into(), 0)]),
        );
        qrels
    }

    fn results_one_query() -> ResultSet {
        let mut results = ResultSet::new();
        results.insert(
            "q1".into(),
            BTreeMap::from([("d1".into(), 0.9), ("d4".into(), 0.7), ("d2".into(), 0.5)]),
        );
        results
    }

    #[test]
    fn graded_ndcg_matches_hand_computation() {
        let qrels = qrels_one_query();
        let results = results_one_query();
        let evaluator = RelevanceEvaluator::new(&qrels, &[1, 3]);
        let per_query = evaluator.evaluate(&results);
        let eval = &per_query["q1"];

        // ranking is d1, d4, d2 with gains 2, 0, 1
        assert!((eval.ndcg[0] - 1.0).abs() < 1e-9);
        let dcg = 2.0 + 1.0 / 4.0_f64.log2();
        let idcg = 2.0 + 1.0 / 3.0_f64.log2();
        assert!((eval.ndcg[1] - dcg / idcg).abs() < 1e-9);
    }

    #[test]
    fn map_recall_precision_match_hand_computation() {
        let qrels = qrels_one_query();
        let results = results_one_query();
        let evaluator = RelevanceEvaluator::new(&qrels, &[1, 3]);
        let eval = &evaluator.evaluate(&results)["q1"];

        // relevant hits at ranks 1 and 3, two relevant docs in total
        assert!((eval.map[0] - 0.5).abs() < 1e-9);
        assert!((eval.map[1] - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
        assert!((eval.recall[0] - 0.5).abs() < 1e-9);
        assert!((eval.recall[1] - 1.0).abs() < 1e-9);
        assert!((eval.precision[0] - 1.0).abs() < 1e-9);
        assert!((eval.precision[1] - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn equal_scores_rank_lower_id_first() {
        let mut qrels = Qrels::new();
        qrels.insert("q1".into(), BTreeMap::from([("da".into(), 1)]));
        let mut results = ResultSet::new();
        results.insert(
            "q1".into(),
            BTreeMap::from([("da".into(), 0.5), ("db".into(), 0.5)]),
        );

        let evaluator = RelevanceEvaluator::new(&qrels, &[1]);
        let eval = &evaluator.evaluate(&results)["q1"];
        assert!((eval.precision[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn queries_without_judgments_are_skipped() {
        let qrels = qrels_one_query();
        let mut results = results_one_query();
        results.insert("q_unjudged".into(), BTreeMap::from([("d1".into(), 0.4)]));

        let evaluator = RelevanceEvaluator::new(&qrels, &[1]);
        let per_query = evaluator.evaluate(&results);
        assert_eq!(per_query.len(), 1);
        assert!(per_query.contains_key("q1"));
    }

    #[test]
    fn query_with_no_relevant_docs_scores_zero() {
        let mut qrels = Qrels::new();
        qrels.insert("q1".into(), BTreeMap::from([("d1".into(), 0)]));
        let mut results = ResultSet::new();
        results.insert("q1".into(), BTreeMap::from([("d1".into(), 0.8)]));

        let evaluator = RelevanceEvaluator::new(&qrels, &[5]);
        let eval = &evaluator.evaluate(&results)["q1"];
        assert_eq!(eval.ndcg[0], 0.0);
        assert_eq!(eval.map[0], 0.0);
        assert_eq!(eval.recall[0], 0.0);
        assert_eq!(eval.precision[0], 0.0);
    }

    #[test]
    fn negative_grades_contribute_no_gain() {
        let mut qrels = Qrels::new();
        qrels.insert(
            "q1".into(),
            BTreeMap::from([("d1".into(), -2), ("d2".into(), 1)]),
        );
        let mut results = ResultSet::new();
        results.insert(
            "q1".into(),
            BTreeMap::from([("d1".into(), 0.9), ("d2".into(), 0.8)]),
        );

        let evaluator = RelevanceEvaluator::new(&qrels, &[2]);
        let eval = &evaluator.evaluate(&results)["q1"];
        // only d2 counts: dcg = 1/log2(3), idcg = 1
        assert!((eval.ndcg[0] - 1.0 / 3.0_f64.log2()).abs() < 1e-9);
        assert!((eval.precision[0] - 0.5).abs() < 1e-9);
    }
}
