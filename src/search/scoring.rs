//! Similarity scoring and bounded top-k selection.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Similarity function used to score query/corpus embedding pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFunction {
    /// Cosine similarity
    CosSim,
    /// Dot product
    Dot,
}

impl ScoreFunction {
    /// Parse a score function name, rejecting anything outside the
    /// supported set before any encoding work happens.
    pub fn parse(name: &str) -> Result<Self, EvalError> {
        match name {
            "cos_sim" => Ok(Self::CosSim),
            "dot" => Ok(Self::Dot),
            other => Err(EvalError::InvalidScoreFunction(other.to_string())),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::CosSim => "cos_sim",
            Self::Dot => "dot",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CosSim => "Cosine Similarity",
            Self::Dot => "Dot Product",
        }
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Full query×doc score matrix for one corpus chunk.
///
/// Cosine rows are left unguarded on purpose: a zero vector yields NaN,
/// which [`replace_nan`] maps to the −1 sentinel.
pub fn score_matrix(
    function: ScoreFunction,
    queries: &[Vec<f32>],
    docs: &[Vec<f32>],
) -> Vec<Vec<f32>> {
    match function {
        ScoreFunction::Dot => queries
            .iter()
            .map(|q| docs.iter().map(|d| dot(q, d)).collect())
            .collect(),
        ScoreFunction::CosSim => {
            let doc_norms: Vec<f32> = docs.iter().map(|d| norm(d)).collect();
            queries
                .iter()
                .map(|q| {
                    let q_norm = norm(q);
                    docs.iter()
                        .zip(doc_norms.iter())
                        .map(|(d, d_norm)| dot(q, d) / (q_norm * d_norm))
                        .collect()
                })
                .collect()
        }
    }
}

/// Replace NaN scores with the −1 sentinel so degenerate vectors never win
/// a top-k slot over any valid alternative.
pub fn replace_nan(scores: &mut [Vec<f32>]) {
    for row in scores.iter_mut() {
        for score in row.iter_mut() {
            if score.is_nan() {
                *score = -1.0;
            }
        }
    }
}

/// A scored corpus entry with a total order: score first; on exactly equal
/// scores the lexicographically lower id ranks higher.
#[derive(Debug, Clone)]
struct ScoredDoc {
    score: f32,
    id: String,
}

impl Ord for ScoredDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScoredDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScoredDoc {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredDoc {}

/// Bounded min-heap holding the best `capacity` corpus entries seen so far
/// for one query: push while under capacity, otherwise push-then-pop-min.
///
/// Total ranking cost is O(n · log(capacity)) over the whole corpus,
/// independent of how the corpus was chunked.
#[derive(Debug)]
pub struct TopKHeap {
    capacity: usize,
    heap: BinaryHeap<Reverse<ScoredDoc>>,
}

impl TopKHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer one candidate; the id is only cloned if it survives the
    /// competition.
    pub fn push(&mut self, score: f32, id: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(ScoredDoc {
                score,
                id: id.to_string(),
            }));
            return;
        }
        let replace = match self.heap.peek() {
            Some(Reverse(min)) => match score.total_cmp(&min.score) {
                Ordering::Greater => true,
                Ordering::Equal => id < min.id.as_str(),
                Ordering::Less => false,
            },
            None => false,
        };
        if replace {
            self.heap.pop();
            self.heap.push(Reverse(ScoredDoc {
                score,
                id: id.to_string(),
            }));
        }
    }

    /// Drain into an unordered id→score mapping. Heap order is not
    /// preserved; callers needing ranked order sort downstream.
    pub fn into_map(self) -> BTreeMap<String, f32> {
        self.heap
            .into_iter()
            .map(|Reverse(doc)| (doc.id, doc.score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_only_known_functions() {
        assert_eq!(ScoreFunction::parse("cos_sim").unwrap(), ScoreFunction::CosSim);
        assert_eq!(ScoreFunction::parse("dot").unwrap(), ScoreFunction::Dot);
        let err = ScoreFunction::parse("euclidean").unwrap_err();
        assert!(matches!(err, EvalError::InvalidScoreFunction(name) if name == "euclidean"));
    }

    #[test]
    fn cosine_matches_direct_formula() {
        let queries = vec![vec![1.0, 0.0]];
        let docs = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let scores = score_matrix(ScoreFunction::CosSim, &queries, &docs);
        assert!((scores[0][0] - 1.0).abs() < 1e-6);
        assert!(scores[0][1].abs() < 1e-6);
        assert!((scores[0][2] - 1.0 / 2.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn dot_product_ignores_magnitude_normalization() {
        let queries = vec![vec![2.0, 1.0]];
        let docs = vec![vec![3.0, -1.0]];
        let scores = score_matrix(ScoreFunction::Dot, &queries, &docs);
        assert!((scores[0][0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_cosine_becomes_sentinel() {
        let queries = vec![vec![1.0, 0.0]];
        let docs = vec![vec![0.0, 0.0]];
        let mut scores = score_matrix(ScoreFunction::CosSim, &queries, &docs);
        assert!(scores[0][0].is_nan());
        replace_nan(&mut scores);
        assert_eq!(scores[0][0], -1.0);
    }

    #[test]
    fn heap_keeps_highest_scores_within_capacity() {
        let mut heap = TopKHeap::new(2);
        heap.push(0.1, "d1");
        heap.push(0.9, "d2");
        heap.push(0.5, "d3");
        let map = heap.into_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("d2"), Some(&0.9));
        assert_eq!(map.get("d3"), Some(&0.5));
    }

    #[test]
    fn heap_tie_break_prefers_lower_id() {
        let mut heap = TopKHeap::new(1);
        heap.push(0.5, "db");
        heap.push(0.5, "da");
        let map = heap.into_map();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["da"]);

        // insertion order must not matter
        let mut heap = TopKHeap::new(1);
        heap.push(0.5, "da");
        heap.push(0.5, "db");
        let map = heap.into_map();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["da"]);
    }

    #[test]
    fn heap_holds_fewer_entries_than_capacity_when_underfilled() {
        let mut heap = TopKHeap::new(10);
        heap.push(0.3, "only");
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.into_map().len(), 1);
    }

    #[test]
    fn sentinel_loses_to_any_valid_score() {
        let mut heap = TopKHeap::new(1);
        heap.push(-1.0, "degenerate");
        heap.push(0.01, "valid");
        let map = heap.into_map();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["valid"]);
    }
}
