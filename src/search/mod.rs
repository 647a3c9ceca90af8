//! Chunked exact dense-retrieval search.
//!
//! The corpus is processed in contiguous chunks so that embeddings for the
//! full corpus are never held simultaneously: only one chunk's embeddings
//! plus the running per-query top-k state are alive at any time. Chunks are
//! scored strictly sequentially because the per-query heaps are shared
//! mutable state across chunk iterations.

pub mod cached;
pub mod scoring;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::dataset::{collect_texts, Item, ItemCollection, Modality};
use crate::embedders::{load_image_batches, Embedder, EmbeddingMatrix};
use crate::error::{EvalError, Result};

pub use cached::load_previous_results;
pub use scoring::{ScoreFunction, TopKHeap};

/// query id → {corpus id → similarity score}, at most `top_k` entries per
/// query. Built incrementally during search and sealed once returned.
pub type ResultSet = BTreeMap<String, BTreeMap<String, f32>>;

/// Engine knobs. The chunk size bounds peak memory; the batch size is
/// forwarded to the embedding provider.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub corpus_chunk_size: usize,
    pub batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            corpus_chunk_size: 20_000,
            batch_size: 128,
        }
    }
}

/// Exact (brute-force) dense retrieval over an embedding provider.
pub struct DenseExactSearch {
    model: Arc<dyn Embedder>,
    config: SearchConfig,
}

impl DenseExactSearch {
    pub fn new(model: Arc<dyn Embedder>) -> Self {
        Self::with_config(model, SearchConfig::default())
    }

    pub fn with_config(model: Arc<dyn Embedder>, config: SearchConfig) -> Self {
        let config = SearchConfig {
            corpus_chunk_size: config.corpus_chunk_size.max(1),
            batch_size: config.batch_size.max(1),
        };
        Self { model, config }
    }

    /// Rank every corpus item against every query and keep the global
    /// top-`top_k` per query.
    ///
    /// Exactly equal scores are resolved in favor of the lexicographically
    /// lower corpus id, independent of chunking and insertion order.
    pub async fn search(
        &self,
        corpus: &ItemCollection,
        queries: &ItemCollection,
        top_k: usize,
        score_function: ScoreFunction,
    ) -> Result<ResultSet> {
        let query_ids = queries.ids();
        let mut results: ResultSet = query_ids
            .iter()
            .map(|qid| (qid.clone(), BTreeMap::new()))
            .collect();
        let (Some(q_modality), Some(corpus_modality)) = (queries.modality(), corpus.modality())
        else {
            // one of the collections is empty; nothing to rank
            return Ok(results);
        };

        info!("Encoding queries");
        let query_embeddings = self.encode(queries.items(), q_modality).await?;

        info!(
            "Scoring function: {} ({})",
            score_function.description(),
            score_function.key()
        );
        info!("Encoding corpus in chunks of {}", self.config.corpus_chunk_size);

        let mut heaps: Vec<TopKHeap> = query_ids.iter().map(|_| TopKHeap::new(top_k)).collect();
        for (chunk_index, chunk) in corpus
            .items()
            .chunks(self.config.corpus_chunk_size)
            .enumerate()
        {
            info!(chunk = chunk_index, size = chunk.len(), "Encoding corpus chunk");
            let chunk_embeddings = self.encode(chunk, corpus_modality).await?;

            let mut scores =
                scoring::score_matrix(score_function, &query_embeddings, &chunk_embeddings);
            // NaN comes from degenerate (zero) vectors; the sentinel keeps
            // such pairs out of the top-k whenever any valid score competes.
            scoring::replace_nan(&mut scores);

            for (heap, row) in heaps.iter_mut().zip(scores.iter()) {
                for (item, &score) in chunk.iter().zip(row.iter()) {
                    heap.push(score, &item.id);
                }
            }
        }

        for (qid, heap) in query_ids.into_iter().zip(heaps) {
            results.insert(qid, heap.into_map());
        }
        Ok(results)
    }

    async fn encode(&self, items: &[Item], modality: Modality) -> Result<EmbeddingMatrix> {
        let batch_size = self.config.batch_size;
        let embeddings = match modality {
            Modality::Text => {
                let texts = collect_texts(items);
                self.model
                    .embed_texts(&texts, batch_size)
                    .await
                    .map_err(EvalError::Embed)?
            }
            Modality::Image => {
                let batches = load_image_batches(items, batch_size)
                    .await
                    .map_err(EvalError::Embed)?;
                self.model
                    .embed_images(&batches, batch_size)
                    .await
                    .map_err(EvalError::Embed)?
            }
            Modality::TextImage => {
                let texts = collect_texts(items);
                let batches = load_image_batches(items, batch_size)
                    .await
                    .map_err(EvalError::Embed)?;
                self.model
                    .embed_fused(&texts, &batches, batch_size)
                    .await
                    .map_err(EvalError::Embed)?
            }
        };
        if embeddings.len() != items.len() {
            return Err(EvalError::Embed(anyhow::anyhow!(
                "backend `{}` returned {} embeddings for {} items",
                self.model.name(),
                embeddings.len(),
                items.len()
            )));
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Item;
    use crate::embedders::{EmbedderConfig, ImageBatch};
    use anyhow::Result as AnyResult;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Embeds each text payload by parsing it as comma-separated floats.
    struct VectorEmbedder {
        config: EmbedderConfig,
    }

    impl VectorEmbedder {
        fn new() -> Self {
            Self {
                config: EmbedderConfig {
                    name: "vector-mock".into(),
                    backend: "mock".into(),
                    model: "mock".into(),
                    dimensions: 0,
                },
            }
        }
    }

    #[async_trait::async_trait]
    impl Embedder for VectorEmbedder {
        fn config(&self) -> &EmbedderConfig {
            &self.config
        }

        async fn embed_texts(
            &self,
            texts: &[String],
            _batch_size: usize,
        ) -> AnyResult<EmbeddingMatrix> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.is_empty() {
                        Vec::new()
                    } else {
                        t.split(',').map(|f| f.parse::<f32>().unwrap()).collect()
                    }
                })
                .collect())
        }

        async fn embed_images(
            &self,
            batches: &[ImageBatch],
            _batch_size: usize,
        ) -> AnyResult<EmbeddingMatrix> {
            // one row per image: first byte, as a 1-d embedding
            Ok(batches
                .iter()
                .flat_map(|b| b.images.iter())
                .map(|bytes| vec![bytes.first().copied().unwrap_or(0) as f32])
                .collect())
        }
    }

    /// Drops every other embedding, violating the alignment contract.
    struct MisalignedEmbedder {
        config: EmbedderConfig,
    }

    #[async_trait::async_trait]
    impl Embedder for MisalignedEmbedder {
        fn config(&self) -> &EmbedderConfig {
            &self.config
        }

        async fn embed_texts(
            &self,
            texts: &[String],
            _batch_size: usize,
        ) -> AnyResult<EmbeddingMatrix> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }

    fn vec_item(id: &str, components: &[f32]) -> Item {
        let text = components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        Item::text(id, text)
    }

    fn engine(chunk_size: usize) -> DenseExactSearch {
        DenseExactSearch::with_config(
            Arc::new(VectorEmbedder::new()),
            SearchConfig {
                corpus_chunk_size: chunk_size,
                batch_size: 128,
            },
        )
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    #[tokio::test]
    async fn round_trip_against_direct_cosine() {
        let corpus = ItemCollection::new(vec![
            vec_item("d1", &[1.0, 0.0]),
            vec_item("d2", &[0.8, 0.6]),
            vec_item("d3", &[0.0, 1.0]),
        ]);
        let queries = ItemCollection::new(vec![vec_item("q1", &[1.0, 0.1])]);

        let results = engine(20_000)
            .search(&corpus, &queries, 2, ScoreFunction::CosSim)
            .await
            .unwrap();

        let q1 = &results["q1"];
        assert_eq!(q1.len(), 2);
        let s1 = q1["d1"];
        let s2 = q1["d2"];
        assert!((s1 - cosine(&[1.0, 0.0], &[1.0, 0.1])).abs() < 1e-6);
        assert!((s2 - cosine(&[0.8, 0.6], &[1.0, 0.1])).abs() < 1e-6);
        assert!(s1 >= s2);
        assert!(!q1.contains_key("d3"));
    }

    #[tokio::test]
    async fn chunking_does_not_change_the_selected_set() {
        let corpus = ItemCollection::new(vec![
            vec_item("d1", &[1.0, 0.0]),
            vec_item("d2", &[0.8, 0.6]),
            vec_item("d3", &[0.0, 1.0]),
        ]);
        let queries = ItemCollection::new(vec![vec_item("q1", &[1.0, 0.1])]);

        let mut outcomes = Vec::new();
        for chunk_size in [1, 2, 3] {
            let results = engine(chunk_size)
                .search(&corpus, &queries, 2, ScoreFunction::CosSim)
                .await
                .unwrap();
            outcomes.push(results);
        }
        assert_eq!(outcomes[0], outcomes[1]);
        assert_eq!(outcomes[1], outcomes[2]);
    }

    #[tokio::test]
    async fn chunked_search_equals_one_shot_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let dim = 8;
        let corpus_items: Vec<Item> = (0..57)
            .map(|i| {
                let v: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect();
                vec_item(&format!("d{i:03}"), &v)
            })
            .collect();
        let query_items: Vec<Item> = (0..3)
            .map(|i| {
                let v: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect();
                vec_item(&format!("q{i}"), &v)
            })
            .collect();
        let corpus = ItemCollection::new(corpus_items);
        let queries = ItemCollection::new(query_items);

        let one_shot = engine(20_000)
            .search(&corpus, &queries, 10, ScoreFunction::Dot)
            .await
            .unwrap();
        let chunked = engine(7)
            .search(&corpus, &queries, 10, ScoreFunction::Dot)
            .await
            .unwrap();
        assert_eq!(one_shot, chunked);
        for docs in one_shot.values() {
            assert_eq!(docs.len(), 10);
        }
    }

    #[tokio::test]
    async fn result_size_is_min_of_corpus_and_top_k() {
        let corpus = ItemCollection::new(vec![
            vec_item("d1", &[1.0, 0.0]),
            vec_item("d2", &[0.9, 0.1]),
        ]);
        let queries = ItemCollection::new(vec![vec_item("q1", &[1.0, 0.0])]);

        let results = engine(20_000)
            .search(&corpus, &queries, 10, ScoreFunction::CosSim)
            .await
            .unwrap();
        assert_eq!(results["q1"].len(), 2);
    }

    #[tokio::test]
    async fn nan_scores_never_beat_valid_alternatives() {
        // d_zero has a zero vector: cosine is NaN, mapped to the sentinel
        let corpus = ItemCollection::new(vec![
            vec_item("d_zero", &[0.0, 0.0]),
            vec_item("d_far", &[-1.0, 0.0]),
        ]);
        let queries = ItemCollection::new(vec![vec_item("q1", &[1.0, 0.0])]);

        let results = engine(20_000)
            .search(&corpus, &queries, 1, ScoreFunction::CosSim)
            .await
            .unwrap();
        assert_eq!(
            results["q1"].keys().collect::<Vec<_>>(),
            vec!["d_far"],
            "sentinel-scored pair must lose to any valid score"
        );
    }

    #[tokio::test]
    async fn every_query_id_is_present_even_with_empty_corpus() {
        let corpus = ItemCollection::default();
        let queries = ItemCollection::new(vec![vec_item("q1", &[1.0]), vec_item("q2", &[2.0])]);

        let results = engine(20_000)
            .search(&corpus, &queries, 5, ScoreFunction::Dot)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results["q1"].is_empty());
        assert!(results["q2"].is_empty());
    }

    #[tokio::test]
    async fn image_collections_use_the_image_encode_path() {
        use crate::dataset::ImageSource;
        let corpus = ItemCollection::new(vec![
            Item {
                id: "i1".into(),
                modality: Modality::Image,
                text: None,
                image: Some(ImageSource::Bytes(vec![10])),
            },
            Item {
                id: "i2".into(),
                modality: Modality::Image,
                text: None,
                image: Some(ImageSource::Bytes(vec![200])),
            },
        ]);
        let queries = ItemCollection::new(vec![vec_item("q1", &[1.0])]);

        let results = engine(20_000)
            .search(&corpus, &queries, 1, ScoreFunction::Dot)
            .await
            .unwrap();
        assert_eq!(results["q1"].keys().collect::<Vec<_>>(), vec!["i2"]);
    }

    #[tokio::test]
    async fn misaligned_backend_is_rejected() {
        let model = MisalignedEmbedder {
            config: EmbedderConfig {
                name: "misaligned".into(),
                backend: "mock".into(),
                model: "mock".into(),
                dimensions: 1,
            },
        };
        let search = DenseExactSearch::new(Arc::new(model));
        let corpus = ItemCollection::new(vec![vec_item("d1", &[1.0])]);
        let queries = ItemCollection::new(vec![vec_item("q1", &[1.0]), vec_item("q2", &[2.0])]);

        let err = search
            .search(&corpus, &queries, 1, ScoreFunction::Dot)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Embed(_)));
    }
}
