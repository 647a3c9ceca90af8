//! Embedder trait abstraction
//!
//! Defines the embedding-provider capability the search engine is
//! polymorphic over: text, image and fused text+image encoding, each
//! returning an embedding matrix aligned to input order.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Ordered embedding matrix: one row per input item, row order matches the
/// item order that produced it.
pub type EmbeddingMatrix = Vec<Vec<f32>>;

/// A batch of loaded image payloads, aligned to item order within the batch.
#[derive(Debug, Clone, Default)]
pub struct ImageBatch {
    pub images: Vec<Vec<u8>>,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Configuration for an embedder backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Human-readable name for this configuration
    pub name: String,
    /// Backend type (e.g. fastembed)
    pub backend: String,
    /// Model identifier
    pub model: String,
    /// Vector dimensions
    pub dimensions: usize,
}

/// Unified trait for embedding backends.
///
/// The search engine calls exactly one of the three encode paths per
/// collection, selected by the collection's modality tag. Backends that only
/// cover a subset of modalities keep the default implementations, which fail
/// with a backend-capability error.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Get the configuration for this embedder
    fn config(&self) -> &EmbedderConfig;

    /// Get the name of this embedder configuration
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Get the vector dimensions produced by this embedder
    fn dimensions(&self) -> usize {
        self.config().dimensions
    }

    /// Embed a slice of texts; rows align to input order.
    async fn embed_texts(&self, texts: &[String], batch_size: usize) -> Result<EmbeddingMatrix>;

    /// Embed pre-loaded image batches; rows align to the concatenated batch
    /// order.
    async fn embed_images(
        &self,
        batches: &[ImageBatch],
        batch_size: usize,
    ) -> Result<EmbeddingMatrix> {
        let _ = (batches, batch_size);
        bail!("backend `{}` does not support image inputs", self.name())
    }

    /// Embed joint text+image inputs; `texts` and the concatenated `batches`
    /// describe the same items in the same order.
    async fn embed_fused(
        &self,
        texts: &[String],
        batches: &[ImageBatch],
        batch_size: usize,
    ) -> Result<EmbeddingMatrix> {
        let _ = (texts, batches, batch_size);
        bail!(
            "backend `{}` does not support fused text+image inputs",
            self.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TextOnly {
        config: EmbedderConfig,
    }

    #[async_trait::async_trait]
    impl Embedder for TextOnly {
        fn config(&self) -> &EmbedderConfig {
            &self.config
        }

        async fn embed_texts(
            &self,
            texts: &[String],
            _batch_size: usize,
        ) -> Result<EmbeddingMatrix> {
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn image_paths_default_to_unsupported() {
        let backend = TextOnly {
            config: EmbedderConfig {
                name: "text-only".into(),
                backend: "mock".into(),
                model: "mock".into(),
                dimensions: 2,
            },
        };
        let err = backend.embed_images(&[], 8).await.unwrap_err();
        assert!(err.to_string().contains("does not support image inputs"));
        let err = backend.embed_fused(&[], &[], 8).await.unwrap_err();
        assert!(err.to_string().contains("fused"));
    }
}
