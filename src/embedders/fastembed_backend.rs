//! FastEmbed backend implementation
//!
//! Wraps the fastembed-rs library for ONNX-based text embedding models. This
//! is the default text backend for the CLI; image and fused encoding keep
//! the trait's unsupported defaults.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::traits::{Embedder, EmbedderConfig, EmbeddingMatrix};

/// Supported fastembed models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastEmbedModel {
    /// BAAI/bge-small-en-v1.5 (384 dims)
    BgeSmallEnV15,
    /// BAAI/bge-base-en-v1.5 (768 dims)
    BgeBaseEnV15,
    /// Nomic embed text v1.5 (768 dims)
    NomicEmbedTextV15,
    /// intfloat/multilingual-e5-base (768 dims)
    MultilingualE5Base,
    /// Jina embeddings v2 base code (768 dims)
    JinaEmbeddingsV2BaseCode,
}

impl FastEmbedModel {
    /// Convert to fastembed's EmbeddingModel enum
    pub fn to_fastembed_model(&self) -> EmbeddingModel {
        match self {
            Self::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
            Self::NomicEmbedTextV15 => EmbeddingModel::NomicEmbedTextV15,
            Self::MultilingualE5Base => EmbeddingModel::MultilingualE5Base,
            Self::JinaEmbeddingsV2BaseCode => EmbeddingModel::JinaEmbeddingsV2BaseCode,
        }
    }

    /// Get the vector dimensions for this model
    pub fn dimensions(&self) -> usize {
        match self {
            Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15
            | Self::NomicEmbedTextV15
            | Self::MultilingualE5Base
            | Self::JinaEmbeddingsV2BaseCode => 768,
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::BgeSmallEnV15 => "BGE-small-en-v1.5",
            Self::BgeBaseEnV15 => "BGE-base-en-v1.5",
            Self::NomicEmbedTextV15 => "Nomic-embed-text-v1.5",
            Self::MultilingualE5Base => "Multilingual-E5-Base",
            Self::JinaEmbeddingsV2BaseCode => "Jina-embeddings-v2-base-code",
        }
    }

    /// Get model identifier (for config)
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "BAAI/bge-base-en-v1.5",
            Self::NomicEmbedTextV15 => "nomic-ai/nomic-embed-text-v1.5",
            Self::MultilingualE5Base => "intfloat/multilingual-e5-base",
            Self::JinaEmbeddingsV2BaseCode => "jinaai/jina-embeddings-v2-base-code",
        }
    }

    /// Resolve a CLI model name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "bge-small" => Some(Self::BgeSmallEnV15),
            "bge-base" => Some(Self::BgeBaseEnV15),
            "nomic" => Some(Self::NomicEmbedTextV15),
            "e5-base" => Some(Self::MultilingualE5Base),
            "jina-code" => Some(Self::JinaEmbeddingsV2BaseCode),
            _ => None,
        }
    }

    /// CLI name for this model.
    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::BgeSmallEnV15 => "bge-small",
            Self::BgeBaseEnV15 => "bge-base",
            Self::NomicEmbedTextV15 => "nomic",
            Self::MultilingualE5Base => "e5-base",
            Self::JinaEmbeddingsV2BaseCode => "jina-code",
        }
    }

    /// List all available models
    pub fn all() -> Vec<Self> {
        vec![
            Self::BgeSmallEnV15,
            Self::BgeBaseEnV15,
            Self::NomicEmbedTextV15,
            Self::MultilingualE5Base,
            Self::JinaEmbeddingsV2BaseCode,
        ]
    }
}

/// FastEmbed backend for ONNX-based text embeddings
pub struct FastEmbedBackend {
    model: Arc<Mutex<TextEmbedding>>,
    config: EmbedderConfig,
}

impl FastEmbedBackend {
    /// Create a new FastEmbed backend with the specified model
    pub fn new(model_type: FastEmbedModel) -> Result<Self> {
        tracing::info!("Initializing FastEmbed model: {}", model_type.name());

        let start = Instant::now();
        let init_options =
            InitOptions::new(model_type.to_fastembed_model()).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options).context(format!(
            "Failed to initialize FastEmbed model: {}",
            model_type.name()
        ))?;
        tracing::info!(
            "FastEmbed model {} loaded in {:?}",
            model_type.name(),
            start.elapsed()
        );

        let config = EmbedderConfig {
            name: format!("fastembed-{}", model_type.name()),
            backend: "fastembed".to_string(),
            model: model_type.model_id().to_string(),
            dimensions: model_type.dimensions(),
        };

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            config,
        })
    }
}

#[async_trait::async_trait]
impl Embedder for FastEmbedBackend {
    fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    async fn embed_texts(&self, texts: &[String], batch_size: usize) -> Result<EmbeddingMatrix> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let texts = texts.to_vec();
        let model = Arc::clone(&self.model);

        // fastembed is synchronous; run off the async runtime
        tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().unwrap();
            let refs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
            guard
                .embed(refs, Some(batch_size))
                .context("Failed to generate batch embeddings")
        })
        .await?
    }
}
