//! Embedding backends abstraction
//!
//! Provides a unified trait for embedding providers plus the default
//! fastembed (ONNX runtime) text backend and the worker-pool image batch
//! loader.

pub mod fastembed_backend;
pub mod image_loader;
pub mod traits;

pub use fastembed_backend::{FastEmbedBackend, FastEmbedModel};
pub use image_loader::load_image_batches;
pub use traits::{Embedder, EmbedderConfig, EmbeddingMatrix, ImageBatch};
