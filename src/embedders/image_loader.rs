//! Worker-pool batch loading of image payloads.
//!
//! Image bytes are materialized batch by batch on blocking threads, with
//! in-flight batches bounded by the available CPU parallelism. Batch order
//! and item order within each batch are preserved.

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::dataset::{ImageSource, Item};

use super::traits::ImageBatch;

/// Load the image payloads of `items` into batches of `batch_size`.
///
/// Items without an image payload contribute empty bytes; payload
/// completeness is the data supplier's contract.
pub async fn load_image_batches(items: &[Item], batch_size: usize) -> Result<Vec<ImageBatch>> {
    let batch_size = batch_size.max(1);
    let workers = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    debug!(
        items = items.len(),
        batch_size, workers, "loading image batches"
    );

    let mut handles = Vec::new();
    for chunk in items.chunks(batch_size) {
        let sources: Vec<Option<ImageSource>> =
            chunk.iter().map(|item| item.image.clone()).collect();
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .context("image loader pool closed")?;
            tokio::task::spawn_blocking(move || load_batch(&sources))
                .await
                .context("image loader worker panicked")?
        }));
    }

    let mut batches = Vec::with_capacity(handles.len());
    for handle in handles {
        batches.push(handle.await.context("image loader task cancelled")??);
    }
    Ok(batches)
}

fn load_batch(sources: &[Option<ImageSource>]) -> Result<ImageBatch> {
    let mut images = Vec::with_capacity(sources.len());
    for source in sources {
        let bytes = match source {
            Some(ImageSource::Path(path)) => std::fs::read(path)
                .with_context(|| format!("Failed to read image: {path:?}"))?,
            Some(ImageSource::Bytes(bytes)) => bytes.clone(),
            None => Vec::new(),
        };
        images.push(bytes);
    }
    Ok(ImageBatch { images })
}
