//! Text embedding.
//!
//! The [`Embedder`] trait turns text into vectors for vector and hybrid
//! search. [`OpenAiEmbedder`] implements it with the `async-openai`
//! embeddings endpoint.

pub mod openai;

use async_trait::async_trait;

pub use openai::{OpenAiEmbedder, create_embedder};

use crate::error::EmbeddingError;

/// Produces embedding vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts, one vector per input, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] on provider failure or a short response.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] on provider failure.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.is_empty() {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            });
        }
        Ok(vectors.swap_remove(0))
    }
}
