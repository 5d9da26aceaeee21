//! Semantic news index
//!
//! Built offline by the `ingest` binary, loaded read-only by the news
//! search tool. The embedding model is recorded in the index header and
//! checked on load.

use crate::gemini::GeminiClient;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod chunker;
pub mod store;

pub use chunker::{Chunker, CHUNK_OVERLAP, CHUNK_SIZE};
pub use store::{build_index, fingerprint, IndexHeader, IndexedChunk, NewsIndex, SearchHit};

/// Text → vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier; indexes built with another model are rejected
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Gemini embedding model over `batchEmbedContents`
pub struct GeminiEmbedder {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(client: Arc<GeminiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client.embed_batch(&self.model, texts).await
    }
}
