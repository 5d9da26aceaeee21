//! Persisted vector index with an embedding-model fingerprint

use crate::error::AnalystError;
use crate::index::{Chunker, Embedder};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info, warn};

pub const INDEX_FORMAT_VERSION: u32 = 1;

const EMBED_BATCH_SIZE: usize = 64;

/// SHA-256 tag identifying the embedding space of a model
pub fn fingerprint(model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"embedding-model:");
    hasher.update(model.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexHeader {
    pub format_version: u32,
    pub embedding_model: String,
    pub fingerprint: String,
    /// 0 until the first chunk is inserted
    pub dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub source: String,
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub source: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsIndex {
    header: IndexHeader,
    chunks: Vec<IndexedChunk>,
}

impl NewsIndex {
    /// Empty index bound to `embedder`'s model, with default chunking
    pub fn empty(embedder: &dyn Embedder, dimension: usize) -> Self {
        Self::with_chunker(embedder, dimension, &Chunker::default())
    }

    pub fn with_chunker(embedder: &dyn Embedder, dimension: usize, chunker: &Chunker) -> Self {
        Self {
            header: IndexHeader {
                format_version: INDEX_FORMAT_VERSION,
                embedding_model: embedder.model().to_string(),
                fingerprint: fingerprint(embedder.model()),
                dimension,
                chunk_size: chunker.chunk_size(),
                chunk_overlap: chunker.chunk_overlap(),
                built_at: Utc::now(),
            },
            chunks: Vec::new(),
        }
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn insert(&mut self, chunk: IndexedChunk) -> Result<()> {
        if chunk.vector.is_empty() {
            return Err(AnalystError::IndexError(format!(
                "Empty embedding for chunk from {}",
                chunk.source
            )));
        }

        if self.header.dimension == 0 {
            self.header.dimension = chunk.vector.len();
        } else if chunk.vector.len() != self.header.dimension {
            return Err(AnalystError::IndexIncompatible(format!(
                "chunk dimension {} does not match index dimension {}",
                chunk.vector.len(),
                self.header.dimension
            )));
        }

        self.chunks.push(chunk);
        Ok(())
    }

    /// Top `k` chunks by cosine similarity, keeping only scores above `min_score`
    pub fn search(&self, query: &[f32], k: usize, min_score: f32) -> Result<Vec<SearchHit>> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.header.dimension {
            return Err(AnalystError::IndexIncompatible(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.header.dimension
            )));
        }

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(query, &chunk.vector), chunk))
            .filter(|(score, _)| *score > min_score)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| SearchHit {
                source: chunk.source.clone(),
                text: chunk.text.clone(),
                score,
            })
            .collect())
    }

    /// Reject indexes built for a different embedding space
    pub fn check_compatible(&self, embedder: &dyn Embedder) -> Result<()> {
        if self.header.format_version != INDEX_FORMAT_VERSION {
            return Err(AnalystError::IndexIncompatible(format!(
                "index format version {} (expected {})",
                self.header.format_version, INDEX_FORMAT_VERSION
            )));
        }

        if self.header.fingerprint != fingerprint(embedder.model()) {
            return Err(AnalystError::IndexIncompatible(format!(
                "index built with embedding model '{}', retrieval uses '{}'",
                self.header.embedding_model,
                embedder.model()
            )));
        }

        Ok(())
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(self)?;
        tokio::fs::write(path, bytes).await?;

        info!(path = %path.display(), chunks = self.len(), "News index saved");
        Ok(())
    }

    /// Load and verify against `embedder`
    pub async fn load(path: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let index: NewsIndex = serde_json::from_slice(&bytes).map_err(|e| {
            AnalystError::IndexError(format!("Corrupt index at {}: {}", path.display(), e))
        })?;

        index.check_compatible(embedder)?;

        info!(
            path = %path.display(),
            chunks = index.len(),
            model = %index.header.embedding_model,
            "News index loaded"
        );
        Ok(index)
    }

    /// Like [`NewsIndex::load`], but a missing file yields an empty index
    pub async fn load_or_empty(path: &Path, embedder: &dyn Embedder) -> Result<Self> {
        match tokio::fs::try_exists(path).await? {
            true => Self::load(path, embedder).await,
            false => {
                warn!(
                    path = %path.display(),
                    "News index not found; news search will return no results"
                );
                Ok(Self::empty(embedder, 0))
            }
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

/// Read every `.txt` file in `dir`, chunk, embed, and index
pub async fn build_index(
    dir: &Path,
    embedder: &dyn Embedder,
    chunker: &Chunker,
) -> Result<NewsIndex> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        AnalystError::IndexError(format!("Cannot read {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("txt") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(AnalystError::IndexError(format!(
            "No .txt documents in {}",
            dir.display()
        )));
    }

    info!(documents = files.len(), "Loaded documents");

    let mut pending: Vec<(String, String)> = Vec::new();
    for path in &files {
        let text = tokio::fs::read_to_string(path).await?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for chunk in chunker.split(&text) {
            pending.push((source.clone(), chunk));
        }
    }

    info!(chunks = pending.len(), "Split documents into chunks");

    let mut index = NewsIndex::with_chunker(embedder, 0, chunker);

    for batch in pending.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;

        if vectors.len() != batch.len() {
            return Err(AnalystError::IndexError(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            )));
        }

        for ((source, text), vector) in batch.iter().cloned().zip(vectors) {
            index.insert(IndexedChunk {
                source,
                text,
                vector,
            })?;
        }

        debug!(indexed = index.len(), "Embedded batch");
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct LengthEmbedder(&'static str);

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model(&self) -> &str {
            self.0
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    fn chunk(text: &str, vector: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            source: "a.txt".to_string(),
            text: text.to_string(),
            vector,
        }
    }

    #[test]
    fn test_search_ranks_by_cosine() {
        let embedder = LengthEmbedder("m1");
        let mut index = NewsIndex::empty(&embedder, 0);
        index.insert(chunk("east", vec![1.0, 0.0])).unwrap();
        index.insert(chunk("north", vec![0.0, 1.0])).unwrap();
        index.insert(chunk("north-east", vec![1.0, 1.0])).unwrap();

        let hits = index.search(&[0.0, 2.0], 2, 0.0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "north-east");

        let strict = index.search(&[0.0, 2.0], 4, 0.9).unwrap();
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let embedder = LengthEmbedder("m1");
        let mut index = NewsIndex::empty(&embedder, 0);
        index.insert(chunk("east", vec![1.0, 0.0])).unwrap();

        assert!(matches!(
            index.insert(chunk("bad", vec![1.0])),
            Err(AnalystError::IndexIncompatible(_))
        ));
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1, 0.0),
            Err(AnalystError::IndexIncompatible(_))
        ));
    }

    #[tokio::test]
    async fn test_save_load_and_fingerprint_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stores").join("news_index.json");

        let builder_model = LengthEmbedder("text-embedding-004");
        let mut index = NewsIndex::empty(&builder_model, 0);
        index.insert(chunk("Nvidia rallies", vec![1.0, 1.0])).unwrap();
        index.save(&path).await.unwrap();

        let loaded = NewsIndex::load(&path, &builder_model).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.header().dimension, 2);
        assert_eq!(loaded.header().chunk_size, 1024);

        let other_model = LengthEmbedder("bge-large-en-v1.5");
        let mismatch = NewsIndex::load(&path, &other_model).await;
        assert!(matches!(mismatch, Err(AnalystError::IndexIncompatible(_))));
    }

    #[tokio::test]
    async fn test_missing_index_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = LengthEmbedder("m1");
        let index = NewsIndex::load_or_empty(&dir.path().join("absent.json"), &embedder)
            .await
            .unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[1.0], 4, 0.0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_index_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        tokio::fs::write(&file, "x").await.unwrap();

        let embedder = LengthEmbedder("m1");
        let result = NewsIndex::load_or_empty(&file.join("news_index.json"), &embedder).await;
        assert!(matches!(result, Err(AnalystError::IoError(_))));
    }

    #[tokio::test]
    async fn test_build_index_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "EV demand slows.").await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "Nvidia beats estimates.").await.unwrap();
        tokio::fs::write(dir.path().join("notes.md"), "ignored").await.unwrap();

        let embedder = LengthEmbedder("m1");
        let index = build_index(dir.path(), &embedder, &Chunker::default())
            .await
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.chunks[0].source, "a.txt");
        assert_eq!(index.header().fingerprint, fingerprint("m1"));

        let empty = tempfile::tempdir().unwrap();
        let result = build_index(empty.path(), &embedder, &Chunker::default()).await;
        assert!(matches!(result, Err(AnalystError::IndexError(_))));
    }
}
