//! Retriever capability
//!
//! `search` returns the top-k passages for a query, best first. The default
//! implementation is a brute-force cosine index over embedded passages.

use crate::error::OrchestrationError;
use crate::llm::Embedder;
use crate::models::{Capability, Passage};
use crate::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const EMBED_BATCH_SIZE: usize = 32;

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Passage>>;
}

struct IndexedPassage {
    passage: Passage,
    embedding: Vec<f32>,
}

/// In-memory vector index backed by an embedding capability
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: RwLock<Vec<IndexedPassage>>,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            embedder,
            index: RwLock::new(Vec::new()),
            top_k,
        }
    }

    /// Embed and append passages to the index
    pub async fn index_passages(&self, passages: Vec<Passage>) -> Result<usize> {
        let mut indexed = Vec::with_capacity(passages.len());

        for batch in passages.chunks(EMBED_BATCH_SIZE) {
            let inputs: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
            let embeddings = self.embedder.embed(&inputs).await?;

            indexed.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(embeddings)
                    .map(|(passage, embedding)| IndexedPassage { passage, embedding }),
            );
        }

        let added = indexed.len();
        let mut index = self.index.write().await;
        index.extend(indexed);

        info!(added, total = index.len(), "Passages indexed");
        Ok(added)
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn search(&self, query: &str) -> Result<Vec<Passage>> {
        if self.is_empty().await {
            return Err(OrchestrationError::unavailable(
                Capability::Retriever,
                "corpus is empty",
            ));
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| OrchestrationError::unavailable(Capability::Retriever, e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                OrchestrationError::unavailable(Capability::Retriever, "no query embedding")
            })?;

        let index = self.index.read().await;
        let mut scored: Vec<(usize, f32)> = index
            .iter()
            .enumerate()
            .map(|(i, item)| (i, cosine_similarity(&query_embedding, &item.embedding)))
            .collect();

        // stable: equal scores keep corpus order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let results: Vec<Passage> = scored
            .into_iter()
            .take(self.top_k)
            .map(|(i, _)| index[i].passage.clone())
            .collect();

        debug!(returned = results.len(), "Retrieval complete");
        Ok(results)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
