//! Deterministic provider mocks
//!
//! No network, no randomness: embeddings hash words into a fixed number of
//! buckets so texts sharing vocabulary land close together, and the LLM
//! mock replays a canned response.

use async_trait::async_trait;
use engram_core::{EmbeddingProvider, LlmProvider, ProviderError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const MOCK_DIMENSIONS: usize = 16;

// ============================================================================
// EMBEDDINGS
// ============================================================================

/// Bag-of-words hashing embedder.
///
/// Deterministic and vocabulary-sensitive: texts sharing most words score
/// high cosine similarity, disjoint texts score near zero.
pub struct MockEmbeddings;

impl MockEmbeddings {
    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; MOCK_DIMENSIONS];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() as usize) % MOCK_DIMENSIONS] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(Self::vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        MOCK_DIMENSIONS
    }
}

// ============================================================================
// LLM
// ============================================================================

/// Replays a canned completion for every call
pub struct MockLlm {
    response: String,
}

impl MockLlm {
    /// Respond with the given body verbatim
    pub fn replaying(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }

    /// Valid extraction with nothing to extract
    pub fn empty() -> Self {
        Self::replaying(r#"{"entities": [], "relationships": [], "tags": []}"#)
    }

    /// A person working at an organization, fenced the way real models
    /// like to answer
    pub fn person_at_org(person: &str, org: &str) -> Self {
        Self::replaying(&format!(
            "```json\n{{\"category\": \"fact\", \"entities\": [\
             {{\"name\": \"{person}\", \"type\": \"person\"}}, \
             {{\"name\": \"{org}\", \"type\": \"organization\"}}], \
             \"relationships\": [{{\"source\": \"{person}\", \"target\": \"{org}\", \
             \"type\": \"WORKS_AT\", \"confidence\": 0.9}}], \
             \"tags\": [{{\"name\": \"work\", \"category\": \"topic\"}}]}}\n```"
        ))
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        Ok(self.response.clone())
    }
}
