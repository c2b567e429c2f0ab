//! Vector math and embedding blob codec
//!
//! Embeddings are stored as little-endian f32 blobs next to their nodes and
//! compared brute-force with cosine similarity. Dimension mismatches score
//! 0.0 rather than erroring - a half-migrated store must not take down the
//! retrieval path.

/// Cosine similarity between two vectors
///
/// Returns 0.0 for mismatched dimensions or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Encode an embedding as a little-endian f32 blob
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian f32 blob back into an embedding
///
/// Returns `None` if the blob length is not a multiple of 4.
pub fn embedding_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    let vector = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Some(vector)
}

// ============================================================================
// TESTS
// ============================================================================
