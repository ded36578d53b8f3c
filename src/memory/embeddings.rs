//! Deterministic hash-based embeddings
//!
//! No model download, no network: token n-grams are hashed into a fixed-size
//! vector and normalized. Quality is well below a real embedding model, but
//! the vectors are deterministic, which keeps similarity ranking reproducible
//! in tests and lets the knowledge store work fully offline.

/// Embed text into a `dim`-sized vector using positional token hashing.
pub fn embed_hash(text: &str, dim: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut embedding = vec![0.0f32; dim];
    let tokens: Vec<&str> = text.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate() {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        (i as u64).hash(&mut hasher);
        let hash = hasher.finish();

        for (j, slot) in embedding.iter_mut().enumerate() {
            let mut hasher = DefaultHasher::new();
            hash.hash(&mut hasher);
            (j as u64).hash(&mut hasher);
            let val = hasher.finish();
            let normalized = (val as f64 / u64::MAX as f64) * 2.0 - 1.0;
            *slot += normalized as f32;
        }
    }

    // Normalize the embedding
    let mag: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag > 0.0 {
        for val in embedding.iter_mut() {
            *val /= mag;
        }
    }

    embedding
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
