pub mod intake;
pub mod lock;
pub mod normalize;
pub mod reconcile;
pub mod rollover;
pub mod search;
pub mod store;
pub mod surface;
pub mod types;

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Convert raw bytes back to an f32 embedding.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity implied by an L2 distance between unit vectors, from
/// `d² = 2(1 − cos)`.
pub fn l2_to_cosine(distance: f64) -> f64 {
    1.0 - (distance * distance) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(bytes), v);
    }

    #[test]
    fn l2_distance_maps_to_cosine_similarity() {
        // Identical unit vectors: zero distance, similarity 1.0
        assert_eq!(l2_to_cosine(0.0), 1.0);
        // Orthogonal unit vectors: distance sqrt(2), similarity 0.0
        assert!(l2_to_cosine(std::f64::consts::SQRT_2).abs() < 1e-9);
        // Opposite unit vectors: distance 2, similarity -1.0
        assert!((l2_to_cosine(2.0) + 1.0).abs() < 1e-9);
    }
}
