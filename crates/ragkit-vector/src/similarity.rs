//! Canonical similarity: every backend reports scores in `[0, 1]`, higher is closer.

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Map cosine similarity `[-1, 1]` onto `[0, 1]`.
pub fn from_cosine(cos: f32) -> f32 {
    ((cos + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Map a cosine distance `[0, 2]` onto `[0, 1]`: `1 - d / 2`.
pub fn from_cosine_distance(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}
