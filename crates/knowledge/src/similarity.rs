//! Cosine similarity and top-k ranking.

use tether_core::knowledge::Document;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Score every `(vector, document)` pair against `query` and keep the best `limit`.
///
/// Results carry their similarity in [`Document::score`], highest first.
pub fn rank<'a, I>(entries: I, query: &[f32], limit: usize) -> Vec<Document>
where
    I: IntoIterator<Item = (&'a [f32], &'a Document)>,
{
    let mut scored: Vec<(f32, &Document)> = entries
        .into_iter()
        .map(|(vector, doc)| (cosine_similarity(vector, query), doc))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
        .into_iter()
        .map(|(score, doc)| {
            let mut doc = doc.clone();
            doc.score = Some(score);
            doc
        })
        .collect()
}

/// Little-endian `f32` encoding for BLOB columns.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_blob`]. Returns `None` on a truncated blob.
pub fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
