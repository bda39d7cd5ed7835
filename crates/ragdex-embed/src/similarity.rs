use std::cmp::Ordering;

/// Compute cosine similarity between two vectors; 0.0 on length mismatch or
/// a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Rank `candidates` by cosine similarity to `query`, highest first, keep at
/// most `k`, and drop scores below `cutoff`. Equal scores keep the order the
/// candidates were given in.
pub fn top_k_by_similarity<'a, T, I>(query: &[f32], candidates: I, k: usize, cutoff: Option<f32>) -> Vec<(T, f32)>
where
    I: IntoIterator<Item = (T, &'a [f32])>,
{
    let mut scored: Vec<(T, f32)> = candidates
        .into_iter()
        .map(|(item, emb)| (item, cosine_similarity(query, emb)))
        .filter(|(_, score)| cutoff.map_or(true, |c| *score >= c))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn ties_keep_input_order() {
        let a = [1.0f32, 0.0];
        let b = [1.0f32, 0.0];
        let c = [0.0f32, 1.0];
        let ranked = top_k_by_similarity(&[1.0, 0.0], vec![("c", &c[..]), ("a", &a[..]), ("b", &b[..])], 2, None);
        assert_eq!(ranked.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn cutoff_filters() {
        let a = [1.0f32, 0.0];
        let c = [0.0f32, 1.0];
        let ranked = top_k_by_similarity(&[1.0, 0.0], vec![(1, &a[..]), (2, &c[..])], 10, Some(0.5));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, 1);
    }
}
