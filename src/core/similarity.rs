/// Characters that end a sentence when splitting run-on paragraphs
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Prepare a text group for embedding.
///
/// A single paragraph containing sentence-ending punctuation is split into
/// its sentences so it isn't embedded as one unit. Anything else is
/// returned as given.
pub fn split_sentences(texts: &[String]) -> Vec<String> {
    match texts {
        [single] if single.contains(SENTENCE_TERMINATORS) => single
            .split(SENTENCE_TERMINATORS)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => texts.to_vec(),
    }
}

/// Element-wise mean of a set of vectors
///
/// Returns `None` for an empty set or ragged dimensions.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return None;
    }

    let mut pooled = vec![0.0f32; dim];
    for vector in vectors {
        for (acc, value) in pooled.iter_mut().zip(vector) {
            *acc += value;
        }
    }
    let count = vectors.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= count);
    Some(pooled)
}

/// Cosine similarity clamped into [0, 1]
///
/// Negative similarity counts as no similarity; zero-length or mismatched
/// vectors score 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_paragraph_is_split() {
        let texts = strings(&["I build models. I train them! Do I ship them?"]);
        assert_eq!(
            split_sentences(&texts),
            strings(&["I build models", "I train them", "Do I ship them"])
        );
    }

    #[test]
    fn test_multiple_elements_kept_as_given() {
        let texts = strings(&["Reading sci-fi.", "Chess."]);
        assert_eq!(split_sentences(&texts), texts);
    }

    #[test]
    fn test_single_element_without_punctuation_kept() {
        let texts = strings(&["Building custom keyboards"]);
        assert_eq!(split_sentences(&texts), texts);
    }

    #[test]
    fn test_mean_pool() {
        let pooled = mean_pool(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(pooled, vec![0.5, 0.5]);
        assert!(mean_pool(&[]).is_none());
        assert!(mean_pool(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        // Opposite vectors are floored at zero
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
