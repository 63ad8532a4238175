use tracing::warn;

use super::{clamp_unit, Metric, MetricKind, NormalizedText, ScoreValue};
use crate::error::MetricUnavailable;

/// Texts longer than this are compared through a representative sample
const MAX_TEXT_LENGTH: usize = 10_000;
/// Above this length only two DP rows are kept
const TWO_ROW_THRESHOLD: usize = 1_000;

/// Character-level Levenshtein similarity over the normalized strings
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistanceScorer;

impl EditDistanceScorer {
    /// `1 - distance / max_len`, 1.0 when both texts are empty
    pub fn similarity(&self, text1: &str, text2: &str) -> f64 {
        let len1 = text1.chars().count();
        let len2 = text2.chars().count();
        let max_len = len1.max(len2);

        if max_len == 0 {
            return 1.0;
        }

        let distance = self.levenshtein_distance(text1, text2);
        clamp_unit(1.0 - distance as f64 / max_len as f64)
    }

    /// Whether `levenshtein_distance` would estimate rather than compute exactly
    pub fn is_estimated(&self, text1: &str, text2: &str) -> bool {
        let len1 = text1.chars().count();
        let len2 = text2.chars().count();
        len1 > MAX_TEXT_LENGTH || len2 > MAX_TEXT_LENGTH
    }

    /// Levenshtein distance with memory safety limits
    pub fn levenshtein_distance(&self, text1: &str, text2: &str) -> usize {
        let len1 = text1.chars().count();
        let len2 = text2.chars().count();

        if len1 == 0 {
            return len2;
        }
        if len2 == 0 {
            return len1;
        }

        if self.is_estimated(text1, text2) {
            warn!(
                "Text lengths exceed safe limit for exact Levenshtein calculation: {} and {} chars (max: {}). \
                Using sampling approach to estimate distance.",
                len1, len2, MAX_TEXT_LENGTH
            );
            return self.estimate_distance_for_large_texts(text1, text2, MAX_TEXT_LENGTH);
        }

        let chars1: Vec<char> = text1.chars().collect();
        let chars2: Vec<char> = text2.chars().collect();

        if len1 > TWO_ROW_THRESHOLD || len2 > TWO_ROW_THRESHOLD {
            return levenshtein_two_rows(&chars1, &chars2);
        }

        let mut matrix = vec![vec![0usize; len2 + 1]; len1 + 1];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[0] = i;
        }
        for j in 0..=len2 {
            matrix[0][j] = j;
        }

        for i in 1..=len1 {
            for j in 1..=len2 {
                let cost = usize::from(chars1[i - 1] != chars2[j - 1]);
                matrix[i][j] = (matrix[i - 1][j] + 1) // deletion
                    .min(matrix[i][j - 1] + 1) // insertion
                    .min(matrix[i - 1][j - 1] + cost); // substitution
            }
        }

        matrix[len1][len2]
    }

    /// Sample head, middle and tail of both texts and scale the sample distance up
    fn estimate_distance_for_large_texts(&self, text1: &str, text2: &str, sample_size: usize) -> usize {
        let sample1 = representative_sample(text1, sample_size);
        let sample2 = representative_sample(text2, sample_size);

        let sample_distance = levenshtein_two_rows(&sample1, &sample2);

        let max_len = text1.chars().count().max(text2.chars().count());
        let sample_len = sample1.len().max(sample2.len());
        if sample_len == 0 {
            return max_len;
        }

        let scaling_factor = max_len as f64 / sample_len as f64;
        let estimated = (sample_distance as f64 * scaling_factor) as usize;
        estimated.min(max_len)
    }
}

impl Metric for EditDistanceScorer {
    fn kind(&self) -> MetricKind {
        MetricKind::Levenshtein
    }

    fn score(
        &self,
        reference: &NormalizedText,
        candidate: &NormalizedText,
    ) -> Result<ScoreValue, MetricUnavailable> {
        Ok(ScoreValue::Scalar(self.similarity(&reference.text, &candidate.text)))
    }

    fn caveat(&self, reference: &NormalizedText, candidate: &NormalizedText) -> Option<String> {
        self.is_estimated(&reference.text, &candidate.text).then(|| {
            format!(
                "{} is estimated from a sample: texts exceed {} characters",
                MetricKind::Levenshtein,
                MAX_TEXT_LENGTH
            )
        })
    }
}

fn levenshtein_two_rows(chars1: &[char], chars2: &[char]) -> usize {
    let len1 = chars1.len();
    let len2 = chars2.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row = vec![0usize; len2 + 1];

    for i in 1..=len1 {
        curr_row[0] = i;
        for j in 1..=len2 {
            let cost = usize::from(chars1[i - 1] != chars2[j - 1]);
            curr_row[j] = (prev_row[j] + 1)
                .min(curr_row[j - 1] + 1)
                .min(prev_row[j - 1] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len2]
}

fn representative_sample(text: &str, max_sample_size: usize) -> Vec<char> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_sample_size {
        return chars;
    }

    let chunk_size = max_sample_size / 3;
    let mut sample = Vec::with_capacity(max_sample_size);

    sample.extend_from_slice(&chars[..chunk_size]);

    let mid_start = (chars.len() - chunk_size) / 2;
    sample.extend_from_slice(&chars[mid_start..mid_start + chunk_size]);

    sample.extend_from_slice(&chars[chars.len() - chunk_size..]);

    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        let scorer = EditDistanceScorer;

        assert_eq!(scorer.levenshtein_distance("hello", "hello"), 0);
        assert_eq!(scorer.levenshtein_distance("hello", "hallo"), 1);
        assert_eq!(scorer.levenshtein_distance("", ""), 0);
        assert_eq!(scorer.levenshtein_distance("hello", ""), 5);
        assert_eq!(scorer.levenshtein_distance("", "world"), 5);
        assert_eq!(scorer.levenshtein_distance("abc", "xyz"), 3);
        assert_eq!(scorer.levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let scorer = EditDistanceScorer;
        assert_eq!(scorer.levenshtein_distance("café", "cafe"), 1);
        assert!((scorer.similarity("café", "cafe") - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_two_row_variant_matches_full_matrix() {
        let a: String = "continuous integration ".repeat(60);
        let b: String = "continuous deployment ".repeat(60);
        assert!(a.chars().count() > TWO_ROW_THRESHOLD);

        let chars_a: Vec<char> = a.chars().collect();
        let chars_b: Vec<char> = b.chars().collect();
        let short_a: String = chars_a[..200].iter().collect();
        let short_b: String = chars_b[..200].iter().collect();

        let scorer = EditDistanceScorer;
        assert_eq!(
            scorer.levenshtein_distance(&short_a, &short_b),
            levenshtein_two_rows(&chars_a[..200], &chars_b[..200])
        );
        assert!(scorer.levenshtein_distance(&a, &b) > 0);
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        let scorer = EditDistanceScorer;
        assert_eq!(scorer.similarity("the powerhouse of the cell", "the powerhouse of the cell"), 1.0);
        assert_eq!(scorer.similarity("", ""), 1.0);
        assert_eq!(scorer.similarity("abc", ""), 0.0);
        assert_eq!(scorer.similarity("feedback loops", "feed back"), scorer.similarity("feed back", "feedback loops"));
    }

    #[test]
    fn test_similarity_monotonic_in_shared_characters() {
        let scorer = EditDistanceScorer;
        let same = scorer.similarity("cat", "cat");
        let two_shared = scorer.similarity("cat", "cot");
        let one_shared = scorer.similarity("cat", "cow");
        let none_shared = scorer.similarity("cat", "dog");
        assert!(same > two_shared);
        assert!(two_shared > one_shared);
        assert!(one_shared > none_shared);
        assert!(none_shared >= scorer.similarity("cat", "xyz123"));
    }

    #[test]
    fn test_large_texts_are_estimated() {
        let scorer = EditDistanceScorer;
        let a = "a".repeat(MAX_TEXT_LENGTH + 10);
        let b = "b".repeat(MAX_TEXT_LENGTH + 10);
        assert!(scorer.is_estimated(&a, &b));

        let distance = scorer.levenshtein_distance(&a, &b);
        assert!(distance <= MAX_TEXT_LENGTH + 10);
        assert!(scorer.similarity(&a, &b) < 0.01);

        assert!(!scorer.is_estimated("short", "texts"));
    }

    #[test]
    fn test_texts_at_the_limit_are_exact() {
        let scorer = EditDistanceScorer;
        let a = "ab".repeat(MAX_TEXT_LENGTH / 2);
        let b = format!("{}c", "ab".repeat(MAX_TEXT_LENGTH / 2 - 1));
        assert_eq!(a.chars().count(), MAX_TEXT_LENGTH);
        assert!(!scorer.is_estimated(&a, &b));
        assert!(!scorer.is_estimated(&a, &a));

        // Replacing the final "ab" with "c" is one substitution plus one deletion
        assert_eq!(scorer.levenshtein_distance(&a, &b), 2);

        let reference = NormalizedText {
            text: a.clone(),
            tokens: vec![a.clone()],
        };
        let candidate = NormalizedText {
            text: b.clone(),
            tokens: vec![b.clone()],
        };
        assert!(scorer.caveat(&reference, &candidate).is_none());
    }

    #[test]
    fn test_representative_sample_size() {
        let text = "x".repeat(30_000);
        let sample = representative_sample(&text, 9_000);
        assert_eq!(sample.len(), 9_000);

        let short = representative_sample("short", 9_000);
        assert_eq!(short.len(), 5);
    }
}
