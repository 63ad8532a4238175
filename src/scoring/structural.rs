use std::borrow::Cow;

use once_cell::sync::Lazy;
use rust_stemmers::{Algorithm, Stemmer};

use super::ngram::clipped_overlap;
use super::{Metric, MetricKind, NormalizedText, OverlapScore, ScoreValue};
use crate::error::MetricUnavailable;

/// Which ROUGE measure a scorer computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RougeVariant {
    /// Clipped n-gram overlap of the given order
    NGram(usize),
    /// Longest common subsequence of tokens
    LongestCommonSubsequence,
}

static ENGLISH_STEMMER: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));

// Tokens this short are left as written
const MIN_STEMMED_LENGTH: usize = 4;

/// ROUGE precision/recall/F1 between the candidate and the reference.
///
/// Precision is measured against the candidate and recall against the
/// reference, so swapping the arguments swaps the two. When stemming is on
/// (the default) tokens of four or more characters are reduced with the
/// English Snowball stemmer before matching, so "deploy" and "deployment"
/// count as the same word.
#[derive(Debug, Clone, Copy)]
pub struct StructuralOverlapScorer {
    variant: RougeVariant,
    stemming: bool,
}

impl StructuralOverlapScorer {
    pub fn rouge1() -> Self {
        Self::new(RougeVariant::NGram(1))
    }

    pub fn rouge2() -> Self {
        Self::new(RougeVariant::NGram(2))
    }

    pub fn rouge_l() -> Self {
        Self::new(RougeVariant::LongestCommonSubsequence)
    }

    fn new(variant: RougeVariant) -> Self {
        Self {
            variant,
            stemming: true,
        }
    }

    pub fn with_stemming(mut self, stemming: bool) -> Self {
        self.stemming = stemming;
        self
    }

    pub fn variant(&self) -> RougeVariant {
        self.variant
    }

    pub fn stemming(&self) -> bool {
        self.stemming
    }

    pub fn overlap(&self, reference: &[String], candidate: &[String]) -> OverlapScore {
        match self.variant {
            RougeVariant::NGram(n) => {
                if n == 0 {
                    return OverlapScore::ZERO;
                }
                if reference.len() < n || candidate.len() < n {
                    // Too short for this order: an exact repeat still matches fully
                    return if !reference.is_empty() && reference == candidate {
                        OverlapScore::from_precision_recall(1.0, 1.0)
                    } else {
                        OverlapScore::ZERO
                    };
                }
                let (matched, candidate_total) = clipped_overlap(reference, candidate, n);
                let reference_total = reference.len() + 1 - n;
                OverlapScore::from_counts(matched, candidate_total, reference_total)
            }
            RougeVariant::LongestCommonSubsequence => {
                let lcs = lcs_length(reference, candidate);
                OverlapScore::from_counts(lcs, candidate.len(), reference.len())
            }
        }
    }
}

impl Metric for StructuralOverlapScorer {
    fn kind(&self) -> MetricKind {
        match self.variant {
            RougeVariant::NGram(1) => MetricKind::Rouge1,
            RougeVariant::NGram(_) => MetricKind::Rouge2,
            RougeVariant::LongestCommonSubsequence => MetricKind::RougeL,
        }
    }

    fn score(
        &self,
        reference: &NormalizedText,
        candidate: &NormalizedText,
    ) -> Result<ScoreValue, MetricUnavailable> {
        let reference = self.match_forms(&reference.tokens);
        let candidate = self.match_forms(&candidate.tokens);
        Ok(ScoreValue::Overlap(self.overlap(&reference, &candidate)))
    }
}

impl StructuralOverlapScorer {
    fn match_forms<'a>(&self, tokens: &'a [String]) -> Cow<'a, [String]> {
        if self.stemming {
            Cow::Owned(stem_tokens(tokens))
        } else {
            Cow::Borrowed(tokens)
        }
    }
}

pub(crate) fn stem_tokens(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .map(|token| {
            if token.chars().count() >= MIN_STEMMED_LENGTH {
                ENGLISH_STEMMER.stem(token).into_owned()
            } else {
                token.clone()
            }
        })
        .collect()
}

/// Length of the longest common token subsequence, two-row DP
fn lcs_length(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev_row = vec![0usize; b.len() + 1];
    let mut curr_row = vec![0usize; b.len() + 1];

    for token_a in a {
        for (j, token_b) in b.iter().enumerate() {
            curr_row[j + 1] = if token_a == token_b {
                prev_row[j] + 1
            } else {
                prev_row[j + 1].max(curr_row[j])
            };
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b.len()]
}
