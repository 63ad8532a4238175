pub mod config;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod scoring;

#[cfg(test)]
mod tests;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use config::Config;
pub use error::{InputError, MetricUnavailable, ProviderError, ScoringError};
pub use scoring::{MetricKind, ScoreAggregator, ScoreReport};
